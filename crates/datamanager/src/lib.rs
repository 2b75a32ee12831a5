//! Variable synchronization and caching layer between client modules and a
//! simulator host.
//!
//! The [`DataManager`] is the single owner of every cached value:
//! * [`Variable`]s are deduplicated by `(name, index, unit)` and refreshed
//!   according to a [`StalenessPolicy`] before client logic runs.
//! * [`DataDefinition`]s group fields into one host transaction; reads are
//!   asynchronous and correlated with replies by [`RequestId`].
//! * [`Event`]s trigger host commands and fan inbound notifications out to
//!   registered callbacks.
//!
//! Each frame the driver calls [`DataManager::pre_update`], then
//! [`DataManager::update`], then [`DataManager::post_update`]. Everything is
//! single-threaded; handles are cheap `Rc` clones sharing state with the
//! manager.
//!
//! [`RequestId`]: simbridge_primitives::RequestId

pub mod config;
mod context;
pub mod data_definition;
pub mod error;
pub mod event;
pub mod manager;
pub mod staleness;
pub mod stats;
pub mod variable;

pub use config::DataManagerConfig;
pub use data_definition::{DataDefinition, DefinitionOptions};
pub use error::{DataError, Result};
pub use event::{Event, EventCallback};
pub use manager::DataManager;
pub use simbridge_host::{Host, HostMessage, LocalHost, ReadPeriod};
pub use simbridge_primitives::{
	CallbackId, ClientEventId, DefinitionId, EventArgs, FieldDef, FieldType, RequestId, Unit, VarKey,
};
pub use staleness::{FrameClock, Freshness, StalenessPolicy};
pub use stats::DataManagerStats;
pub use variable::{CommandWriter, VarOptions, Variable, VariableKind};
