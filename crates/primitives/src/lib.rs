//! Core value types shared between the host boundary and the data manager.

/// Event argument tuples carried by host notifications and outbound triggers.
pub mod event_args;
/// Batch field schema types.
pub mod field;
/// Identifier newtypes and the monotonic generator that issues them.
pub mod ids;
/// Deduplication keys for cached variables.
pub mod key;
/// Interned measurement units.
pub mod unit;

pub use event_args::{EventArgs, MAX_EVENT_PARAMS};
pub use field::{FieldDef, FieldType, schema_size};
pub use ids::{CallbackId, ClientEventId, CounterIdGen, DefinitionId, HostVarId, Id, IdGen, RequestId};
pub use key::VarKey;
pub use unit::Unit;
