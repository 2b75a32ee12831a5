//! Host boundary for the simbridge data manager.
//!
//! The data manager never talks to a simulator directly. Everything it needs
//! from the host process goes through the [`Host`] trait:
//! * a named-value store (`register_named`, `read_named`, `write_named`)
//! * an indexed, read-only value table (`lookup_indexed`, `read_indexed`)
//! * a command bus (`map_event`, `transmit_event`, `subscribe_event`)
//! * a batch facility (`define_data`, `request_data`, `write_data`)
//! * a message pump (`next_message`) delivering [`HostMessage`]s
//!
//! [`LocalHost`] is an in-process implementation backed by plain maps.

#![warn(missing_docs)]

pub mod error;
pub mod host;
pub mod local;
pub mod message;

pub use error::{HostError, Result};
pub use host::Host;
pub use local::{LocalHost, LocalHostStats};
pub use message::{GROUP_PRIORITY_DEFAULT, GROUP_PRIORITY_HIGHEST, HostMessage, ReadPeriod, exception_name};
