//! Error types reported by host calls.

use simbridge_primitives::{ClientEventId, DefinitionId, HostVarId};
use thiserror::Error;

/// Failure of a single host call.
///
/// The host offers no exception mechanism; every failure is a value the
/// caller decides how to absorb.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
	/// A named or indexed variable does not exist on the host.
	#[error("unknown variable: {0}")]
	UnknownVariable(String),

	/// A variable handle was never issued by this host.
	#[error("unknown variable handle: {0}")]
	UnknownHandle(HostVarId),

	/// A client event id was never mapped.
	#[error("unknown client event: {0}")]
	UnknownEvent(ClientEventId),

	/// A batch definition id was never registered.
	#[error("unknown data definition: {0}")]
	UnknownDefinition(DefinitionId),

	/// A payload did not match the registered schema size.
	#[error("payload size mismatch: expected {expected} bytes, got {actual}")]
	SizeMismatch {
		/// Size of the registered schema.
		expected: usize,
		/// Size of the offered payload.
		actual: usize,
	},

	/// The host refused the operation.
	#[error("{op} rejected: {reason}")]
	Rejected {
		/// Operation name.
		op: &'static str,
		/// Host supplied reason.
		reason: String,
	},
}

/// Result type for host calls.
pub type Result<T> = std::result::Result<T, HostError>;
