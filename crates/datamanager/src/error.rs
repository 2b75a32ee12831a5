//! Error taxonomy of the data manager.
//!
//! Most failures never leave the call that produced them: the public handle
//! methods absorb them and [`report`](DataError::report) them through
//! `tracing` with a severity per variant. The `try_*` variants of those
//! methods return them instead.

use std::path::PathBuf;

use simbridge_host::HostError;
use simbridge_primitives::{MAX_EVENT_PARAMS, RequestId};
use thiserror::Error;

/// Errors produced by the data manager.
#[derive(Debug, Error)]
pub enum DataError {
	/// A host variable or table entry does not exist.
	#[error("lookup failed for {name}: {source}")]
	LookupFailure {
		/// Variable name.
		name: String,
		/// Host failure.
		#[source]
		source: HostError,
	},

	/// A batch payload size disagrees with its field schema.
	#[error("schema mismatch for {name}: payload is {payload_size} bytes, fields need {schema_size}")]
	SchemaMismatch {
		/// Batch debug name.
		name: String,
		/// Declared or received payload size.
		payload_size: usize,
		/// Sum of the field widths.
		schema_size: usize,
	},

	/// A reply arrived for a request token nobody is waiting on.
	#[error("unsolicited reply for {0}")]
	UnsolicitedReply(RequestId),

	/// A write was attempted on a read-only variable.
	#[error("invalid write to read-only variable {0}")]
	InvalidWrite(String),

	/// A write was attempted before any value was cached.
	#[error("nothing cached for {0}")]
	EmptyCache(String),

	/// The host rejected command mapping or subscription.
	#[error("subscription failed for {name}: {source}")]
	SubscriptionFailure {
		/// Command name.
		name: String,
		/// Host failure.
		#[source]
		source: HostError,
	},

	/// An event was triggered with more parameters than the host accepts.
	#[error("too many event parameters: {0} (max {MAX_EVENT_PARAMS})")]
	TooManyParams(usize),

	/// A phase was driven before `initialize` or after `shutdown`.
	#[error("data manager is not initialized")]
	NotInitialized,

	/// Any other host call failed.
	#[error(transparent)]
	Host(#[from] HostError),

	/// Configuration could not be parsed.
	#[error("config parse error: {0}")]
	Config(#[from] toml::de::Error),

	/// Configuration file could not be read.
	#[error("I/O error reading {path}: {error}")]
	Io {
		/// Path of the file.
		path: PathBuf,
		/// Underlying error.
		error: std::io::Error,
	},
}

impl DataError {
	/// Returns true for failures that are expected in normal operation.
	pub fn is_warning(&self) -> bool {
		matches!(self, Self::UnsolicitedReply(_))
	}

	/// Logs the error at its taxonomy severity.
	pub fn report(&self) {
		if self.is_warning() {
			tracing::warn!(error = %self, "data_manager.warning");
		} else {
			tracing::error!(error = %self, "data_manager.error");
		}
	}
}

/// Result type for data manager operations.
pub type Result<T> = std::result::Result<T, DataError>;

/// Reports an error and converts the result into a success flag.
pub(crate) fn absorb<T>(result: Result<T>) -> Option<T> {
	result.map_err(|error| error.report()).ok()
}
