//! Data manager configuration.
//!
//! Every field has a default, so an empty document is a valid config:
//!
//! ```toml
//! default_epsilon = 0.001
//! staleness_policy = "any_expired"
//! event_group_priority = 1
//! max_messages_per_pump = 64
//! request_timeout_ticks = 120
//! catch_callback_panics = true
//! ```

use std::path::Path;

use serde::Deserialize;
use simbridge_host::GROUP_PRIORITY_HIGHEST;

use crate::error::{DataError, Result};
use crate::staleness::StalenessPolicy;

/// Tunables shared by every handle a [`DataManager`](crate::DataManager) creates.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DataManagerConfig {
	/// Change threshold for variables created without an explicit epsilon.
	pub default_epsilon: f64,
	/// How time and tick budgets combine when deciding staleness.
	pub staleness_policy: StalenessPolicy,
	/// Priority of the group inbound notifications are subscribed under.
	pub event_group_priority: u32,
	/// Upper bound on messages drained per pump; `None` drains the queue.
	pub max_messages_per_pump: Option<usize>,
	/// Ticks after which an unanswered one-shot batch read is abandoned and
	/// auto-read may request again; `None` waits forever.
	pub request_timeout_ticks: Option<u64>,
	/// Catch panics raised by event callbacks instead of unwinding through
	/// the dispatcher.
	pub catch_callback_panics: bool,
}

impl Default for DataManagerConfig {
	fn default() -> Self {
		Self {
			default_epsilon: f64::MIN_POSITIVE,
			staleness_policy: StalenessPolicy::default(),
			event_group_priority: GROUP_PRIORITY_HIGHEST,
			max_messages_per_pump: None,
			request_timeout_ticks: None,
			catch_callback_panics: true,
		}
	}
}

impl DataManagerConfig {
	/// Parses a TOML document.
	pub fn from_toml_str(input: &str) -> Result<Self> {
		Ok(toml::from_str(input)?)
	}

	/// Reads and parses a TOML file.
	pub fn load(path: &Path) -> Result<Self> {
		let input = std::fs::read_to_string(path).map_err(|error| DataError::Io {
			path: path.to_path_buf(),
			error,
		})?;
		Self::from_toml_str(&input)
	}
}
