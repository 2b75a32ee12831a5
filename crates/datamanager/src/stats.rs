//! Activity counters.

/// Running totals of data manager activity, read through
/// [`DataManager::stats`](crate::DataManager::stats).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DataManagerStats {
	/// Completed frames.
	pub ticks: u64,
	/// Successful variable fetches.
	pub fetches: u64,
	/// Failed host lookups or reads.
	pub lookup_failures: u64,
	/// Successful variable and batch writes.
	pub writes: u64,
	/// Writes the host rejected.
	pub write_failures: u64,
	/// Writes refused because the target is read-only.
	pub invalid_writes: u64,
	/// Batch read requests issued.
	pub requests_sent: u64,
	/// Batch replies copied into a payload.
	pub replies_applied: u64,
	/// One-shot batch reads given up after a host exception or timeout.
	pub abandoned_requests: u64,
	/// Replies dropped because nobody was waiting for them.
	pub unsolicited_replies: u64,
	/// Events triggered toward the host.
	pub events_triggered: u64,
	/// Inbound notifications dispatched to callbacks.
	pub events_dispatched: u64,
	/// Callbacks that panicked during dispatch.
	pub callback_panics: u64,
	/// Host messages drained by the pump.
	pub messages_pumped: u64,
}
