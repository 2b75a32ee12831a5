//! The host trait.

use simbridge_primitives::{ClientEventId, DefinitionId, EventArgs, FieldDef, HostVarId, RequestId, Unit};

use crate::{HostMessage, ReadPeriod, Result};

/// Everything the data manager consumes from its host process.
///
/// All calls are synchronous and non-blocking. Batch reads are answered later
/// through [`next_message`](Host::next_message), correlated by [`RequestId`].
/// Implementations are used from a single thread and take `&self`; interior
/// mutability is the implementation's concern.
pub trait Host {
	/// Registers (or looks up) a user-defined named variable.
	fn register_named(&self, name: &str) -> Result<HostVarId>;

	/// Reads a named variable in `unit`.
	fn read_named(&self, id: HostVarId, unit: Unit) -> Result<f64>;

	/// Writes a named variable in `unit`.
	fn write_named(&self, id: HostVarId, unit: Unit, value: f64) -> Result<()>;

	/// Resolves an indexed host variable by name.
	fn lookup_indexed(&self, name: &str) -> Result<HostVarId>;

	/// Reads entry `index` of an indexed host variable in `unit`.
	fn read_indexed(&self, id: HostVarId, unit: Unit, index: u32) -> Result<f64>;

	/// Executes a calculator code snippet, used to set indexed variables
	/// through key events.
	fn execute_calculator_code(&self, code: &str) -> Result<()>;

	/// Maps a client event id to a host command name.
	fn map_event(&self, id: ClientEventId, name: &str) -> Result<()>;

	/// Transmits a mapped command with up to five parameters.
	fn transmit_event(&self, id: ClientEventId, args: EventArgs) -> Result<()>;

	/// Adds a mapped command to the inbound notification group.
	///
	/// `mask` asks the host not to propagate the notification to lower
	/// priority listeners.
	fn subscribe_event(&self, id: ClientEventId, group_priority: u32, mask: bool) -> Result<()>;

	/// Removes a mapped command from the inbound notification group.
	fn unsubscribe_event(&self, id: ClientEventId) -> Result<()>;

	/// Registers a batch schema under `def`.
	fn define_data(&self, def: DefinitionId, fields: &[FieldDef]) -> Result<()>;

	/// Requests an asynchronous read of batch `def`, answered under `request`.
	fn request_data(&self, def: DefinitionId, request: RequestId, period: ReadPeriod) -> Result<()>;

	/// Synchronously writes a whole batch payload.
	fn write_data(&self, def: DefinitionId, data: &[u8]) -> Result<()>;

	/// Pops the next queued message, if any.
	fn next_message(&self) -> Option<HostMessage>;
}
