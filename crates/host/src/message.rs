//! Messages delivered by the host message pump.

use simbridge_primitives::{ClientEventId, DefinitionId, EventArgs, RequestId};

/// Highest notification group priority.
pub const GROUP_PRIORITY_HIGHEST: u32 = 1;

/// Default notification group priority.
pub const GROUP_PRIORITY_DEFAULT: u32 = 2_000_000_000;

/// How often the host answers a batch read request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ReadPeriod {
	/// Cancel an outstanding periodic request.
	Never,
	/// Answer exactly once.
	#[default]
	Once,
	/// Answer on every rendered frame.
	VisualFrame,
	/// Answer on every simulation frame.
	SimFrame,
	/// Answer once per second.
	Second,
}

impl ReadPeriod {
	/// Returns true when the host keeps answering under the same request token.
	pub const fn is_periodic(self) -> bool {
		matches!(self, Self::VisualFrame | Self::SimFrame | Self::Second)
	}
}

/// One message drained from the host queue.
#[derive(Debug, Clone, PartialEq)]
pub enum HostMessage {
	/// Connection to the host is established.
	Open,
	/// The host is shutting down.
	Quit,
	/// The host reported an asynchronous failure of an earlier call.
	Exception {
		/// Host specific exception code.
		code: u32,
	},
	/// An inbound notification for a subscribed client event.
	Event {
		/// Client id the notification was mapped to.
		client_id: ClientEventId,
		/// Notification parameters.
		args: EventArgs,
	},
	/// Reply to a batch read request.
	ObjectData {
		/// Token of the request being answered.
		request_id: RequestId,
		/// Definition the data was encoded with.
		definition_id: DefinitionId,
		/// Raw payload bytes.
		data: Vec<u8>,
	},
}

const EXCEPTION_NAMES: [&str; 38] = [
	"NONE",
	"ERROR",
	"SIZE_MISMATCH",
	"UNRECOGNIZED_ID",
	"UNOPENED",
	"VERSION_MISMATCH",
	"TOO_MANY_GROUPS",
	"NAME_UNRECOGNIZED",
	"TOO_MANY_EVENT_NAMES",
	"EVENT_ID_DUPLICATE",
	"TOO_MANY_MAPS",
	"TOO_MANY_OBJECTS",
	"TOO_MANY_REQUESTS",
	"WEATHER_INVALID_PORT",
	"WEATHER_INVALID_METAR",
	"WEATHER_UNABLE_TO_GET_OBSERVATION",
	"WEATHER_UNABLE_TO_CREATE_STATION",
	"WEATHER_UNABLE_TO_REMOVE_STATION",
	"INVALID_DATA_TYPE",
	"INVALID_DATA_SIZE",
	"DATA_ERROR",
	"INVALID_ARRAY",
	"CREATE_OBJECT_FAILED",
	"LOAD_FLIGHTPLAN_FAILED",
	"OPERATION_INVALID_FOR_OBJECT_TYPE",
	"ILLEGAL_OPERATION",
	"ALREADY_SUBSCRIBED",
	"INVALID_ENUM",
	"DEFINITION_ERROR",
	"DUPLICATE_ID",
	"DATUM_ID",
	"OUT_OF_BOUNDS",
	"ALREADY_CREATED",
	"OBJECT_OUTSIDE_REALITY_BUBBLE",
	"OBJECT_CONTAINER",
	"OBJECT_AI",
	"OBJECT_ATC",
	"OBJECT_SCHEDULE",
];

/// Symbolic name of a host exception code, or `"UNKNOWN"` for codes
/// outside the known table.
pub fn exception_name(code: u32) -> &'static str {
	usize::try_from(code)
		.ok()
		.and_then(|index| EXCEPTION_NAMES.get(index))
		.copied()
		.unwrap_or("UNKNOWN")
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn exception_codes_map_to_names() {
		assert_eq!(exception_name(0), "NONE");
		assert_eq!(exception_name(7), "NAME_UNRECOGNIZED");
		assert_eq!(exception_name(37), "OBJECT_SCHEDULE");
		assert_eq!(exception_name(38), "UNKNOWN");
		assert_eq!(exception_name(u32::MAX), "UNKNOWN");
	}
}
