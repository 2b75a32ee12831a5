use std::fmt;
use std::marker::PhantomData;

/// Simple counter-based ID generator.
///
/// Starts at 1 so that 0 never names a live host object. IDs are never reused
/// within one generator.
#[derive(Debug, Clone, Copy)]
pub struct CounterIdGen(u64);

impl Default for CounterIdGen {
	fn default() -> Self {
		Self::new()
	}
}

impl CounterIdGen {
	/// Creates a new counter starting at 1.
	#[must_use]
	pub const fn new() -> Self {
		Self(1)
	}

	/// Generates the next unique ID and increments the counter.
	#[allow(clippy::should_implement_trait, reason = "convention")]
	pub fn next(&mut self) -> u64 {
		let id = self.0;
		self.0 += 1;
		id
	}

	/// Returns the ID the next call to [`next`](Self::next) will hand out.
	pub const fn peek(&self) -> u64 {
		self.0
	}
}

/// Identifier newtype backed by a raw `u64`.
pub trait Id: Copy + Eq + std::hash::Hash + fmt::Debug {
	/// Wraps a raw value.
	fn from_raw(raw: u64) -> Self;

	/// Returns the raw value.
	fn raw(self) -> u64;
}

/// Typed wrapper around [`CounterIdGen`] issuing one kind of identifier.
pub struct IdGen<T> {
	counter: CounterIdGen,
	_marker: PhantomData<fn() -> T>,
}

impl<T> fmt::Debug for IdGen<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("IdGen").field("next", &self.counter.peek()).finish()
	}
}

impl<T> Clone for IdGen<T> {
	fn clone(&self) -> Self {
		Self {
			counter: self.counter,
			_marker: PhantomData,
		}
	}
}

impl<T> Default for IdGen<T> {
	fn default() -> Self {
		Self {
			counter: CounterIdGen::new(),
			_marker: PhantomData,
		}
	}
}

impl<T: Id> IdGen<T> {
	/// Creates a generator whose first ID is 1.
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns a fresh identifier.
	#[allow(clippy::should_implement_trait, reason = "convention")]
	pub fn next(&mut self) -> T {
		T::from_raw(self.counter.next())
	}
}

macro_rules! define_id {
	($(#[$meta:meta])* $name:ident, $prefix:literal) => {
		$(#[$meta])*
		#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
		pub struct $name(pub u64);

		impl Id for $name {
			fn from_raw(raw: u64) -> Self {
				Self(raw)
			}

			fn raw(self) -> u64 {
				self.0
			}
		}

		impl fmt::Display for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				write!(f, concat!($prefix, "#{}"), self.0)
			}
		}
	};
}

define_id!(
	/// Host definition token for a batch schema. Stable for the record's lifetime.
	DefinitionId,
	"def"
);
define_id!(
	/// Request token correlating one asynchronous batch read with its reply.
	RequestId,
	"req"
);
define_id!(
	/// Client-side identifier mapped to a host command/notification name.
	ClientEventId,
	"evt"
);
define_id!(
	/// Handle returned when a callback is attached to an event.
	CallbackId,
	"cb"
);
define_id!(
	/// Host-assigned handle for a named or indexed variable.
	HostVarId,
	"var"
);
