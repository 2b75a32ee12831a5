/// Maximum number of numeric parameters an event can carry.
pub const MAX_EVENT_PARAMS: usize = 5;

/// Parameter tuple of an inbound notification or outbound trigger.
///
/// `count` is the number of meaningful parameters; the remaining slots are 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventArgs {
	pub count: usize,
	pub params: [u32; MAX_EVENT_PARAMS],
}

impl EventArgs {
	pub const fn new(count: usize, params: [u32; MAX_EVENT_PARAMS]) -> Self {
		Self { count, params }
	}

	/// Builds args from a slice, zero-filling unused trailing slots.
	///
	/// Returns `None` when the slice holds more than [`MAX_EVENT_PARAMS`] values.
	pub fn from_slice(values: &[u32]) -> Option<Self> {
		if values.len() > MAX_EVENT_PARAMS {
			return None;
		}
		let mut params = [0; MAX_EVENT_PARAMS];
		params[..values.len()].copy_from_slice(values);
		Some(Self {
			count: values.len(),
			params,
		})
	}

	/// Returns the meaningful parameters.
	pub fn used(&self) -> &[u32] {
		&self.params[..self.count.min(MAX_EVENT_PARAMS)]
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn trailing_params_default_to_zero() {
		let args = EventArgs::from_slice(&[7, 9]).unwrap();
		assert_eq!(args.count, 2);
		assert_eq!(args.params, [7, 9, 0, 0, 0]);
		assert_eq!(args.used(), &[7, 9]);
	}

	#[test]
	fn rejects_more_than_five() {
		assert!(EventArgs::from_slice(&[1, 2, 3, 4, 5, 6]).is_none());
		assert!(EventArgs::from_slice(&[1, 2, 3, 4, 5]).is_some());
	}
}
