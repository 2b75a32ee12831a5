use std::fmt;

use crate::Unit;

/// Deduplication key of a cached variable: `(name, index, unit)`.
///
/// Two requests with equal keys anywhere in one data manager resolve to the
/// same shared variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VarKey {
	pub name: Box<str>,
	pub index: u32,
	pub unit: Unit,
}

impl VarKey {
	pub fn new(name: impl Into<Box<str>>, index: u32, unit: Unit) -> Self {
		Self {
			name: name.into(),
			index,
			unit,
		}
	}
}

impl fmt::Display for VarKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}:{} ({})", self.name, self.index, self.unit)
	}
}
