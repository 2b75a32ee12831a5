use std::fmt;

/// Measurement unit understood by the host, identified by its host-side name.
///
/// Units are interned as `'static` strings; two units are equal when their
/// names are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Unit(&'static str);

impl Unit {
	pub const BOOL: Self = Self("Bool");
	pub const CELSIUS: Self = Self("Celsius");
	pub const FEET: Self = Self("Feet");
	pub const FEET_PER_MINUTE: Self = Self("feet/minute");
	pub const FEET_PER_SECOND: Self = Self("feet/second");
	pub const FEET_PER_SECOND_SQUARED: Self = Self("feet per second squared");
	pub const FOOT_POUNDS: Self = Self("Foot pounds");
	pub const GALLONS: Self = Self("Gallons");
	pub const HOURS: Self = Self("Hours");
	pub const MACH: Self = Self("Mach");
	pub const MILLIBARS: Self = Self("Millibars");
	pub const NUMBER: Self = Self("Number");
	pub const PERCENT: Self = Self("Percent");
	pub const PERCENT_OVER_100: Self = Self("Percent over 100");
	pub const POUNDS: Self = Self("Pounds");
	pub const POUNDS_PER_HOUR: Self = Self("Pounds per hour");
	pub const PSI: Self = Self("Psi");
	pub const RADIANS: Self = Self("radians");
	pub const RADIANS_PER_SECOND: Self = Self("radians per second");
	pub const RADIANS_PER_SECOND_SQUARED: Self = Self("radians per second squared");
	pub const SECONDS: Self = Self("Seconds");

	/// Creates a unit from its host-side name.
	pub const fn new(name: &'static str) -> Self {
		Self(name)
	}

	/// Returns the host-side name.
	pub const fn name(self) -> &'static str {
		self.0
	}
}

impl Default for Unit {
	fn default() -> Self {
		Self::NUMBER
	}
}

impl fmt::Display for Unit {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.0)
	}
}
