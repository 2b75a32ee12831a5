use crate::Unit;

/// Fixed-width numeric encoding of one batch field.
///
/// Fields are laid out back to back in declaration order, little-endian,
/// without padding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum FieldType {
	#[default]
	Float64,
	Float32,
	Int32,
	Int64,
}

impl FieldType {
	/// Width of the encoded field in bytes.
	pub const fn width(self) -> usize {
		match self {
			Self::Float64 | Self::Int64 => 8,
			Self::Float32 | Self::Int32 => 4,
		}
	}

	/// Decodes a field from exactly [`width`](Self::width) bytes.
	pub fn decode(self, bytes: &[u8]) -> Option<f64> {
		Some(match self {
			Self::Float64 => f64::from_le_bytes(bytes.try_into().ok()?),
			Self::Float32 => f64::from(f32::from_le_bytes(bytes.try_into().ok()?)),
			Self::Int32 => f64::from(i32::from_le_bytes(bytes.try_into().ok()?)),
			Self::Int64 => i64::from_le_bytes(bytes.try_into().ok()?) as f64,
		})
	}

	/// Encodes `value` into exactly [`width`](Self::width) bytes.
	///
	/// Integer encodings truncate toward zero and saturate at the type bounds.
	pub fn encode(self, value: f64, out: &mut [u8]) -> bool {
		if out.len() != self.width() {
			return false;
		}
		match self {
			Self::Float64 => out.copy_from_slice(&value.to_le_bytes()),
			Self::Float32 => out.copy_from_slice(&(value as f32).to_le_bytes()),
			Self::Int32 => out.copy_from_slice(&(value as i32).to_le_bytes()),
			Self::Int64 => out.copy_from_slice(&(value as i64).to_le_bytes()),
		}
		true
	}
}

/// One host value inside a batch schema.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldDef {
	pub name: Box<str>,
	pub index: u32,
	pub unit: Unit,
	pub ty: FieldType,
}

impl FieldDef {
	/// Creates a `Float64` field.
	pub fn new(name: impl Into<Box<str>>, index: u32, unit: Unit) -> Self {
		Self {
			name: name.into(),
			index,
			unit,
			ty: FieldType::Float64,
		}
	}

	/// Overrides the field encoding.
	pub fn with_type(mut self, ty: FieldType) -> Self {
		self.ty = ty;
		self
	}
}

/// Total encoded size of a schema in bytes.
pub fn schema_size(fields: &[FieldDef]) -> usize {
	fields.iter().map(|f| f.ty.width()).sum()
}
