//! Cached scalar variables.
//!
//! A [`Variable`] mirrors one host value identified by its [`VarKey`]. Reads
//! go through the cache; the host is consulted only by [`Variable::fetch`]
//! and by [`Variable::refresh`] once the cache has gone stale. Local writes
//! mark the variable dirty until they reach the host.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use simbridge_primitives::{HostVarId, Unit, VarKey};
use tracing::{debug, trace, warn};

use crate::context::Context;
use crate::error::{DataError, Result, absorb};
use crate::event::Event;
use crate::staleness::{FrameClock, Freshness};

/// How an indexed variable is written back to the host.
#[derive(Debug, Clone)]
pub enum CommandWriter {
	/// Trigger an event with the value, preceded by the index when non-zero.
	Event(Event),
	/// Execute generated calculator code for the named key event.
	CalculatorCode(Box<str>),
}

impl CommandWriter {
	/// Calculator code writer for `event`.
	pub fn calculator_code(event: impl Into<Box<str>>) -> Self {
		Self::CalculatorCode(event.into())
	}

	fn write(&self, ctx: &Context, index: u32, value: f64) -> Result<()> {
		match self {
			Self::Event(event) => {
				let raw = value as i64 as u32;
				if index == 0 {
					event.try_trigger(&[raw])
				} else {
					event.try_trigger(&[index, raw])
				}
			}
			Self::CalculatorCode(event) => {
				let code = calculator_code(event, index, value);
				trace!(code = %code, "variable.calculator_code");
				Ok(ctx.host.execute_calculator_code(&code)?)
			}
		}
	}
}

/// Renders the calculator code that sets a value through a key event.
pub fn calculator_code(event: &str, index: u32, value: f64) -> String {
	if index == 0 {
		format!("{value} (>K:{event})")
	} else {
		format!("{value} {index} (>K:2:{event})")
	}
}

/// Read and write strategy of a variable.
#[derive(Debug, Clone)]
pub enum VariableKind {
	/// Client-defined named variable, read and written directly.
	Named,
	/// Indexed host variable without a writer.
	IndexedReadOnly,
	/// Indexed host variable written through a command.
	CommandWritten(CommandWriter),
}

impl VariableKind {
	/// Returns true if writes are refused.
	pub fn is_read_only(&self) -> bool {
		matches!(self, Self::IndexedReadOnly)
	}

	/// Returns true if both kinds address the same host store.
	pub fn same_store(&self, other: &Self) -> bool {
		matches!(self, Self::Named) == matches!(other, Self::Named)
	}
}

/// Creation options for a variable. Merged into an existing variable when
/// the key is already registered.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VarOptions {
	/// Unit the value is read and written in. Part of the identity.
	pub unit: Unit,
	/// Refresh before client logic every frame the cache is stale.
	pub auto_read: bool,
	/// Write back after client logic when dirty.
	pub auto_write: bool,
	/// Maximum cache age in simulation seconds; zero constrains nothing.
	pub max_age_time: f64,
	/// Maximum cache age in ticks; zero constrains nothing.
	pub max_age_ticks: u64,
	/// Change threshold; the configured default when unset.
	pub epsilon: Option<f64>,
}

impl Default for VarOptions {
	fn default() -> Self {
		Self {
			unit: Unit::NUMBER,
			auto_read: false,
			auto_write: false,
			max_age_time: 0.0,
			max_age_ticks: 0,
			epsilon: None,
		}
	}
}

impl VarOptions {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn unit(mut self, unit: Unit) -> Self {
		self.unit = unit;
		self
	}

	pub fn auto_read(mut self, auto_read: bool) -> Self {
		self.auto_read = auto_read;
		self
	}

	pub fn auto_write(mut self, auto_write: bool) -> Self {
		self.auto_write = auto_write;
		self
	}

	pub fn max_age_time(mut self, seconds: f64) -> Self {
		self.max_age_time = seconds;
		self
	}

	pub fn max_age_ticks(mut self, ticks: u64) -> Self {
		self.max_age_ticks = ticks;
		self
	}

	pub fn epsilon(mut self, epsilon: f64) -> Self {
		self.epsilon = Some(epsilon);
		self
	}
}

struct VarState {
	key: VarKey,
	kind: VariableKind,
	host_id: Option<HostVarId>,
	cached: Option<f64>,
	dirty: bool,
	changed: bool,
	epsilon: f64,
	auto_read: bool,
	auto_write: bool,
	freshness: Freshness,
}

/// Shared handle to a cached host variable.
///
/// Clones alias the same state; the data manager hands out one state per key.
#[derive(Clone)]
pub struct Variable {
	state: Rc<RefCell<VarState>>,
	ctx: Rc<Context>,
}

impl Variable {
	pub(crate) fn new(ctx: Rc<Context>, key: VarKey, kind: VariableKind, options: &VarOptions) -> Self {
		let variable = Self {
			state: Rc::new(RefCell::new(VarState {
				key,
				kind,
				host_id: None,
				cached: None,
				dirty: false,
				changed: false,
				epsilon: options.epsilon.unwrap_or(ctx.config.default_epsilon),
				auto_read: options.auto_read,
				auto_write: options.auto_write,
				freshness: Freshness::new(options.max_age_time, options.max_age_ticks),
			})),
			ctx,
		};
		if let Err(error) = variable.resolve() {
			variable.ctx.bump(|s| s.lookup_failures += 1);
			error.report();
		}
		variable
	}

	/// Returns the host id, looking it up again if an earlier lookup failed.
	fn resolve(&self) -> Result<HostVarId> {
		let (name, named) = {
			let state = self.state.borrow();
			if let Some(id) = state.host_id {
				return Ok(id);
			}
			(state.key.name.clone(), matches!(state.kind, VariableKind::Named))
		};

		let lookup = if named {
			self.ctx.host.register_named(&name)
		} else {
			self.ctx.host.lookup_indexed(&name)
		};
		let id = lookup.map_err(|source| DataError::LookupFailure {
			name: name.to_string(),
			source,
		})?;
		debug!(var = %name, host_id = %id, "variable.resolved");
		self.state.borrow_mut().host_id = Some(id);
		Ok(id)
	}

	fn read_raw(&self) -> Result<f64> {
		let id = self.resolve()?;
		let state = self.state.borrow();
		let read = match state.kind {
			VariableKind::Named => self.ctx.host.read_named(id, state.key.unit),
			_ => self.ctx.host.read_indexed(id, state.key.unit, state.key.index),
		};
		read.map_err(|source| DataError::LookupFailure {
			name: state.key.name.to_string(),
			source,
		})
	}

	/// Reads the value from the host into the cache.
	///
	/// The cache only moves when the host value differs by more than epsilon.
	/// A failed read is logged and yields `0.0`, leaving the cache untouched.
	pub fn fetch(&self) -> f64 {
		match self.try_fetch() {
			Ok(value) => value,
			Err(error) => {
				self.ctx.bump(|s| s.lookup_failures += 1);
				error.report();
				0.0
			}
		}
	}

	/// Like [`fetch`](Self::fetch), returning the failure.
	pub fn try_fetch(&self) -> Result<f64> {
		let value = self.read_raw()?;
		let now = self.ctx.clock();
		let mut state = self.state.borrow_mut();
		if state.dirty {
			warn!(var = %state.key, "variable.unflushed_set_discarded");
		}
		let epsilon = state.epsilon;
		let changed = state.cached.is_none_or(|old| (value - old).abs() > epsilon);
		state.changed = changed;
		if changed {
			state.cached = Some(value);
		}
		state.dirty = false;
		state.freshness.stamp(now);
		self.ctx.bump(|s| s.fetches += 1);
		Ok(state.cached.unwrap_or(value))
	}

	/// Fetches if the cache is empty or stale under the configured policy,
	/// otherwise clears the changed flag and returns the cached value.
	pub fn refresh(&self) -> f64 {
		if self.is_stale() {
			return self.fetch();
		}
		let mut state = self.state.borrow_mut();
		state.changed = false;
		state.cached.unwrap_or_default()
	}

	/// Returns true if [`refresh`](Self::refresh) would go to the host.
	pub fn is_stale(&self) -> bool {
		let state = self.state.borrow();
		state.cached.is_none() || state.freshness.is_expired(self.ctx.clock(), self.ctx.config.staleness_policy)
	}

	/// Cached value, or `0.0` if nothing was cached yet.
	pub fn get(&self) -> f64 {
		let state = self.state.borrow();
		match state.cached {
			Some(value) => {
				if state.dirty {
					warn!(var = %state.key, "variable.dirty_read");
				}
				value
			}
			None => {
				warn!(var = %state.key, "variable.read_before_fetch");
				0.0
			}
		}
	}

	pub fn get_as_bool(&self) -> bool {
		self.get() != 0.0
	}

	pub fn get_as_i64(&self) -> i64 {
		self.get() as i64
	}

	/// Stores a value locally and marks the variable dirty. Setting the
	/// cached value again is a no-op. Read-only variables refuse the value.
	pub fn set(&self, value: f64) {
		absorb(self.try_set(value));
	}

	/// Like [`set`](Self::set), returning the failure.
	pub fn try_set(&self, value: f64) -> Result<()> {
		let mut state = self.state.borrow_mut();
		if state.kind.is_read_only() {
			self.ctx.bump(|s| s.invalid_writes += 1);
			return Err(DataError::InvalidWrite(state.key.to_string()));
		}
		if state.cached == Some(value) {
			return Ok(());
		}
		state.cached = Some(value);
		state.dirty = true;
		Ok(())
	}

	pub fn set_as_bool(&self, value: bool) {
		self.set(if value { 1.0 } else { 0.0 });
	}

	pub fn set_as_i64(&self, value: i64) {
		self.set(value as f64);
	}

	/// Writes the cached value to the host regardless of the dirty flag.
	pub fn write(&self) -> bool {
		absorb(self.try_write()).is_some()
	}

	/// Like [`write`](Self::write), returning the failure.
	///
	/// The dirty flag is only cleared once the host accepted the value, so a
	/// failed write is retried by the next flush.
	pub fn try_write(&self) -> Result<()> {
		let (key, kind, value) = {
			let state = self.state.borrow();
			(state.key.clone(), state.kind.clone(), state.cached)
		};

		let written = match (&kind, value) {
			(VariableKind::IndexedReadOnly, _) => {
				self.ctx.bump(|s| s.invalid_writes += 1);
				return Err(DataError::InvalidWrite(key.to_string()));
			}
			(_, None) => return Err(DataError::EmptyCache(key.to_string())),
			(VariableKind::Named, Some(value)) => self
				.resolve()
				.and_then(|id| self.ctx.host.write_named(id, key.unit, value).map_err(DataError::from)),
			(VariableKind::CommandWritten(writer), Some(value)) => writer.write(&self.ctx, key.index, value),
		};
		if let Err(error) = written {
			self.ctx.bump(|s| s.write_failures += 1);
			return Err(error);
		}

		let mut state = self.state.borrow_mut();
		state.dirty = false;
		state.changed = false;
		self.ctx.bump(|s| s.writes += 1);
		trace!(var = %key, value = ?value, "variable.written");
		Ok(())
	}

	/// Sets and immediately writes a value.
	pub fn write_through(&self, value: f64) -> bool {
		absorb(self.try_set(value).and_then(|()| self.try_write())).is_some()
	}

	/// Writes the cached value if it is dirty. Returns false only when a
	/// write was attempted and failed.
	pub fn flush(&self) -> bool {
		let pending = {
			let state = self.state.borrow();
			state.dirty && state.cached.is_some()
		};
		!pending || self.write()
	}

	/// Deduplication key.
	pub fn key(&self) -> VarKey {
		self.state.borrow().key.clone()
	}

	pub fn name(&self) -> String {
		self.state.borrow().key.name.to_string()
	}

	pub fn index(&self) -> u32 {
		self.state.borrow().key.index
	}

	pub fn unit(&self) -> Unit {
		self.state.borrow().key.unit
	}

	pub fn kind(&self) -> VariableKind {
		self.state.borrow().kind.clone()
	}

	pub fn is_read_only(&self) -> bool {
		self.state.borrow().kind.is_read_only()
	}

	/// Host id, once a lookup succeeded.
	pub fn host_id(&self) -> Option<HostVarId> {
		self.state.borrow().host_id
	}

	/// Cached value without the logging of [`get`](Self::get).
	pub fn cached(&self) -> Option<f64> {
		self.state.borrow().cached
	}

	/// True only for the frame in which a fetch moved the cached value.
	pub fn has_changed(&self) -> bool {
		self.state.borrow().changed
	}

	pub fn is_dirty(&self) -> bool {
		self.state.borrow().dirty
	}

	pub fn epsilon(&self) -> f64 {
		self.state.borrow().epsilon
	}

	pub fn set_epsilon(&self, epsilon: f64) {
		self.state.borrow_mut().epsilon = epsilon;
	}

	pub fn is_auto_read(&self) -> bool {
		self.state.borrow().auto_read
	}

	pub fn set_auto_read(&self, auto_read: bool) {
		self.state.borrow_mut().auto_read = auto_read;
	}

	pub fn is_auto_write(&self) -> bool {
		self.state.borrow().auto_write
	}

	pub fn set_auto_write(&self, auto_write: bool) {
		self.state.borrow_mut().auto_write = auto_write;
	}

	pub fn max_age_time(&self) -> f64 {
		self.state.borrow().freshness.max_age_time
	}

	pub fn set_max_age_time(&self, seconds: f64) {
		self.state.borrow_mut().freshness.max_age_time = seconds;
	}

	pub fn max_age_ticks(&self) -> u64 {
		self.state.borrow().freshness.max_age_ticks
	}

	pub fn set_max_age_ticks(&self, ticks: u64) {
		self.state.borrow_mut().freshness.max_age_ticks = ticks;
	}

	/// Clock of the last successful fetch.
	pub fn last_fetch(&self) -> Option<FrameClock> {
		self.state.borrow().freshness.last_fetch()
	}

	/// Returns true if both handles share one state.
	pub fn ptr_eq(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.state, &other.state)
	}

	/// Folds a second consumer's demands into this variable: flags are
	/// or-ed, age limits and epsilon take the stricter value.
	pub(crate) fn merge(&self, options: &VarOptions) {
		let mut state = self.state.borrow_mut();
		state.auto_read |= options.auto_read;
		state.auto_write |= options.auto_write;
		state
			.freshness
			.tighten(options.max_age_time, options.max_age_ticks, self.ctx.config.staleness_policy);
		if let Some(epsilon) = options.epsilon {
			state.epsilon = state.epsilon.min(epsilon);
		}
	}

	/// Attaches a writer to a read-only indexed variable. Returns true if the
	/// variable was upgraded.
	pub(crate) fn attach_writer(&self, writer: CommandWriter) -> bool {
		let mut state = self.state.borrow_mut();
		if !state.kind.is_read_only() {
			return false;
		}
		state.kind = VariableKind::CommandWritten(writer);
		true
	}
}

impl fmt::Debug for Variable {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let state = self.state.borrow();
		f.debug_struct("Variable")
			.field("key", &state.key)
			.field("kind", &state.kind)
			.field("cached", &state.cached)
			.field("dirty", &state.dirty)
			.field("changed", &state.changed)
			.finish_non_exhaustive()
	}
}

impl fmt::Display for Variable {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let state = self.state.borrow();
		write!(f, "Variable {} value=", state.key)?;
		match state.cached {
			Some(value) => write!(f, "{value}")?,
			None => f.write_str("<none>")?,
		}
		write!(
			f,
			" changed={} dirty={} auto_read={} auto_write={} max_age={}s/{}t",
			state.changed,
			state.dirty,
			state.auto_read,
			state.auto_write,
			state.freshness.max_age_time,
			state.freshness.max_age_ticks
		)
	}
}
