//! Batched host transactions.
//!
//! A [`DataDefinition`] owns a fixed-size payload laid out by its field
//! schema. Reads are asynchronous: [`DataDefinition::request_read`] tags the
//! request with a fresh [`RequestId`] and the reply is copied into the
//! payload when the manager pumps host messages. Writes push the whole
//! payload synchronously.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use simbridge_host::ReadPeriod;
use simbridge_primitives::{DefinitionId, FieldDef, RequestId, schema_size};
use tracing::{debug, trace, warn};

use crate::context::Context;
use crate::error::{DataError, Result, absorb};
use crate::staleness::{FrameClock, Freshness};

/// Scheduling options of a data definition.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DefinitionOptions {
	/// Request a read before client logic whenever the payload is stale.
	pub auto_read: bool,
	/// Write the payload after client logic every frame.
	pub auto_write: bool,
	/// Maximum payload age in simulation seconds; zero constrains nothing.
	pub max_age_time: f64,
	/// Maximum payload age in ticks; zero constrains nothing.
	pub max_age_ticks: u64,
}

impl DefinitionOptions {
	pub fn new() -> Self {
		Self::default()
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
}

pub(crate) struct DefinitionState {
	name: Box<str>,
	definition_id: DefinitionId,
	fields: Vec<FieldDef>,
	offsets: Vec<usize>,
	payload: Vec<u8>,
	pending: Option<RequestId>,
	requested_at: u64,
	period: ReadPeriod,
	auto_read: bool,
	auto_write: bool,
	freshness: Freshness,
	dirty: bool,
	last_write: Option<FrameClock>,
}

impl DefinitionState {
	fn field_range(&self, index: usize) -> Option<std::ops::Range<usize>> {
		let field = self.fields.get(index)?;
		let start = *self.offsets.get(index)?;
		Some(start..start + field.ty.width())
	}
}

/// Shared handle to a batch of host fields read and written as one payload.
#[derive(Clone)]
pub struct DataDefinition {
	state: Rc<RefCell<DefinitionState>>,
	ctx: Rc<Context>,
}

impl DataDefinition {
	/// Validates the schema against `payload_size` and registers it with the
	/// host. A size mismatch is returned before any host traffic.
	pub(crate) fn new(
		ctx: Rc<Context>,
		name: &str,
		fields: Vec<FieldDef>,
		payload_size: usize,
		options: &DefinitionOptions,
	) -> Result<Self> {
		let schema_size = schema_size(&fields);
		if payload_size != schema_size {
			return Err(DataError::SchemaMismatch {
				name: name.to_owned(),
				payload_size,
				schema_size,
			});
		}

		let definition_id = ctx.next_definition_id();
		if let Err(error) = ctx.host.define_data(definition_id, &fields) {
			DataError::from(error).report();
		}

		let offsets = fields
			.iter()
			.scan(0, |offset, field| {
				let start = *offset;
				*offset += field.ty.width();
				Some(start)
			})
			.collect();
		debug!(definition = name, definition_id = %definition_id, fields = fields.len(), size = payload_size, "definition.created");

		Ok(Self {
			state: Rc::new(RefCell::new(DefinitionState {
				name: name.into(),
				definition_id,
				fields,
				offsets,
				payload: vec![0; payload_size],
				pending: None,
				requested_at: 0,
				period: ReadPeriod::Once,
				auto_read: options.auto_read,
				auto_write: options.auto_write,
				freshness: Freshness::new(options.max_age_time, options.max_age_ticks),
				dirty: false,
				last_write: None,
			})),
			ctx,
		})
	}

	pub(crate) fn from_state(state: Rc<RefCell<DefinitionState>>, ctx: Rc<Context>) -> Self {
		Self { state, ctx }
	}

	/// Requests a one-shot asynchronous read. Returns false if the host
	/// refused the request.
	pub fn request_read(&self) -> bool {
		absorb(self.try_request_read()).is_some()
	}

	/// Like [`request_read`](Self::request_read), returning the request token.
	///
	/// A still outstanding one-shot request is superseded and its reply will
	/// be dropped. While a periodic read is active no new request is made and
	/// the periodic token is returned.
	pub fn try_request_read(&self) -> Result<RequestId> {
		let (definition_id, previous, period) = {
			let state = self.state.borrow();
			(state.definition_id, state.pending, state.period)
		};
		if let Some(token) = previous.filter(|_| period.is_periodic()) {
			debug!(definition_id = %definition_id, request_id = %token, "definition.read_while_periodic");
			return Ok(token);
		}

		let token = self.ctx.next_request_id();
		self.ctx.host.request_data(definition_id, token, ReadPeriod::Once)?;
		if let Some(old) = previous {
			self.ctx.untrack(old);
			debug!(definition_id = %definition_id, request_id = %old, "definition.request_superseded");
		}
		{
			let mut state = self.state.borrow_mut();
			state.pending = Some(token);
			state.requested_at = self.ctx.clock().tick;
		}
		self.ctx.track(token, &self.state);
		self.ctx.bump(|s| s.requests_sent += 1);
		trace!(definition_id = %definition_id, request_id = %token, "definition.read_requested");
		Ok(token)
	}

	/// Subscribes to repeated replies under one request token.
	/// [`ReadPeriod::Never`] cancels whatever request is outstanding and
	/// [`ReadPeriod::Once`] behaves like [`request_read`](Self::request_read).
	pub fn request_periodic(&self, period: ReadPeriod) -> bool {
		absorb(self.try_request_periodic(period)).is_some()
	}

	/// Like [`request_periodic`](Self::request_periodic), returning the failure.
	pub fn try_request_periodic(&self, period: ReadPeriod) -> Result<()> {
		match period {
			ReadPeriod::Once => return self.try_request_read().map(drop),
			ReadPeriod::Never => return self.cancel(),
			_ => {}
		}

		let definition_id = self.definition_id();
		let token = self.ctx.next_request_id();
		self.ctx.host.request_data(definition_id, token, period)?;
		absorb(self.cancel());

		let mut state = self.state.borrow_mut();
		state.pending = Some(token);
		state.requested_at = self.ctx.clock().tick;
		state.period = period;
		self.ctx.track(token, &self.state);
		self.ctx.bump(|s| s.requests_sent += 1);
		debug!(definition_id = %definition_id, request_id = %token, period = ?period, "definition.periodic");
		Ok(())
	}

	/// Cancels the outstanding request, if any.
	fn cancel(&self) -> Result<()> {
		let (definition_id, pending) = {
			let state = self.state.borrow();
			(state.definition_id, state.pending)
		};
		let Some(token) = pending else {
			return Ok(());
		};

		self.ctx.untrack(token);
		{
			let mut state = self.state.borrow_mut();
			state.pending = None;
			state.period = ReadPeriod::Once;
		}
		self.ctx.host.request_data(definition_id, token, ReadPeriod::Never)?;
		debug!(definition_id = %definition_id, request_id = %token, "definition.request_cancelled");
		Ok(())
	}

	/// Requests a read if auto-read scheduling calls for one: nothing is
	/// outstanding and the payload is missing or stale. A one-shot request
	/// older than `request_timeout_ticks` is abandoned first.
	pub(crate) fn request_if_stale(&self) {
		let now = self.ctx.clock();
		let timed_out = {
			let state = self.state.borrow();
			!state.period.is_periodic()
				&& state.pending.is_some()
				&& self
					.ctx
					.config
					.request_timeout_ticks
					.is_some_and(|limit| now.tick.saturating_sub(state.requested_at) >= limit)
		};
		if timed_out {
			self.abandon();
		}

		let due = {
			let state = self.state.borrow();
			state.pending.is_none() && state.freshness.is_expired(now, self.ctx.config.staleness_policy)
		};
		if due {
			self.request_read();
		}
	}

	/// Gives up on an outstanding one-shot request without telling the host,
	/// so auto-read may request again. A late reply counts as unsolicited.
	/// Periodic requests are kept. Returns true if a request was abandoned.
	pub(crate) fn abandon(&self) -> bool {
		let (name, token) = {
			let mut state = self.state.borrow_mut();
			if state.period.is_periodic() {
				return false;
			}
			let Some(token) = state.pending.take() else {
				return false;
			};
			(state.name.clone(), token)
		};
		self.ctx.untrack(token);
		self.ctx.bump(|s| s.abandoned_requests += 1);
		warn!(definition = %name, request_id = %token, "definition.request_abandoned");
		true
	}

	/// Copies a host reply into the payload.
	pub(crate) fn apply_reply(&self, token: RequestId, definition_id: DefinitionId, data: &[u8]) -> Result<()> {
		let now = self.ctx.clock();
		let mut state = self.state.borrow_mut();
		if state.pending != Some(token) || state.definition_id != definition_id {
			return Err(DataError::UnsolicitedReply(token));
		}
		if !state.period.is_periodic() {
			state.pending = None;
			self.ctx.untrack(token);
		}
		if data.len() != state.payload.len() {
			return Err(DataError::SchemaMismatch {
				name: state.name.to_string(),
				payload_size: data.len(),
				schema_size: state.payload.len(),
			});
		}
		if state.dirty {
			warn!(definition = %state.name, "definition.unflushed_edit_discarded");
		}

		state.payload.copy_from_slice(data);
		state.dirty = false;
		state.freshness.stamp(now);
		self.ctx.bump(|s| s.replies_applied += 1);
		trace!(definition = %state.name, request_id = %token, "definition.reply_applied");
		Ok(())
	}

	/// Forgets the outstanding request so its replies count as unsolicited.
	pub(crate) fn release(&self) {
		absorb(self.cancel());
	}

	/// Writes the whole payload to the host. Returns false on failure.
	pub fn write_now(&self) -> bool {
		absorb(self.try_write_now()).is_some()
	}

	/// Like [`write_now`](Self::write_now), returning the failure.
	pub fn try_write_now(&self) -> Result<()> {
		let (definition_id, payload) = {
			let state = self.state.borrow();
			(state.definition_id, state.payload.clone())
		};
		if let Err(error) = self.ctx.host.write_data(definition_id, &payload) {
			self.ctx.bump(|s| s.write_failures += 1);
			return Err(error.into());
		}

		let mut state = self.state.borrow_mut();
		state.dirty = false;
		state.last_write = Some(self.ctx.clock());
		self.ctx.bump(|s| s.writes += 1);
		trace!(definition_id = %definition_id, "definition.written");
		Ok(())
	}

	/// Decodes field `index` from the payload.
	pub fn field(&self, index: usize) -> Option<f64> {
		let state = self.state.borrow();
		let range = state.field_range(index)?;
		state.fields[index].ty.decode(&state.payload[range])
	}

	/// Decodes the first field named `name`.
	pub fn field_by_name(&self, name: &str) -> Option<f64> {
		let index = self.field_index(name)?;
		self.field(index)
	}

	/// Position of the first field named `name`.
	pub fn field_index(&self, name: &str) -> Option<usize> {
		self.state.borrow().fields.iter().position(|field| &*field.name == name)
	}

	/// Encodes `value` into field `index` and marks the payload dirty.
	pub fn set_field(&self, index: usize, value: f64) -> bool {
		let mut state = self.state.borrow_mut();
		let Some(range) = state.field_range(index) else {
			return false;
		};
		let ty = state.fields[index].ty;
		if !ty.encode(value, &mut state.payload[range]) {
			return false;
		}
		state.dirty = true;
		true
	}

	/// Copy of the payload.
	pub fn payload(&self) -> Vec<u8> {
		self.state.borrow().payload.clone()
	}

	/// Runs `f` on a mutable view of the payload and marks it dirty.
	///
	/// `f` works on a copy that is stored back afterwards, so it may use this
	/// handle freely.
	pub fn with_payload_mut<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
		let mut payload = self.payload();
		let result = f(&mut payload);
		let mut state = self.state.borrow_mut();
		state.payload = payload;
		state.dirty = true;
		result
	}

	pub fn name(&self) -> String {
		self.state.borrow().name.to_string()
	}

	/// Host definition token, fixed for the lifetime of the definition.
	pub fn definition_id(&self) -> DefinitionId {
		self.state.borrow().definition_id
	}

	pub fn fields(&self) -> Vec<FieldDef> {
		self.state.borrow().fields.clone()
	}

	pub fn payload_size(&self) -> usize {
		self.state.borrow().payload.len()
	}

	/// Token of the request a reply is expected for.
	pub fn pending_request(&self) -> Option<RequestId> {
		self.state.borrow().pending
	}

	/// Active read period; [`ReadPeriod::Once`] when not periodic.
	pub fn period(&self) -> ReadPeriod {
		self.state.borrow().period
	}

	/// Whether a reply has ever been applied.
	pub fn has_data(&self) -> bool {
		self.state.borrow().freshness.last_fetch().is_some()
	}

	/// Whether the payload was edited locally since the last write or reply.
	pub fn is_dirty(&self) -> bool {
		self.state.borrow().dirty
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

	/// Clock of the last applied reply.
	pub fn last_fetch(&self) -> Option<FrameClock> {
		self.state.borrow().freshness.last_fetch()
	}

	/// Clock of the last successful write.
	pub fn last_write(&self) -> Option<FrameClock> {
		self.state.borrow().last_write
	}

	/// Returns true if both handles share one state.
	pub fn ptr_eq(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.state, &other.state)
	}
}

impl fmt::Debug for DataDefinition {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let state = self.state.borrow();
		f.debug_struct("DataDefinition")
			.field("name", &state.name)
			.field("definition_id", &state.definition_id)
			.field("fields", &state.fields.len())
			.field("pending", &state.pending)
			.field("period", &state.period)
			.finish_non_exhaustive()
	}
}

impl fmt::Display for DataDefinition {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let state = self.state.borrow();
		write!(
			f,
			"DataDefinition {} ({}) fields={} size={} pending=",
			state.name,
			state.definition_id,
			state.fields.len(),
			state.payload.len()
		)?;
		match state.pending {
			Some(token) => write!(f, "{token}")?,
			None => f.write_str("none")?,
		}
		write!(f, " auto_read={} auto_write={}", state.auto_read, state.auto_write)
	}
}
