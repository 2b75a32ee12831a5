//! In-process host backed by plain maps.
//!
//! [`LocalHost`] behaves like a simulator connection without one: named
//! variables live in a map, indexed variables must be declared before they can
//! be looked up, transmitted commands are logged and looped back to subscribed
//! listeners, and batch reads stay outstanding until
//! [`service_requests`](LocalHost::service_requests) answers them.

use std::cell::RefCell;
use std::collections::VecDeque;

use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};
use simbridge_primitives::{
	ClientEventId, DefinitionId, EventArgs, FieldDef, HostVarId, IdGen, RequestId, Unit, schema_size,
};
use tracing::{debug, trace};

use crate::{Host, HostError, HostMessage, ReadPeriod, Result};

/// Call counters for a [`LocalHost`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LocalHostStats {
	/// Successful and failed `read_named` calls.
	pub named_reads: u64,
	/// Accepted `write_named` calls.
	pub named_writes: u64,
	/// `read_indexed` calls.
	pub indexed_reads: u64,
	/// Accepted `transmit_event` calls.
	pub transmitted_events: u64,
	/// Accepted `request_data` calls, including cancellations.
	pub data_requests: u64,
	/// Accepted `write_data` calls.
	pub data_writes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Subscription {
	group_priority: u32,
	mask: bool,
}

#[derive(Debug, Clone, Copy)]
struct OutstandingRead {
	def: DefinitionId,
	request: RequestId,
	period: ReadPeriod,
}

#[derive(Debug)]
struct IndexedVar {
	id: HostVarId,
	values: HashMap<u32, f64>,
}

#[derive(Debug, Default)]
struct Faults {
	reject_map: HashSet<Box<str>>,
	reject_subscribe: bool,
	reject_writes: bool,
	reject_requests: bool,
}

#[derive(Debug, Default)]
struct LocalState {
	var_ids: IdGen<HostVarId>,
	named_by_name: HashMap<Box<str>, HostVarId>,
	named_values: HashMap<HostVarId, f64>,
	indexed_by_name: HashMap<Box<str>, IndexedVar>,
	indexed_names: HashMap<HostVarId, Box<str>>,
	events: HashMap<ClientEventId, Box<str>>,
	subscriptions: HashMap<ClientEventId, Subscription>,
	transmitted: Vec<(Box<str>, EventArgs)>,
	calculator_code: Vec<String>,
	definitions: HashMap<DefinitionId, Vec<FieldDef>>,
	data_writes: Vec<(DefinitionId, Vec<u8>)>,
	outstanding: Vec<OutstandingRead>,
	queue: VecDeque<HostMessage>,
	stats: LocalHostStats,
	faults: Faults,
}

impl LocalState {
	fn rejected(op: &'static str) -> HostError {
		HostError::Rejected {
			op,
			reason: "fault injected".into(),
		}
	}

	fn register_named(&mut self, name: &str) -> HostVarId {
		if let Some(id) = self.named_by_name.get(name) {
			return *id;
		}
		let id = self.var_ids.next();
		self.named_by_name.insert(name.into(), id);
		self.named_values.insert(id, 0.0);
		debug!(name, id = %id, "local_host.register_named");
		id
	}

	fn declare_indexed(&mut self, name: &str) -> HostVarId {
		if let Some(var) = self.indexed_by_name.get(name) {
			return var.id;
		}
		let id = self.var_ids.next();
		self.indexed_by_name.insert(
			name.into(),
			IndexedVar {
				id,
				values: HashMap::default(),
			},
		);
		self.indexed_names.insert(id, name.into());
		id
	}

	fn value_for_field(&self, field: &FieldDef) -> f64 {
		if let Some(var) = self.indexed_by_name.get(&*field.name) {
			return var.values.get(&field.index).copied().unwrap_or_default();
		}
		self.named_by_name
			.get(&*field.name)
			.and_then(|id| self.named_values.get(id))
			.copied()
			.unwrap_or_default()
	}

	fn encode(&self, def: DefinitionId) -> Option<Vec<u8>> {
		let fields = self.definitions.get(&def)?;
		let mut data = vec![0u8; schema_size(fields)];
		let mut offset = 0;
		for field in fields {
			let width = field.ty.width();
			field.ty.encode(self.value_for_field(field), &mut data[offset..offset + width]);
			offset += width;
		}
		Some(data)
	}
}

/// In-process [`Host`] implementation.
#[derive(Debug, Default)]
pub struct LocalHost {
	state: RefCell<LocalState>,
}

impl LocalHost {
	/// Creates an empty host.
	pub fn new() -> Self {
		Self::default()
	}

	/// Sets a named variable, registering it if needed.
	pub fn set_named(&self, name: &str, value: f64) {
		let mut state = self.state.borrow_mut();
		let id = state.register_named(name);
		state.named_values.insert(id, value);
	}

	/// Returns the current value of a named variable.
	pub fn named(&self, name: &str) -> Option<f64> {
		let state = self.state.borrow();
		let id = state.named_by_name.get(name)?;
		state.named_values.get(id).copied()
	}

	/// Declares an indexed variable so it can be looked up.
	pub fn declare_indexed(&self, name: &str) -> HostVarId {
		self.state.borrow_mut().declare_indexed(name)
	}

	/// Sets entry `index` of an indexed variable, declaring it if needed.
	pub fn set_indexed(&self, name: &str, index: u32, value: f64) {
		let mut state = self.state.borrow_mut();
		state.declare_indexed(name);
		if let Some(var) = state.indexed_by_name.get_mut(name) {
			var.values.insert(index, value);
		}
	}

	/// Returns entry `index` of an indexed variable.
	pub fn indexed(&self, name: &str, index: u32) -> Option<f64> {
		self.state.borrow().indexed_by_name.get(name)?.values.get(&index).copied()
	}

	/// Queues a raw message for the pump.
	pub fn push_message(&self, message: HostMessage) {
		self.state.borrow_mut().queue.push_back(message);
	}

	/// Raises a host-side command, notifying every subscribed client id mapped
	/// to `name`. Returns the number of notifications queued.
	pub fn raise_event(&self, name: &str, args: EventArgs) -> usize {
		let mut state = self.state.borrow_mut();
		let mut targets: Vec<_> = state
			.events
			.iter()
			.filter(|(id, mapped)| &***mapped == name && state.subscriptions.contains_key(*id))
			.map(|(id, _)| *id)
			.collect();
		targets.sort();
		for client_id in &targets {
			state.queue.push_back(HostMessage::Event {
				client_id: *client_id,
				args,
			});
		}
		targets.len()
	}

	/// Queues a batch reply for `request`, as if the host had answered it.
	pub fn reply(&self, request: RequestId, definition_id: DefinitionId, data: Vec<u8>) {
		self.push_message(HostMessage::ObjectData {
			request_id: request,
			definition_id,
			data,
		});
	}

	/// Answers every outstanding batch read with the current host values.
	///
	/// One-shot requests are consumed; periodic requests stay outstanding.
	/// Returns the number of replies queued.
	pub fn service_requests(&self) -> usize {
		let mut state = self.state.borrow_mut();
		let outstanding = std::mem::take(&mut state.outstanding);
		let mut served = 0;
		for read in outstanding {
			if let Some(data) = state.encode(read.def) {
				state.queue.push_back(HostMessage::ObjectData {
					request_id: read.request,
					definition_id: read.def,
					data,
				});
				served += 1;
			}
			if read.period.is_periodic() {
				state.outstanding.push(read);
			}
		}
		trace!(served, "local_host.service_requests");
		served
	}

	/// Returns outstanding batch reads in request order.
	pub fn outstanding_requests(&self) -> Vec<(DefinitionId, RequestId, ReadPeriod)> {
		self.state
			.borrow()
			.outstanding
			.iter()
			.map(|r| (r.def, r.request, r.period))
			.collect()
	}

	/// Returns every transmitted command as `(name, args)`.
	pub fn transmitted(&self) -> Vec<(Box<str>, EventArgs)> {
		self.state.borrow().transmitted.clone()
	}

	/// Returns every executed calculator code snippet.
	pub fn calculator_code(&self) -> Vec<String> {
		self.state.borrow().calculator_code.clone()
	}

	/// Returns every batch write as `(definition, payload)`.
	pub fn data_writes(&self) -> Vec<(DefinitionId, Vec<u8>)> {
		self.state.borrow().data_writes.clone()
	}

	/// Returns the registered schema of `def`.
	pub fn definition(&self, def: DefinitionId) -> Option<Vec<FieldDef>> {
		self.state.borrow().definitions.get(&def).cloned()
	}

	/// Returns true if `id` is subscribed, with its mask flag.
	pub fn subscription(&self, id: ClientEventId) -> Option<(u32, bool)> {
		self.state
			.borrow()
			.subscriptions
			.get(&id)
			.map(|s| (s.group_priority, s.mask))
	}

	/// Returns the number of queued messages.
	pub fn queued(&self) -> usize {
		self.state.borrow().queue.len()
	}

	/// Returns call counters.
	pub fn stats(&self) -> LocalHostStats {
		self.state.borrow().stats
	}

	/// Makes `map_event` fail for `name`.
	pub fn reject_event_mapping(&self, name: &str) {
		self.state.borrow_mut().faults.reject_map.insert(name.into());
	}

	/// Makes every `subscribe_event` fail.
	pub fn reject_subscriptions(&self, reject: bool) {
		self.state.borrow_mut().faults.reject_subscribe = reject;
	}

	/// Makes every write (named, batch, calculator code, transmit) fail.
	pub fn reject_writes(&self, reject: bool) {
		self.state.borrow_mut().faults.reject_writes = reject;
	}

	/// Makes every `request_data` fail.
	pub fn reject_requests(&self, reject: bool) {
		self.state.borrow_mut().faults.reject_requests = reject;
	}
}

impl Host for LocalHost {
	fn register_named(&self, name: &str) -> Result<HostVarId> {
		Ok(self.state.borrow_mut().register_named(name))
	}

	fn read_named(&self, id: HostVarId, _unit: Unit) -> Result<f64> {
		let mut state = self.state.borrow_mut();
		state.stats.named_reads += 1;
		state.named_values.get(&id).copied().ok_or(HostError::UnknownHandle(id))
	}

	fn write_named(&self, id: HostVarId, _unit: Unit, value: f64) -> Result<()> {
		let mut state = self.state.borrow_mut();
		if state.faults.reject_writes {
			return Err(LocalState::rejected("write_named"));
		}
		let slot = state.named_values.get_mut(&id).ok_or(HostError::UnknownHandle(id))?;
		*slot = value;
		state.stats.named_writes += 1;
		Ok(())
	}

	fn lookup_indexed(&self, name: &str) -> Result<HostVarId> {
		self.state
			.borrow()
			.indexed_by_name
			.get(name)
			.map(|var| var.id)
			.ok_or_else(|| HostError::UnknownVariable(name.to_string()))
	}

	fn read_indexed(&self, id: HostVarId, _unit: Unit, index: u32) -> Result<f64> {
		let mut state = self.state.borrow_mut();
		state.stats.indexed_reads += 1;
		let name = state.indexed_names.get(&id).ok_or(HostError::UnknownHandle(id))?;
		Ok(state
			.indexed_by_name
			.get(name)
			.and_then(|var| var.values.get(&index))
			.copied()
			.unwrap_or_default())
	}

	fn execute_calculator_code(&self, code: &str) -> Result<()> {
		let mut state = self.state.borrow_mut();
		if state.faults.reject_writes {
			return Err(LocalState::rejected("execute_calculator_code"));
		}
		state.calculator_code.push(code.to_string());
		Ok(())
	}

	fn map_event(&self, id: ClientEventId, name: &str) -> Result<()> {
		let mut state = self.state.borrow_mut();
		if state.faults.reject_map.contains(name) {
			return Err(LocalState::rejected("map_event"));
		}
		state.events.insert(id, name.into());
		Ok(())
	}

	fn transmit_event(&self, id: ClientEventId, args: EventArgs) -> Result<()> {
		let mut state = self.state.borrow_mut();
		if state.faults.reject_writes {
			return Err(LocalState::rejected("transmit_event"));
		}
		let name = state.events.get(&id).cloned().ok_or(HostError::UnknownEvent(id))?;
		state.stats.transmitted_events += 1;
		state.transmitted.push((name, args));
		if state.subscriptions.contains_key(&id) {
			state.queue.push_back(HostMessage::Event { client_id: id, args });
		}
		Ok(())
	}

	fn subscribe_event(&self, id: ClientEventId, group_priority: u32, mask: bool) -> Result<()> {
		let mut state = self.state.borrow_mut();
		if state.faults.reject_subscribe {
			return Err(LocalState::rejected("subscribe_event"));
		}
		if !state.events.contains_key(&id) {
			return Err(HostError::UnknownEvent(id));
		}
		state.subscriptions.insert(id, Subscription { group_priority, mask });
		Ok(())
	}

	fn unsubscribe_event(&self, id: ClientEventId) -> Result<()> {
		self.state
			.borrow_mut()
			.subscriptions
			.remove(&id)
			.map(|_| ())
			.ok_or(HostError::UnknownEvent(id))
	}

	fn define_data(&self, def: DefinitionId, fields: &[FieldDef]) -> Result<()> {
		self.state.borrow_mut().definitions.insert(def, fields.to_vec());
		Ok(())
	}

	fn request_data(&self, def: DefinitionId, request: RequestId, period: ReadPeriod) -> Result<()> {
		let mut state = self.state.borrow_mut();
		if state.faults.reject_requests {
			return Err(LocalState::rejected("request_data"));
		}
		if !state.definitions.contains_key(&def) {
			return Err(HostError::UnknownDefinition(def));
		}
		state.stats.data_requests += 1;
		state.outstanding.retain(|r| r.request != request);
		if period != ReadPeriod::Never {
			state.outstanding.push(OutstandingRead { def, request, period });
		}
		Ok(())
	}

	fn write_data(&self, def: DefinitionId, data: &[u8]) -> Result<()> {
		let mut state = self.state.borrow_mut();
		if state.faults.reject_writes {
			return Err(LocalState::rejected("write_data"));
		}
		let fields = state.definitions.get(&def).cloned().ok_or(HostError::UnknownDefinition(def))?;
		let expected = schema_size(&fields);
		if data.len() != expected {
			return Err(HostError::SizeMismatch {
				expected,
				actual: data.len(),
			});
		}
		let mut offset = 0;
		for field in &fields {
			let width = field.ty.width();
			if let Some(value) = field.ty.decode(&data[offset..offset + width]) {
				state.declare_indexed(&field.name);
				if let Some(var) = state.indexed_by_name.get_mut(&*field.name) {
					var.values.insert(field.index, value);
				}
			}
			offset += width;
		}
		state.stats.data_writes += 1;
		state.data_writes.push((def, data.to_vec()));
		Ok(())
	}

	fn next_message(&self) -> Option<HostMessage> {
		self.state.borrow_mut().queue.pop_front()
	}
}
