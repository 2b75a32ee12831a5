//! The data manager: deduplicating factory and per-frame phase driver.
//!
//! # Frame cycle
//!
//! ```text
//! pre_update(sim_time)   tick += 1
//!                        refresh stale auto-read variables
//!                        request stale auto-read definitions
//!                        pump host messages (replies, notifications)
//! update()               client logic runs against the caches
//! post_update()          flush dirty auto-write variables
//!                        write auto-write definitions
//! ```
//!
//! Every iteration over the registry works on a snapshot of cloned handles,
//! so callbacks and client code may create new handles at any time.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap as HashMap;
use simbridge_host::{Host, HostMessage, exception_name};
use simbridge_primitives::{ClientEventId, DefinitionId, EventArgs, FieldDef, RequestId, VarKey};
use tracing::{debug, error, info, trace, warn};

use crate::config::DataManagerConfig;
use crate::context::Context;
use crate::data_definition::{DataDefinition, DefinitionOptions};
use crate::error::{DataError, Result};
use crate::event::Event;
use crate::stats::DataManagerStats;
use crate::variable::{CommandWriter, VarOptions, Variable, VariableKind};

struct Registry {
	variables: HashMap<VarKey, Variable>,
	definitions: Vec<DataDefinition>,
	events_by_name: HashMap<Box<str>, Event>,
	events_by_id: HashMap<ClientEventId, Event>,
}

struct Inner {
	ctx: Rc<Context>,
	initialized: Cell<bool>,
	registry: RefCell<Registry>,
}

/// Owner of every variable, data definition and event of one client.
///
/// Cloning yields another handle to the same manager.
#[derive(Clone)]
pub struct DataManager {
	inner: Rc<Inner>,
}

impl DataManager {
	/// Creates a manager with the default configuration.
	pub fn new(host: Rc<dyn Host>) -> Self {
		Self::with_config(host, DataManagerConfig::default())
	}

	pub fn with_config(host: Rc<dyn Host>, config: DataManagerConfig) -> Self {
		Self {
			inner: Rc::new(Inner {
				ctx: Rc::new(Context::new(host, config)),
				initialized: Cell::new(false),
				registry: RefCell::new(Registry {
					variables: HashMap::default(),
					definitions: Vec::new(),
					events_by_name: HashMap::default(),
					events_by_id: HashMap::default(),
				}),
			}),
		}
	}

	pub fn config(&self) -> &DataManagerConfig {
		&self.inner.ctx.config
	}

	/// Enables the frame phases.
	pub fn initialize(&self) -> bool {
		self.inner.initialized.set(true);
		info!("data_manager.initialized");
		true
	}

	/// Disables the frame phases. Handles stay usable.
	pub fn shutdown(&self) -> bool {
		self.inner.initialized.set(false);
		let registry = self.inner.registry.borrow();
		info!(
			variables = registry.variables.len(),
			definitions = registry.definitions.len(),
			events = registry.events_by_name.len(),
			"data_manager.shutdown"
		);
		true
	}

	pub fn is_initialized(&self) -> bool {
		self.inner.initialized.get()
	}

	fn ensure_initialized(&self, phase: &'static str) -> bool {
		if self.inner.initialized.get() {
			return true;
		}
		error!(phase, error = %DataError::NotInitialized, "data_manager.phase_refused");
		false
	}

	/// First phase of a frame: advances the clock, refreshes stale auto-read
	/// variables, requests stale auto-read definitions and pumps host
	/// messages.
	pub fn pre_update(&self, sim_time: f64) -> bool {
		if !self.ensure_initialized("pre_update") {
			return false;
		}
		let now = self.inner.ctx.advance(sim_time);
		trace!(tick = now.tick, sim_time, "data_manager.pre_update");

		for variable in self.variables().iter().filter(|v| v.is_auto_read()) {
			variable.refresh();
		}
		for definition in self.definitions().iter().filter(|d| d.is_auto_read()) {
			definition.request_if_stale();
		}
		self.pump_messages();
		true
	}

	/// Client logic phase. Performs no host traffic.
	pub fn update(&self) -> bool {
		self.ensure_initialized("update")
	}

	/// Last phase of a frame: writes back dirty auto-write variables and
	/// every auto-write definition.
	pub fn post_update(&self) -> bool {
		if !self.ensure_initialized("post_update") {
			return false;
		}
		for variable in self.variables().iter().filter(|v| v.is_auto_write()) {
			variable.flush();
		}
		for definition in self.definitions().iter().filter(|d| d.is_auto_write()) {
			definition.write_now();
		}
		true
	}

	/// Drains queued host messages, bounded by `max_messages_per_pump`.
	/// Returns the number of messages handled.
	pub fn pump_messages(&self) -> usize {
		let limit = self.inner.ctx.config.max_messages_per_pump;
		let mut handled = 0;
		while limit.is_none_or(|max| handled < max) {
			let Some(message) = self.inner.ctx.host.next_message() else {
				break;
			};
			handled += 1;
			self.handle_message(message);
		}
		self.inner.ctx.bump(|s| s.messages_pumped += handled as u64);
		handled
	}

	fn handle_message(&self, message: HostMessage) {
		match message {
			HostMessage::Open => info!("data_manager.host_open"),
			HostMessage::Quit => info!("data_manager.host_quit"),
			HostMessage::Exception { code } => {
				error!(code, exception = exception_name(code), "data_manager.host_exception");
				self.abandon_one_shot_requests();
			}
			HostMessage::Event { client_id, args } => self.route_event(client_id, &args),
			HostMessage::ObjectData {
				request_id,
				definition_id,
				data,
			} => self.route_reply(request_id, definition_id, &data),
		}
	}

	/// Exceptions do not name the failed request, so every outstanding
	/// one-shot read is abandoned and auto-read requests again.
	fn abandon_one_shot_requests(&self) {
		let abandoned = self.definitions().iter().filter(|d| d.abandon()).count();
		if abandoned > 0 {
			debug!(abandoned, "data_manager.requests_abandoned");
		}
	}

	fn route_event(&self, client_id: ClientEventId, args: &EventArgs) {
		let event = self.inner.registry.borrow().events_by_id.get(&client_id).cloned();
		match event {
			Some(event) if event.is_subscribed() => {
				event.dispatch(args);
			}
			Some(event) => debug!(event = %event.name(), client_id = %client_id, "data_manager.event_unsubscribed"),
			None => debug!(client_id = %client_id, "data_manager.event_unrouted"),
		}
	}

	fn route_reply(&self, request_id: RequestId, definition_id: DefinitionId, data: &[u8]) {
		let ctx = &self.inner.ctx;
		let result = match ctx.waiting_on(request_id) {
			Some(state) => DataDefinition::from_state(state, Rc::clone(ctx)).apply_reply(request_id, definition_id, data),
			None => Err(DataError::UnsolicitedReply(request_id)),
		};
		if let Err(error) = result {
			if matches!(error, DataError::UnsolicitedReply(_)) {
				ctx.bump(|s| s.unsolicited_replies += 1);
			}
			error.report();
		}
	}

	/// Returns the named client variable for `name`, creating it on first
	/// use. Named variables always use index 0.
	pub fn make_named_var(&self, name: &str, options: VarOptions) -> Variable {
		self.find_or_create(VarKey::new(name, 0, options.unit), VariableKind::Named, &options)
	}

	/// Returns the indexed host variable `name:index`, creating it on first
	/// use. With a `writer` the variable is writable; a read-only variable
	/// registered earlier under the same key is upgraded.
	pub fn make_aircraft_var(
		&self,
		name: &str,
		index: u32,
		writer: Option<CommandWriter>,
		options: VarOptions,
	) -> Variable {
		let kind = match writer {
			Some(writer) => VariableKind::CommandWritten(writer),
			None => VariableKind::IndexedReadOnly,
		};
		self.find_or_create(VarKey::new(name, index, options.unit), kind, &options)
	}

	/// Read-only indexed variable at index 0. Auto-write is ignored.
	pub fn make_simple_aircraft_var(&self, name: &str, options: VarOptions) -> Variable {
		self.make_aircraft_var(name, 0, None, options.auto_write(false))
	}

	fn find_or_create(&self, key: VarKey, kind: VariableKind, options: &VarOptions) -> Variable {
		let existing = self.inner.registry.borrow().variables.get(&key).cloned();
		if let Some(variable) = existing {
			variable.merge(options);
			let current = variable.kind();
			if !current.same_store(&kind) {
				warn!(var = %key, existing = ?current, requested = ?kind, "data_manager.kind_conflict");
			} else if let VariableKind::CommandWritten(writer) = kind
				&& variable.attach_writer(writer)
			{
				debug!(var = %key, "data_manager.writer_attached");
			}
			return variable;
		}

		let variable = Variable::new(Rc::clone(&self.inner.ctx), key.clone(), kind, options);
		debug!(var = %key, "data_manager.variable_created");
		self.inner.registry.borrow_mut().variables.insert(key, variable.clone());
		variable
	}

	/// Creates a data definition. `payload_size` must equal the summed field
	/// widths; otherwise nothing is created.
	pub fn make_data_definition(
		&self,
		name: &str,
		fields: Vec<FieldDef>,
		payload_size: usize,
		options: DefinitionOptions,
	) -> Result<DataDefinition> {
		let definition = DataDefinition::new(Rc::clone(&self.inner.ctx), name, fields, payload_size, &options)?;
		self.inner.registry.borrow_mut().definitions.push(definition.clone());
		Ok(definition)
	}

	/// Removes a definition from the registry and abandons its outstanding
	/// request. Returns false if it was not registered.
	pub fn release_data_definition(&self, definition: &DataDefinition) -> bool {
		let removed = {
			let mut registry = self.inner.registry.borrow_mut();
			let before = registry.definitions.len();
			registry.definitions.retain(|d| !d.ptr_eq(definition));
			before != registry.definitions.len()
		};
		if removed {
			definition.release();
			debug!(definition_id = %definition.definition_id(), "data_manager.definition_released");
		}
		removed
	}

	/// Returns the event mapped to `name`, creating it on first use.
	pub fn make_event(&self, name: &str) -> Event {
		let existing = self.inner.registry.borrow().events_by_name.get(name).cloned();
		if let Some(event) = existing {
			return event;
		}

		let event = Event::new(Rc::clone(&self.inner.ctx), name);
		let mut registry = self.inner.registry.borrow_mut();
		registry.events_by_id.insert(event.client_id(), event.clone());
		registry.events_by_name.insert(name.into(), event.clone());
		event
	}

	pub fn variable(&self, key: &VarKey) -> Option<Variable> {
		self.inner.registry.borrow().variables.get(key).cloned()
	}

	pub fn event(&self, name: &str) -> Option<Event> {
		self.inner.registry.borrow().events_by_name.get(name).cloned()
	}

	pub fn event_by_id(&self, client_id: ClientEventId) -> Option<Event> {
		self.inner.registry.borrow().events_by_id.get(&client_id).cloned()
	}

	/// Snapshot of every registered variable.
	pub fn variables(&self) -> Vec<Variable> {
		self.inner.registry.borrow().variables.values().cloned().collect()
	}

	/// Snapshot of every registered definition, in creation order.
	pub fn definitions(&self) -> Vec<DataDefinition> {
		self.inner.registry.borrow().definitions.clone()
	}

	/// Number of definitions waiting on a reply.
	pub fn pending_requests(&self) -> usize {
		self.inner.ctx.pending_len()
	}

	pub fn tick_counter(&self) -> u64 {
		self.inner.ctx.clock().tick
	}

	pub fn sim_time(&self) -> f64 {
		self.inner.ctx.clock().sim_time
	}

	pub fn stats(&self) -> DataManagerStats {
		self.inner.ctx.stats()
	}
}

impl fmt::Debug for DataManager {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let registry = self.inner.registry.borrow();
		f.debug_struct("DataManager")
			.field("initialized", &self.inner.initialized.get())
			.field("clock", &self.inner.ctx.clock())
			.field("variables", &registry.variables.len())
			.field("definitions", &registry.definitions.len())
			.field("events", &registry.events_by_name.len())
			.finish()
	}
}

#[cfg(test)]
mod tests;
