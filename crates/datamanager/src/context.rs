use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use rustc_hash::FxHashMap as HashMap;
use simbridge_host::Host;
use simbridge_primitives::{CallbackId, ClientEventId, DefinitionId, IdGen, RequestId};

use crate::config::DataManagerConfig;
use crate::data_definition::DefinitionState;
use crate::staleness::FrameClock;
use crate::stats::DataManagerStats;

/// State shared by the manager and every handle it creates.
pub(crate) struct Context {
	pub(crate) host: Rc<dyn Host>,
	pub(crate) config: DataManagerConfig,
	clock: Cell<FrameClock>,
	stats: Cell<DataManagerStats>,
	ids: RefCell<Ids>,
	/// Batches waiting on a reply, by request token. Held weakly so a released
	/// batch turns its late replies into unsolicited ones.
	pending: RefCell<HashMap<RequestId, Weak<RefCell<DefinitionState>>>>,
}

#[derive(Default)]
struct Ids {
	definitions: IdGen<DefinitionId>,
	requests: IdGen<RequestId>,
	events: IdGen<ClientEventId>,
	callbacks: IdGen<CallbackId>,
}

impl Context {
	pub(crate) fn new(host: Rc<dyn Host>, config: DataManagerConfig) -> Self {
		Self {
			host,
			config,
			clock: Cell::new(FrameClock::default()),
			stats: Cell::new(DataManagerStats::default()),
			ids: RefCell::new(Ids::default()),
			pending: RefCell::new(HashMap::default()),
		}
	}

	pub(crate) fn clock(&self) -> FrameClock {
		self.clock.get()
	}

	pub(crate) fn advance(&self, sim_time: f64) -> FrameClock {
		let next = self.clock.get().advance(sim_time);
		self.clock.set(next);
		self.bump(|s| s.ticks += 1);
		next
	}

	pub(crate) fn stats(&self) -> DataManagerStats {
		self.stats.get()
	}

	pub(crate) fn bump(&self, f: impl FnOnce(&mut DataManagerStats)) {
		let mut stats = self.stats.get();
		f(&mut stats);
		self.stats.set(stats);
	}

	pub(crate) fn next_definition_id(&self) -> DefinitionId {
		self.ids.borrow_mut().definitions.next()
	}

	pub(crate) fn next_request_id(&self) -> RequestId {
		self.ids.borrow_mut().requests.next()
	}

	pub(crate) fn next_event_id(&self) -> ClientEventId {
		self.ids.borrow_mut().events.next()
	}

	pub(crate) fn next_callback_id(&self) -> CallbackId {
		self.ids.borrow_mut().callbacks.next()
	}

	pub(crate) fn track(&self, request: RequestId, state: &Rc<RefCell<DefinitionState>>) {
		self.pending.borrow_mut().insert(request, Rc::downgrade(state));
	}

	pub(crate) fn untrack(&self, request: RequestId) {
		self.pending.borrow_mut().remove(&request);
	}

	/// Resolves a reply token. Dead entries are pruned and report `None`.
	pub(crate) fn waiting_on(&self, request: RequestId) -> Option<Rc<RefCell<DefinitionState>>> {
		let mut pending = self.pending.borrow_mut();
		let state = pending.get(&request)?.upgrade();
		if state.is_none() {
			pending.remove(&request);
		}
		state
	}

	pub(crate) fn pending_len(&self) -> usize {
		self.pending.borrow().len()
	}
}

#[cfg(test)]
pub(crate) fn test_context(host: &Rc<simbridge_host::LocalHost>, config: DataManagerConfig) -> Rc<Context> {
	Rc::new(Context::new(Rc::clone(host) as Rc<dyn Host>, config))
}
