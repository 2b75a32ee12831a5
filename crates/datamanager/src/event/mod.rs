//! Host commands and inbound notification fan-out.

use std::cell::RefCell;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::rc::Rc;

use indexmap::IndexMap;
use simbridge_primitives::{CallbackId, ClientEventId, EventArgs};
use tracing::{debug, error, info, trace};

use crate::context::Context;
use crate::error::{DataError, Result, absorb};

/// Closure invoked with the arguments of an inbound notification.
pub type EventCallback = Rc<dyn Fn(&EventArgs)>;

struct EventState {
	name: Box<str>,
	client_id: ClientEventId,
	subscribed: bool,
	masked: bool,
	callbacks: IndexMap<CallbackId, EventCallback>,
}

/// A host command mapped to a client id.
///
/// Triggering sends the command to the host. Once subscribed, notifications
/// the host delivers for the command are dispatched to every callback in
/// registration order.
#[derive(Clone)]
pub struct Event {
	state: Rc<RefCell<EventState>>,
	ctx: Rc<Context>,
}

impl Event {
	/// Maps `name` to a fresh client id. A mapping rejected by the host is
	/// logged; the handle stays usable and later host calls report their own
	/// failures.
	pub(crate) fn new(ctx: Rc<Context>, name: &str) -> Self {
		let client_id = ctx.next_event_id();
		if let Err(source) = ctx.host.map_event(client_id, name) {
			DataError::SubscriptionFailure {
				name: name.to_owned(),
				source,
			}
			.report();
		}
		debug!(event = name, client_id = %client_id, "event.mapped");

		Self {
			state: Rc::new(RefCell::new(EventState {
				name: name.into(),
				client_id,
				subscribed: false,
				masked: false,
				callbacks: IndexMap::new(),
			})),
			ctx,
		}
	}

	/// Host command name.
	pub fn name(&self) -> String {
		self.state.borrow().name.to_string()
	}

	/// Client id the command is mapped to.
	pub fn client_id(&self) -> ClientEventId {
		self.state.borrow().client_id
	}

	/// Whether inbound notifications are routed to this event.
	pub fn is_subscribed(&self) -> bool {
		self.state.borrow().subscribed
	}

	/// Whether the subscription masks the notification from lower priority
	/// listeners.
	pub fn is_masked(&self) -> bool {
		self.state.borrow().masked
	}

	/// Number of registered callbacks.
	pub fn callback_count(&self) -> usize {
		self.state.borrow().callbacks.len()
	}

	/// Sends the command with up to five parameters; missing trailing
	/// parameters are zero. Failures are logged and reported as `false`.
	pub fn trigger(&self, params: &[u32]) -> bool {
		absorb(self.try_trigger(params)).is_some()
	}

	/// Like [`trigger`](Self::trigger), returning the failure.
	pub fn try_trigger(&self, params: &[u32]) -> Result<()> {
		let args = EventArgs::from_slice(params).ok_or(DataError::TooManyParams(params.len()))?;
		self.try_trigger_args(args)
	}

	/// Sends the command with a prepared argument tuple.
	pub fn try_trigger_args(&self, args: EventArgs) -> Result<()> {
		let client_id = self.client_id();
		self.ctx.host.transmit_event(client_id, args)?;
		self.ctx.bump(|s| s.events_triggered += 1);
		trace!(client_id = %client_id, params = ?args.used(), "event.triggered");
		Ok(())
	}

	/// Subscribes to inbound notifications for this command. Subscribing
	/// twice is a logged no-op.
	pub fn subscribe(&self, mask: bool) -> bool {
		absorb(self.try_subscribe(mask)).is_some()
	}

	/// Like [`subscribe`](Self::subscribe), returning the failure.
	pub fn try_subscribe(&self, mask: bool) -> Result<()> {
		let (name, client_id, subscribed) = {
			let state = self.state.borrow();
			(state.name.clone(), state.client_id, state.subscribed)
		};
		if subscribed {
			debug!(event = %name, "event.already_subscribed");
			return Ok(());
		}

		self.ctx
			.host
			.subscribe_event(client_id, self.ctx.config.event_group_priority, mask)
			.map_err(|source| DataError::SubscriptionFailure {
				name: name.to_string(),
				source,
			})?;

		let mut state = self.state.borrow_mut();
		state.subscribed = true;
		state.masked = mask;
		info!(event = %name, client_id = %client_id, mask, "event.subscribed");
		Ok(())
	}

	/// Stops inbound notifications. Unsubscribing an unsubscribed event is a
	/// no-op.
	pub fn unsubscribe(&self) -> bool {
		absorb(self.try_unsubscribe()).is_some()
	}

	/// Like [`unsubscribe`](Self::unsubscribe), returning the failure.
	pub fn try_unsubscribe(&self) -> Result<()> {
		let (name, client_id, subscribed) = {
			let state = self.state.borrow();
			(state.name.clone(), state.client_id, state.subscribed)
		};
		if !subscribed {
			return Ok(());
		}

		self.ctx
			.host
			.unsubscribe_event(client_id)
			.map_err(|source| DataError::SubscriptionFailure {
				name: name.to_string(),
				source,
			})?;

		let mut state = self.state.borrow_mut();
		state.subscribed = false;
		state.masked = false;
		info!(event = %name, client_id = %client_id, "event.unsubscribed");
		Ok(())
	}

	/// Registers a callback run on every dispatch.
	pub fn add_callback(&self, callback: impl Fn(&EventArgs) + 'static) -> CallbackId {
		let id = self.ctx.next_callback_id();
		self.state.borrow_mut().callbacks.insert(id, Rc::new(callback));
		id
	}

	/// Removes a callback, keeping the order of the others.
	pub fn remove_callback(&self, id: CallbackId) -> bool {
		self.state.borrow_mut().callbacks.shift_remove(&id).is_some()
	}

	/// Invokes every callback with `args` and returns how many ran to
	/// completion.
	///
	/// The callback list is captured before the first call, so callbacks may
	/// add or remove callbacks and create new handles. Changes apply from the
	/// next dispatch.
	pub fn dispatch(&self, args: &EventArgs) -> usize {
		let (name, callbacks) = {
			let state = self.state.borrow();
			let callbacks: Vec<_> = state.callbacks.iter().map(|(id, cb)| (*id, Rc::clone(cb))).collect();
			(state.name.clone(), callbacks)
		};
		self.ctx.bump(|s| s.events_dispatched += 1);
		trace!(event = %name, callbacks = callbacks.len(), "event.dispatch");

		if !self.ctx.config.catch_callback_panics {
			callbacks.iter().for_each(|(_, callback)| callback(args));
			return callbacks.len();
		}

		let mut completed = 0;
		for (id, callback) in callbacks {
			match std::panic::catch_unwind(AssertUnwindSafe(|| callback(args))) {
				Ok(()) => completed += 1,
				Err(payload) => {
					self.ctx.bump(|s| s.callback_panics += 1);
					error!(event = %name, callback = %id, panic = panic_message(&*payload), "event.callback_panicked");
				}
			}
		}
		completed
	}
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
	payload
		.downcast_ref::<&str>()
		.copied()
		.or_else(|| payload.downcast_ref::<String>().map(String::as_str))
		.unwrap_or("<non-string panic>")
}

impl fmt::Debug for Event {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let state = self.state.borrow();
		f.debug_struct("Event")
			.field("name", &state.name)
			.field("client_id", &state.client_id)
			.field("subscribed", &state.subscribed)
			.field("masked", &state.masked)
			.field("callbacks", &state.callbacks.len())
			.finish()
	}
}

impl fmt::Display for Event {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let state = self.state.borrow();
		write!(
			f,
			"Event {} ({}) subscribed={} masked={} callbacks={}",
			state.name,
			state.client_id,
			state.subscribed,
			state.masked,
			state.callbacks.len()
		)
	}
}
