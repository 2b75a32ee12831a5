use std::cell::RefCell;

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use rstest::rstest;
use simbridge_host::{LocalHost, ReadPeriod};
use simbridge_primitives::{FieldType, Unit};

use super::*;
use crate::staleness::StalenessPolicy;

fn setup() -> (Rc<LocalHost>, DataManager) {
	setup_with(DataManagerConfig::default())
}

fn setup_with(config: DataManagerConfig) -> (Rc<LocalHost>, DataManager) {
	let host = Rc::new(LocalHost::new());
	let manager = DataManager::with_config(Rc::clone(&host) as Rc<dyn Host>, config);
	manager.initialize();
	(host, manager)
}

fn engine_fields() -> Vec<FieldDef> {
	vec![
		FieldDef::new("ENG N1", 1, Unit::PERCENT),
		FieldDef::new("ENG N1", 2, Unit::PERCENT),
		FieldDef::new("ENG FUEL FLOW", 1, Unit::POUNDS_PER_HOUR).with_type(FieldType::Int32),
	]
}

#[test]
fn identical_keys_share_state() {
	let (_host, manager) = setup();
	let a = manager.make_named_var("A32NX_FCU_SPD", VarOptions::default());
	let b = manager.make_named_var("A32NX_FCU_SPD", VarOptions::default());
	let other_unit = manager.make_named_var("A32NX_FCU_SPD", VarOptions::new().unit(Unit::PERCENT));

	assert!(a.ptr_eq(&b));
	assert!(!a.ptr_eq(&other_unit));
	a.set(250.0);
	assert_eq!(b.get(), 250.0);
	assert_eq!(manager.variables().len(), 2);
}

#[test]
fn dedup_merges_flags_and_ages() {
	let (_host, manager) = setup();
	let first = manager.make_named_var("A32NX_X", VarOptions::new().max_age_ticks(10).max_age_time(1.0));
	manager.make_named_var("A32NX_X", VarOptions::new().auto_read(true).max_age_ticks(3).max_age_time(5.0));
	manager.make_named_var("A32NX_X", VarOptions::new().auto_write(true).max_age_ticks(7));

	assert!(first.is_auto_read());
	assert!(first.is_auto_write());
	assert_eq!(first.max_age_ticks(), 3);
	assert_eq!(first.max_age_time(), 0.0);
}

#[test]
fn read_only_variable_is_upgraded_by_writer() {
	let (host, manager) = setup();
	host.declare_indexed("LIGHT LANDING");
	let reader = manager.make_simple_aircraft_var("LIGHT LANDING", VarOptions::new().unit(Unit::BOOL));
	assert!(reader.is_read_only());

	let writer = manager.make_aircraft_var(
		"LIGHT LANDING",
		0,
		Some(CommandWriter::calculator_code("LANDING_LIGHTS_SET")),
		VarOptions::new().unit(Unit::BOOL),
	);
	assert!(reader.ptr_eq(&writer));
	assert!(!reader.is_read_only());
	assert!(reader.write_through(1.0));
	assert_eq!(host.calculator_code(), vec!["1 (>K:LANDING_LIGHTS_SET)".to_string()]);
}

#[test]
fn kind_conflict_returns_existing() {
	let (host, manager) = setup();
	host.declare_indexed("SHARED");
	let named = manager.make_named_var("SHARED", VarOptions::default());
	let indexed = manager.make_aircraft_var("SHARED", 0, None, VarOptions::default());
	assert!(named.ptr_eq(&indexed));
	assert!(matches!(indexed.kind(), VariableKind::Named));
}

#[test]
fn simple_aircraft_var_never_auto_writes() {
	let (_host, manager) = setup();
	let var = manager.make_simple_aircraft_var("PLANE ALTITUDE", VarOptions::new().auto_write(true));
	assert!(!var.is_auto_write());
	assert_eq!(var.index(), 0);
}

#[rstest]
#[case::pre_update("pre_update")]
#[case::update("update")]
#[case::post_update("post_update")]
fn phases_require_initialize(#[case] phase: &str) {
	let host = Rc::new(LocalHost::new());
	let manager = DataManager::new(Rc::clone(&host) as Rc<dyn Host>);
	let var = manager.make_named_var("A32NX_AUTO", VarOptions::new().auto_read(true).auto_write(true));
	var.set(1.0);

	let run = |manager: &DataManager| match phase {
		"pre_update" => manager.pre_update(1.0),
		"update" => manager.update(),
		_ => manager.post_update(),
	};

	assert!(!run(&manager));
	assert_eq!(manager.tick_counter(), 0);
	assert_eq!(host.named("A32NX_AUTO"), Some(0.0));

	manager.initialize();
	assert!(run(&manager));
	manager.shutdown();
	assert!(!run(&manager));
}

#[test]
fn pre_update_advances_clock() {
	let (_host, manager) = setup();
	assert!(manager.pre_update(0.5));
	assert!(manager.pre_update(0.75));
	assert_eq!(manager.tick_counter(), 2);
	assert_eq!(manager.sim_time(), 0.75);
	assert_eq!(manager.stats().ticks, 2);
}

#[test]
fn post_update_flushes_only_dirty_auto_write() {
	let (host, manager) = setup();
	let auto = manager.make_named_var("A32NX_AUTO", VarOptions::new().auto_write(true));
	let manual = manager.make_named_var("A32NX_MANUAL", VarOptions::default());
	auto.set(3.0);
	manual.set(4.0);

	manager.post_update();
	assert_eq!(host.named("A32NX_AUTO"), Some(3.0));
	assert_eq!(host.named("A32NX_MANUAL"), Some(0.0));
	assert!(!auto.is_dirty());
	assert!(manual.is_dirty());

	manager.post_update();
	assert_eq!(host.stats().named_writes, 1);
}

#[test]
fn replies_correlate_in_any_order() {
	let (host, manager) = setup();
	let fields = vec![FieldDef::new("A", 0, Unit::NUMBER)];
	let first = manager
		.make_data_definition("FIRST", fields.clone(), 8, DefinitionOptions::default())
		.unwrap();
	let second = manager
		.make_data_definition("SECOND", fields, 8, DefinitionOptions::default())
		.unwrap();

	let t1 = first.try_request_read().unwrap();
	let t2 = second.try_request_read().unwrap();
	host.reply(t2, second.definition_id(), 2.0f64.to_le_bytes().to_vec());
	host.reply(t1, first.definition_id(), 1.0f64.to_le_bytes().to_vec());

	assert_eq!(manager.pump_messages(), 2);
	assert_eq!(first.field(0), Some(1.0));
	assert_eq!(second.field(0), Some(2.0));
	assert_eq!(manager.pending_requests(), 0);
	assert_eq!(manager.stats().replies_applied, 2);
}

#[test]
fn unknown_tokens_are_counted_and_dropped() {
	let (host, manager) = setup();
	let def = manager
		.make_data_definition("ENGINES", engine_fields(), 20, DefinitionOptions::default())
		.unwrap();
	def.set_field(0, 42.0);
	let token = def.try_request_read().unwrap();
	let payload = def.payload();

	host.reply(RequestId(99), def.definition_id(), vec![1; 20]);
	host.push_message(HostMessage::Quit);
	assert_eq!(manager.pump_messages(), 2);
	assert_eq!(manager.stats().unsolicited_replies, 1);
	assert_eq!(def.payload(), payload);
	assert_eq!(def.pending_request(), Some(token));
	assert_eq!(manager.pending_requests(), 1);
	assert!(def.last_fetch().is_none());
}

#[test]
fn released_definition_drops_replies() {
	let (host, manager) = setup();
	let def = manager
		.make_data_definition("ENGINES", engine_fields(), 20, DefinitionOptions::default())
		.unwrap();
	let token = def.try_request_read().unwrap();

	assert!(manager.release_data_definition(&def));
	assert!(!manager.release_data_definition(&def));
	assert!(manager.definitions().is_empty());

	host.reply(token, def.definition_id(), vec![1; 20]);
	manager.pump_messages();
	assert_eq!(def.payload(), vec![0; 20]);
	assert_eq!(manager.stats().unsolicited_replies, 1);
}

#[test]
fn schema_mismatch_creates_nothing() {
	let (_host, manager) = setup();
	let result = manager.make_data_definition("ENGINES", engine_fields(), 24, DefinitionOptions::default());
	assert!(matches!(result, Err(DataError::SchemaMismatch { .. })));
	assert!(manager.definitions().is_empty());
}

#[test]
fn auto_read_definition_requests_once_until_reply() {
	let (host, manager) = setup();
	let def = manager
		.make_data_definition("ENGINES", engine_fields(), 20, DefinitionOptions::new().auto_read(true))
		.unwrap();

	manager.pre_update(0.0);
	manager.pre_update(0.1);
	assert_eq!(manager.stats().requests_sent, 1);
	assert!(def.pending_request().is_some());

	host.set_indexed("ENG N1", 2, 88.5);
	host.service_requests();
	manager.pre_update(0.2);
	assert_eq!(def.field(1), Some(88.5));
	assert!(def.pending_request().is_none());

	manager.pre_update(0.3);
	assert_eq!(manager.stats().requests_sent, 2);
}

#[test]
fn host_exception_abandons_one_shot_reads() {
	let (host, manager) = setup();
	let engines = manager
		.make_data_definition("ENGINES", engine_fields(), 20, DefinitionOptions::new().auto_read(true))
		.unwrap();
	let fuel = manager
		.make_data_definition(
			"FUEL",
			vec![FieldDef::new("FUEL TOTAL QUANTITY", 0, Unit::GALLONS)],
			8,
			DefinitionOptions::default(),
		)
		.unwrap();
	assert!(fuel.request_periodic(ReadPeriod::Second));
	let periodic = fuel.pending_request();

	manager.pre_update(0.0);
	let stuck = engines.pending_request().unwrap();
	host.push_message(HostMessage::Exception { code: 20 });
	assert_eq!(manager.pump_messages(), 1);
	assert_eq!(engines.pending_request(), None);
	assert_eq!(fuel.pending_request(), periodic);
	assert_eq!(manager.stats().abandoned_requests, 1);

	manager.pre_update(0.1);
	assert!(engines.pending_request().is_some_and(|token| token != stuck));

	host.reply(stuck, engines.definition_id(), vec![1; 20]);
	manager.pump_messages();
	assert!(!engines.has_data());
	assert_eq!(manager.stats().unsolicited_replies, 1);
}

#[test]
fn unanswered_read_times_out() {
	let (_host, manager) = setup_with(DataManagerConfig {
		request_timeout_ticks: Some(3),
		..DataManagerConfig::default()
	});
	let def = manager
		.make_data_definition("ENGINES", engine_fields(), 20, DefinitionOptions::new().auto_read(true))
		.unwrap();

	for frame in 0..3 {
		manager.pre_update(f64::from(frame));
	}
	assert_eq!(manager.stats().requests_sent, 1);
	let first = def.pending_request();

	manager.pre_update(3.0);
	assert_eq!(manager.stats().abandoned_requests, 1);
	assert_eq!(manager.stats().requests_sent, 2);
	assert_ne!(def.pending_request(), first);
	assert_eq!(manager.pending_requests(), 1);
}

#[test]
fn periodic_definition_suppresses_auto_requests() {
	let (host, manager) = setup();
	let def = manager
		.make_data_definition("ENGINES", engine_fields(), 20, DefinitionOptions::new().auto_read(true))
		.unwrap();
	assert!(def.request_periodic(ReadPeriod::SimFrame));

	for frame in 0..3 {
		host.set_indexed("ENG FUEL FLOW", 1, f64::from(frame) * 100.0);
		host.service_requests();
		manager.pre_update(f64::from(frame));
		assert_eq!(def.field(2), Some(f64::from(frame) * 100.0));
	}
	assert_eq!(manager.stats().requests_sent, 1);
	assert_eq!(manager.stats().replies_applied, 3);
}

#[test]
fn pump_respects_message_budget() {
	let (host, manager) = setup_with(DataManagerConfig {
		max_messages_per_pump: Some(2),
		..DataManagerConfig::default()
	});
	for _ in 0..5 {
		host.push_message(HostMessage::Open);
	}
	assert_eq!(manager.pump_messages(), 2);
	assert_eq!(host.queued(), 3);
	assert_eq!(manager.pump_messages(), 2);
	assert_eq!(manager.pump_messages(), 1);
	assert_eq!(manager.stats().messages_pumped, 5);
}

#[test]
fn events_are_deduplicated_by_name() {
	let (_host, manager) = setup();
	let a = manager.make_event("TOGGLE_X");
	let b = manager.make_event("TOGGLE_X");
	assert_eq!(a.client_id(), b.client_id());
	assert_eq!(manager.event_by_id(a.client_id()).map(|e| e.name()), Some("TOGGLE_X".to_string()));
	assert!(manager.event("OTHER").is_none());
}

#[test]
fn inbound_notification_reaches_callbacks() {
	let (host, manager) = setup();
	let event = manager.make_event("A32NX.FCU_SPD_INC");
	assert!(event.subscribe(false));
	let seen = Rc::new(RefCell::new(Vec::new()));
	let sink = Rc::clone(&seen);
	event.add_callback(move |args| sink.borrow_mut().push(args.used().to_vec()));

	host.raise_event("A32NX.FCU_SPD_INC", EventArgs::from_slice(&[5]).unwrap());
	manager.pre_update(0.0);
	assert_eq!(*seen.borrow(), vec![vec![5]]);
	assert_eq!(manager.stats().events_dispatched, 1);
}

#[test]
fn queued_notification_is_dropped_after_unsubscribe() {
	let (host, manager) = setup();
	let event = manager.make_event("A32NX.FCU_SPD_DEC");
	assert!(event.subscribe(false));
	let hits = Rc::new(RefCell::new(0));
	let sink = Rc::clone(&hits);
	event.add_callback(move |_| *sink.borrow_mut() += 1);

	assert_eq!(host.raise_event("A32NX.FCU_SPD_DEC", EventArgs::default()), 1);
	assert!(event.unsubscribe());
	assert_eq!(manager.pump_messages(), 1);
	assert!(!event.is_subscribed());
	assert_eq!(*hits.borrow(), 0);
	assert_eq!(manager.stats().events_dispatched, 0);
}

#[test]
fn callbacks_may_create_handles() {
	let (host, manager) = setup();
	let event = manager.make_event("SPAWN");
	event.subscribe(false);
	let spawned = Rc::new(RefCell::new(None));
	let slot = Rc::clone(&spawned);
	let inner = manager.clone();
	event.add_callback(move |_| {
		let var = inner.make_named_var("A32NX_SPAWNED", VarOptions::new().auto_read(true));
		inner.make_event("SPAWNED_EVENT");
		*slot.borrow_mut() = Some(var);
	});

	host.raise_event("SPAWN", EventArgs::default());
	manager.pump_messages();
	assert!(spawned.borrow().is_some());
	assert!(manager.variable(&VarKey::new("A32NX_SPAWNED", 0, Unit::NUMBER)).is_some());
	assert!(manager.event("SPAWNED_EVENT").is_some());
}

#[test]
fn any_expired_policy_is_configurable() {
	let (host, manager) = setup_with(DataManagerConfig {
		staleness_policy: StalenessPolicy::AnyExpired,
		..DataManagerConfig::default()
	});
	host.set_named("A32NX_P", 1.0);
	let var = manager.make_named_var("A32NX_P", VarOptions::new().auto_read(true).max_age_time(1.0).max_age_ticks(100));

	manager.pre_update(0.0);
	host.set_named("A32NX_P", 2.0);
	manager.pre_update(0.5);
	assert_eq!(var.get(), 1.0);
	manager.pre_update(1.0);
	assert_eq!(var.get(), 2.0);
}

#[test]
fn any_expired_merge_keeps_other_consumers_budget() {
	let (host, manager) = setup_with(DataManagerConfig {
		staleness_policy: StalenessPolicy::AnyExpired,
		..DataManagerConfig::default()
	});
	host.set_named("A32NX_Q", 1.0);
	let strict_time =
		manager.make_named_var("A32NX_Q", VarOptions::new().auto_read(true).max_age_time(1.0).max_age_ticks(100));
	let strict_ticks = manager.make_named_var("A32NX_Q", VarOptions::new().auto_read(true).max_age_ticks(50));
	assert_eq!(strict_time.max_age_time(), 1.0);
	assert_eq!(strict_ticks.max_age_ticks(), 50);

	manager.pre_update(0.0);
	host.set_named("A32NX_Q", 2.0);
	manager.pre_update(5.0);
	assert_eq!(strict_time.get(), 2.0);
}

proptest! {
	#[test]
	fn at_most_one_instance_per_key(
		requests in prop::collection::vec((0usize..4, 0u32..3, any::<bool>(), any::<bool>()), 1..40)
	) {
		let (_host, manager) = setup();
		let names = ["A", "B", "C", "D"];
		let mut handles: Vec<(VarKey, Variable)> = Vec::new();

		for (name, index, percent, auto_read) in requests {
			let unit = if percent { Unit::PERCENT } else { Unit::NUMBER };
			let options = VarOptions::new().unit(unit).auto_read(auto_read);
			let var = manager.make_aircraft_var(names[name], index, None, options);
			handles.push((var.key(), var));
		}

		for (key, var) in &handles {
			let registered = manager.variable(key).unwrap();
			prop_assert!(registered.ptr_eq(var));
		}
		let mut keys: Vec<_> = handles.iter().map(|(key, _)| key.clone()).collect();
		keys.sort_by(|a, b| (&a.name, a.index, a.unit).cmp(&(&b.name, b.index, b.unit)));
		keys.dedup();
		prop_assert_eq!(keys.len(), manager.variables().len());
	}
}
