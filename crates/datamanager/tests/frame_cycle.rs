//! End-to-end frame cycles against the in-process host.

use std::cell::RefCell;
use std::rc::Rc;

use pretty_assertions::assert_eq;
use simbridge_datamanager::{
	CommandWriter, DataManager, DataManagerConfig, DefinitionOptions, EventArgs, FieldDef, FieldType, Host,
	LocalHost, ReadPeriod, StalenessPolicy, Unit, VarOptions,
};

fn start(config: DataManagerConfig) -> (Rc<LocalHost>, DataManager) {
	let _ = tracing_subscriber::fmt().with_test_writer().try_init();
	let host = Rc::new(LocalHost::new());
	let manager = DataManager::with_config(Rc::clone(&host) as Rc<dyn Host>, config);
	assert!(manager.initialize());
	(host, manager)
}

fn frame(host: &LocalHost, manager: &DataManager, sim_time: f64) {
	host.service_requests();
	assert!(manager.pre_update(sim_time));
	assert!(manager.update());
	assert!(manager.post_update());
}

#[test]
fn altitude_refetches_every_fifth_tick() {
	let (host, manager) = start(DataManagerConfig::default());
	host.set_indexed("ALT", 0, 1000.0);
	let alt = manager.make_aircraft_var(
		"ALT",
		0,
		None,
		VarOptions::new().unit(Unit::FEET).auto_read(true).max_age_ticks(5),
	);

	frame(&host, &manager, 0.0);
	assert_eq!(alt.get(), 1000.0);
	assert!(alt.has_changed());
	host.set_indexed("ALT", 0, 1500.0);

	for tick in 1..5 {
		frame(&host, &manager, f64::from(tick));
		assert_eq!(alt.get(), 1000.0, "tick {tick}");
		assert!(!alt.has_changed());
	}

	frame(&host, &manager, 5.0);
	assert_eq!(alt.get(), 1500.0);
	assert!(alt.has_changed());
	assert_eq!(host.stats().indexed_reads, 2);
}

#[test]
fn unchanged_host_value_stays_cached() {
	let (host, manager) = start(DataManagerConfig::default());
	host.set_named("A32NX_IDLE", 42.0);
	let var = manager.make_named_var("A32NX_IDLE", VarOptions::new().auto_read(true).max_age_ticks(2));

	for n in 0..6 {
		frame(&host, &manager, f64::from(n) * 0.1);
		assert_eq!(var.get(), 42.0);
		assert_eq!(var.has_changed(), n == 0);
		assert!(!var.is_dirty());
	}
	assert_eq!(host.stats().named_reads, 3);
}

#[test]
fn toggle_dispatches_to_both_callbacks_in_order() {
	let (host, manager) = start(DataManagerConfig::default());
	let toggle = manager.make_event("TOGGLE_X");
	assert!(toggle.subscribe(false));

	let calls = Rc::new(RefCell::new(Vec::new()));
	for label in ["first", "second"] {
		let calls = Rc::clone(&calls);
		toggle.add_callback(move |args| calls.borrow_mut().push((label, args.count, args.params)));
	}

	host.raise_event("TOGGLE_X", EventArgs::new(1, [42, 0, 0, 0, 0]));
	frame(&host, &manager, 0.0);

	assert_eq!(
		*calls.borrow(),
		vec![("first", 1, [42, 0, 0, 0, 0]), ("second", 1, [42, 0, 0, 0, 0])]
	);
}

#[test]
fn client_logic_round_trip() {
	let (host, manager) = start(DataManagerConfig::default());
	host.set_indexed("LIGHT STROBE", 0, 0.0);
	host.set_named("A32NX_STROBE_REQ", 1.0);

	let request = manager.make_named_var("A32NX_STROBE_REQ", VarOptions::new().auto_read(true));
	let strobe_set = manager.make_event("STROBES_SET");
	let strobe = manager.make_aircraft_var(
		"LIGHT STROBE",
		0,
		Some(CommandWriter::Event(strobe_set)),
		VarOptions::new().unit(Unit::BOOL).auto_read(true).auto_write(true),
	);
	let status = manager.make_named_var("A32NX_STROBE_STATUS", VarOptions::new().auto_write(true));

	host.service_requests();
	manager.pre_update(0.0);
	if request.get_as_bool() != strobe.get_as_bool() {
		strobe.set_as_bool(request.get_as_bool());
		status.set(2.0);
	}
	manager.post_update();

	let sent: Vec<_> = host
		.transmitted()
		.into_iter()
		.map(|(name, args)| (name.to_string(), args.used().to_vec()))
		.collect();
	assert_eq!(sent, vec![("STROBES_SET".to_string(), vec![1])]);
	assert_eq!(host.named("A32NX_STROBE_STATUS"), Some(2.0));
	assert!(!strobe.is_dirty());
	assert!(!status.is_dirty());
}

#[test]
fn batch_read_and_write_cycle() {
	let (host, manager) = start(DataManagerConfig::default());
	host.set_indexed("ENG N1", 1, 21.5);
	host.set_indexed("ENG N1", 2, 22.5);
	let fields = vec![
		FieldDef::new("ENG N1", 1, Unit::PERCENT),
		FieldDef::new("ENG N1", 2, Unit::PERCENT),
		FieldDef::new("ENG FUEL FLOW", 1, Unit::POUNDS_PER_HOUR).with_type(FieldType::Int32),
	];
	let engines = manager
		.make_data_definition("ENGINES", fields, 20, DefinitionOptions::new().auto_read(true))
		.unwrap();
	let throttle = manager
		.make_data_definition(
			"THROTTLE",
			vec![FieldDef::new("GENERAL ENG THROTTLE LEVER POSITION", 1, Unit::PERCENT)],
			8,
			DefinitionOptions::new().auto_write(true),
		)
		.unwrap();

	// Request goes out in frame 1, reply lands in frame 2.
	frame(&host, &manager, 0.0);
	assert!(!engines.has_data());
	frame(&host, &manager, 0.1);
	assert_eq!(engines.field(0), Some(21.5));
	assert_eq!(engines.field(1), Some(22.5));
	assert_eq!(engines.last_fetch().map(|clock| clock.tick), Some(2));

	throttle.set_field(0, 75.0);
	manager.post_update();
	assert_eq!(host.indexed("GENERAL ENG THROTTLE LEVER POSITION", 1), Some(75.0));
	assert!(throttle.last_write().is_some());
}

#[test]
fn late_replies_for_released_batches_are_ignored() {
	let (host, manager) = start(DataManagerConfig::default());
	let fields = vec![FieldDef::new("FUEL TOTAL QUANTITY", 0, Unit::GALLONS)];
	let fuel = manager
		.make_data_definition("FUEL", fields, 8, DefinitionOptions::default())
		.unwrap();
	assert!(fuel.request_periodic(ReadPeriod::Second));
	let token = fuel.pending_request().unwrap();

	assert!(manager.release_data_definition(&fuel));
	host.reply(token, fuel.definition_id(), 1.0f64.to_le_bytes().to_vec());
	frame(&host, &manager, 0.0);

	assert!(!fuel.has_data());
	assert_eq!(host.outstanding_requests(), vec![]);
	assert_eq!(manager.stats().unsolicited_replies, 1);
}

#[test]
fn panicking_callback_does_not_abort_the_frame() {
	let (host, manager) = start(DataManagerConfig::default());
	let event = manager.make_event("A32NX.BROKEN");
	event.subscribe(true);
	event.add_callback(|_| panic!("broken module"));
	let reached = Rc::new(RefCell::new(false));
	let flag = Rc::clone(&reached);
	event.add_callback(move |_| *flag.borrow_mut() = true);

	host.raise_event("A32NX.BROKEN", EventArgs::default());
	frame(&host, &manager, 0.0);
	assert!(*reached.borrow());
	assert_eq!(manager.stats().callback_panics, 1);
}

#[test]
fn config_from_toml_drives_behavior() {
	let config = DataManagerConfig::from_toml_str(
		r#"
		default_epsilon = 0.5
		staleness_policy = "any_expired"
		"#,
	)
	.unwrap();
	assert_eq!(config.staleness_policy, StalenessPolicy::AnyExpired);

	let (host, manager) = start(config);
	host.set_named("A32NX_NOISY", 10.0);
	let var = manager.make_named_var("A32NX_NOISY", VarOptions::new().auto_read(true));
	assert_eq!(var.epsilon(), 0.5);

	frame(&host, &manager, 0.0);
	host.set_named("A32NX_NOISY", 10.4);
	frame(&host, &manager, 0.1);
	assert_eq!(var.get(), 10.0);
	assert!(!var.has_changed());
}

#[test]
fn shutdown_stops_host_traffic() {
	let (host, manager) = start(DataManagerConfig::default());
	let var = manager.make_named_var("A32NX_OUT", VarOptions::new().auto_write(true));
	var.set(9.0);
	assert!(manager.shutdown());
	assert!(!manager.post_update());
	assert_eq!(host.named("A32NX_OUT"), Some(0.0));
	assert!(var.is_dirty());
}
