//! AppService against mock hardware and storage: role resolution,
//! persistence, fan and PSU paths.

use crate::mock_hw::{MemStorage, MockHardware, RecordingSink, uid};
use fluiddash::app::commands::AppCommand;
use fluiddash::app::events::AppEvent;
use fluiddash::app::service::{AUTO_SAVE_DELAY_MS, AppService};
use fluiddash::config::SystemConfig;
use fluiddash::sensors::arbiter::BusMode;
use fluiddash::sensors::identify::IdentifyOutcome;
use fluiddash::sensors::mapping::{MAPPING_NAMESPACE, MappingStore, Role};

fn run(app: &mut AppService, hw: &mut MockHardware, sink: &mut RecordingSink, from: u64, to: u64) {
    let mut t = from;
    while t <= to {
        app.tick(t, hw, sink);
        t += 10;
    }
}

fn started(config: SystemConfig, hw: &mut MockHardware, storage: &MemStorage) -> (AppService, RecordingSink) {
    let mut sink = RecordingSink::new();
    let mut app = AppService::new(config);
    app.start(storage, hw, &mut sink);
    (app, sink)
}

// ── Role resolution ───────────────────────────────────────────

#[test]
fn positional_fallback_uses_discovery_order() {
    let mut hw = MockHardware::with_probes(&[(1, 30.0), (2, 40.0), (3, 35.0)]);
    let storage = MemStorage::new();
    let (mut app, mut sink) = started(SystemConfig::default(), &mut hw, &storage);

    run(&mut app, &mut hw, &mut sink, 0, 1000);

    assert_eq!(app.reading(Role::XAxis).latest_c, 30.0);
    assert_eq!(app.reading(Role::YLeft).latest_c, 40.0);
    assert_eq!(app.reading(Role::YRight).latest_c, 35.0);
    assert!(!app.reading(Role::ZAxis).valid);
}

#[test]
fn persisted_mapping_wins_after_restart() {
    let mut hw = MockHardware::with_probes(&[(1, 30.0), (2, 40.0)]);
    let mut storage = MemStorage::new();
    let (mut app, mut sink) = started(SystemConfig::default(), &mut hw, &storage);
    app.handle_command(
        AppCommand::AssignRole {
            uid: uid(2),
            role: Role::XAxis,
        },
        0,
        &mut hw,
        &mut sink,
    )
    .unwrap();
    assert!(app.persist_if_dirty(AUTO_SAVE_DELAY_MS, &mut storage));

    let mut hw = MockHardware::with_probes(&[(1, 30.0), (2, 40.0)]);
    let (mut app, mut sink) = started(SystemConfig::default(), &mut hw, &storage);
    assert!(sink.events.contains(&AppEvent::Started {
        mapped: 2,
        discovered: 2
    }));

    run(&mut app, &mut hw, &mut sink, 0, 1000);
    assert_eq!(app.reading(Role::XAxis).latest_c, 40.0);
    // With any role bound, unbound roles stay empty instead of guessing.
    assert!(!app.reading(Role::YLeft).valid);
}

#[test]
fn unreadable_storage_falls_back_to_positional_roles() {
    let mut hw = MockHardware::with_probes(&[(1, 22.0), (2, 23.0)]);
    let mut storage = MemStorage::new();
    storage.fail_reads = true;
    let (mut app, mut sink) = started(SystemConfig::default(), &mut hw, &storage);

    assert!(sink.events.contains(&AppEvent::Started {
        mapped: 0,
        discovered: 2
    }));
    run(&mut app, &mut hw, &mut sink, 0, 1000);
    assert_eq!(app.reading(Role::XAxis).latest_c, 22.0);
    assert_eq!(app.reading(Role::YLeft).latest_c, 23.0);
}

#[test]
fn disabled_probe_is_skipped_positionally() {
    let mut hw = MockHardware::with_probes(&[(1, 30.0), (2, 40.0)]);
    let storage = MemStorage::new();
    let (mut app, mut sink) = started(SystemConfig::default(), &mut hw, &storage);
    app.handle_command(
        AppCommand::SetProbeEnabled {
            uid: uid(1),
            enabled: false,
        },
        0,
        &mut hw,
        &mut sink,
    )
    .unwrap();

    run(&mut app, &mut hw, &mut sink, 0, 1000);
    assert_eq!(app.reading(Role::XAxis).latest_c, 40.0);
    assert!(!app.reading(Role::YLeft).valid);
}

#[test]
fn calibration_offset_is_added() {
    let mut cfg = SystemConfig::default();
    cfg.temp_offsets_c[Role::XAxis.index()] = 2.0;
    let mut hw = MockHardware::with_probes(&[(1, 30.0)]);
    let storage = MemStorage::new();
    let (mut app, mut sink) = started(cfg, &mut hw, &storage);

    run(&mut app, &mut hw, &mut sink, 0, 1000);
    assert_eq!(app.reading(Role::XAxis).latest_c, 32.0);
}

// ── Readings ──────────────────────────────────────────────────

#[test]
fn invalid_read_keeps_previous_value() {
    let mut hw = MockHardware::with_probes(&[(1, 30.0)]);
    let storage = MemStorage::new();
    let (mut app, mut sink) = started(SystemConfig::default(), &mut hw, &storage);

    run(&mut app, &mut hw, &mut sink, 0, 1000);
    hw.bus.set_present(&uid(1), false);
    hw.bus.add_probe(uid(9), 80.0); // keeps conversions succeeding
    run(&mut app, &mut hw, &mut sink, 1010, 3000);

    let r = app.reading(Role::XAxis);
    assert!(r.valid);
    assert_eq!(r.latest_c, 30.0);
}

#[test]
fn peak_tracks_and_resets() {
    let mut hw = MockHardware::with_probes(&[(1, 30.0)]);
    hw.bus.script(&uid(1), &[30.0, 45.0, 35.0]);
    let storage = MemStorage::new();
    let (mut app, mut sink) = started(SystemConfig::default(), &mut hw, &storage);

    run(&mut app, &mut hw, &mut sink, 0, 4500);
    let r = app.reading(Role::XAxis);
    assert_eq!(r.latest_c, 35.0);
    assert_eq!(r.peak_c, 45.0);

    app.handle_command(AppCommand::ResetPeaks, 4500, &mut hw, &mut sink)
        .unwrap();
    assert_eq!(app.reading(Role::XAxis).peak_c, 35.0);
}

// ── Fan and PSU ───────────────────────────────────────────────

#[test]
fn fan_commands_min_then_follows_temperature_once() {
    let mut hw = MockHardware::with_probes(&[(1, 55.0)]);
    let storage = MemStorage::new();
    let (mut app, mut sink) = started(SystemConfig::default(), &mut hw, &storage);

    run(&mut app, &mut hw, &mut sink, 0, 1500);
    assert_eq!(hw.duty_calls, vec![30, 100]);
    assert_eq!(
        sink.count(|e| matches!(e, AppEvent::FanDutyChanged { .. })),
        2
    );
}

#[test]
fn tach_window_reports_rpm() {
    let mut hw = MockHardware::new();
    let storage = MemStorage::new();
    let (mut app, mut sink) = started(SystemConfig::default(), &mut hw, &storage);

    app.tick(0, &mut hw, &mut sink);
    hw.pending_pulses = 40;
    app.tick(1000, &mut hw, &mut sink);

    assert!(sink.events.contains(&AppEvent::FanSpeed { rpm: 1200 }));
    assert_eq!(app.actuator().rpm, 1200);
}

#[test]
fn psu_average_published_once_per_window() {
    let mut hw = MockHardware::new();
    hw.psu_raw = Some(2048);
    let storage = MemStorage::new();
    let (mut app, mut sink) = started(SystemConfig::default(), &mut hw, &storage);

    for t in (0..=45).step_by(5) {
        app.tick(t, &mut hw, &mut sink);
    }
    assert_eq!(sink.count(|e| matches!(e, AppEvent::PsuUpdated { .. })), 1);

    let psu = app.psu();
    assert!(psu.valid);
    assert!((psu.volts - 12.05).abs() < 0.05, "got {}", psu.volts);
    assert_eq!(psu.min_volts, Some(psu.volts));
}

// ── Identification through the service ────────────────────────

#[test]
fn unanswered_identify_times_out_and_sampling_resumes() {
    let mut cfg = SystemConfig::default();
    cfg.identify_timeout_ms = 2000;
    let mut hw = MockHardware::with_probes(&[(1, 25.0), (2, 25.0)]);
    let storage = MemStorage::new();
    let (mut app, mut sink) = started(cfg, &mut hw, &storage);

    app.handle_command(
        AppCommand::StartIdentify {
            assign_to: Some(Role::YLeft),
        },
        0,
        &mut hw,
        &mut sink,
    )
    .unwrap();
    run(&mut app, &mut hw, &mut sink, 0, 3000);

    assert_eq!(app.last_identify(), Some(IdentifyOutcome::NoMatch));
    assert!(app.mapping().by_role(Role::YLeft).is_none());

    let finished = sink
        .events
        .iter()
        .position(|e| *e == AppEvent::IdentifyFinished(IdentifyOutcome::NoMatch))
        .expect("identify finished");
    let refreshed = sink
        .events
        .iter()
        .position(|e| matches!(e, AppEvent::ReadingsUpdated { .. }))
        .expect("readings refreshed");
    assert!(refreshed > finished, "no probe cycle may run during identification");
    assert_eq!(app.bus_mode(), BusMode::Idle);
}

// ── Persistence ───────────────────────────────────────────────

#[test]
fn failed_save_is_retried_after_quiet_period() {
    let mut hw = MockHardware::with_probes(&[(1, 25.0)]);
    let mut storage = MemStorage::new();
    let (mut app, _sink) = started(SystemConfig::default(), &mut hw, &storage);
    assert!(app.is_dirty());

    storage.fail_writes = true;
    assert!(!app.persist_if_dirty(AUTO_SAVE_DELAY_MS, &mut storage));
    assert!(app.is_dirty());

    storage.fail_writes = false;
    assert!(!app.persist_if_dirty(AUTO_SAVE_DELAY_MS + 1000, &mut storage));
    assert!(app.persist_if_dirty(2 * AUTO_SAVE_DELAY_MS, &mut storage));
    assert!(!app.is_dirty());
}

#[test]
fn corrupt_record_is_skipped_without_truncating() {
    let mut storage = MemStorage::new();
    let mut store = MappingStore::new();
    store.upsert(uid(1), "Left", "a").unwrap();
    store.upsert(uid(2), "Right", "b").unwrap();
    store.upsert(uid(3), "Spindle", "c").unwrap();
    store.save(&mut storage).unwrap();

    storage.corrupt(MAPPING_NAMESPACE, "p1");
    let mut reloaded = MappingStore::new();
    assert_eq!(reloaded.load(&storage), Ok(2));
    assert!(reloaded.by_alias("a").is_some());
    assert!(reloaded.by_alias("b").is_none());
    assert!(reloaded.by_alias("c").is_some());
}

#[test]
fn snapshot_reports_identify_and_probes() {
    let mut cfg = SystemConfig::default();
    cfg.identify_timeout_ms = 1600;
    let mut hw = MockHardware::with_probes(&[(1, 25.0)]);
    let storage = MemStorage::new();
    let (mut app, mut sink) = started(cfg, &mut hw, &storage);
    app.handle_command(AppCommand::StartIdentify { assign_to: None }, 0, &mut hw, &mut sink)
        .unwrap();
    run(&mut app, &mut hw, &mut sink, 0, 2000);

    let snap = app.snapshot();
    assert_eq!(snap.probes.len(), 1);
    assert_eq!(snap.last_identify, Some(IdentifyOutcome::NoMatch));
    let json = snap.to_json().unwrap();
    assert!(json.contains("\"last_identify\":\"NoMatch\""));
}
