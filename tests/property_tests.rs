//! Property and fuzz-style tests for robustness of core data structures.
//!
//! Runs on host (x86_64) only; proptest is not available for ESP32 targets.

#![cfg(not(target_os = "espidf"))]

use fluiddash::control::fan::compute_duty;
use fluiddash::sensors::mapping::{MappingStore, Role};
use fluiddash::sensors::uid::{FAMILY_DS18B20, ProbeUid};
use fluiddash::telemetry::parser::parse;
use fluiddash::telemetry::{MAX_AXES, MachineStatus, StatusReport};
use proptest::prelude::*;

fn axis_list(values: &[i32]) -> String {
    values
        .iter()
        .map(|v| format!("{}.{:03}", v / 1000, (v % 1000).abs()))
        .collect::<Vec<_>>()
        .join(",")
}

// ── Status line parser ────────────────────────────────────────

proptest! {
    /// Arbitrary input never panics the decoder.
    #[test]
    fn parser_never_panics(line in ".{0,200}") {
        let _ = parse(&line);
    }

    #[test]
    fn parser_never_panics_on_tag_soup(
        tags in proptest::collection::vec(
            prop_oneof![
                Just("MPos:"), Just("WPos:"), Just("WCO:"), Just("FS:"),
                Just("Ov:"), Just("F:"), Just(","), Just("|"), Just("-"),
                Just("1.5"), Just("x"), Just(">"), Just("<"), Just(":"),
            ],
            0..40,
        )
    ) {
        let line = format!("<Idle|{}", tags.concat());
        prop_assert!(parse(&line).is_some());
    }

    /// Axis count equals the number of comma-separated components.
    #[test]
    fn position_axis_count_matches_payload(
        axes in proptest::collection::vec(-99_999i32..99_999, 1..=MAX_AXES)
    ) {
        let line = format!("<Idle|MPos:{}>", axis_list(&axes));
        let report = parse(&line).unwrap();
        prop_assert_eq!(report.machine.map(|p| p.axis_count()), Some(axes.len()));
    }

    /// Without any offset, work coordinates mirror machine coordinates.
    #[test]
    fn work_mirrors_machine_without_offset(
        axes in proptest::collection::vec(-99_999i32..99_999, 1..=MAX_AXES)
    ) {
        let line = format!("<Run|MPos:{}>", axis_list(&axes));
        let mut status = MachineStatus::new();
        status.apply(&parse(&line).unwrap(), 0);
        prop_assert_eq!(status.work, status.machine);
    }

    /// A report with nothing in it leaves the status untouched apart from
    /// the report timestamp.
    #[test]
    fn empty_report_changes_nothing(now in 0u64..1_000_000) {
        let mut status = MachineStatus::new();
        status.apply(&parse("<Jog|MPos:1,2,3|FS:10,20>").unwrap(), 0);
        let before = status.clone();
        status.apply(&StatusReport::default(), now);
        prop_assert_eq!(status.state, before.state);
        prop_assert_eq!(status.machine, before.machine);
        prop_assert_eq!(status.work, before.work);
        prop_assert_eq!(status.feed_rate, before.feed_rate);
        prop_assert_eq!(status.last_report_ms, Some(now));
    }
}

// ── Probe identity ────────────────────────────────────────────

proptest! {
    #[test]
    fn uid_hex_round_trip(bytes in any::<[u8; 8]>()) {
        let uid = ProbeUid(bytes);
        let text = uid.to_hex();
        prop_assert_eq!(text.len(), 16);
        prop_assert_eq!(text.parse::<ProbeUid>(), Ok(uid));
        prop_assert_eq!(text.to_ascii_lowercase().parse::<ProbeUid>(), Ok(uid));
    }

    #[test]
    fn built_uids_carry_valid_crc(serial in any::<[u8; 6]>()) {
        let uid = ProbeUid::from_serial(FAMILY_DS18B20, serial);
        prop_assert!(uid.crc_valid());
        prop_assert_eq!(uid.family(), FAMILY_DS18B20);
    }

    /// Upserting the same record twice leaves one record.
    #[test]
    fn upsert_is_idempotent(
        serial in any::<[u8; 6]>(),
        name in "[A-Za-z][A-Za-z0-9 ]{0,15}",
        alias in "[a-z][a-z0-9]{0,7}",
    ) {
        let uid = ProbeUid::from_serial(FAMILY_DS18B20, serial);
        let mut store = MappingStore::new();
        store.upsert(uid, &name, &alias).unwrap();
        store.upsert(uid, &name, &alias).unwrap();
        prop_assert_eq!(store.len(), 1);
        prop_assert_eq!(store.by_alias(&alias).map(|r| r.uid), Some(uid));
    }

    /// Whatever order roles are assigned in, each role ends up on at most
    /// one record.
    #[test]
    fn roles_stay_unique(
        ops in proptest::collection::vec((0u8..6, 0usize..4), 1..30)
    ) {
        let mut store = MappingStore::new();
        for (n, r) in ops {
            let uid = ProbeUid::from_serial(FAMILY_DS18B20, [n, 0, 0, 0, 0, 1]);
            let role = Role::from_index(r).unwrap();
            store.assign_role(uid, role).unwrap();
        }
        for r in 0..4 {
            let role = Role::from_index(r).unwrap();
            prop_assert!(store.iter().filter(|rec| rec.role == Some(role)).count() <= 1);
        }
    }
}

// ── Fan curve ─────────────────────────────────────────────────

proptest! {
    #[test]
    fn duty_stays_between_limits(
        temp in -50.0f32..150.0,
        low in 0.0f32..60.0,
        span in 1.0f32..60.0,
        min in 0u8..=100,
        extra in 0u8..=100,
    ) {
        let max = min.saturating_add(extra).min(100);
        let duty = compute_duty(temp, low, low + span, min, max);
        prop_assert!(duty >= min && duty <= max, "duty {} outside {}..={}", duty, min, max);
    }

    #[test]
    fn duty_is_monotonic_in_temperature(
        a in -20.0f32..120.0,
        b in -20.0f32..120.0,
    ) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(compute_duty(lo, 30.0, 50.0, 30, 100) <= compute_duty(hi, 30.0, 50.0, 30, 100));
    }
}
