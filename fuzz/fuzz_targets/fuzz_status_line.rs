//! Fuzz target: `telemetry::parser::parse`
//!
//! Drives arbitrary text through the status-line decoder and into a
//! `MachineStatus`, asserting that neither panics and that decoded
//! positions never exceed the axis limit.
//!
//! cargo fuzz run fuzz_status_line

#![no_main]

use fluiddash::telemetry::parser::parse;
use fluiddash::telemetry::{MAX_AXES, MachineStatus};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = core::str::from_utf8(data) else {
        return;
    };

    let mut status = MachineStatus::new();
    for (i, line) in text.lines().enumerate() {
        let Some(report) = parse(line) else {
            continue;
        };
        for pos in [report.machine, report.work, report.offset].into_iter().flatten() {
            assert!(pos.axis_count() >= 1 && pos.axis_count() <= MAX_AXES);
        }
        status.apply(&report, i as u64 * 200);
        if status.job_running {
            assert!(status.job_started_ms.is_some());
        }
    }
});
