//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the ESP-IDF logger (which goes to UART / USB-CDC in production).
//! A display or web push adapter would implement the same trait.

use log::{debug, info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;
use crate::sensors::identify::IdentifyOutcome;

/// Adapter that logs every [`AppEvent`] to the serial console.
/// Periodic readings go out at debug level.
pub struct LogEventSink;

impl Default for LogEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Started { mapped, discovered } => {
                info!("START | mapped={} discovered={}", mapped, discovered);
            }
            AppEvent::ProbesDiscovered(n) => {
                info!("PROBE | discovered {}", n);
            }
            AppEvent::IdentifyStarted { probes } => {
                info!("PROBE | identify: watching {} probe(s), touch one now", probes);
            }
            AppEvent::IdentifyFinished(outcome) => match outcome {
                IdentifyOutcome::Matched { uid, delta_c, iteration } => {
                    info!(
                        "PROBE | identify: {} (+{:.2}\u{00b0}C, iteration {})",
                        uid, delta_c, iteration
                    );
                }
                IdentifyOutcome::NoMatch => warn!("PROBE | identify: no probe warmed up"),
                IdentifyOutcome::NoProbes => warn!("PROBE | identify: no probes on bus"),
            },
            AppEvent::RoleAssigned { uid, role } => {
                info!("PROBE | {} -> {}", uid, role.label());
            }
            AppEvent::RoleCleared(role) => {
                info!("PROBE | {} unassigned", role.label());
            }
            AppEvent::ReadingsUpdated { max_c } => match max_c {
                Some(t) => debug!("TEMP  | max={:.1}\u{00b0}C", t),
                None => debug!("TEMP  | no valid probes"),
            },
            AppEvent::PsuUpdated { volts } => {
                debug!("PSU   | {:.2}V", volts);
            }
            AppEvent::FanDutyChanged { duty_percent } => {
                info!("FAN   | duty={}%", duty_percent);
            }
            AppEvent::FanSpeed { rpm } => {
                debug!("FAN   | {} rpm", rpm);
            }
            AppEvent::LinkStateChanged(state) => {
                info!("LINK  | {:?}", state);
            }
            AppEvent::MachineStateChanged { from, to } => {
                info!("CNC   | {} -> {}", from.label(), to.label());
            }
            AppEvent::JobStarted => {
                info!("JOB   | started");
            }
            AppEvent::JobFinished { duration_ms } => {
                let secs = duration_ms / 1000;
                info!("JOB   | finished after {}m{:02}s", secs / 60, secs % 60);
            }
        }
    }
}
