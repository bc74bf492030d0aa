//! Outbound application events.
//!
//! The [`AppService`](super::service::AppService) and the
//! [`TelemetryLink`](crate::telemetry::link::TelemetryLink) emit these
//! through the [`EventSink`](super::ports::EventSink) port. Adapters on
//! the other side decide what to do with them: log to serial, refresh a
//! display, push to a browser.

use crate::sensors::identify::IdentifyOutcome;
use crate::sensors::mapping::Role;
use crate::sensors::uid::ProbeUid;
use crate::telemetry::MachineState;
use crate::telemetry::link::LinkState;

/// Structured events emitted by the application core.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// The service finished startup with this many mapped / discovered probes.
    Started { mapped: usize, discovered: usize },

    /// A bus scan completed.
    ProbesDiscovered(usize),

    /// A touch-identification session began watching `probes` probes.
    IdentifyStarted { probes: usize },

    /// A touch-identification session ended.
    IdentifyFinished(IdentifyOutcome),

    RoleAssigned { uid: ProbeUid, role: Role },

    RoleCleared(Role),

    /// A probe cycle refreshed the role readings; carries the hottest value.
    ReadingsUpdated { max_c: Option<f32> },

    /// A new PSU voltage average is available.
    PsuUpdated { volts: f32 },

    FanDutyChanged { duty_percent: u8 },

    FanSpeed { rpm: u32 },

    /// The controller link changed state.
    LinkStateChanged(LinkState),

    /// The controller reported a state change.
    MachineStateChanged { from: MachineState, to: MachineState },

    JobStarted,

    JobFinished { duration_ms: u64 },
}
