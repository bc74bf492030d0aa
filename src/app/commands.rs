//! Inbound commands to the application service.
//!
//! These represent actions requested by the outside world (serial
//! console, a web page, the touch UI) that the
//! [`AppService`](super::service::AppService) interprets and acts upon.

use crate::config::SystemConfig;
use crate::sensors::mapping::Role;
use crate::sensors::uid::ProbeUid;

/// Commands that external adapters can send into the application core.
#[derive(Debug, Clone)]
pub enum AppCommand {
    /// Begin a touch-identification session. Queued while a probe cycle
    /// holds the bus. On a match the probe is bound to `assign_to`.
    StartIdentify { assign_to: Option<Role> },

    /// Bind `uid` to `role`, unbinding whichever probe held it.
    AssignRole { uid: ProbeUid, role: Role },

    ClearRole(Role),

    /// Create or rename a probe record.
    UpsertProbe { uid: ProbeUid, name: String, alias: String },

    SetProbeNotes { uid: ProbeUid, notes: String },

    SetProbeEnabled { uid: ProbeUid, enabled: bool },

    /// Delete the record with this alias.
    RemoveProbe(String),

    /// Re-enumerate the bus. Refused while the bus is held.
    Rediscover,

    /// Restart the per-role peak tracking from the latest values.
    ResetPeaks,

    /// Hot-reload configuration (e.g. from a settings page or NVS).
    UpdateConfig(SystemConfig),

    /// Persist config and mapping on the next `persist_if_dirty` call.
    SaveConfig,
}
