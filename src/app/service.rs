//! Application service — the hexagonal core of the sensor pipeline.
//!
//! [`AppService`] owns the probe mapping, the bus arbiter, the touch
//! binder, the acquisition scheduler and the fan controller. All I/O
//! flows through port traits injected at call sites, making the entire
//! service testable with mock adapters.
//!
//! ```text
//!  SensorBus  ──▶ ┌──────────────────────────────┐ ──▶ EventSink
//!  AnalogPort ──▶ │          AppService           │
//!  FanPort    ◀── │ Binder · Acquisition · Fan    │ ◀──▶ ConfigPort / StoragePort
//!                 └──────────────────────────────┘
//! ```
//!
//! The telemetry link is a separate pipeline; it shares only the
//! [`EventSink`].

use log::{info, warn};
use serde::Serialize;

use crate::config::SystemConfig;
use crate::control::fan::{ActuatorState, FanController};
use crate::error::{Error, Result, SensorError};
use crate::sensors::UidList;
use crate::sensors::acquisition::{AcquisitionScheduler, AggregateReading, PsuReading};
use crate::sensors::arbiter::{BusArbiter, BusMode};
use crate::sensors::bus::SensorBus;
use crate::sensors::identify::{IdentifyConfig, IdentifyError, IdentifyOutcome, IdentityBinder};
use crate::sensors::mapping::{MappingStore, ProbeIdentity, Role};
use crate::sensors::uid::ProbeUid;

use super::commands::AppCommand;
use super::events::AppEvent;
use super::ports::{AnalogPort, ConfigError, ConfigPort, EventSink, FanPort, StoragePort};

/// Quiet period after the last change before dirty state is flushed.
pub const AUTO_SAVE_DELAY_MS: u64 = 5_000;

// ───────────────────────────────────────────────────────────────
// Snapshot
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct RoleReading {
    pub role: Role,
    pub label: &'static str,
    /// Probe currently feeding this role (mapped or positional).
    pub uid: Option<ProbeUid>,
    pub reading: AggregateReading,
}

/// Read-only view of the sensor pipeline for displays and web pages.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardSnapshot {
    pub readings: Vec<RoleReading>,
    pub max_temperature_c: Option<f32>,
    pub actuator: ActuatorState,
    pub psu: PsuReading,
    pub bus_mode: BusMode,
    pub identifying: bool,
    pub probes: Vec<ProbeIdentity>,
    pub discovered: Vec<ProbeUid>,
    pub last_identify: Option<IdentifyOutcome>,
}

impl DashboardSnapshot {
    pub fn to_json(&self) -> core::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// ───────────────────────────────────────────────────────────────
// AppService
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct IdentifyRequest {
    assign_to: Option<Role>,
}

pub struct AppService {
    config: SystemConfig,
    mapping: MappingStore,
    arbiter: BusArbiter,
    binder: IdentityBinder,
    acquisition: AcquisitionScheduler,
    fan: FanController,
    discovered: UidList,
    last_identify: Option<IdentifyOutcome>,
    /// Waiting for the bus to go idle.
    pending_identify: Option<IdentifyRequest>,
    /// Role to bind when the running session matches.
    identify_target: Option<Role>,
    config_dirty: bool,
    /// Set by `UpdateConfig` until the owner re-applies the link settings.
    config_changed: bool,
    mapping_dirty: bool,
    dirty_since_ms: Option<u64>,
    save_requested: bool,
    now_ms: u64,
}

impl AppService {
    /// Construct the service from configuration.
    ///
    /// Does **not** touch the bus or storage; call [`start`](Self::start) next.
    pub fn new(config: SystemConfig) -> Self {
        Self {
            mapping: MappingStore::new(),
            arbiter: BusArbiter::new(),
            binder: IdentityBinder::new(IdentifyConfig::from(&config)),
            acquisition: AcquisitionScheduler::new(&config),
            fan: FanController::new(&config),
            discovered: UidList::new(),
            last_identify: None,
            pending_identify: None,
            identify_target: None,
            config_dirty: false,
            config_changed: false,
            mapping_dirty: false,
            dirty_since_ms: None,
            save_requested: false,
            now_ms: 0,
            config,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Load the persisted mapping and enumerate the bus.
    ///
    /// A mapping that cannot be loaded is treated as empty; roles then
    /// fall back to discovery order.
    pub fn start(&mut self, storage: &impl StoragePort, bus: &mut impl SensorBus, sink: &mut impl EventSink) {
        let mapped = match self.mapping.load(storage) {
            Ok(n) => n,
            Err(e) => {
                warn!("AppService: mapping unavailable ({}), using positional roles", e);
                self.mapping = MappingStore::new();
                0
            }
        };
        self.discover(bus, sink);
        sink.emit(&AppEvent::Started {
            mapped,
            discovered: self.discovered.len(),
        });
        info!(
            "AppService started: {} mapped, {} on bus",
            mapped,
            self.discovered.len()
        );
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// Run one cooperative pass: identification, probe cycle, fan, PSU.
    ///
    /// `hw` carries the bus, fan and analog ports together. Never waits
    /// on a conversion.
    pub fn tick(
        &mut self,
        now_ms: u64,
        hw: &mut (impl SensorBus + FanPort + AnalogPort),
        sink: &mut impl EventSink,
    ) {
        self.now_ms = now_ms;

        // 1. Touch identification owns the bus while it runs
        if let Some(req) = self.pending_identify {
            if self.arbiter.try_begin(BusMode::Identifying).is_ok() {
                self.pending_identify = None;
                self.begin_identify(req, hw, sink);
            }
        }
        if self.binder.is_active() {
            if let Some(outcome) = self.binder.poll(hw, now_ms) {
                self.finish_identify(outcome, sink);
            }
        }

        // 2. Probe cycle (defers itself while the bus is held)
        let refreshed = self
            .acquisition
            .tick_probes(now_ms, hw, &mut self.arbiter, &self.mapping, &self.discovered);
        if refreshed {
            sink.emit(&AppEvent::ReadingsUpdated {
                max_c: self.acquisition.max_temperature(),
            });
        }

        // 3. Fan duty follows the hottest role; RPM from the tach window
        if let Some(duty) = self.fan.update(self.acquisition.max_temperature(), hw) {
            sink.emit(&AppEvent::FanDutyChanged { duty_percent: duty });
        }
        if let Some(rpm) = self.fan.tick_tach(now_ms, hw) {
            sink.emit(&AppEvent::FanSpeed { rpm });
        }

        // 4. PSU averaging
        if let Some(volts) = self.acquisition.tick_analog(now_ms, || hw.read_psu_raw()) {
            sink.emit(&AppEvent::PsuUpdated { volts });
        }
    }

    // ── Command handling ──────────────────────────────────────

    /// Process an external command (serial console, web UI, touch UI)
    /// received at `now_ms`.
    pub fn handle_command(
        &mut self,
        cmd: AppCommand,
        now_ms: u64,
        bus: &mut impl SensorBus,
        sink: &mut impl EventSink,
    ) -> Result<()> {
        self.now_ms = self.now_ms.max(now_ms);
        match cmd {
            AppCommand::StartIdentify { assign_to } => {
                if self.binder.is_active() || self.pending_identify.is_some() {
                    return Err(Error::Sensor(SensorError::BusBusy));
                }
                self.pending_identify = Some(IdentifyRequest { assign_to });
                info!("AppService: identify queued (assign to {:?})", assign_to.map(Role::label));
            }
            AppCommand::AssignRole { uid, role } => {
                self.mapping.assign_role(uid, role)?;
                self.mark_mapping_dirty();
                sink.emit(&AppEvent::RoleAssigned { uid, role });
            }
            AppCommand::ClearRole(role) => {
                if self.mapping.clear_role(role) {
                    self.mark_mapping_dirty();
                    sink.emit(&AppEvent::RoleCleared(role));
                }
            }
            AppCommand::UpsertProbe { uid, name, alias } => {
                self.mapping.upsert(uid, &name, &alias)?;
                self.mark_mapping_dirty();
            }
            AppCommand::SetProbeNotes { uid, notes } => {
                self.mapping.set_notes(&uid, &notes)?;
                self.mark_mapping_dirty();
            }
            AppCommand::SetProbeEnabled { uid, enabled } => {
                self.mapping.set_enabled(&uid, enabled)?;
                self.mark_mapping_dirty();
            }
            AppCommand::RemoveProbe(alias) => {
                if !self.mapping.remove(&alias) {
                    return Err(Error::Config("no probe with that alias"));
                }
                self.mark_mapping_dirty();
            }
            AppCommand::Rediscover => {
                self.arbiter.try_begin(BusMode::Sampling)?;
                self.discover(bus, sink);
                self.arbiter.release(BusMode::Sampling);
            }
            AppCommand::ResetPeaks => {
                self.acquisition.reset_peaks();
                info!("AppService: peaks reset");
            }
            AppCommand::UpdateConfig(new_config) => {
                self.acquisition.apply_config(&new_config);
                self.fan.apply_config(&new_config);
                self.binder.set_config(IdentifyConfig::from(&new_config));
                self.config = new_config;
                self.config_dirty = true;
                self.config_changed = true;
                self.mark_dirty();
                info!("Configuration updated at runtime");
            }
            AppCommand::SaveConfig => {
                self.config_dirty = true;
                self.save_requested = true;
                self.mark_dirty();
                info!("Explicit save requested (flushes on next persist check)");
            }
        }
        Ok(())
    }

    // ── Persistence ───────────────────────────────────────────

    /// Flush dirty config and mapping once the quiet period has passed
    /// (or immediately after `SaveConfig`). Returns `true` when
    /// everything pending was written.
    pub fn persist_if_dirty(&mut self, now_ms: u64, storage: &mut (impl ConfigPort + StoragePort)) -> bool {
        let Some(since) = self.dirty_since_ms else {
            return false;
        };
        if !self.save_requested && now_ms.saturating_sub(since) < AUTO_SAVE_DELAY_MS {
            return false;
        }

        let mut all_ok = true;
        if self.config_dirty {
            match storage.save(&self.config) {
                Ok(()) => {
                    self.config_dirty = false;
                    info!("Config auto-saved to NVS");
                }
                Err(ConfigError::ValidationFailed(msg)) => {
                    // Retrying cannot help; keep running on the live copy.
                    self.config_dirty = false;
                    warn!("Config rejected, not saved: {}", msg);
                }
                Err(e) => {
                    all_ok = false;
                    warn!("Config auto-save failed: {}", e);
                }
            }
        }
        if self.mapping_dirty {
            match self.mapping.save(storage) {
                Ok(()) => {
                    self.mapping_dirty = false;
                    info!("Probe mapping saved ({} records)", self.mapping.len());
                }
                Err(e) => {
                    all_ok = false;
                    warn!("Probe mapping save failed: {}", e);
                }
            }
        }

        self.save_requested = false;
        self.dirty_since_ms = if all_ok { None } else { Some(now_ms) };
        all_ok
    }

    /// Whether config or mapping have unsaved changes.
    pub fn is_dirty(&self) -> bool {
        self.config_dirty || self.mapping_dirty
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn snapshot(&self) -> DashboardSnapshot {
        let readings = Role::ALL
            .iter()
            .map(|&role| RoleReading {
                role,
                label: role.label(),
                uid: AcquisitionScheduler::resolve(role, &self.mapping, &self.discovered),
                reading: self.acquisition.reading(role),
            })
            .collect();
        DashboardSnapshot {
            readings,
            max_temperature_c: self.acquisition.max_temperature(),
            actuator: self.fan.state(),
            psu: self.acquisition.psu(),
            bus_mode: self.arbiter.mode(),
            identifying: self.binder.is_active(),
            probes: self.mapping.iter().cloned().collect(),
            discovered: self.discovered.to_vec(),
            last_identify: self.last_identify,
        }
    }

    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    /// `true` once after each runtime config update.
    pub fn take_config_changed(&mut self) -> bool {
        core::mem::take(&mut self.config_changed)
    }

    pub fn mapping(&self) -> &MappingStore {
        &self.mapping
    }

    pub fn discovered(&self) -> &[ProbeUid] {
        &self.discovered
    }

    pub fn bus_mode(&self) -> BusMode {
        self.arbiter.mode()
    }

    pub fn is_identifying(&self) -> bool {
        self.binder.is_active()
    }

    pub fn identify_pending(&self) -> bool {
        self.pending_identify.is_some()
    }

    pub fn last_identify(&self) -> Option<IdentifyOutcome> {
        self.last_identify
    }

    pub fn reading(&self, role: Role) -> AggregateReading {
        self.acquisition.reading(role)
    }

    pub fn actuator(&self) -> ActuatorState {
        self.fan.state()
    }

    pub fn psu(&self) -> PsuReading {
        self.acquisition.psu()
    }

    // ── Internal ──────────────────────────────────────────────

    fn discover(&mut self, bus: &mut impl SensorBus, sink: &mut impl EventSink) {
        self.discovered = bus.discover();
        if self.mapping.record_discovered(&self.discovered) > 0 {
            self.mark_mapping_dirty();
        }
        sink.emit(&AppEvent::ProbesDiscovered(self.discovered.len()));
    }

    /// The arbiter is already held in `Identifying`.
    fn begin_identify(&mut self, req: IdentifyRequest, bus: &mut impl SensorBus, sink: &mut impl EventSink) {
        match self.binder.start(bus, self.now_ms) {
            Ok(probes) => {
                self.identify_target = req.assign_to;
                sink.emit(&AppEvent::IdentifyStarted { probes });
            }
            Err(IdentifyError::NoProbes) => {
                self.arbiter.release(BusMode::Identifying);
                self.last_identify = Some(IdentifyOutcome::NoProbes);
                sink.emit(&AppEvent::IdentifyFinished(IdentifyOutcome::NoProbes));
            }
            Err(IdentifyError::AlreadyActive) => {
                self.arbiter.release(BusMode::Identifying);
            }
        }
    }

    fn finish_identify(&mut self, outcome: IdentifyOutcome, sink: &mut impl EventSink) {
        self.arbiter.release(BusMode::Identifying);
        self.last_identify = Some(outcome);
        sink.emit(&AppEvent::IdentifyFinished(outcome));

        let target = self.identify_target.take();
        if let (IdentifyOutcome::Matched { uid, .. }, Some(role)) = (outcome, target) {
            match self.mapping.assign_role(uid, role) {
                Ok(()) => {
                    self.mark_mapping_dirty();
                    sink.emit(&AppEvent::RoleAssigned { uid, role });
                }
                Err(e) => warn!("AppService: could not bind {} to {}: {}", uid, role.label(), e),
            }
        }
    }

    fn mark_mapping_dirty(&mut self) {
        self.mapping_dirty = true;
        self.mark_dirty();
    }

    fn mark_dirty(&mut self) {
        if self.dirty_since_ms.is_none() {
            self.dirty_since_ms = Some(self.now_ms);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::hardware::HardwareAdapter;
    use crate::adapters::nvs::NvsAdapter;
    use crate::drivers::fan::FanDriver;
    use crate::sensors::bus::SimProbeBus;
    use crate::sensors::uid::FAMILY_DS18B20;

    #[derive(Default)]
    struct VecSink(Vec<AppEvent>);

    impl EventSink for VecSink {
        fn emit(&mut self, event: &AppEvent) {
            self.0.push(event.clone());
        }
    }

    fn uid(n: u8) -> ProbeUid {
        ProbeUid::from_serial(FAMILY_DS18B20, [n, 0, 0, 0, 0, 1])
    }

    fn rig(temps: &[(u8, f32)]) -> (AppService, HardwareAdapter<SimProbeBus>, NvsAdapter, VecSink) {
        let mut bus = SimProbeBus::new();
        for &(n, t) in temps {
            bus.add_probe(uid(n), t);
        }
        let mut hw = HardwareAdapter::new(bus, FanDriver::new());
        let storage = NvsAdapter::new().unwrap();
        let mut sink = VecSink::default();
        let mut app = AppService::new(SystemConfig::default());
        app.start(&storage, &mut hw, &mut sink);
        (app, hw, storage, sink)
    }

    #[test]
    fn start_discovers_and_records_probes() {
        let (app, _hw, _storage, sink) = rig(&[(1, 20.0), (2, 21.0)]);
        assert_eq!(app.discovered().len(), 2);
        assert_eq!(app.mapping().len(), 2);
        assert!(sink.0.contains(&AppEvent::Started { mapped: 0, discovered: 2 }));
        assert!(app.is_dirty());
    }

    #[test]
    fn positional_roles_feed_readings_and_fan() {
        let (mut app, mut hw, _storage, mut sink) = rig(&[(1, 30.0), (2, 40.0)]);
        for t in (0..=2000).step_by(10) {
            app.tick(t, &mut hw, &mut sink);
        }
        assert_eq!(app.reading(Role::XAxis).latest_c, 30.0);
        assert_eq!(app.reading(Role::YLeft).latest_c, 40.0);
        assert!(!app.reading(Role::ZAxis).valid);
        // 40 °C with defaults 30..50 and 30..100 %
        assert_eq!(app.actuator().duty_percent, 65);
        assert!(sink.0.iter().any(|e| matches!(e, AppEvent::ReadingsUpdated { max_c: Some(_) })));
    }

    #[test]
    fn identify_binds_warmed_probe_to_requested_role() {
        let (mut app, mut hw, _storage, mut sink) = rig(&[(1, 25.0), (2, 25.0)]);
        hw.bus_mut().script(&uid(2), &[25.0, 30.0]);

        app.handle_command(
            AppCommand::StartIdentify {
                assign_to: Some(Role::ZAxis),
            },
            0,
            &mut hw,
            &mut sink,
        )
        .unwrap();
        app.tick(0, &mut hw, &mut sink);
        assert!(app.is_identifying());
        assert_eq!(app.bus_mode(), BusMode::Identifying);

        app.tick(800, &mut hw, &mut sink);
        app.tick(1600, &mut hw, &mut sink);

        assert!(!app.is_identifying());
        assert!(matches!(
            app.last_identify(),
            Some(IdentifyOutcome::Matched { uid: u, .. }) if u == uid(2)
        ));
        assert_eq!(app.mapping().by_role(Role::ZAxis).map(|r| r.uid), Some(uid(2)));
        assert!(sink.0.contains(&AppEvent::RoleAssigned {
            uid: uid(2),
            role: Role::ZAxis
        }));
    }

    #[test]
    fn identify_waits_for_probe_cycle_to_release_bus() {
        let (mut app, mut hw, _storage, mut sink) = rig(&[(1, 25.0)]);
        app.tick(0, &mut hw, &mut sink);
        app.tick(10, &mut hw, &mut sink);
        assert_eq!(app.bus_mode(), BusMode::Sampling);

        app.handle_command(AppCommand::StartIdentify { assign_to: None }, 10, &mut hw, &mut sink)
            .unwrap();
        app.tick(20, &mut hw, &mut sink);
        assert!(app.identify_pending());
        assert!(!app.is_identifying());

        // Conversion done at 760, roles read and bus released at 770.
        app.tick(760, &mut hw, &mut sink);
        app.tick(770, &mut hw, &mut sink);
        assert!(app.identify_pending());
        app.tick(780, &mut hw, &mut sink);
        assert!(app.is_identifying());
        assert!(sink.0.contains(&AppEvent::IdentifyStarted { probes: 1 }));
    }

    #[test]
    fn second_identify_request_is_refused() {
        let (mut app, mut hw, _storage, mut sink) = rig(&[(1, 25.0)]);
        app.handle_command(AppCommand::StartIdentify { assign_to: None }, 0, &mut hw, &mut sink)
            .unwrap();
        let err = app
            .handle_command(AppCommand::StartIdentify { assign_to: None }, 0, &mut hw, &mut sink)
            .unwrap_err();
        assert_eq!(err, Error::Sensor(SensorError::BusBusy));
    }

    #[test]
    fn identify_on_empty_bus_reports_no_probes() {
        let (mut app, mut hw, _storage, mut sink) = rig(&[]);
        app.handle_command(AppCommand::StartIdentify { assign_to: None }, 0, &mut hw, &mut sink)
            .unwrap();
        app.tick(0, &mut hw, &mut sink);
        assert_eq!(app.last_identify(), Some(IdentifyOutcome::NoProbes));
        assert_eq!(app.bus_mode(), BusMode::Idle);
    }

    #[test]
    fn rediscover_refused_while_sampling() {
        let (mut app, mut hw, _storage, mut sink) = rig(&[(1, 25.0)]);
        app.tick(0, &mut hw, &mut sink);
        app.tick(10, &mut hw, &mut sink);
        assert_eq!(
            app.handle_command(AppCommand::Rediscover, 10, &mut hw, &mut sink),
            Err(Error::Sensor(SensorError::BusBusy))
        );
    }

    #[test]
    fn persist_waits_for_quiet_period_then_writes_both() {
        let (mut app, mut hw, mut storage, mut sink) = rig(&[(1, 25.0)]);
        let mut cfg = SystemConfig::default();
        cfg.fan_min_duty = 40;
        app.handle_command(AppCommand::UpdateConfig(cfg), 0, &mut hw, &mut sink)
            .unwrap();

        assert!(!app.persist_if_dirty(1_000, &mut storage));
        assert!(app.persist_if_dirty(AUTO_SAVE_DELAY_MS, &mut storage));
        assert!(!app.is_dirty());
        assert_eq!(ConfigPort::load(&storage).unwrap().fan_min_duty, 40);

        let mut reloaded = MappingStore::new();
        assert_eq!(reloaded.load(&storage), Ok(1));
    }

    #[test]
    fn quiet_period_counts_from_the_command_time() {
        let (mut app, mut hw, mut storage, mut sink) = rig(&[]);
        app.tick(0, &mut hw, &mut sink);
        app.persist_if_dirty(AUTO_SAVE_DELAY_MS, &mut storage);
        assert!(!app.is_dirty());

        let mut cfg = SystemConfig::default();
        cfg.status_poll_interval_ms = 500;
        app.handle_command(AppCommand::UpdateConfig(cfg), 3_000, &mut hw, &mut sink)
            .unwrap();
        assert!(app.take_config_changed());
        assert!(!app.take_config_changed());

        assert!(!app.persist_if_dirty(3_000 + AUTO_SAVE_DELAY_MS - 1, &mut storage));
        assert!(app.persist_if_dirty(3_000 + AUTO_SAVE_DELAY_MS, &mut storage));
    }

    #[test]
    fn save_config_flushes_immediately() {
        let (mut app, mut hw, mut storage, mut sink) = rig(&[]);
        app.handle_command(AppCommand::SaveConfig, 0, &mut hw, &mut sink).unwrap();
        assert!(app.persist_if_dirty(0, &mut storage));
        assert!(!app.persist_if_dirty(10_000, &mut storage));
    }

    #[test]
    fn remove_unknown_alias_is_an_error() {
        let (mut app, mut hw, _storage, mut sink) = rig(&[]);
        assert!(app
            .handle_command(AppCommand::RemoveProbe("nope".into()), 0, &mut hw, &mut sink)
            .is_err());
    }

    #[test]
    fn snapshot_serialises_to_json() {
        let (mut app, mut hw, _storage, mut sink) = rig(&[(1, 33.0)]);
        for t in (0..=1000).step_by(10) {
            app.tick(t, &mut hw, &mut sink);
        }
        let snap = app.snapshot();
        assert_eq!(snap.readings.len(), Role::COUNT);
        assert_eq!(snap.readings[0].uid, Some(uid(1)));
        let json = snap.to_json().unwrap();
        assert!(json.contains("\"bus_mode\""));
        assert!(json.contains("X-Axis"));
    }
}
