//! Cooperative sampling of the PSU analog channel and the probe bus.
//!
//! Two cadences share one tick source and never block:
//!
//! - **Analog averaging**: one ADC sample per `sample_interval_ms` into a
//!   fixed window; a full window yields one average and starts over.
//! - **Probe cycle**: every `probe_interval_ms`, claim the bus, request a
//!   conversion, wait the device conversion time across later ticks, then
//!   read every role and release the bus.
//!
//! ```text
//!  Idle ──due──▶ Requesting ──bus claimed──▶ Converting ──elapsed──▶ Ready ──read──▶ Idle
//!                    │ (bus held by identification: wait)
//! ```

use log::{debug, warn};
use serde::Serialize;

use super::arbiter::{BusArbiter, BusMode};
use super::bus::{Reading, SensorBus};
use super::mapping::{MappingStore, Role};
use super::uid::ProbeUid;
use crate::config::SystemConfig;
use crate::pins::{ADC_FULL_SCALE, ADC_REF_VOLTS};

/// Samples averaged per PSU reading.
pub const PSU_AVERAGING_DEPTH: usize = 10;
/// Below this the supply is considered off and ignored for the minimum.
const PSU_MIN_TRACK_VOLTS: f32 = 10.0;

// ───────────────────────────────────────────────────────────────
// Analog averaging
// ───────────────────────────────────────────────────────────────

/// Fixed-depth buffer of raw ADC samples, emptied every time it fills.
#[derive(Debug, Default)]
pub struct SampleWindow<const N: usize> {
    samples: heapless::Vec<u16, N>,
}

impl<const N: usize> SampleWindow<N> {
    pub fn new() -> Self {
        Self {
            samples: heapless::Vec::new(),
        }
    }

    /// Add a sample. Returns the window average when this sample fills it.
    pub fn push(&mut self, sample: u16) -> Option<f32> {
        // A full window is always drained below, so this push has room.
        let _ = self.samples.push(sample);
        if !self.samples.is_full() {
            return None;
        }
        let sum: u32 = self.samples.iter().map(|&s| u32::from(s)).sum();
        let avg = sum as f32 / N as f32;
        self.samples.clear();
        Some(avg)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Rate-limited sampler feeding a [`SampleWindow`].
#[derive(Debug)]
pub struct AnalogAverager<const N: usize> {
    window: SampleWindow<N>,
    interval_ms: u32,
    last_sample_ms: Option<u64>,
}

impl<const N: usize> AnalogAverager<N> {
    pub fn new(interval_ms: u32) -> Self {
        Self {
            window: SampleWindow::new(),
            interval_ms,
            last_sample_ms: None,
        }
    }

    pub fn set_interval(&mut self, interval_ms: u32) {
        self.interval_ms = interval_ms;
    }

    /// Take at most one sample. Returns a new average on the tick that
    /// completes a window, and `None` on every other tick.
    pub fn tick(&mut self, now_ms: u64, sample: impl FnOnce() -> Option<u16>) -> Option<f32> {
        if let Some(last) = self.last_sample_ms {
            if now_ms.saturating_sub(last) < u64::from(self.interval_ms) {
                return None;
            }
        }
        self.last_sample_ms = Some(now_ms);
        self.window.push(sample()?)
    }

    pub fn pending(&self) -> usize {
        self.window.len()
    }
}

/// Convert an averaged raw ADC count to supply volts.
pub fn adc_to_volts(avg_raw: f32, cal: f32) -> f32 {
    avg_raw / ADC_FULL_SCALE * ADC_REF_VOLTS * cal
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PsuReading {
    pub volts: f32,
    /// Lowest reading above the supply-off floor this session.
    pub min_volts: Option<f32>,
    pub max_volts: f32,
    pub valid: bool,
}

impl PsuReading {
    fn record(&mut self, volts: f32) {
        self.volts = volts;
        self.valid = true;
        if volts > self.max_volts {
            self.max_volts = volts;
        }
        if volts > PSU_MIN_TRACK_VOLTS && self.min_volts.is_none_or(|m| volts < m) {
            self.min_volts = Some(volts);
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Per-role aggregates
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AggregateReading {
    pub latest_c: f32,
    /// Highest value seen since startup or the last peak reset.
    pub peak_c: f32,
    /// False until the first valid reading; distinguishes "no data" from 0 °C.
    pub valid: bool,
}

impl AggregateReading {
    pub fn record(&mut self, celsius: f32) {
        if !self.valid || celsius > self.peak_c {
            self.peak_c = celsius;
        }
        self.latest_c = celsius;
        self.valid = true;
    }

    fn reset_peak(&mut self) {
        self.peak_c = self.latest_c;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeCycle {
    Idle,
    Requesting,
    Converting { since_ms: u64 },
    Ready,
}

// ───────────────────────────────────────────────────────────────
// AcquisitionScheduler
// ───────────────────────────────────────────────────────────────

pub struct AcquisitionScheduler {
    cycle: ProbeCycle,
    probe_interval_ms: u32,
    last_cycle_ms: Option<u64>,
    readings: [AggregateReading; Role::COUNT],
    offsets: [f32; Role::COUNT],
    psu: AnalogAverager<PSU_AVERAGING_DEPTH>,
    psu_cal: f32,
    psu_reading: PsuReading,
}

impl AcquisitionScheduler {
    pub fn new(cfg: &SystemConfig) -> Self {
        Self {
            cycle: ProbeCycle::Idle,
            probe_interval_ms: cfg.probe_interval_ms,
            last_cycle_ms: None,
            readings: [AggregateReading::default(); Role::COUNT],
            offsets: cfg.temp_offsets_c,
            psu: AnalogAverager::new(cfg.psu_sample_interval_ms),
            psu_cal: cfg.psu_voltage_cal,
            psu_reading: PsuReading::default(),
        }
    }

    /// Pick up new intervals, offsets and calibration.
    pub fn apply_config(&mut self, cfg: &SystemConfig) {
        self.probe_interval_ms = cfg.probe_interval_ms;
        self.offsets = cfg.temp_offsets_c;
        self.psu.set_interval(cfg.psu_sample_interval_ms);
        self.psu_cal = cfg.psu_voltage_cal;
    }

    // ── Analog cadence ────────────────────────────────────────

    /// Returns the new PSU voltage on the tick that completes a window.
    pub fn tick_analog(&mut self, now_ms: u64, sample: impl FnOnce() -> Option<u16>) -> Option<f32> {
        let avg = self.psu.tick(now_ms, sample)?;
        let volts = adc_to_volts(avg, self.psu_cal);
        self.psu_reading.record(volts);
        Some(volts)
    }

    // ── Probe cadence ─────────────────────────────────────────

    /// Advance the probe cycle by at most one step. Returns `true` on the
    /// tick that refreshed the role readings.
    ///
    /// Roles resolve through `mapping`; when no role is bound at all, the
    /// first four `discovered` probes stand in for the roles in order.
    pub fn tick_probes(
        &mut self,
        now_ms: u64,
        bus: &mut impl SensorBus,
        arbiter: &mut BusArbiter,
        mapping: &MappingStore,
        discovered: &[ProbeUid],
    ) -> bool {
        match self.cycle {
            ProbeCycle::Idle => {
                let due = self
                    .last_cycle_ms
                    .is_none_or(|last| now_ms.saturating_sub(last) >= u64::from(self.probe_interval_ms));
                if due {
                    self.cycle = ProbeCycle::Requesting;
                }
                false
            }
            ProbeCycle::Requesting => {
                if arbiter.try_begin(BusMode::Sampling).is_err() {
                    return false;
                }
                match bus.request_conversion() {
                    Ok(()) => self.cycle = ProbeCycle::Converting { since_ms: now_ms },
                    Err(_) => {
                        arbiter.release(BusMode::Sampling);
                        self.last_cycle_ms = Some(now_ms);
                        self.cycle = ProbeCycle::Idle;
                    }
                }
                false
            }
            ProbeCycle::Converting { since_ms } => {
                if now_ms.saturating_sub(since_ms) >= u64::from(bus.conversion_time_ms()) {
                    self.cycle = ProbeCycle::Ready;
                }
                false
            }
            ProbeCycle::Ready => {
                self.read_roles(bus, mapping, discovered);
                arbiter.release(BusMode::Sampling);
                self.last_cycle_ms = Some(now_ms);
                self.cycle = ProbeCycle::Idle;
                true
            }
        }
    }

    /// The probe currently standing in for `role`, if any.
    pub fn resolve(role: Role, mapping: &MappingStore, discovered: &[ProbeUid]) -> Option<ProbeUid> {
        if mapping.has_role_assignments() {
            return mapping.by_role(role).filter(|r| r.enabled).map(|r| r.uid);
        }
        discovered
            .iter()
            .filter(|uid| mapping.by_uid(uid).is_none_or(|r| r.enabled))
            .nth(role.index())
            .copied()
    }

    fn read_roles(&mut self, bus: &mut impl SensorBus, mapping: &MappingStore, discovered: &[ProbeUid]) {
        for role in Role::ALL {
            let Some(uid) = Self::resolve(role, mapping, discovered) else {
                continue;
            };
            match bus.read(&uid) {
                Reading::Valid(c) => self.readings[role.index()].record(c + self.offsets[role.index()]),
                Reading::Invalid(reason) => {
                    debug!("Acquisition: {} ({}) kept previous value: {:?}", role.label(), uid, reason);
                }
            }
        }
        if self.readings.iter().all(|r| !r.valid) {
            warn!("Acquisition: no valid probe readings yet");
        }
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn cycle(&self) -> ProbeCycle {
        self.cycle
    }

    pub fn readings(&self) -> &[AggregateReading; Role::COUNT] {
        &self.readings
    }

    pub fn reading(&self, role: Role) -> AggregateReading {
        self.readings[role.index()]
    }

    /// Highest current value across roles with data.
    pub fn max_temperature(&self) -> Option<f32> {
        self.readings
            .iter()
            .filter(|r| r.valid)
            .map(|r| r.latest_c)
            .reduce(f32::max)
    }

    pub fn reset_peaks(&mut self) {
        for r in self.readings.iter_mut() {
            r.reset_peak();
        }
    }

    pub fn psu(&self) -> PsuReading {
        self.psu_reading
    }
}
