//! Shared-bus probe access.
//!
//! [`ProbeBus`] is the raw port a backend implements (real 1-Wire or the
//! host simulation). [`SensorBus`] layers the policy on top of any backend:
//! checksum/family filtering on discovery and explicit invalid readings.
//!
//! ```text
//!  OneWireProbeBus ─┐
//!                   ├─▶ ProbeBus ──▶ SensorBus (discover · request_conversion · read)
//!  SimProbeBus ─────┘
//! ```

use log::{debug, warn};

use super::uid::{FAMILY_DS18B20, ProbeUid};
use super::{MAX_PROBES, UidList};
use crate::error::SensorError;

/// Value the DS18B20 libraries report for an absent device.
pub const DEVICE_DISCONNECTED_C: f32 = -127.0;
/// Readings at or below this are outside the probe's physical range.
pub const MIN_VALID_C: f32 = -55.0;
/// Readings at or above this are outside the probe's physical range.
pub const MAX_VALID_C: f32 = 125.0;

/// Why a probe read produced no usable temperature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum InvalidReason {
    Disconnected,
    OutOfRange,
    NotConverted,
    CrcMismatch,
}

/// Result of reading one probe. Never a phantom zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    Valid(f32),
    Invalid(InvalidReason),
}

impl Reading {
    pub fn celsius(self) -> Option<f32> {
        match self {
            Self::Valid(c) => Some(c),
            Self::Invalid(_) => None,
        }
    }

    pub fn is_valid(self) -> bool {
        matches!(self, Self::Valid(_))
    }
}

/// Classify a raw backend temperature.
pub fn classify(celsius: f32) -> Reading {
    if celsius == DEVICE_DISCONNECTED_C {
        return Reading::Invalid(InvalidReason::Disconnected);
    }
    // NaN fails both comparisons and lands here too.
    if !(celsius > MIN_VALID_C && celsius < MAX_VALID_C) {
        return Reading::Invalid(InvalidReason::OutOfRange);
    }
    Reading::Valid(celsius)
}

// ───────────────────────────────────────────────────────────────
// Raw port
// ───────────────────────────────────────────────────────────────

/// Raw access to a shared single-wire probe bus.
pub trait ProbeBus {
    /// Enumerate every ROM code answering on the bus, unfiltered.
    fn scan_roms(&mut self) -> Result<heapless::Vec<[u8; 8], MAX_PROBES>, SensorError>;

    /// Start a temperature conversion on every device. Must not block.
    fn start_conversion(&mut self) -> Result<(), SensorError>;

    /// Read back the last converted value of one device.
    fn read_celsius(&mut self, uid: &ProbeUid) -> Result<f32, InvalidReason>;

    /// Worst-case time from `start_conversion` until values are ready.
    fn conversion_time_ms(&self) -> u32;
}

// ───────────────────────────────────────────────────────────────
// Policy layer
// ───────────────────────────────────────────────────────────────

/// Probe operations used by the identity binder and acquisition cycle.
/// Implemented for every [`ProbeBus`].
pub trait SensorBus: ProbeBus {
    /// Scan the bus and keep only DS18B20 devices with a valid ROM CRC.
    fn discover(&mut self) -> UidList {
        let mut uids = UidList::new();
        let roms = match self.scan_roms() {
            Ok(roms) => roms,
            Err(e) => {
                warn!("SensorBus: scan failed: {}", e);
                return uids;
            }
        };
        for rom in roms {
            let uid = ProbeUid(rom);
            if !uid.crc_valid() {
                warn!("SensorBus: dropping {} (ROM CRC mismatch)", uid);
                continue;
            }
            if uid.family() != FAMILY_DS18B20 {
                warn!("SensorBus: dropping {} (family 0x{:02X})", uid, uid.family());
                continue;
            }
            if uids.contains(&uid) {
                continue;
            }
            // Capacity matches the scan buffer, push cannot fail here.
            let _ = uids.push(uid);
        }
        debug!("SensorBus: discovered {} probe(s)", uids.len());
        uids
    }

    /// Begin a bus-wide conversion without waiting for it.
    fn request_conversion(&mut self) -> Result<(), SensorError> {
        self.start_conversion().inspect_err(|e| {
            warn!("SensorBus: conversion request failed: {}", e);
        })
    }

    /// Last converted value for `uid`, or an explicit invalid reading.
    fn read(&mut self, uid: &ProbeUid) -> Reading {
        match self.read_celsius(uid) {
            Ok(c) => classify(c),
            Err(reason) => Reading::Invalid(reason),
        }
    }
}

impl<T: ProbeBus + ?Sized> SensorBus for T {}

// ───────────────────────────────────────────────────────────────
// Host simulation backend
// ───────────────────────────────────────────────────────────────

struct SimProbe {
    rom: [u8; 8],
    live: f32,
    script: std::collections::VecDeque<f32>,
    latched: Option<f32>,
    present: bool,
}

/// In-memory bus for host tests and simulation builds.
///
/// Each conversion latches the probe's current temperature (or the next
/// scripted value), matching a real DS18B20 whose scratchpad only changes
/// after a conversion.
pub struct SimProbeBus {
    probes: Vec<SimProbe>,
    conversion_ms: u32,
    conversions: u32,
}

impl Default for SimProbeBus {
    fn default() -> Self {
        Self::new()
    }
}

impl SimProbeBus {
    pub fn new() -> Self {
        Self::with_conversion_time(super::ds18b20::CONVERSION_TIME_12BIT_MS)
    }

    pub fn with_conversion_time(conversion_ms: u32) -> Self {
        Self {
            probes: Vec::new(),
            conversion_ms,
            conversions: 0,
        }
    }

    /// Attach a probe at a fixed temperature.
    pub fn add_probe(&mut self, uid: ProbeUid, celsius: f32) {
        self.add_raw_rom(uid.0, celsius);
    }

    /// Attach a device by raw ROM code, valid or not.
    pub fn add_raw_rom(&mut self, rom: [u8; 8], celsius: f32) {
        self.probes.push(SimProbe {
            rom,
            live: celsius,
            script: std::collections::VecDeque::new(),
            latched: None,
            present: true,
        });
    }

    fn probe_mut(&mut self, uid: &ProbeUid) -> Option<&mut SimProbe> {
        self.probes.iter_mut().find(|p| p.rom == uid.0)
    }

    pub fn set_temp(&mut self, uid: &ProbeUid, celsius: f32) {
        if let Some(p) = self.probe_mut(uid) {
            p.live = celsius;
        }
    }

    /// Queue one value per future conversion. The last value sticks.
    pub fn script(&mut self, uid: &ProbeUid, values: &[f32]) {
        if let Some(p) = self.probe_mut(uid) {
            p.script.extend(values.iter().copied());
        }
    }

    /// Electrically detach or reattach a probe.
    pub fn set_present(&mut self, uid: &ProbeUid, present: bool) {
        if let Some(p) = self.probe_mut(uid) {
            p.present = present;
            if !present {
                p.latched = None;
            }
        }
    }

    /// Number of conversions started so far.
    pub fn conversions(&self) -> u32 {
        self.conversions
    }
}

impl ProbeBus for SimProbeBus {
    fn scan_roms(&mut self) -> Result<heapless::Vec<[u8; 8], MAX_PROBES>, SensorError> {
        let mut roms = heapless::Vec::new();
        for p in self.probes.iter().filter(|p| p.present) {
            if roms.push(p.rom).is_err() {
                break;
            }
        }
        Ok(roms)
    }

    fn start_conversion(&mut self) -> Result<(), SensorError> {
        if !self.probes.iter().any(|p| p.present) {
            return Err(SensorError::NoPresence);
        }
        self.conversions += 1;
        for p in self.probes.iter_mut().filter(|p| p.present) {
            if let Some(next) = p.script.pop_front() {
                p.live = next;
            }
            p.latched = Some(p.live);
        }
        Ok(())
    }

    fn read_celsius(&mut self, uid: &ProbeUid) -> Result<f32, InvalidReason> {
        match self.probes.iter().find(|p| p.rom == uid.0) {
            Some(p) if p.present => p.latched.ok_or(InvalidReason::NotConverted),
            _ => Err(InvalidReason::Disconnected),
        }
    }

    fn conversion_time_ms(&self) -> u32 {
        self.conversion_ms
    }
}
