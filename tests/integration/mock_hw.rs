//! Mock hardware and storage adapters for integration tests.
//!
//! Records every fan command so tests can assert on the full history
//! without touching real LEDC registers. Probes come from the crate's own
//! simulated bus.

use fluiddash::app::events::AppEvent;
use fluiddash::app::ports::{
    AnalogPort, ConfigError, ConfigPort, EventSink, FanPort, StorageError, StoragePort,
};
use fluiddash::config::SystemConfig;
use fluiddash::error::SensorError;
use fluiddash::sensors::MAX_PROBES;
use fluiddash::sensors::bus::{InvalidReason, ProbeBus, SimProbeBus};
use fluiddash::sensors::uid::{FAMILY_DS18B20, ProbeUid};
use std::cell::RefCell;
use std::collections::HashMap;

pub fn uid(n: u8) -> ProbeUid {
    ProbeUid::from_serial(FAMILY_DS18B20, [0x10, n, 0, 0, 0, 0x42])
}

// ── MockHardware ──────────────────────────────────────────────

pub struct MockHardware {
    pub bus: SimProbeBus,
    pub duty_calls: Vec<u8>,
    pub pending_pulses: u32,
    pub psu_raw: Option<u16>,
}

#[allow(dead_code)]
impl MockHardware {
    pub fn new() -> Self {
        Self {
            bus: SimProbeBus::new(),
            duty_calls: Vec::new(),
            pending_pulses: 0,
            psu_raw: Some(0),
        }
    }

    pub fn with_probes(temps: &[(u8, f32)]) -> Self {
        let mut hw = Self::new();
        for &(n, t) in temps {
            hw.bus.add_probe(uid(n), t);
        }
        hw
    }

    pub fn last_duty(&self) -> Option<u8> {
        self.duty_calls.last().copied()
    }
}

impl Default for MockHardware {
    fn default() -> Self {
        Self::new()
    }
}

impl ProbeBus for MockHardware {
    fn scan_roms(&mut self) -> Result<heapless::Vec<[u8; 8], MAX_PROBES>, SensorError> {
        self.bus.scan_roms()
    }

    fn start_conversion(&mut self) -> Result<(), SensorError> {
        self.bus.start_conversion()
    }

    fn read_celsius(&mut self, uid: &ProbeUid) -> Result<f32, InvalidReason> {
        self.bus.read_celsius(uid)
    }

    fn conversion_time_ms(&self) -> u32 {
        self.bus.conversion_time_ms()
    }
}

impl FanPort for MockHardware {
    fn set_fan_duty(&mut self, percent: u8) {
        self.duty_calls.push(percent);
    }

    fn take_tach_pulses(&mut self) -> u32 {
        std::mem::take(&mut self.pending_pulses)
    }
}

impl AnalogPort for MockHardware {
    fn read_psu_raw(&mut self) -> Option<u16> {
        self.psu_raw
    }
}

// ── MemStorage ────────────────────────────────────────────────

#[derive(Default)]
pub struct MemStorage {
    pub blobs: HashMap<String, Vec<u8>>,
    pub config: RefCell<Option<SystemConfig>>,
    pub fail_reads: bool,
    pub fail_writes: bool,
}

#[allow(dead_code)]
impl MemStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(namespace: &str, key: &str) -> String {
        format!("{namespace}::{key}")
    }

    pub fn corrupt(&mut self, namespace: &str, key: &str) {
        self.blobs.insert(Self::key(namespace, key), vec![0xFF; 3]);
    }

    pub fn remove(&mut self, namespace: &str, key: &str) {
        self.blobs.remove(&Self::key(namespace, key));
    }
}

impl StoragePort for MemStorage {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        if self.fail_reads {
            return Err(StorageError::IoError);
        }
        let data = self
            .blobs
            .get(&Self::key(namespace, key))
            .ok_or(StorageError::NotFound)?;
        let len = data.len().min(buf.len());
        buf[..len].copy_from_slice(&data[..len]);
        Ok(len)
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        if self.fail_writes {
            return Err(StorageError::IoError);
        }
        self.blobs.insert(Self::key(namespace, key), data.to_vec());
        Ok(())
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        self.blobs.remove(&Self::key(namespace, key));
        Ok(())
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        self.blobs.contains_key(&Self::key(namespace, key))
    }
}

impl ConfigPort for MemStorage {
    fn load(&self) -> Result<SystemConfig, ConfigError> {
        self.config.borrow().clone().ok_or(ConfigError::NotFound)
    }

    fn save(&self, config: &SystemConfig) -> Result<(), ConfigError> {
        if self.fail_writes {
            return Err(ConfigError::IoError);
        }
        *self.config.borrow_mut() = Some(config.clone());
        Ok(())
    }
}

// ── RecordingSink ─────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<AppEvent>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, pred: impl Fn(&AppEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}
