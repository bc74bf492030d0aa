//! Hardware adapter — bridges real peripherals to domain port traits.
//!
//! Owns the probe bus backend and the fan driver, exposing them through
//! [`ProbeBus`], [`FanPort`] and [`AnalogPort`]. This is the only module
//! besides the drivers that touches actual hardware. On non-espidf
//! targets the drivers use cfg-gated simulation stubs and the bus is a
//! [`SimProbeBus`](crate::sensors::bus::SimProbeBus).

use crate::app::ports::{AnalogPort, FanPort};
use crate::drivers::fan::FanDriver;
use crate::drivers::hw_init;
use crate::error::SensorError;
use crate::sensors::MAX_PROBES;
use crate::sensors::bus::{InvalidReason, ProbeBus};
use crate::sensors::uid::ProbeUid;

/// Concrete adapter that combines all hardware behind port traits.
pub struct HardwareAdapter<B: ProbeBus> {
    bus: B,
    fan: FanDriver,
}

impl<B: ProbeBus> HardwareAdapter<B> {
    pub fn new(bus: B, fan: FanDriver) -> Self {
        Self { bus, fan }
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn fan_duty(&self) -> u8 {
        self.fan.duty_percent()
    }
}

// ── ProbeBus implementation ───────────────────────────────────

impl<B: ProbeBus> ProbeBus for HardwareAdapter<B> {
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

// ── FanPort / AnalogPort implementations ──────────────────────

impl<B: ProbeBus> FanPort for HardwareAdapter<B> {
    fn set_fan_duty(&mut self, percent: u8) {
        self.fan.set_duty(percent);
    }

    fn take_tach_pulses(&mut self) -> u32 {
        self.fan.take_pulses()
    }
}

impl<B: ProbeBus> AnalogPort for HardwareAdapter<B> {
    fn read_psu_raw(&mut self) -> Option<u16> {
        hw_init::adc1_read(hw_init::ADC1_CH_PSU)
    }
}
