//! System configuration parameters
//!
//! All tunable parameters for the FluidDash core.
//! Values are persisted in NVS via [`ConfigPort`](crate::app::ports::ConfigPort).

use serde::{Deserialize, Serialize};

use crate::sensors::mapping::Role;
use crate::util::bounded;

/// Core system configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    // --- Identity / network ---
    /// Device name, also used as mDNS hostname.
    pub device_name: heapless::String<32>,
    pub wifi_ssid: heapless::String<32>,
    pub wifi_password: heapless::String<64>,

    // --- Controller link ---
    /// Last configured controller address (discovery fallback).
    pub controller_host: heapless::String<64>,
    /// Websocket port on the controller.
    pub controller_port: u16,
    /// Look the controller up over mDNS at startup.
    pub auto_discover: bool,
    /// Interval between `?` status polls (milliseconds)
    pub status_poll_interval_ms: u32,
    /// Fixed reconnect interval after a disconnect (milliseconds)
    pub reconnect_interval_ms: u32,

    // --- Fan curve ---
    /// Temperature at or below which the fan runs at minimum duty (°C)
    pub temp_low_c: f32,
    /// Temperature at or above which the fan runs at maximum duty (°C)
    pub temp_high_c: f32,
    /// Minimum fan duty (0-100%)
    pub fan_min_duty: u8,
    /// Maximum fan duty (0-100%)
    pub fan_max_duty: u8,
    /// Tachometer pulses per fan revolution
    pub tach_pulses_per_rev: u8,

    // --- Probes ---
    /// Calibration offset added to each role's reading (°C), indexed by role
    pub temp_offsets_c: [f32; Role::COUNT],
    /// Probe conversion cadence (milliseconds)
    pub probe_interval_ms: u32,
    /// Minimum rise over baseline that identifies a touched probe (°C)
    pub identify_threshold_c: f32,
    /// Wait between conversion request and read during identification (ms)
    pub identify_settle_ms: u32,
    /// Overall identification timeout (ms)
    pub identify_timeout_ms: u32,

    // --- PSU monitor ---
    /// Divider calibration factor applied to the ADC voltage
    pub psu_voltage_cal: f32,
    /// Interval between PSU ADC samples (milliseconds)
    pub psu_sample_interval_ms: u32,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            device_name: bounded("fluiddash"),
            wifi_ssid: heapless::String::new(),
            wifi_password: heapless::String::new(),

            controller_host: bounded("192.168.73.13"),
            controller_port: 81,
            auto_discover: false,
            status_poll_interval_ms: 200,
            reconnect_interval_ms: 5000,

            temp_low_c: 30.0,
            temp_high_c: 50.0,
            fan_min_duty: 30,
            fan_max_duty: 100,
            tach_pulses_per_rev: 2,

            temp_offsets_c: [0.0; Role::COUNT],
            probe_interval_ms: 1000,
            identify_threshold_c: 1.0,
            identify_settle_ms: 750,
            identify_timeout_ms: 30_000,

            psu_voltage_cal: 7.3,
            psu_sample_interval_ms: 5,
        }
    }
}

impl SystemConfig {
    /// Calibration offset for `role`.
    pub fn offset_for(&self, role: Role) -> f32 {
        self.temp_offsets_c[role.index()]
    }
}
