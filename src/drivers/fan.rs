//! 4-wire PWM cooling fan: LEDC duty output and tachometer pulse counter.
//!
//! The tach line pulses a fixed number of times per revolution (2 for
//! common PC fans). A GPIO ISR bumps [`FAN_TACH_PULSES`]; the control
//! loop swaps it to zero once per measurement window.
//!
//! ## Dual-target design
//!
//! On ESP-IDF: drives real PWM via hw_init helpers.
//! On host/test: tracks state in-memory only.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::drivers::hw_init;

/// Edge counter shared between an ISR and the loop.
#[derive(Debug, Default)]
pub struct PulseCounter(AtomicU32);

impl PulseCounter {
    pub const fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    /// Lock-free; safe from interrupt context.
    pub fn record_pulse(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// Read and reset in one step.
    pub fn take(&self) -> u32 {
        self.0.swap(0, Ordering::Relaxed)
    }
}

/// `static` because ESP-IDF ISR callbacks cannot capture state.
pub static FAN_TACH_PULSES: PulseCounter = PulseCounter::new();

pub struct FanDriver {
    duty_percent: u8,
}

impl Default for FanDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl FanDriver {
    pub fn new() -> Self {
        Self { duty_percent: 0 }
    }

    /// Command duty in percent (clamped to 100).
    pub fn set_duty(&mut self, percent: u8) {
        let percent = percent.min(100);
        let duty_8bit = (u16::from(percent) * 255 / 100) as u8;
        hw_init::ledc_set(hw_init::LEDC_CH_FAN, duty_8bit);
        self.duty_percent = percent;
    }

    pub fn duty_percent(&self) -> u8 {
        self.duty_percent
    }

    pub fn take_pulses(&self) -> u32 {
        FAN_TACH_PULSES.take()
    }
}
