//! Fan duty from the hottest probe, and fan speed from the tach line.
//!
//! Duty curve:
//!
//! ```text
//!  duty
//!  max ┤            ┌──────
//!      │          ╱
//!      │        ╱
//!  min ┤──────┘
//!      └──────┬─────┬────── °C
//!            low   high
//! ```

use log::{debug, info};
use serde::Serialize;

use crate::app::ports::FanPort;
use crate::config::SystemConfig;

/// Tach windows shorter than this are not evaluated.
pub const TACH_WINDOW_MS: u64 = 1000;

/// Map the hottest temperature onto a duty cycle.
///
/// At or below `low_c` the result is `min_duty`; at or above `high_c` it
/// is `max_duty`; in between it is linear and rounded. When `high_c <= low_c`
/// the curve degenerates to a step at `low_c`.
pub fn compute_duty(max_temp_c: f32, low_c: f32, high_c: f32, min_duty: u8, max_duty: u8) -> u8 {
    if max_temp_c.is_nan() || max_temp_c <= low_c {
        return min_duty;
    }
    if max_temp_c >= high_c {
        return max_duty;
    }
    let frac = (max_temp_c - low_c) / (high_c - low_c);
    let span = f32::from(max_duty) - f32::from(min_duty);
    let duty = (f32::from(min_duty) + frac * span).round();
    let (lo, hi) = (min_duty.min(max_duty), min_duty.max(max_duty));
    (duty as u8).clamp(lo, hi)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ActuatorState {
    pub duty_percent: u8,
    pub rpm: u32,
}

/// Converts tach pulses over a window of at least [`TACH_WINDOW_MS`] to RPM.
#[derive(Debug)]
pub struct TachWindow {
    window_start_ms: Option<u64>,
    pulses_per_rev: u8,
}

impl TachWindow {
    pub fn new(pulses_per_rev: u8) -> Self {
        Self {
            window_start_ms: None,
            pulses_per_rev,
        }
    }

    pub fn set_pulses_per_rev(&mut self, ppr: u8) {
        self.pulses_per_rev = ppr;
    }

    /// Returns a fresh RPM once per elapsed window.
    pub fn tick(&mut self, now_ms: u64, take_pulses: impl FnOnce() -> u32) -> Option<u32> {
        let Some(start) = self.window_start_ms else {
            // Discard whatever accumulated before the first window.
            let _ = take_pulses();
            self.window_start_ms = Some(now_ms);
            return None;
        };
        let elapsed = now_ms.saturating_sub(start);
        if elapsed < TACH_WINDOW_MS {
            return None;
        }
        let pulses = u64::from(take_pulses());
        self.window_start_ms = Some(now_ms);
        let ppr = u64::from(self.pulses_per_rev.max(1));
        Some((pulses * 60_000 / (ppr * elapsed)) as u32)
    }
}

pub struct FanController {
    low_c: f32,
    high_c: f32,
    min_duty: u8,
    max_duty: u8,
    state: ActuatorState,
    tach: TachWindow,
    commanded: bool,
}

impl FanController {
    pub fn new(cfg: &SystemConfig) -> Self {
        Self {
            low_c: cfg.temp_low_c,
            high_c: cfg.temp_high_c,
            min_duty: cfg.fan_min_duty,
            max_duty: cfg.fan_max_duty,
            state: ActuatorState::default(),
            tach: TachWindow::new(cfg.tach_pulses_per_rev),
            commanded: false,
        }
    }

    pub fn apply_config(&mut self, cfg: &SystemConfig) {
        self.low_c = cfg.temp_low_c;
        self.high_c = cfg.temp_high_c;
        self.min_duty = cfg.fan_min_duty;
        self.max_duty = cfg.fan_max_duty;
        self.tach.set_pulses_per_rev(cfg.tach_pulses_per_rev);
    }

    /// Recompute duty from the hottest valid temperature and command it
    /// when it changed. `None` means no probe has data: run at min duty.
    /// Returns the new duty when a command was issued.
    pub fn update(&mut self, max_temp_c: Option<f32>, fan: &mut impl FanPort) -> Option<u8> {
        let duty = match max_temp_c {
            Some(t) => compute_duty(t, self.low_c, self.high_c, self.min_duty, self.max_duty),
            None => self.min_duty,
        };
        if self.commanded && duty == self.state.duty_percent {
            return None;
        }
        fan.set_fan_duty(duty);
        debug!(
            "FanController: {:?} -> {}% (was {}%)",
            max_temp_c, duty, self.state.duty_percent
        );
        self.state.duty_percent = duty;
        self.commanded = true;
        Some(duty)
    }

    pub fn tick_tach(&mut self, now_ms: u64, fan: &mut impl FanPort) -> Option<u32> {
        let rpm = self.tach.tick(now_ms, || fan.take_tach_pulses())?;
        if rpm == 0 && self.state.rpm != 0 {
            info!("FanController: fan stopped (duty {}%)", self.state.duty_percent);
        }
        self.state.rpm = rpm;
        Some(rpm)
    }

    pub fn state(&self) -> ActuatorState {
        self.state
    }
}
