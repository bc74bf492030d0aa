//! Touch identification: find the probe a person is holding.
//!
//! A held probe warms by a degree or more within a few conversions. The
//! binder records one baseline per probe, then keeps converting until some
//! probe's rise over its baseline reaches the threshold, or the session
//! times out.
//!
//! The session is a non-blocking state machine. `start()` requests the
//! first conversion and every later step happens in `poll()`, which the
//! cooperative loop calls on each tick.
//!
//! ```text
//!   Idle ──start──▶ Converting{baseline} ──settle──▶ Requesting ──▶ Converting ──settle──▶ read
//!                                                        ▲                                  │
//!                                                        └──────── no match, time left ◀────┘
//! ```

use core::fmt;

use log::{debug, info, warn};
use serde::Serialize;

use super::MAX_PROBES;
use super::bus::{Reading, SensorBus};
use super::uid::ProbeUid;
use crate::config::SystemConfig;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IdentifyConfig {
    /// Rise over baseline that counts as a touch (°C).
    pub threshold_c: f32,
    /// Wait between a conversion request and reading the result.
    pub settle_ms: u32,
    /// Overall session limit, measured from `start()`.
    pub timeout_ms: u32,
}

impl Default for IdentifyConfig {
    fn default() -> Self {
        Self {
            threshold_c: 1.0,
            settle_ms: 750,
            timeout_ms: 30_000,
        }
    }
}

impl From<&SystemConfig> for IdentifyConfig {
    fn from(cfg: &SystemConfig) -> Self {
        Self {
            threshold_c: cfg.identify_threshold_c,
            settle_ms: cfg.identify_settle_ms,
            timeout_ms: cfg.identify_timeout_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum IdentifyOutcome {
    /// `uid` rose by `delta_c` on scan iteration `iteration` (1-based).
    Matched {
        uid: ProbeUid,
        delta_c: f32,
        iteration: u32,
    },
    /// No probe crossed the threshold before the timeout.
    NoMatch,
    /// The bus had no probes to watch.
    NoProbes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifyError {
    AlreadyActive,
    NoProbes,
}

impl fmt::Display for IdentifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyActive => write!(f, "identification already running"),
            Self::NoProbes => write!(f, "no probes on bus"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    /// A conversion must be requested (first attempt or retry).
    Requesting { baseline: bool },
    /// A conversion is in flight since `since_ms`.
    Converting { baseline: bool, since_ms: u64 },
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    uid: ProbeUid,
    baseline: Option<f32>,
}

pub struct IdentityBinder {
    cfg: IdentifyConfig,
    phase: Phase,
    started_ms: u64,
    iteration: u32,
    candidates: heapless::Vec<Candidate, MAX_PROBES>,
}

impl IdentityBinder {
    pub fn new(cfg: IdentifyConfig) -> Self {
        Self {
            cfg,
            phase: Phase::Idle,
            started_ms: 0,
            iteration: 0,
            candidates: heapless::Vec::new(),
        }
    }

    pub fn config(&self) -> IdentifyConfig {
        self.cfg
    }

    /// Takes effect on the next session.
    pub fn set_config(&mut self, cfg: IdentifyConfig) {
        self.cfg = cfg;
    }

    pub fn is_active(&self) -> bool {
        self.phase != Phase::Idle
    }

    /// Completed scan iterations in the current or last session.
    pub fn iterations(&self) -> u32 {
        self.iteration
    }

    /// Enumerate the bus and request the baseline conversion.
    /// The caller must already own the bus.
    pub fn start(&mut self, bus: &mut impl SensorBus, now_ms: u64) -> Result<usize, IdentifyError> {
        if self.is_active() {
            return Err(IdentifyError::AlreadyActive);
        }
        let uids = bus.discover();
        if uids.is_empty() {
            warn!("IdentityBinder: no probes on bus");
            return Err(IdentifyError::NoProbes);
        }

        self.candidates.clear();
        for uid in &uids {
            let _ = self.candidates.push(Candidate {
                uid: *uid,
                baseline: None,
            });
        }
        self.started_ms = now_ms;
        self.iteration = 0;
        info!(
            "IdentityBinder: watching {} probe(s), threshold {:.1}\u{00b0}C, timeout {} ms",
            uids.len(),
            self.cfg.threshold_c,
            self.cfg.timeout_ms
        );
        self.begin_conversion(bus, now_ms, true);
        Ok(uids.len())
    }

    /// Advance the session. Returns the outcome once, when it finishes.
    pub fn poll(&mut self, bus: &mut impl SensorBus, now_ms: u64) -> Option<IdentifyOutcome> {
        match self.phase {
            Phase::Idle => None,
            Phase::Requesting { baseline } => {
                if self.timed_out(now_ms) {
                    return Some(self.finish(IdentifyOutcome::NoMatch));
                }
                self.begin_conversion(bus, now_ms, baseline);
                None
            }
            Phase::Converting { baseline, since_ms } => {
                if now_ms.saturating_sub(since_ms) < u64::from(self.cfg.settle_ms) {
                    if self.timed_out(now_ms) {
                        return Some(self.finish(IdentifyOutcome::NoMatch));
                    }
                    return None;
                }

                if baseline {
                    self.record_baselines(bus);
                } else if let Some(outcome) = self.scan(bus) {
                    return Some(self.finish(outcome));
                }

                if self.timed_out(now_ms) {
                    return Some(self.finish(IdentifyOutcome::NoMatch));
                }
                // Retry the baseline if no probe produced a usable one.
                let need_baseline = !self.candidates.iter().any(|c| c.baseline.is_some());
                self.begin_conversion(bus, now_ms, need_baseline);
                None
            }
        }
    }

    fn timed_out(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.started_ms) >= u64::from(self.cfg.timeout_ms)
    }

    fn begin_conversion(&mut self, bus: &mut impl SensorBus, now_ms: u64, baseline: bool) {
        self.phase = match bus.request_conversion() {
            Ok(()) => Phase::Converting {
                baseline,
                since_ms: now_ms,
            },
            Err(_) => Phase::Requesting { baseline },
        };
    }

    fn record_baselines(&mut self, bus: &mut impl SensorBus) {
        for c in self.candidates.iter_mut() {
            match bus.read(&c.uid) {
                Reading::Valid(v) => c.baseline = Some(v),
                Reading::Invalid(reason) => {
                    debug!("IdentityBinder: no baseline for {} ({:?})", c.uid, reason);
                }
            }
        }
    }

    fn scan(&mut self, bus: &mut impl SensorBus) -> Option<IdentifyOutcome> {
        self.iteration += 1;
        for c in &self.candidates {
            let Some(baseline) = c.baseline else {
                continue;
            };
            match bus.read(&c.uid) {
                Reading::Valid(v) => {
                    let delta = v - baseline;
                    if delta >= self.cfg.threshold_c {
                        return Some(IdentifyOutcome::Matched {
                            uid: c.uid,
                            delta_c: delta,
                            iteration: self.iteration,
                        });
                    }
                }
                Reading::Invalid(reason) => {
                    debug!(
                        "IdentityBinder: {} skipped on iteration {} ({:?})",
                        c.uid, self.iteration, reason
                    );
                }
            }
        }
        None
    }

    fn finish(&mut self, outcome: IdentifyOutcome) -> IdentifyOutcome {
        self.phase = Phase::Idle;
        match outcome {
            IdentifyOutcome::Matched { uid, delta_c, iteration } => info!(
                "IdentityBinder: {} touched (+{:.2}\u{00b0}C, iteration {})",
                uid, delta_c, iteration
            ),
            other => info!("IdentityBinder: finished with {:?}", other),
        }
        outcome
    }
}
