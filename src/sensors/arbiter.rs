//! Ownership of the shared probe bus.
//!
//! Touch identification and periodic sampling both issue conversions on
//! the same wire. Only one of them may hold the bus at a time; every
//! transition goes through Idle.
//!
//! ```text
//!            try_begin(Identifying)          try_begin(Sampling)
//!  Identifying ◀────────────────── Idle ──────────────────▶ Sampling
//!             ──────────────────▶      ◀──────────────────
//!                 release(Identifying)     release(Sampling)
//! ```

use log::{debug, warn};
use serde::Serialize;

use crate::error::SensorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum BusMode {
    #[default]
    Idle,
    Identifying,
    Sampling,
}

#[derive(Debug, Default)]
pub struct BusArbiter {
    mode: BusMode,
}

impl BusArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> BusMode {
        self.mode
    }

    pub fn is_idle(&self) -> bool {
        self.mode == BusMode::Idle
    }

    /// Claim the bus for `mode`. Only succeeds from Idle.
    pub fn try_begin(&mut self, mode: BusMode) -> Result<(), SensorError> {
        if mode == BusMode::Idle {
            return Ok(());
        }
        if self.mode != BusMode::Idle {
            debug!("BusArbiter: {:?} refused, bus held by {:?}", mode, self.mode);
            return Err(SensorError::BusBusy);
        }
        self.mode = mode;
        debug!("BusArbiter: Idle -> {:?}", mode);
        Ok(())
    }

    /// Return the bus to Idle. Ignored unless `mode` is the current holder.
    pub fn release(&mut self, mode: BusMode) {
        if self.mode != mode {
            warn!("BusArbiter: release by {:?} while held by {:?}", mode, self.mode);
            return;
        }
        debug!("BusArbiter: {:?} -> Idle", self.mode);
        self.mode = BusMode::Idle;
    }
}
