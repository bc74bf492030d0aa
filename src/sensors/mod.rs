//! Temperature probes, their identities, and the PSU analog channel.
//!
//! [`bus::SensorBus`] is the seam to the 1-Wire hardware; everything above
//! it ([`identify::IdentityBinder`], [`acquisition::AcquisitionScheduler`])
//! runs unchanged against [`bus::SimProbeBus`] on the host.

pub mod acquisition;
pub mod arbiter;
pub mod bus;
pub mod ds18b20;
pub mod identify;
pub mod mapping;
pub mod uid;

use uid::ProbeUid;

/// Upper bound on probes tracked on one bus.
pub const MAX_PROBES: usize = 16;

/// Probe UIDs in discovery order.
pub type UidList = heapless::Vec<ProbeUid, MAX_PROBES>;
