//! FluidDash firmware library.
//!
//! Two independent pipelines feed the dashboard: the FluidNC telemetry
//! link (`telemetry`) and the probe/fan pipeline (`sensors`, `control`,
//! orchestrated by `app::service`). All ESP-IDF-specific code is guarded
//! by `#[cfg(target_os = "espidf")]` within each module, so the whole
//! crate builds and tests on the host.

#![deny(unused_must_use)]

pub mod app;
pub mod config;
pub mod error;
pub mod pins;
pub mod telemetry;

pub mod adapters;
pub mod control;
pub mod drivers;
pub mod sensors;

mod util;
