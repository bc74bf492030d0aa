//! Application core — pure domain logic, zero I/O.
//!
//! This module wires the probe pipeline together: touch identification,
//! the acquisition cycle, fan control and persistence of the probe
//! mapping. All interaction with hardware happens through **port traits**
//! defined in [`ports`], keeping this layer fully testable without real
//! peripherals.

pub mod commands;
pub mod events;
pub mod ports;
pub mod service;
