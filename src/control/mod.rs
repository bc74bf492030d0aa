//! Temperature-driven actuator control.

pub mod fan;
