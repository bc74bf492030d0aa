//! Peripheral drivers: fan PWM and tach, one-shot ADC, and the task
//! watchdog.

pub mod fan;
pub mod hw_init;
pub mod watchdog;
