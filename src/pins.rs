//! GPIO / peripheral pin assignments for the FluidDash board (ESP32 "CYD").
//!
//! Single source of truth. Every driver references this module rather than
//! hard-coding pin numbers.

// ---------------------------------------------------------------------------
// Temperature probes (DS18B20 on a shared one-wire bus)
// ---------------------------------------------------------------------------

/// Open-drain data line with external 4.7 kΩ pull-up.
pub const ONE_WIRE_GPIO: i32 = 21;

// ---------------------------------------------------------------------------
// Cooling fan
// ---------------------------------------------------------------------------

/// LEDC PWM output to the fan's control input.
pub const FAN_PWM_GPIO: i32 = 4;
/// Open-collector tachometer output, input-only pin.
pub const FAN_TACH_GPIO: i32 = 35;

// ---------------------------------------------------------------------------
// PSU monitor (resistive divider into ADC1)
// ---------------------------------------------------------------------------

/// ADC1 channel 6 (GPIO 34 on ESP32).
pub const PSU_ADC_GPIO: i32 = 34;

// ---------------------------------------------------------------------------
// PWM / ADC configuration
// ---------------------------------------------------------------------------

/// LEDC timer resolution (bits). 8-bit gives 0 – 255 duty levels.
pub const PWM_RESOLUTION_BITS: u32 = 8;
/// LEDC base frequency for the fan (25 kHz, above audible range).
pub const FAN_PWM_FREQ_HZ: u32 = 25_000;
/// Full-scale count of the 12-bit ADC.
pub const ADC_FULL_SCALE: f32 = 4095.0;
/// ADC reference voltage at 12 dB attenuation.
pub const ADC_REF_VOLTS: f32 = 3.3;
