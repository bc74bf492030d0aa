//! DS18B20 probes on a 1-Wire bus, via the `one-wire-bus` and `ds18b20`
//! crates.
//!
//! Both crates speak `embedded-hal` 0.2 (`embedded_hal_p2` here); on
//! ESP-IDF `PinDriver` in open-drain input/output mode and `Ets` implement
//! those traits. One cycle is a simultaneous CONVERT T for every device;
//! after the 12-bit conversion time each probe's scratchpad is read by
//! address. The conversion wait belongs to the caller.

use ::ds18b20::{Ds18b20, Resolution};
use embedded_hal_p2::blocking::delay::DelayUs;
use embedded_hal_p2::digital::v2::{InputPin, OutputPin};
use log::{debug, warn};
use one_wire_bus::{Address, OneWire, OneWireError};

use super::MAX_PROBES;
use super::bus::{DEVICE_DISCONNECTED_C, InvalidReason, ProbeBus};
use super::uid::ProbeUid;
use crate::error::SensorError;

/// Maximum conversion time at the power-on 12-bit resolution.
pub const CONVERSION_TIME_12BIT_MS: u32 = 750;

/// The crate's address keeps the family code in the low byte, so the
/// little-endian bytes are ROM order.
pub fn uid_from_address(address: Address) -> ProbeUid {
    ProbeUid(address.0.to_le_bytes())
}

pub fn address_of(uid: &ProbeUid) -> Address {
    Address(u64::from_le_bytes(uid.0))
}

/// Real-hardware [`ProbeBus`] backend.
pub struct OneWireProbeBus<P, D> {
    bus: OneWire<P>,
    delay: D,
    converted: bool,
}

impl<P, D, E> OneWireProbeBus<P, D>
where
    P: InputPin<Error = E> + OutputPin<Error = E>,
    D: DelayUs<u16>,
    E: core::fmt::Debug,
{
    pub fn new(pin: P, delay: D) -> Result<Self, SensorError> {
        let bus = OneWire::new(pin).map_err(|e| {
            warn!("OneWireProbeBus: bus init failed: {:?}", e);
            SensorError::NoPresence
        })?;
        Ok(Self {
            bus,
            delay,
            converted: false,
        })
    }

    /// Reset pulse; `Ok(())` only when some device answered.
    fn presence(&mut self) -> Result<(), SensorError> {
        match self.bus.reset(&mut self.delay) {
            Ok(true) => Ok(()),
            Ok(false) => Err(SensorError::NoPresence),
            Err(e) => {
                warn!("OneWireProbeBus: reset failed: {:?}", e);
                Err(SensorError::NoPresence)
            }
        }
    }
}

impl<P, D, E> ProbeBus for OneWireProbeBus<P, D>
where
    P: InputPin<Error = E> + OutputPin<Error = E>,
    D: DelayUs<u16>,
    E: core::fmt::Debug,
{
    fn scan_roms(&mut self) -> Result<heapless::Vec<[u8; 8], MAX_PROBES>, SensorError> {
        let mut roms = heapless::Vec::new();
        for found in self.bus.devices(false, &mut self.delay) {
            match found {
                Ok(address) => {
                    if roms.push(uid_from_address(address).0).is_err() {
                        warn!("OneWireProbeBus: more than {} devices, ignoring the rest", MAX_PROBES);
                        break;
                    }
                }
                Err(e) => {
                    warn!("OneWireProbeBus: search stopped: {:?}", e);
                    if roms.is_empty() {
                        return Err(SensorError::NoPresence);
                    }
                    break;
                }
            }
        }
        debug!("OneWireProbeBus: search found {} device(s)", roms.len());
        Ok(roms)
    }

    fn start_conversion(&mut self) -> Result<(), SensorError> {
        self.presence()?;
        ::ds18b20::start_simultaneous_temp_measurement(&mut self.bus, &mut self.delay).map_err(
            |e: OneWireError<E>| {
                warn!("OneWireProbeBus: convert command failed: {:?}", e);
                SensorError::ConversionFailed
            },
        )?;
        self.converted = true;
        Ok(())
    }

    fn read_celsius(&mut self, uid: &ProbeUid) -> Result<f32, InvalidReason> {
        if !self.converted {
            return Err(InvalidReason::NotConverted);
        }
        let sensor = Ds18b20::new::<E>(address_of(uid)).map_err(|_| InvalidReason::Disconnected)?;
        if self.presence().is_err() {
            return Err(InvalidReason::Disconnected);
        }
        let data = sensor
            .read_data(&mut self.bus, &mut self.delay)
            .map_err(|e| match e {
                OneWireError::CrcMismatch => InvalidReason::CrcMismatch,
                _ => InvalidReason::Disconnected,
            })?;
        if data.temperature == DEVICE_DISCONNECTED_C {
            return Err(InvalidReason::Disconnected);
        }
        Ok(data.temperature)
    }

    fn conversion_time_ms(&self) -> u32 {
        u32::from(Resolution::Bits12.max_measurement_time_millis())
    }
}
