//! 64-bit probe ROM codes and their textual form.
//!
//! The text form is 16 uppercase hex digits in ROM byte order (family code
//! first), e.g. `28FF641E8C160495`. Parsing accepts either case.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use one_wire_bus::crc::crc8;

/// Family code of the DS18B20 digital thermometer.
pub const FAMILY_DS18B20: u8 = 0x28;

/// Unique 8-byte probe address: family, 6-byte serial, CRC-8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProbeUid(pub [u8; 8]);

/// Errors from parsing the textual UID form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UidParseError {
    /// Input was not exactly 16 characters.
    BadLength(usize),
    /// A character outside `[0-9a-fA-F]`.
    BadDigit,
}

impl fmt::Display for UidParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadLength(n) => write!(f, "uid must be 16 hex digits (got {})", n),
            Self::BadDigit => write!(f, "uid contains a non-hex digit"),
        }
    }
}

impl ProbeUid {
    /// Build a ROM code from its family and serial, computing the CRC.
    pub fn from_serial(family: u8, serial: [u8; 6]) -> Self {
        let mut rom = [0u8; 8];
        rom[0] = family;
        rom[1..7].copy_from_slice(&serial);
        rom[7] = crc8(&rom[..7]);
        Self(rom)
    }

    pub fn family(&self) -> u8 {
        self.0[0]
    }

    /// True if the trailing byte matches the CRC-8 of the first seven.
    pub fn crc_valid(&self) -> bool {
        crc8(&self.0[..7]) == self.0[7]
    }

    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }

    /// Uppercase hex text form.
    pub fn to_hex(&self) -> heapless::String<16> {
        let mut s = heapless::String::new();
        use core::fmt::Write;
        for b in self.0 {
            let _ = write!(s, "{:02X}", b);
        }
        s
    }

    /// Last four hex digits, used to build default probe names.
    pub fn short_tag(&self) -> heapless::String<4> {
        let mut s = heapless::String::new();
        use core::fmt::Write;
        let _ = write!(s, "{:02X}{:02X}", self.0[6], self.0[7]);
        s
    }
}

fn nibble(c: u8) -> Result<u8, UidParseError> {
    match c {
        b'0'..=b'9' => Ok(c - b'0'),
        b'a'..=b'f' => Ok(c - b'a' + 10),
        b'A'..=b'F' => Ok(c - b'A' + 10),
        _ => Err(UidParseError::BadDigit),
    }
}

impl FromStr for ProbeUid {
    type Err = UidParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        if bytes.len() != 16 {
            return Err(UidParseError::BadLength(bytes.len()));
        }
        let mut rom = [0u8; 8];
        for (i, pair) in bytes.chunks_exact(2).enumerate() {
            rom[i] = (nibble(pair[0])? << 4) | nibble(pair[1])?;
        }
        Ok(Self(rom))
    }
}

impl fmt::Display for ProbeUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}
