//! Device identity derived from the ESP32 factory MAC address.
//!
//! Produces a stable mDNS hostname `<device_name>-xxyyzz` from the last
//! 3 bytes of the factory MAC, so several dashboards on one LAN never
//! collide.

use core::fmt::Write;

/// Full 6-byte MAC address.
pub type MacAddress = [u8; 6];

const HOSTNAME_CAP: usize = 32;
/// Length of the `-xxyyzz` suffix.
const SUFFIX_LEN: usize = 7;

pub type Hostname = heapless::String<HOSTNAME_CAP>;

/// Read the factory MAC address from eFuse.
#[cfg(target_os = "espidf")]
pub fn read_mac() -> MacAddress {
    let mut mac: MacAddress = [0u8; 6];
    // SAFETY: writes exactly 6 bytes into `mac`.
    unsafe {
        esp_idf_svc::sys::esp_efuse_mac_get_default(mac.as_mut_ptr());
    }
    mac
}

/// Simulation: returns a deterministic fake MAC.
#[cfg(not(target_os = "espidf"))]
pub fn read_mac() -> MacAddress {
    [0xDE, 0xAD, 0xBE, 0xEF, 0xCA, 0xFE]
}

/// `<base>-xxyyzz`, lowercase. `base` is cut so the suffix always fits.
pub fn hostname(base: &str, mac: &MacAddress) -> Hostname {
    let base = if base.trim().is_empty() { "fluiddash" } else { base.trim() };
    let mut name = Hostname::new();
    for c in base.chars().take(HOSTNAME_CAP - SUFFIX_LEN) {
        let c = c.to_ascii_lowercase();
        let c = if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' };
        let _ = name.push(c);
    }
    let _ = write!(name, "-{:02x}{:02x}{:02x}", mac[3], mac[4], mac[5]);
    name
}
