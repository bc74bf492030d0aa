//! WiFi station-mode adapter.
//!
//! Joins the configured access point at startup (blocking, before the
//! main loop starts) and afterwards only polls: a dropped association is
//! retried on a fixed interval without stalling the loop.
//!
//! On ESP-IDF this wraps `esp_idf_svc::wifi::BlockingWifi`; elsewhere the
//! link is a flag tests can flip.

use core::fmt;
use log::{info, warn};

#[cfg(target_os = "espidf")]
use esp_idf_svc::eventloop::EspSystemEventLoop;
#[cfg(target_os = "espidf")]
use esp_idf_svc::hal::modem::Modem;
#[cfg(target_os = "espidf")]
use esp_idf_svc::wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi};

use crate::util::{bounded, is_printable_ascii};

/// Wait between reassociation attempts once the loop is running.
pub const RETRY_INTERVAL_MS: u64 = 10_000;
/// WPA2 passphrase length limits; an empty passphrase means an open network.
const PASSPHRASE_LEN: core::ops::RangeInclusive<usize> = 8..=64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiError {
    /// No SSID has been configured.
    MissingSsid,
    BadSsid,
    BadPassphrase,
    Driver,
    JoinFailed,
}

impl fmt::Display for WifiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSsid => write!(f, "no SSID configured"),
            Self::BadSsid => write!(f, "SSID must be 1-32 printable ASCII characters"),
            Self::BadPassphrase => write!(f, "passphrase must be empty (open) or 8-64 characters"),
            Self::Driver => write!(f, "WiFi driver unavailable"),
            Self::JoinFailed => write!(f, "could not join access point"),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Credentials
// ───────────────────────────────────────────────────────────────

/// A validated SSID / passphrase pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    ssid: heapless::String<32>,
    passphrase: heapless::String<64>,
}

impl Credentials {
    pub fn new(ssid: &str, passphrase: &str) -> Result<Self, WifiError> {
        if ssid.is_empty() {
            return Err(WifiError::MissingSsid);
        }
        if ssid.len() > 32 || !is_printable_ascii(ssid) {
            return Err(WifiError::BadSsid);
        }
        if !passphrase.is_empty() && !PASSPHRASE_LEN.contains(&passphrase.len()) {
            return Err(WifiError::BadPassphrase);
        }
        Ok(Self {
            ssid: bounded(ssid),
            passphrase: bounded(passphrase),
        })
    }

    pub fn ssid(&self) -> &str {
        &self.ssid
    }

    pub fn is_open(&self) -> bool {
        self.passphrase.is_empty()
    }
}

// ───────────────────────────────────────────────────────────────
// Adapter
// ───────────────────────────────────────────────────────────────

pub struct WifiAdapter {
    #[cfg(target_os = "espidf")]
    driver: BlockingWifi<EspWifi<'static>>,
    #[cfg(not(target_os = "espidf"))]
    sim_up: bool,
    credentials: Option<Credentials>,
    last_attempt_ms: u64,
    was_up: bool,
}

impl WifiAdapter {
    #[cfg(target_os = "espidf")]
    pub fn new(modem: Modem, sysloop: EspSystemEventLoop) -> Result<Self, WifiError> {
        // No NVS partition: credentials come from SystemConfig, not the driver's own store.
        let esp_wifi = EspWifi::new(modem, sysloop.clone(), None).map_err(|e| {
            warn!("WiFi: driver init failed: {:?}", e);
            WifiError::Driver
        })?;
        let driver = BlockingWifi::wrap(esp_wifi, sysloop).map_err(|_| WifiError::Driver)?;
        Ok(Self {
            driver,
            credentials: None,
            last_attempt_ms: 0,
            was_up: false,
        })
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn new() -> Self {
        Self {
            sim_up: false,
            credentials: None,
            last_attempt_ms: 0,
            was_up: false,
        }
    }

    /// Validate and store credentials; takes effect on the next join.
    pub fn set_credentials(&mut self, ssid: &str, passphrase: &str) -> Result<(), WifiError> {
        let creds = Credentials::new(ssid, passphrase)?;
        info!(
            "WiFi: credentials set for '{}' ({})",
            creds.ssid(),
            if creds.is_open() { "open" } else { "WPA2" }
        );
        self.credentials = Some(creds);
        Ok(())
    }

    /// Associate and wait for an IP. Startup only: this blocks.
    pub fn connect(&mut self) -> Result<(), WifiError> {
        let creds = self.credentials.clone().ok_or(WifiError::MissingSsid)?;
        info!("WiFi: joining '{}'", creds.ssid());
        self.join(&creds)?;
        self.was_up = true;
        info!("WiFi: link up");
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.link_up()
    }

    /// Non-blocking upkeep from the main loop. Returns `true` on the call
    /// that observes the link coming back.
    pub fn poll(&mut self, now_ms: u64) -> bool {
        if self.link_up() {
            let regained = !self.was_up;
            self.was_up = true;
            if regained {
                info!("WiFi: link restored");
            }
            return regained;
        }
        if self.was_up {
            warn!("WiFi: link lost");
            self.was_up = false;
        }
        let due = now_ms.saturating_sub(self.last_attempt_ms) >= RETRY_INTERVAL_MS;
        if due && self.credentials.is_some() {
            self.last_attempt_ms = now_ms;
            self.reassociate();
        }
        false
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn join(&mut self, creds: &Credentials) -> Result<(), WifiError> {
        let client = ClientConfiguration {
            ssid: creds.ssid.as_str().try_into().map_err(|_| WifiError::BadSsid)?,
            password: creds
                .passphrase
                .as_str()
                .try_into()
                .map_err(|_| WifiError::BadPassphrase)?,
            auth_method: if creds.is_open() {
                AuthMethod::None
            } else {
                AuthMethod::WPA2Personal
            },
            ..Default::default()
        };
        let fail = |e: esp_idf_svc::sys::EspError| {
            warn!("WiFi: {:?}", e);
            WifiError::JoinFailed
        };
        self.driver
            .set_configuration(&Configuration::Client(client))
            .map_err(fail)?;
        self.driver.start().map_err(fail)?;
        self.driver.connect().map_err(fail)?;
        self.driver.wait_netif_up().map_err(fail)
    }

    #[cfg(not(target_os = "espidf"))]
    fn join(&mut self, creds: &Credentials) -> Result<(), WifiError> {
        self.sim_up = true;
        info!("WiFi(sim): joined '{}'", creds.ssid());
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn link_up(&self) -> bool {
        self.driver.is_connected().unwrap_or(false)
    }

    #[cfg(not(target_os = "espidf"))]
    fn link_up(&self) -> bool {
        self.sim_up
    }

    #[cfg(target_os = "espidf")]
    fn reassociate(&mut self) {
        // Non-blocking driver call; completion shows up in link_up().
        if let Err(e) = self.driver.wifi_mut().connect() {
            warn!("WiFi: reassociate failed: {:?}", e);
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn reassociate(&mut self) {
        info!("WiFi(sim): reassociating");
    }
}

#[cfg(not(target_os = "espidf"))]
impl Default for WifiAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(not(target_os = "espidf"))]
impl WifiAdapter {
    pub fn sim_set_link(&mut self, up: bool) {
        self.sim_up = up;
    }
}
