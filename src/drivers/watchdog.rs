//! Task Watchdog Timer (TWDT) driver.
//!
//! Resets the dashboard if the main loop stops feeding it. The main loop
//! feeds once per pass; the blocking startup steps (WiFi join, mDNS
//! browse) run before the watchdog is armed.

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

use log::{info, warn};

/// Default stall budget. Must exceed the longest blocking call inside
/// the loop (a 1-Wire scratchpad sweep of every probe).
pub const DEFAULT_TIMEOUT_MS: u32 = 8_000;
const MIN_TIMEOUT_MS: u32 = 1_000;

pub struct Watchdog {
    timeout_ms: u32,
    subscribed: bool,
    #[cfg(not(target_os = "espidf"))]
    feeds: u32,
}

impl Default for Watchdog {
    fn default() -> Self {
        Self::arm(DEFAULT_TIMEOUT_MS)
    }
}

impl Watchdog {
    /// Reconfigure the TWDT and subscribe the calling task.
    pub fn arm(timeout_ms: u32) -> Self {
        let timeout_ms = timeout_ms.max(MIN_TIMEOUT_MS);
        let subscribed = Self::platform_subscribe(timeout_ms);
        if subscribed {
            info!("Watchdog: armed ({} ms, panic on trigger)", timeout_ms);
        } else {
            warn!("Watchdog: not subscribed, loop stalls will go unnoticed");
        }
        Self {
            timeout_ms,
            subscribed,
            #[cfg(not(target_os = "espidf"))]
            feeds: 0,
        }
    }

    pub fn timeout_ms(&self) -> u32 {
        self.timeout_ms
    }

    pub fn is_armed(&self) -> bool {
        self.subscribed
    }

    pub fn feed(&mut self) {
        if !self.subscribed {
            return;
        }
        self.platform_feed();
    }

    #[cfg(target_os = "espidf")]
    fn platform_subscribe(timeout_ms: u32) -> bool {
        let cfg = esp_task_wdt_config_t {
            timeout_ms,
            idle_core_mask: 0,
            trigger_panic: true,
        };
        // SAFETY: plain FFI calls on the current task handle.
        unsafe {
            let ret = esp_task_wdt_reconfigure(&cfg);
            if ret != ESP_OK {
                warn!("Watchdog: reconfigure returned {}", ret);
            }
            esp_task_wdt_add(core::ptr::null_mut()) == ESP_OK
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_subscribe(_timeout_ms: u32) -> bool {
        true
    }

    #[cfg(target_os = "espidf")]
    fn platform_feed(&mut self) {
        // SAFETY: the task subscribed in `arm`.
        unsafe {
            esp_task_wdt_reset();
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_feed(&mut self) {
        self.feeds = self.feeds.saturating_add(1);
    }
}

#[cfg(not(target_os = "espidf"))]
impl Watchdog {
    pub fn sim_feeds(&self) -> u32 {
        self.feeds
    }
}
