//! FluidDash Firmware — Main Entry Point
//!
//! Hexagonal architecture with a single cooperative loop.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  HardwareAdapter      LogEventSink   NvsAdapter   Esp32Time    │
//! │  (Bus+Fan+Analog)     (EventSink)    (Config+NVS) (clock)      │
//! │  WsTransport          MdnsBrowser    WifiAdapter               │
//! │  (LinkTransport)      (ServiceBrowser)                         │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌─────────────────────────┐   ┌──────────────────────────┐    │
//! │  │ TelemetryLink + parser  │   │ AppService               │    │
//! │  │ (MachineStatus)         │   │ Binder · Acquisition·Fan │    │
//! │  └─────────────────────────┘   └──────────────────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use anyhow::{Result, anyhow};
use log::{error, info, warn};

use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::delay::Ets;
use esp_idf_svc::hal::gpio::PinDriver;
use esp_idf_svc::hal::peripherals::Peripherals;

use fluiddash::adapters::device_id;
use fluiddash::adapters::hardware::HardwareAdapter;
use fluiddash::adapters::log_sink::LogEventSink;
use fluiddash::adapters::mdns::MdnsBrowser;
use fluiddash::adapters::nvs::NvsAdapter;
use fluiddash::adapters::time::Esp32TimeAdapter;
use fluiddash::adapters::wifi::WifiAdapter;
use fluiddash::adapters::ws_transport::WsTransport;
use fluiddash::app::ports::ConfigPort;
use fluiddash::app::service::AppService;
use fluiddash::config::SystemConfig;
use fluiddash::drivers::fan::FanDriver;
use fluiddash::drivers::hw_init;
use fluiddash::drivers::watchdog::Watchdog;
use fluiddash::sensors::ds18b20::OneWireProbeBus;
use fluiddash::telemetry::link::{DiscoveryOutcome, TelemetryLink};

/// Loop pacing. Short enough for the 5 ms PSU sample cadence to hold.
const LOOP_SLEEP_MS: u64 = 2;

fn fatal(what: &str, e: impl core::fmt::Display) -> ! {
    error!("{} failed: {}, restarting", what, e);
    std::thread::sleep(std::time::Duration::from_millis(500));
    esp_idf_svc::hal::reset::restart();
}

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  FluidDash v{}                       ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 2. Peripherals (fatal on failure) ─────────────────────
    if let Err(e) = hw_init::init_peripherals() {
        fatal("HAL init", e);
    }
    if let Err(e) = hw_init::init_isr_service() {
        fatal("ISR service init", e);
    }

    // ── 3. Load config from NVS (or defaults) ─────────────────
    let mut nvs = match NvsAdapter::new() {
        Ok(n) => n,
        Err(e) => {
            warn!("NVS init failed ({}), running with defaults and no persistence", e);
            NvsAdapter::default()
        }
    };
    let config = match nvs.load() {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!("NVS config load failed ({}), using defaults", e);
            SystemConfig::default()
        }
    };

    let mac = device_id::read_mac();
    let hostname = device_id::hostname(&config.device_name, &mac);
    info!("Hostname: {}", hostname);

    // ── 4. WiFi (blocking join before the loop) ───────────────
    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let mut wifi = WifiAdapter::new(peripherals.modem, sysloop).map_err(|e| anyhow!("{e}"))?;
    match wifi.set_credentials(&config.wifi_ssid, &config.wifi_password) {
        Ok(()) => {
            if let Err(e) = wifi.connect() {
                warn!("WiFi: {} (will keep retrying)", e);
            }
        }
        Err(e) => warn!("WiFi: {}, controller link stays offline", e),
    }

    // ── 5. Probe bus + actuators ──────────────────────────────
    // GPIO21 is pins::ONE_WIRE_GPIO.
    let ow_pin = PinDriver::input_output_od(peripherals.pins.gpio21)?;
    let probe_bus = match OneWireProbeBus::new(ow_pin, Ets) {
        Ok(bus) => bus,
        Err(e) => fatal("1-Wire init", e),
    };
    let mut hw = HardwareAdapter::new(probe_bus, FanDriver::new());
    let mut log_sink = LogEventSink::new();
    let clock = Esp32TimeAdapter::new();

    // ── 6. Application service ────────────────────────────────
    let mut app = AppService::new(config.clone());
    app.start(&nvs, &mut hw, &mut log_sink);

    // ── 7. Telemetry link ─────────────────────────────────────
    let mut link = TelemetryLink::new(WsTransport::new(), &config);
    if config.auto_discover {
        let mut mdns = MdnsBrowser::new(hostname.clone());
        if let DiscoveryOutcome::Found { hostname, .. } = link.discover(&mut mdns, clock.uptime_ms()) {
            info!("Controller discovered: {}", hostname);
        }
    } else {
        link.connect(&config.controller_host, config.controller_port, clock.uptime_ms());
    }

    let mut watchdog = Watchdog::default();
    info!("System ready. Entering main loop.");

    // ── 8. Cooperative loop ───────────────────────────────────
    loop {
        let now = clock.uptime_ms();

        link.pump(now, &mut log_sink);
        link.poll(now);

        app.tick(now, &mut hw, &mut log_sink);
        if app.take_config_changed() {
            link.apply_config(app.config());
        }
        app.persist_if_dirty(now, &mut nvs);

        if wifi.poll(now) {
            info!("WiFi back, controller link will reconnect on its next retry");
        }

        watchdog.feed();
        std::thread::sleep(std::time::Duration::from_millis(LOOP_SLEEP_MS));
    }
}
