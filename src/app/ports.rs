//! Port traits — the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ AppService / TelemetryLink (domain)
//! ```
//!
//! Driven adapters (probe bus, fan, ADC, websocket, mDNS, event sinks,
//! storage) implement these traits. The domain consumes them via
//! generics, so it never touches hardware directly and every path runs
//! on the host against simulated adapters.

use crate::config::SystemConfig;

// ───────────────────────────────────────────────────────────────
// Actuator / analog ports (driven adapter: domain ↔ hardware)
// ───────────────────────────────────────────────────────────────

/// Cooling fan output and tach input.
pub trait FanPort {
    /// Command duty in percent (0–100).
    fn set_fan_duty(&mut self, percent: u8);

    /// Tach pulses since the previous call.
    fn take_tach_pulses(&mut self) -> u32;
}

/// PSU voltage-divider ADC channel.
pub trait AnalogPort {
    /// One raw 12-bit sample, or `None` if the conversion failed.
    fn read_psu_raw(&mut self) -> Option<u16>;
}

// ───────────────────────────────────────────────────────────────
// Telemetry transport (driven adapter: controller ↔ domain)
// ───────────────────────────────────────────────────────────────

/// What the transport delivered since the last drain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connected,
    Disconnected,
    Text(String),
    Binary(Vec<u8>),
    Error(TransportError),
}

/// A message-oriented connection to the controller (websocket on device).
///
/// `open()` only starts connecting; completion arrives later as
/// [`TransportEvent::Connected`] from [`next_event`](Self::next_event).
pub trait LinkTransport {
    fn open(&mut self, url: &str) -> Result<(), TransportError>;

    /// Tear down any connection or pending attempt. Idempotent.
    fn close(&mut self);

    fn send_text(&mut self, text: &str) -> Result<(), TransportError>;

    /// Non-blocking; `None` when nothing is queued.
    fn next_event(&mut self) -> Option<TransportEvent>;
}

/// One resolved service instance from a discovery query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRecord {
    pub hostname: String,
    /// Dotted IPv4 address to connect to.
    pub address: String,
    pub port: u16,
}

/// Network service discovery (mDNS on device).
pub trait ServiceBrowser {
    /// Look up `service`/`proto` (e.g. `_http`, `_tcp`), waiting at most
    /// `timeout_ms`. An empty list means nothing answered.
    fn browse(&mut self, service: &str, proto: &str, timeout_ms: u32) -> Vec<ServiceRecord>;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port. Adapters decide where they go (serial log, a
/// display task, a web socket push, etc.).
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists system configuration.
///
/// Implementations MUST validate config values before persisting.
/// Invalid ranges are rejected with [`ConfigError::ValidationFailed`],
/// not silently clamped.
pub trait ConfigPort {
    /// Load configuration from persistent storage.
    /// Returns [`SystemConfig::default()`] if no stored config exists.
    fn load(&self) -> Result<SystemConfig, ConfigError>;

    /// Validate and persist configuration.
    fn save(&self, config: &SystemConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: domain ↔ NVS / flash)
// ───────────────────────────────────────────────────────────────

/// Persistent key-value storage. Keys are namespaced per subsystem.
///
/// Write operations MUST be atomic: no partial writes on power loss.
pub trait StoragePort {
    /// Read a value. Returns the number of bytes written to `buf`.
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Write a value atomically.
    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Delete a key. Returns `Ok(())` even if the key didn't exist.
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError>;

    /// Check whether a key exists without reading it.
    fn exists(&self, namespace: &str, key: &str) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`ConfigPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// No config found in storage (first boot).
    NotFound,
    /// Stored config failed integrity / deserialization check.
    Corrupted,
    /// A config field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
    /// Underlying storage is full.
    StorageFull,
    /// Generic I/O error from the storage backend.
    IoError,
}

/// Errors from [`StoragePort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested key does not exist.
    NotFound,
    /// Storage partition is full.
    Full,
    /// Generic I/O error.
    IoError,
}

/// Errors from [`LinkTransport`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// The client could not be created or the URL was rejected.
    OpenFailed,
    SendFailed,
    NotConnected,
    /// The peer or the stack reported a protocol error.
    Protocol,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "config not found"),
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::StorageFull => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl core::fmt::Display for TransportError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::OpenFailed => write!(f, "open failed"),
            Self::SendFailed => write!(f, "send failed"),
            Self::NotConnected => write!(f, "not connected"),
            Self::Protocol => write!(f, "protocol error"),
        }
    }
}

impl From<ConfigError> for crate::error::Error {
    fn from(e: ConfigError) -> Self {
        match e {
            ConfigError::ValidationFailed(msg) => Self::Config(msg),
            ConfigError::StorageFull => Self::Storage(crate::error::StorageFailure::Full),
            ConfigError::Corrupted => Self::Storage(crate::error::StorageFailure::Codec),
            ConfigError::NotFound | ConfigError::IoError => {
                Self::Storage(crate::error::StorageFailure::Io)
            }
        }
    }
}

impl From<TransportError> for crate::error::LinkError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::OpenFailed | TransportError::Protocol => Self::ConnectFailed,
            TransportError::SendFailed => Self::SendFailed,
            TransportError::NotConnected => Self::NotConnected,
        }
    }
}
