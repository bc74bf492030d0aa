//! Flash-backed persistence for config and probe records.
//!
//! Implements both [`ConfigPort`] and [`StoragePort`] on top of three blob
//! primitives (`get_blob`, `put_blob`, `erase_blob`). On ESP-IDF those go
//! through `esp_idf_svc::nvs::EspNvs`, one handle per namespace per call;
//! on the host they hit an in-memory map.
//!
//! Config is range-checked before it is written. The probe mapping lives in
//! its own namespace (see
//! [`MAPPING_NAMESPACE`](crate::sensors::mapping::MAPPING_NAMESPACE)).

use log::{info, warn};

use crate::app::ports::{ConfigError, ConfigPort, StorageError, StoragePort};
use crate::config::SystemConfig;

#[cfg(not(target_os = "espidf"))]
use std::cell::RefCell;
#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault};

const CONFIG_NAMESPACE: &str = "fluiddash";
const CONFIG_KEY: &str = "syscfg";
/// NVS keys and namespaces are limited to 15 characters.
const MAX_KEY_LEN: usize = 15;

pub struct NvsAdapter {
    /// `None` when the partition could not be brought up; every access
    /// then fails with an I/O error.
    #[cfg(target_os = "espidf")]
    partition: Option<EspDefaultNvsPartition>,
    #[cfg(not(target_os = "espidf"))]
    store: RefCell<HashMap<String, Vec<u8>>>,
}

impl NvsAdapter {
    /// Bring up the default NVS partition. A partition with no free pages
    /// or from an older IDF is erased and re-initialised by the driver.
    pub fn new() -> Result<Self, ConfigError> {
        #[cfg(target_os = "espidf")]
        {
            let partition = EspDefaultNvsPartition::take().map_err(|e| {
                warn!("NvsAdapter: partition init failed: {:?}", e);
                ConfigError::IoError
            })?;
            info!("NvsAdapter: default partition ready");
            Ok(Self {
                partition: Some(partition),
            })
        }

        #[cfg(not(target_os = "espidf"))]
        {
            info!("NvsAdapter: simulation backend");
            Ok(Self::detached())
        }
    }

    /// An adapter with no backing partition (host: an empty map).
    fn detached() -> Self {
        Self {
            #[cfg(target_os = "espidf")]
            partition: None,
            #[cfg(not(target_os = "espidf"))]
            store: RefCell::new(HashMap::new()),
        }
    }

    fn check_key(namespace: &str, key: &str) -> Result<(), StorageError> {
        if namespace.is_empty() || key.is_empty() || namespace.len() > MAX_KEY_LEN || key.len() > MAX_KEY_LEN {
            warn!("NvsAdapter: bad key '{}::{}'", namespace, key);
            return Err(StorageError::IoError);
        }
        Ok(())
    }

    // ── Blob primitives ───────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn handle(&self, namespace: &str, read_write: bool) -> Result<EspNvs<NvsDefault>, StorageError> {
        let partition = self.partition.clone().ok_or(StorageError::IoError)?;
        EspNvs::new(partition, namespace, read_write).map_err(|e| {
            warn!("NvsAdapter: open '{}' failed: {:?}", namespace, e);
            StorageError::IoError
        })
    }

    #[cfg(target_os = "espidf")]
    fn get_blob(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Self::check_key(namespace, key)?;
        // A namespace that was never written cannot be opened read-only.
        let nvs = match self.handle(namespace, false) {
            Ok(nvs) => nvs,
            Err(_) => return Ok(None),
        };
        let Some(len) = nvs.blob_len(key).map_err(|_| StorageError::IoError)? else {
            return Ok(None);
        };
        let mut buf = vec![0u8; len];
        let data = nvs.get_blob(key, &mut buf).map_err(|_| StorageError::IoError)?;
        Ok(data.map(<[u8]>::to_vec))
    }

    #[cfg(target_os = "espidf")]
    fn put_blob(&self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        Self::check_key(namespace, key)?;
        let mut nvs = self.handle(namespace, true)?;
        nvs.set_blob(key, data).map_err(|e| {
            warn!("NvsAdapter: write {}::{} failed: {:?}", namespace, key, e);
            if e.code() == esp_idf_svc::sys::ESP_ERR_NVS_NOT_ENOUGH_SPACE {
                StorageError::Full
            } else {
                StorageError::IoError
            }
        })
    }

    #[cfg(target_os = "espidf")]
    fn erase_blob(&self, namespace: &str, key: &str) -> Result<(), StorageError> {
        Self::check_key(namespace, key)?;
        let mut nvs = self.handle(namespace, true)?;
        nvs.remove(key).map(|_| ()).map_err(|_| StorageError::IoError)
    }

    #[cfg(not(target_os = "espidf"))]
    fn composite_key(namespace: &str, key: &str) -> String {
        format!("{}::{}", namespace, key)
    }

    #[cfg(not(target_os = "espidf"))]
    fn get_blob(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Self::check_key(namespace, key)?;
        Ok(self.store.borrow().get(&Self::composite_key(namespace, key)).cloned())
    }

    #[cfg(not(target_os = "espidf"))]
    fn put_blob(&self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        Self::check_key(namespace, key)?;
        self.store
            .borrow_mut()
            .insert(Self::composite_key(namespace, key), data.to_vec());
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn erase_blob(&self, namespace: &str, key: &str) -> Result<(), StorageError> {
        Self::check_key(namespace, key)?;
        self.store.borrow_mut().remove(&Self::composite_key(namespace, key));
        Ok(())
    }
}

impl Default for NvsAdapter {
    /// Falls back to a detached adapter if the partition is unavailable.
    fn default() -> Self {
        Self::new().unwrap_or_else(|_| Self::detached())
    }
}

// ───────────────────────────────────────────────────────────────
// Validation
// ───────────────────────────────────────────────────────────────

fn validate_config(cfg: &SystemConfig) -> Result<(), ConfigError> {
    let temp_range = -20.0..=120.0;
    // First failing rule wins; the message names the field for the UI.
    let rules: [(bool, &'static str); 15] = [
        (!cfg.controller_host.trim().is_empty(), "controller_host is empty"),
        (cfg.controller_port != 0, "controller_port is zero"),
        (
            (50..=10_000).contains(&cfg.status_poll_interval_ms),
            "status_poll_interval_ms outside 50..=10000",
        ),
        (
            (1000..=60_000).contains(&cfg.reconnect_interval_ms),
            "reconnect_interval_ms outside 1000..=60000",
        ),
        (
            temp_range.contains(&cfg.temp_low_c) && temp_range.contains(&cfg.temp_high_c),
            "fan curve temperatures outside -20..=120 C",
        ),
        (cfg.temp_low_c < cfg.temp_high_c, "temp_low_c not below temp_high_c"),
        (cfg.fan_max_duty <= 100, "fan_max_duty above 100"),
        (cfg.fan_min_duty <= cfg.fan_max_duty, "fan_min_duty above fan_max_duty"),
        (
            (1..=8).contains(&cfg.tach_pulses_per_rev),
            "tach_pulses_per_rev outside 1..=8",
        ),
        (
            cfg.temp_offsets_c.iter().all(|o| (-10.0..=10.0).contains(o)),
            "temperature offset outside -10..=10 C",
        ),
        (
            (750..=60_000).contains(&cfg.probe_interval_ms),
            "probe_interval_ms outside 750..=60000",
        ),
        (
            (0.1..=10.0).contains(&cfg.identify_threshold_c),
            "identify_threshold_c outside 0.1..=10",
        ),
        (
            (94..=2000).contains(&cfg.identify_settle_ms),
            "identify_settle_ms outside 94..=2000",
        ),
        (
            cfg.identify_timeout_ms >= cfg.identify_settle_ms * 2
                && cfg.identify_timeout_ms <= 300_000,
            "identify_timeout_ms shorter than two conversions or above 300000",
        ),
        (
            (0.1..=50.0).contains(&cfg.psu_voltage_cal)
                && (1..=1000).contains(&cfg.psu_sample_interval_ms),
            "PSU calibration or sample interval out of range",
        ),
    ];
    match rules.iter().find(|(ok, _)| !ok) {
        Some((_, why)) => Err(ConfigError::ValidationFailed(*why)),
        None => Ok(()),
    }
}

// ───────────────────────────────────────────────────────────────
// Ports
// ───────────────────────────────────────────────────────────────

impl ConfigPort for NvsAdapter {
    fn load(&self) -> Result<SystemConfig, ConfigError> {
        match self.get_blob(CONFIG_NAMESPACE, CONFIG_KEY) {
            Ok(Some(bytes)) => {
                let cfg = postcard::from_bytes(&bytes).map_err(|_| ConfigError::Corrupted)?;
                info!("NvsAdapter: loaded config ({} bytes)", bytes.len());
                Ok(cfg)
            }
            Ok(None) => {
                info!("NvsAdapter: no stored config, using defaults");
                Ok(SystemConfig::default())
            }
            Err(e) => {
                warn!("NvsAdapter: config read failed ({}), using defaults", e);
                Ok(SystemConfig::default())
            }
        }
    }

    fn save(&self, config: &SystemConfig) -> Result<(), ConfigError> {
        validate_config(config)?;
        let bytes = postcard::to_allocvec(config).map_err(|_| ConfigError::IoError)?;
        self.put_blob(CONFIG_NAMESPACE, CONFIG_KEY, &bytes)
            .map_err(|e| match e {
                StorageError::Full => ConfigError::StorageFull,
                _ => ConfigError::IoError,
            })?;
        info!("NvsAdapter: config saved ({} bytes)", bytes.len());
        Ok(())
    }
}

impl StoragePort for NvsAdapter {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        let data = self.get_blob(namespace, key)?.ok_or(StorageError::NotFound)?;
        let len = data.len().min(buf.len());
        buf[..len].copy_from_slice(&data[..len]);
        Ok(len)
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.put_blob(namespace, key, data)
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        self.erase_blob(namespace, key)
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        matches!(self.get_blob(namespace, key), Ok(Some(_)))
    }
}
