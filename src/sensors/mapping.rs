//! Probe identity table: uid ↔ logical role bindings.
//!
//! Persisted through [`StoragePort`] as count-prefixed indexed records in
//! the `probes` namespace:
//!
//! ```text
//!   probes::count  → u8 number of records
//!   probes::p0 .. probes::p15 → postcard(ProbeIdentity)
//! ```
//!
//! `load` walks every index below the stored count and skips a missing or
//! corrupt record instead of stopping, so a hole in the middle never hides
//! the records after it.

use core::fmt;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use super::MAX_PROBES;
use super::uid::ProbeUid;
use crate::app::ports::{StorageError, StoragePort};
use crate::error::StorageFailure;
use crate::util::bounded;

pub const MAPPING_NAMESPACE: &str = "probes";
const COUNT_KEY: &str = "count";
const RECORD_BUF_LEN: usize = 192;

// ───────────────────────────────────────────────────────────────
// Roles
// ───────────────────────────────────────────────────────────────

/// Logical measurement slot a probe can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    XAxis,
    YLeft,
    YRight,
    ZAxis,
}

impl Role {
    pub const COUNT: usize = 4;
    pub const ALL: [Role; Role::COUNT] = [Role::XAxis, Role::YLeft, Role::YRight, Role::ZAxis];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Role> {
        Self::ALL.get(index).copied()
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::XAxis => "X-Axis",
            Self::YLeft => "Y-Left",
            Self::YRight => "Y-Right",
            Self::ZAxis => "Z-Axis",
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Records
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeIdentity {
    pub uid: ProbeUid,
    pub role: Option<Role>,
    pub name: heapless::String<32>,
    pub alias: heapless::String<16>,
    pub enabled: bool,
    pub notes: heapless::String<64>,
}

impl ProbeIdentity {
    fn new(uid: ProbeUid, name: &str, alias: &str) -> Self {
        Self {
            uid,
            role: None,
            name: bounded(name),
            alias: bounded(alias),
            enabled: true,
            notes: heapless::String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingError {
    /// The table already holds `MAX_PROBES` records.
    Full,
    EmptyName,
    EmptyAlias,
    /// Another probe already uses this alias.
    AliasTaken,
    UnknownUid,
    Storage(StorageFailure),
}

impl fmt::Display for MappingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => write!(f, "probe table full ({} entries)", MAX_PROBES),
            Self::EmptyName => write!(f, "name is required"),
            Self::EmptyAlias => write!(f, "alias is required"),
            Self::AliasTaken => write!(f, "alias already in use"),
            Self::UnknownUid => write!(f, "no probe with that uid"),
            Self::Storage(e) => write!(f, "storage: {}", e),
        }
    }
}

impl From<MappingError> for crate::error::Error {
    fn from(e: MappingError) -> Self {
        match e {
            MappingError::Storage(s) => Self::Storage(s),
            MappingError::Full => Self::Storage(StorageFailure::Full),
            MappingError::EmptyName => Self::Config("probe name is required"),
            MappingError::EmptyAlias => Self::Config("probe alias is required"),
            MappingError::AliasTaken => Self::Config("probe alias already in use"),
            MappingError::UnknownUid => Self::Config("unknown probe uid"),
        }
    }
}

fn record_key(index: usize) -> heapless::String<8> {
    let mut key = heapless::String::new();
    use core::fmt::Write;
    let _ = write!(key, "p{}", index);
    key
}

// ───────────────────────────────────────────────────────────────
// MappingStore
// ───────────────────────────────────────────────────────────────

/// Owned table of known probes. At most one record holds each role.
#[derive(Debug, Default)]
pub struct MappingStore {
    records: heapless::Vec<ProbeIdentity, MAX_PROBES>,
}

impl MappingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProbeIdentity> {
        self.records.iter()
    }

    pub fn by_uid(&self, uid: &ProbeUid) -> Option<&ProbeIdentity> {
        self.records.iter().find(|r| r.uid == *uid)
    }

    fn by_uid_mut(&mut self, uid: &ProbeUid) -> Option<&mut ProbeIdentity> {
        self.records.iter_mut().find(|r| r.uid == *uid)
    }

    pub fn by_role(&self, role: Role) -> Option<&ProbeIdentity> {
        self.records.iter().find(|r| r.role == Some(role))
    }

    pub fn by_alias(&self, alias: &str) -> Option<&ProbeIdentity> {
        self.records.iter().find(|r| r.alias.as_str() == alias)
    }

    /// True if any record is bound to a role.
    pub fn has_role_assignments(&self) -> bool {
        self.records.iter().any(|r| r.role.is_some())
    }

    fn alias_taken_by_other(&self, uid: &ProbeUid, alias: &str) -> bool {
        self.records
            .iter()
            .any(|r| r.uid != *uid && r.alias.as_str() == alias)
    }

    /// Update the record for `uid`, or append a new one.
    pub fn upsert(&mut self, uid: ProbeUid, name: &str, alias: &str) -> Result<(), MappingError> {
        let name = name.trim();
        let alias = alias.trim();
        if name.is_empty() {
            return Err(MappingError::EmptyName);
        }
        if alias.is_empty() {
            return Err(MappingError::EmptyAlias);
        }
        if self.alias_taken_by_other(&uid, alias) {
            return Err(MappingError::AliasTaken);
        }

        if let Some(rec) = self.by_uid_mut(&uid) {
            rec.name = bounded(name);
            rec.alias = bounded(alias);
            return Ok(());
        }
        self.records
            .push(ProbeIdentity::new(uid, name, alias))
            .map_err(|_| MappingError::Full)
    }

    pub fn set_notes(&mut self, uid: &ProbeUid, notes: &str) -> Result<(), MappingError> {
        let rec = self.by_uid_mut(uid).ok_or(MappingError::UnknownUid)?;
        rec.notes = bounded(notes);
        Ok(())
    }

    pub fn set_enabled(&mut self, uid: &ProbeUid, enabled: bool) -> Result<(), MappingError> {
        let rec = self.by_uid_mut(uid).ok_or(MappingError::UnknownUid)?;
        rec.enabled = enabled;
        Ok(())
    }

    /// Bind `role` to `uid`, taking it away from whichever record held it.
    /// An unknown uid gets a new record named after the role.
    pub fn assign_role(&mut self, uid: ProbeUid, role: Role) -> Result<(), MappingError> {
        if self.by_uid(&uid).is_none() {
            let mut alias: heapless::String<16> = heapless::String::new();
            use core::fmt::Write;
            let _ = write!(alias, "t{}", role.index());
            if self.alias_taken_by_other(&uid, &alias) {
                alias = bounded(&uid.to_hex());
            }
            self.records
                .push(ProbeIdentity::new(uid, role.label(), &alias))
                .map_err(|_| MappingError::Full)?;
        }

        for rec in self.records.iter_mut() {
            if rec.role == Some(role) && rec.uid != uid {
                info!("MappingStore: {} released {}", rec.uid, role.label());
                rec.role = None;
            }
        }
        if let Some(rec) = self.by_uid_mut(&uid) {
            rec.role = Some(role);
        }
        info!("MappingStore: {} -> {}", uid, role.label());
        Ok(())
    }

    /// Unbind `role`. Returns `true` if a record held it.
    pub fn clear_role(&mut self, role: Role) -> bool {
        match self.records.iter_mut().find(|r| r.role == Some(role)) {
            Some(rec) => {
                rec.role = None;
                true
            }
            None => false,
        }
    }

    /// Delete the record with `alias`. Returns `true` if one was removed.
    pub fn remove(&mut self, alias: &str) -> bool {
        match self.records.iter().position(|r| r.alias.as_str() == alias) {
            Some(pos) => {
                self.records.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Add default records for uids seen on the bus for the first time.
    /// Returns how many were added.
    pub fn record_discovered(&mut self, uids: &[ProbeUid]) -> usize {
        let mut added = 0;
        for uid in uids {
            if self.by_uid(uid).is_some() {
                continue;
            }
            let tag = uid.short_tag();
            let mut name: heapless::String<32> = heapless::String::new();
            use core::fmt::Write;
            let _ = write!(name, "Sensor {}", tag);
            let alias = if self.alias_taken_by_other(uid, &tag) {
                uid.to_hex()
            } else {
                bounded(&tag)
            };
            if self.records.push(ProbeIdentity::new(*uid, &name, &alias)).is_err() {
                warn!("MappingStore: table full, {} not recorded", uid);
                break;
            }
            added += 1;
        }
        added
    }

    // ── Persistence ───────────────────────────────────────────

    /// Replace the table with the persisted one. Returns the record count.
    pub fn load(&mut self, storage: &impl StoragePort) -> Result<usize, MappingError> {
        self.records.clear();

        let mut count_buf = [0u8; 1];
        let count = match storage.read(MAPPING_NAMESPACE, COUNT_KEY, &mut count_buf) {
            Ok(1) => usize::from(count_buf[0]),
            Ok(_) => return Err(MappingError::Storage(StorageFailure::Codec)),
            Err(StorageError::NotFound) => {
                info!("MappingStore: no stored probe table");
                return Ok(0);
            }
            Err(e) => {
                warn!("MappingStore: count read failed: {}", e);
                return Err(MappingError::Storage(StorageFailure::Io));
            }
        };

        let mut buf = [0u8; RECORD_BUF_LEN];
        for index in 0..count.min(MAX_PROBES) {
            let key = record_key(index);
            let len = match storage.read(MAPPING_NAMESPACE, &key, &mut buf) {
                Ok(len) => len,
                Err(e) => {
                    warn!("MappingStore: record {} unreadable ({}), skipping", index, e);
                    continue;
                }
            };
            let mut rec: ProbeIdentity = match postcard::from_bytes(&buf[..len]) {
                Ok(rec) => rec,
                Err(_) => {
                    warn!("MappingStore: record {} corrupt, skipping", index);
                    continue;
                }
            };
            if self.by_uid(&rec.uid).is_some() {
                warn!("MappingStore: duplicate {} at record {}, skipping", rec.uid, index);
                continue;
            }
            if let Some(role) = rec.role {
                if self.by_role(role).is_some() {
                    warn!("MappingStore: {} already bound, clearing on {}", role.label(), rec.uid);
                    rec.role = None;
                }
            }
            if self.records.push(rec).is_err() {
                break;
            }
        }

        info!("MappingStore: loaded {} of {} record(s)", self.records.len(), count);
        Ok(self.records.len())
    }

    /// Persist the table: records first, then the count, then stale indices.
    pub fn save(&self, storage: &mut impl StoragePort) -> Result<(), MappingError> {
        let mut count_buf = [0u8; 1];
        let previous = match storage.read(MAPPING_NAMESPACE, COUNT_KEY, &mut count_buf) {
            Ok(1) => usize::from(count_buf[0]),
            _ => 0,
        };

        let mut buf = [0u8; RECORD_BUF_LEN];
        for (index, rec) in self.records.iter().enumerate() {
            let bytes = postcard::to_slice(rec, &mut buf)
                .map_err(|_| MappingError::Storage(StorageFailure::Codec))?;
            storage
                .write(MAPPING_NAMESPACE, &record_key(index), bytes)
                .map_err(|_| MappingError::Storage(StorageFailure::Io))?;
        }

        let count = self.records.len();
        storage
            .write(MAPPING_NAMESPACE, COUNT_KEY, &[count as u8])
            .map_err(|_| MappingError::Storage(StorageFailure::Io))?;

        for index in count..previous.min(MAX_PROBES) {
            if let Err(e) = storage.delete(MAPPING_NAMESPACE, &record_key(index)) {
                warn!("MappingStore: stale record {} not deleted: {}", index, e);
            }
        }

        info!("MappingStore: saved {} record(s)", count);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::nvs::NvsAdapter;
    use crate::sensors::uid::FAMILY_DS18B20;

    fn uid(n: u8) -> ProbeUid {
        ProbeUid::from_serial(FAMILY_DS18B20, [n, 1, 2, 3, 4, 5])
    }

    #[test]
    fn upsert_twice_keeps_one_record() {
        let mut store = MappingStore::new();
        store.upsert(uid(1), "Spindle", "sp").unwrap();
        store.upsert(uid(1), "Spindle", "sp").unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn upsert_updates_existing_name() {
        let mut store = MappingStore::new();
        store.upsert(uid(1), "Old", "a").unwrap();
        store.upsert(uid(1), "New", "b").unwrap();
        let rec = store.by_uid(&uid(1)).unwrap();
        assert_eq!(rec.name.as_str(), "New");
        assert_eq!(rec.alias.as_str(), "b");
    }

    #[test]
    fn upsert_validates_fields() {
        let mut store = MappingStore::new();
        assert_eq!(store.upsert(uid(1), " ", "a"), Err(MappingError::EmptyName));
        assert_eq!(store.upsert(uid(1), "n", ""), Err(MappingError::EmptyAlias));
        store.upsert(uid(1), "n", "a").unwrap();
        assert_eq!(store.upsert(uid(2), "m", "a"), Err(MappingError::AliasTaken));
    }

    #[test]
    fn upsert_fails_when_full() {
        let mut store = MappingStore::new();
        for n in 0..MAX_PROBES as u8 {
            let alias = record_key(n as usize);
            store.upsert(uid(n), "p", &alias).unwrap();
        }
        assert_eq!(store.upsert(uid(200), "p", "extra"), Err(MappingError::Full));
    }

    #[test]
    fn assign_role_is_exclusive() {
        let mut store = MappingStore::new();
        store.assign_role(uid(1), Role::XAxis).unwrap();
        store.assign_role(uid(2), Role::XAxis).unwrap();
        assert_eq!(store.by_uid(&uid(1)).unwrap().role, None);
        assert_eq!(store.by_uid(&uid(2)).unwrap().role, Some(Role::XAxis));
        assert_eq!(store.by_role(Role::XAxis).unwrap().uid, uid(2));
    }

    #[test]
    fn assign_role_creates_named_record() {
        let mut store = MappingStore::new();
        store.assign_role(uid(7), Role::ZAxis).unwrap();
        let rec = store.by_uid(&uid(7)).unwrap();
        assert_eq!(rec.name.as_str(), "Z-Axis");
        assert_eq!(rec.alias.as_str(), "t3");
        assert!(rec.enabled);
    }

    #[test]
    fn clear_role_keeps_record() {
        let mut store = MappingStore::new();
        store.assign_role(uid(1), Role::YLeft).unwrap();
        assert!(store.clear_role(Role::YLeft));
        assert!(!store.clear_role(Role::YLeft));
        assert_eq!(store.len(), 1);
        assert!(!store.has_role_assignments());
    }

    #[test]
    fn remove_by_alias() {
        let mut store = MappingStore::new();
        store.upsert(uid(1), "n", "a").unwrap();
        assert!(store.remove("a"));
        assert!(!store.remove("a"));
        assert!(store.is_empty());
    }

    #[test]
    fn record_discovered_adds_only_new_uids() {
        let mut store = MappingStore::new();
        store.upsert(uid(1), "Known", "k").unwrap();
        assert_eq!(store.record_discovered(&[uid(1), uid(2)]), 1);
        let rec = store.by_uid(&uid(2)).unwrap();
        assert!(rec.name.starts_with("Sensor "));
        assert_eq!(rec.role, None);
        assert_eq!(store.record_discovered(&[uid(1), uid(2)]), 0);
    }

    #[test]
    fn save_load_roundtrip() {
        let mut nvs = NvsAdapter::new().unwrap();
        let mut store = MappingStore::new();
        store.upsert(uid(1), "Left rail", "yl").unwrap();
        store.assign_role(uid(1), Role::YLeft).unwrap();
        store.set_notes(&uid(1), "behind drag chain").unwrap();
        store.assign_role(uid(2), Role::ZAxis).unwrap();
        store.set_enabled(&uid(2), false).unwrap();
        store.save(&mut nvs).unwrap();

        let mut loaded = MappingStore::new();
        assert_eq!(loaded.load(&nvs).unwrap(), 2);
        let rec = loaded.by_role(Role::YLeft).unwrap();
        assert_eq!(rec.uid, uid(1));
        assert_eq!(rec.notes.as_str(), "behind drag chain");
        assert!(!loaded.by_uid(&uid(2)).unwrap().enabled);
    }

    #[test]
    fn load_skips_missing_middle_record() {
        let mut nvs = NvsAdapter::new().unwrap();
        let mut store = MappingStore::new();
        for n in 0..3u8 {
            store.upsert(uid(n), "p", &record_key(n as usize)).unwrap();
        }
        store.save(&mut nvs).unwrap();
        nvs.delete(MAPPING_NAMESPACE, "p1").unwrap();

        let mut loaded = MappingStore::new();
        assert_eq!(loaded.load(&nvs).unwrap(), 2);
        assert!(loaded.by_uid(&uid(0)).is_some());
        assert!(loaded.by_uid(&uid(2)).is_some());
    }

    #[test]
    fn save_deletes_stale_indices() {
        let mut nvs = NvsAdapter::new().unwrap();
        let mut store = MappingStore::new();
        store.upsert(uid(1), "a", "a").unwrap();
        store.upsert(uid(2), "b", "b").unwrap();
        store.save(&mut nvs).unwrap();
        assert!(store.remove("b"));
        store.save(&mut nvs).unwrap();
        assert!(!nvs.exists(MAPPING_NAMESPACE, "p1"));
    }

    #[test]
    fn load_without_table_is_empty() {
        let nvs = NvsAdapter::new().unwrap();
        let mut store = MappingStore::new();
        assert_eq!(store.load(&nvs).unwrap(), 0);
    }

    #[test]
    fn load_repairs_duplicate_roles() {
        let mut nvs = NvsAdapter::new().unwrap();
        let mut a = ProbeIdentity::new(uid(1), "a", "a");
        a.role = Some(Role::XAxis);
        let mut b = ProbeIdentity::new(uid(2), "b", "b");
        b.role = Some(Role::XAxis);
        let bytes_a = postcard::to_allocvec(&a).unwrap();
        let bytes_b = postcard::to_allocvec(&b).unwrap();
        nvs.write(MAPPING_NAMESPACE, "p0", &bytes_a).unwrap();
        nvs.write(MAPPING_NAMESPACE, "p1", &bytes_b).unwrap();
        nvs.write(MAPPING_NAMESPACE, COUNT_KEY, &[2]).unwrap();

        let mut store = MappingStore::new();
        store.load(&nvs).unwrap();
        assert_eq!(store.by_role(Role::XAxis).unwrap().uid, uid(1));
        assert_eq!(store.by_uid(&uid(2)).unwrap().role, None);
    }
}
