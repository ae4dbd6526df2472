//! Persistent schema snapshots, one JSON record per database

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, warn};

pub const CACHE_FORMAT_VERSION: u32 = 1;
pub const DEFAULT_MAX_AGE_HOURS: u64 = 24;

fn default_version() -> u32 {
    CACHE_FORMAT_VERSION
}

/// Write-side cache failures. Unreadable records are reported as misses instead.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// On-disk snapshot of one database's schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaRecord {
    pub schema: String,
    pub table_count: usize,
    pub schema_hash: String,
    pub cached_at: String,
    #[serde(default = "default_version")]
    pub version: u32,
}

impl SchemaRecord {
    /// Capture time, accepting RFC 3339 or a naive ISO timestamp taken as UTC
    pub fn cached_at_utc(&self) -> Option<DateTime<Utc>> {
        if let Ok(timestamp) = DateTime::parse_from_rfc3339(&self.cached_at) {
            return Some(timestamp.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(&self.cached_at, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }
}

/// Lowercase hex SHA-256 of the schema text
pub fn schema_hash(schema: &str) -> String {
    hex::encode(Sha256::digest(schema.as_bytes()))
}

/// Directory of `<db>_schema.json` records under `<memory_dir>/schemas`.
#[derive(Debug, Clone)]
pub struct SchemaCache {
    dir: PathBuf,
}

impl SchemaCache {
    pub fn new(memory_dir: &Path) -> Self {
        Self {
            dir: memory_dir.join("schemas"),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, db_name: &str) -> PathBuf {
        let file_stem: String = db_name
            .chars()
            .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
            .collect();
        self.dir.join(format!("{file_stem}_schema.json"))
    }

    /// The stored record, or `None` when missing or unreadable
    pub fn get(&self, db_name: &str) -> Option<SchemaRecord> {
        let path = self.path_for(db_name);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Could not read schema cache {}: {}", path.display(), e);
                return None;
            }
        };
        match serde_json::from_str(&content) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Ignoring corrupt schema cache {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Hash, timestamp and atomically replace the record for `db_name`
    pub fn save(
        &self,
        db_name: &str,
        schema: &str,
        table_count: usize,
    ) -> Result<SchemaRecord, CacheError> {
        self.save_at(db_name, schema, table_count, Utc::now())
    }

    pub fn save_at(
        &self,
        db_name: &str,
        schema: &str,
        table_count: usize,
        now: DateTime<Utc>,
    ) -> Result<SchemaRecord, CacheError> {
        let record = SchemaRecord {
            schema: schema.to_string(),
            table_count,
            schema_hash: schema_hash(schema),
            cached_at: now.to_rfc3339(),
            version: CACHE_FORMAT_VERSION,
        };

        fs::create_dir_all(&self.dir)?;
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        serde_json::to_writer_pretty(&mut tmp, &record)?;
        tmp.flush()?;
        tmp.as_file().sync_all()?;
        let path = self.path_for(db_name);
        tmp.persist(&path).map_err(|e| CacheError::Io(e.error))?;

        debug!(
            "[SchemaCache::save] Cached schema for '{}' ({} tables, {} chars) at {}",
            db_name,
            table_count,
            schema.len(),
            path.display()
        );
        Ok(record)
    }

    /// True when the record is missing, has an unreadable timestamp, or is
    /// older than `max_age_hours`. A differing table count alone never makes
    /// a record stale.
    pub fn is_stale(
        &self,
        db_name: &str,
        current_table_count: Option<usize>,
        max_age_hours: u64,
    ) -> bool {
        self.is_stale_at(db_name, current_table_count, max_age_hours, Utc::now())
    }

    pub fn is_stale_at(
        &self,
        db_name: &str,
        current_table_count: Option<usize>,
        max_age_hours: u64,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(record) = self.get(db_name) else {
            return true;
        };
        let Some(cached_at) = record.cached_at_utc() else {
            debug!(
                "[SchemaCache::is_stale_at] Unparseable timestamp '{}' for '{}'",
                record.cached_at, db_name
            );
            return true;
        };

        if let Some(count) = current_table_count {
            if count != record.table_count {
                debug!(
                    "[SchemaCache::is_stale_at] '{}' now has {} tables, cache has {}",
                    db_name, count, record.table_count
                );
            }
        }

        let max_age = i64::try_from(max_age_hours)
            .ok()
            .and_then(TimeDelta::try_hours)
            .unwrap_or(TimeDelta::MAX);
        now.signed_duration_since(cached_at) > max_age
    }

    /// Remove the record; missing records are not an error
    pub fn clear(&self, db_name: &str) -> Result<(), CacheError> {
        match fs::remove_file(self.path_for(db_name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    fn cache() -> (TempDir, SchemaCache) {
        let dir = TempDir::new().unwrap();
        let cache = SchemaCache::new(dir.path());
        (dir, cache)
    }

    #[rstest]
    #[case("")]
    #[case("\n-- Table: users\nCREATE TABLE `users` (`id` int)")]
    #[case("CREATE TABLE `émoji` (`名前` text)")]
    fn test_save_then_get(#[case] schema: &str) {
        let (_dir, cache) = cache();
        cache.save("shop", schema, 7).unwrap();

        let record = cache.get("shop").unwrap();
        assert_eq!(record.schema, schema);
        assert_eq!(record.schema_hash, schema_hash(schema));
        assert_eq!(record.table_count, 7);
        assert_eq!(record.version, CACHE_FORMAT_VERSION);
    }

    #[rstest]
    fn test_hash_is_stable_hex_sha256() {
        assert_eq!(
            schema_hash("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(schema_hash("x"), schema_hash("x"));
    }

    #[rstest]
    fn test_record_file_layout() {
        let (dir, cache) = cache();
        cache.save("shop", "s", 1).unwrap();
        let path = dir.path().join("schemas").join("shop_schema.json");
        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        for key in ["schema", "table_count", "schema_hash", "cached_at", "version"] {
            assert!(raw.get(key).is_some(), "missing {key}");
        }
    }

    #[rstest]
    fn test_staleness_lifecycle() {
        let (_dir, cache) = cache();
        let saved_at = Utc::now();
        assert!(cache.is_stale_at("shop", None, 24, saved_at));

        cache.save_at("shop", "s", 3, saved_at).unwrap();
        assert!(!cache.is_stale("shop", Some(3), 24));
        assert!(!cache.is_stale_at("shop", None, 24, saved_at + TimeDelta::hours(23)));
        assert!(cache.is_stale_at("shop", None, 24, saved_at + TimeDelta::hours(25)));
    }

    #[rstest]
    fn test_table_count_drift_alone_is_not_stale() {
        let (_dir, cache) = cache();
        cache.save("shop", "s", 3).unwrap();
        assert!(!cache.is_stale("shop", Some(40), 24));
    }

    #[rstest]
    #[case("2020-01-01T00:00:00.123456", false)]
    #[case("not a date", true)]
    fn test_timestamp_formats(#[case] cached_at: &str, #[case] stale_now: bool) {
        let (_dir, cache) = cache();
        let record = SchemaRecord {
            schema: "s".to_string(),
            table_count: 1,
            schema_hash: schema_hash("s"),
            cached_at: cached_at.to_string(),
            version: 1,
        };
        fs::create_dir_all(cache.directory()).unwrap();
        fs::write(
            cache.path_for("legacy"),
            serde_json::to_string(&record).unwrap(),
        )
        .unwrap();

        let reference = DateTime::parse_from_rfc3339("2020-01-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(cache.is_stale_at("legacy", None, 24, reference), stale_now);
    }

    #[rstest]
    fn test_corrupt_record_reads_as_missing() {
        let (_dir, cache) = cache();
        fs::create_dir_all(cache.directory()).unwrap();
        fs::write(cache.path_for("shop"), "{ not json").unwrap();
        assert!(cache.get("shop").is_none());
        assert!(cache.is_stale("shop", None, 24));
    }

    #[rstest]
    fn test_clear() {
        let (_dir, cache) = cache();
        cache.save("shop", "s", 1).unwrap();
        cache.clear("shop").unwrap();
        assert!(cache.get("shop").is_none());
        cache.clear("shop").unwrap();
    }

    #[rstest]
    fn test_save_overwrites() {
        let (_dir, cache) = cache();
        cache.save("shop", "old", 1).unwrap();
        cache.save("shop", "new", 2).unwrap();
        let record = cache.get("shop").unwrap();
        assert_eq!(record.schema, "new");
        assert_eq!(record.table_count, 2);
    }
}
