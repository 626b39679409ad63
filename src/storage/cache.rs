//! Content-hash cache
//!
//! The cache sits in `.fmtree/cache/fmtree.db` and remembers, per
//! (file, formatter), the content hash last confirmed clean together with the
//! formatter's settings fingerprint. Entries live in a sharded in-memory map
//! while a run is in flight and are written back in one transaction by
//! [`Cache::flush`].

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use thiserror::Error;

use crate::domain::{FileEntry, FormatterSpec, Root};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A (file, formatter) pair confirmed clean at a given content hash
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub path: String,
    pub formatter: String,
    pub fingerprint: String,
    pub hash: String,
    pub confirmed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct Slot {
    entry: CacheEntry,
    dirty: bool,
}

type Key = (String, String);

/// Summary of the cache contents
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub enabled: bool,
    pub path: Option<PathBuf>,
    pub entries: usize,
    pub formatters: usize,
    pub last_confirmed: Option<DateTime<Utc>>,
}

/// Content-hash cache keyed by (relative path, formatter name)
pub struct Cache {
    /// Path to the SQLite database (`None` when disabled)
    db_path: Option<PathBuf>,

    /// Database connection, used only when loading and flushing
    conn: Option<Mutex<Connection>>,

    entries: DashMap<Key, Slot>,

    /// Keys invalidated since the last flush
    removed: DashSet<Key>,
}

impl Cache {
    /// Schema version - bump when schema changes to force rebuild
    const SCHEMA_VERSION: i32 = 1;

    /// Returns the cache directory for a project
    fn dir_for(root: &Root) -> PathBuf {
        root.state_dir().join("cache")
    }

    /// Creates or opens the cache for a project
    pub fn open(root: &Root) -> Result<Self> {
        let cache_dir = Self::dir_for(root);
        let db_path = cache_dir.join("fmtree.db");

        // Ensure cache directory exists
        fs::create_dir_all(&cache_dir).with_context(|| {
            format!("Failed to create cache directory: {}", cache_dir.display())
        })?;

        let conn = Connection::open(&db_path)
            .with_context(|| format!("Failed to open cache database: {}", db_path.display()))?;

        // Enable WAL mode for better concurrent access
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(CacheError::from)?;

        let cache = Self {
            db_path: Some(db_path),
            conn: Some(Mutex::new(conn)),
            entries: DashMap::new(),
            removed: DashSet::new(),
        };

        cache.ensure_schema()?;
        cache.load()?;

        log::debug!(
            "Opened cache with {} entries at {}",
            cache.len(),
            cache.path().map(|p| p.display().to_string()).unwrap_or_default()
        );

        Ok(cache)
    }

    /// A cache that never skips and never persists
    pub fn disabled() -> Self {
        Self {
            db_path: None,
            conn: None,
            entries: DashMap::new(),
            removed: DashSet::new(),
        }
    }

    /// Returns false for [`Cache::disabled`]
    pub fn is_enabled(&self) -> bool {
        self.conn.is_some()
    }

    /// Path to the database file
    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Ensures the schema is up to date
    fn ensure_schema(&self) -> Result<()> {
        let Some(conn) = &self.conn else {
            return Ok(());
        };
        let conn = conn.lock();

        let current_version: i32 = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .optional()
            .map_err(CacheError::from)?
            .unwrap_or(0);

        if current_version != Self::SCHEMA_VERSION {
            conn.execute_batch(
                "
                DROP TABLE IF EXISTS entries;

                CREATE TABLE entries (
                    path TEXT NOT NULL,
                    formatter TEXT NOT NULL,
                    fingerprint TEXT NOT NULL,
                    hash TEXT NOT NULL,
                    confirmed_at TEXT NOT NULL,
                    PRIMARY KEY (path, formatter)
                );
                ",
            )
            .map_err(CacheError::from)?;

            conn.execute(
                &format!("PRAGMA user_version = {}", Self::SCHEMA_VERSION),
                [],
            )
            .map_err(CacheError::from)?;
        }

        Ok(())
    }

    /// Loads every persisted entry into memory
    fn load(&self) -> Result<()> {
        let Some(conn) = &self.conn else {
            return Ok(());
        };
        let conn = conn.lock();

        let mut stmt = conn
            .prepare("SELECT path, formatter, fingerprint, hash, confirmed_at FROM entries")
            .map_err(CacheError::from)?;

        let rows = stmt
            .query_map([], |row| {
                let confirmed_at: String = row.get(4)?;
                Ok(CacheEntry {
                    path: row.get(0)?,
                    formatter: row.get(1)?,
                    fingerprint: row.get(2)?,
                    hash: row.get(3)?,
                    confirmed_at: DateTime::parse_from_rfc3339(&confirmed_at)
                        .map(|t| t.with_timezone(&Utc))
                        .unwrap_or_default(),
                })
            })
            .map_err(CacheError::from)?;

        for row in rows {
            let entry = row.map_err(CacheError::from)?;
            let key = (entry.path.clone(), entry.formatter.clone());
            self.entries.insert(key, Slot { entry, dirty: false });
        }

        Ok(())
    }

    /// Returns false when `entry` is known clean for `spec`
    ///
    /// Unreadable files are always processed so the formatter reports them.
    pub fn should_process(&self, entry: &FileEntry, spec: &FormatterSpec) -> bool {
        match entry.content_hash() {
            Ok(hash) => !self.is_clean(entry.relative_path(), &hash, spec),
            Err(_) => true,
        }
    }

    /// Returns true if `path` at `hash` was confirmed clean with the same settings
    pub fn is_clean(&self, path: &str, hash: &str, spec: &FormatterSpec) -> bool {
        if !self.is_enabled() {
            return false;
        }

        self.entries
            .get(&(path.to_string(), spec.name.clone()))
            .is_some_and(|slot| slot.entry.hash == hash && slot.entry.fingerprint == spec.fingerprint())
    }

    /// Records the entry's content hash as clean for `spec`
    ///
    /// The hash is the one the entry last observed; refresh it first when a
    /// formatter has rewritten the file.
    pub fn record(&self, entry: &FileEntry, spec: &FormatterSpec) -> io::Result<()> {
        let hash = entry.content_hash()?;
        self.record_hash(entry.relative_path(), &hash, spec);
        Ok(())
    }

    /// Records `path` at `hash` as clean for `spec`
    pub fn record_hash(&self, path: &str, hash: &str, spec: &FormatterSpec) {
        if !self.is_enabled() {
            return;
        }

        let key = (path.to_string(), spec.name.clone());
        self.removed.remove(&key);
        self.entries.insert(
            key,
            Slot {
                entry: CacheEntry {
                    path: path.to_string(),
                    formatter: spec.name.clone(),
                    fingerprint: spec.fingerprint().to_string(),
                    hash: hash.to_string(),
                    confirmed_at: Utc::now(),
                },
                dirty: true,
            },
        );
    }

    /// Forgets the entry for (path, formatter)
    pub fn invalidate(&self, path: &str, formatter: &str) {
        let key = (path.to_string(), formatter.to_string());
        if self.entries.remove(&key).is_some() && self.is_enabled() {
            self.removed.insert(key);
        }
    }

    /// Returns a copy of the entry for (path, formatter)
    pub fn get(&self, path: &str, formatter: &str) -> Option<CacheEntry> {
        self.entries
            .get(&(path.to_string(), formatter.to_string()))
            .map(|slot| slot.entry.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry count, distinct formatters and the newest confirmation
    pub fn stats(&self) -> CacheStats {
        let mut formatters = std::collections::HashSet::new();
        let mut last_confirmed = None;

        for slot in self.entries.iter() {
            formatters.insert(slot.entry.formatter.clone());
            last_confirmed = last_confirmed.max(Some(slot.entry.confirmed_at));
        }

        CacheStats {
            enabled: self.is_enabled(),
            path: self.db_path.clone(),
            entries: self.entries.len(),
            formatters: formatters.len(),
            last_confirmed,
        }
    }

    /// Writes changed and invalidated entries to the database
    ///
    /// Returns the number of rows written or deleted.
    pub fn flush(&self) -> Result<usize> {
        let Some(conn) = &self.conn else {
            return Ok(0);
        };
        let mut conn = conn.lock();
        let tx = conn.transaction().map_err(CacheError::from)?;
        let mut written = 0;

        {
            let mut delete = tx
                .prepare("DELETE FROM entries WHERE path = ?1 AND formatter = ?2")
                .map_err(CacheError::from)?;
            let removed: Vec<Key> = self.removed.iter().map(|k| k.key().clone()).collect();
            for (path, formatter) in &removed {
                delete
                    .execute(params![path, formatter])
                    .map_err(CacheError::from)?;
                self.removed.remove(&(path.clone(), formatter.clone()));
                written += 1;
            }

            let mut upsert = tx
                .prepare(
                    "INSERT OR REPLACE INTO entries (path, formatter, fingerprint, hash, confirmed_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )
                .map_err(CacheError::from)?;
            for mut slot in self.entries.iter_mut() {
                if !slot.dirty {
                    continue;
                }
                let entry = &slot.entry;
                upsert
                    .execute(params![
                        entry.path,
                        entry.formatter,
                        entry.fingerprint,
                        entry.hash,
                        entry.confirmed_at.to_rfc3339(),
                    ])
                    .map_err(CacheError::from)?;
                slot.dirty = false;
                written += 1;
            }
        }

        tx.commit().map_err(CacheError::from)?;
        log::debug!("Flushed {} cache rows", written);

        Ok(written)
    }

    /// Drops every entry, in memory and on disk
    pub fn clear(&self) -> Result<()> {
        self.entries.clear();
        self.removed.clear();

        if let Some(conn) = &self.conn {
            conn.lock()
                .execute("DELETE FROM entries", [])
                .map_err(CacheError::from)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_project() -> (TempDir, Root) {
        let dir = TempDir::new().unwrap();
        let root = Root::new(dir.path());
        (dir, root)
    }

    fn spec_with(name: &str, allowed: i64) -> FormatterSpec {
        let mut settings = toml::Table::new();
        settings.insert("allowed_blank_lines".into(), toml::Value::Integer(allowed));
        FormatterSpec::builder(name, "blank-lines")
            .includes(["*"])
            .settings(settings)
            .build()
            .unwrap()
    }

    #[test]
    fn test_cache_creation() {
        let (_dir, root) = setup_project();
        let cache = Cache::open(&root).unwrap();

        assert!(cache.path().unwrap().exists());
        assert!(cache.is_empty());
    }

    #[test]
    fn unknown_file_is_processed() {
        let (dir, root) = setup_project();
        fs::write(dir.path().join("a.txt"), "x").unwrap();
        let cache = Cache::open(&root).unwrap();

        let entry = FileEntry::from_relative(&root, "a.txt");
        assert!(cache.should_process(&entry, &spec_with("t", 1)));
    }

    #[test]
    fn recorded_file_is_skipped_until_content_changes() {
        let (dir, root) = setup_project();
        fs::write(dir.path().join("a.txt"), "x").unwrap();
        let cache = Cache::open(&root).unwrap();
        let spec = spec_with("t", 1);

        let entry = FileEntry::from_relative(&root, "a.txt");
        cache.record(&entry, &spec).unwrap();
        assert!(!cache.should_process(&entry, &spec));

        fs::write(dir.path().join("a.txt"), "y").unwrap();
        let changed = FileEntry::from_relative(&root, "a.txt");
        assert!(cache.should_process(&changed, &spec));
    }

    #[test]
    fn settings_change_forces_reprocessing() {
        let (dir, root) = setup_project();
        fs::write(dir.path().join("a.txt"), "x").unwrap();
        let cache = Cache::open(&root).unwrap();

        let entry = FileEntry::from_relative(&root, "a.txt");
        cache.record(&entry, &spec_with("t", 1)).unwrap();

        assert!(!cache.should_process(&entry, &spec_with("t", 1)));
        assert!(cache.should_process(&entry, &spec_with("t", 2)));
    }

    #[test]
    fn entries_are_per_formatter() {
        let (dir, root) = setup_project();
        fs::write(dir.path().join("a.txt"), "x").unwrap();
        let cache = Cache::open(&root).unwrap();

        let entry = FileEntry::from_relative(&root, "a.txt");
        cache.record(&entry, &spec_with("one", 1)).unwrap();

        assert!(cache.should_process(&entry, &spec_with("two", 1)));
    }

    #[test]
    fn flush_persists_across_open() {
        let (dir, root) = setup_project();
        fs::write(dir.path().join("a.txt"), "x").unwrap();
        let spec = spec_with("t", 1);

        {
            let cache = Cache::open(&root).unwrap();
            cache.record(&FileEntry::from_relative(&root, "a.txt"), &spec).unwrap();
            assert_eq!(cache.flush().unwrap(), 1);
            assert_eq!(cache.flush().unwrap(), 0);
        }

        let reopened = Cache::open(&root).unwrap();
        assert_eq!(reopened.len(), 1);
        let entry = FileEntry::from_relative(&root, "a.txt");
        assert!(!reopened.should_process(&entry, &spec));
        assert_eq!(reopened.get("a.txt", "t").unwrap().hash, entry.content_hash().unwrap());
    }

    #[test]
    fn invalidate_removes_persisted_entry() {
        let (dir, root) = setup_project();
        fs::write(dir.path().join("a.txt"), "x").unwrap();
        let spec = spec_with("t", 1);

        let cache = Cache::open(&root).unwrap();
        cache.record(&FileEntry::from_relative(&root, "a.txt"), &spec).unwrap();
        cache.flush().unwrap();

        cache.invalidate("a.txt", "t");
        cache.flush().unwrap();
        drop(cache);

        assert!(Cache::open(&root).unwrap().is_empty());
    }

    #[test]
    fn clear_empties_database() {
        let (dir, root) = setup_project();
        fs::write(dir.path().join("a.txt"), "x").unwrap();

        let cache = Cache::open(&root).unwrap();
        cache
            .record(&FileEntry::from_relative(&root, "a.txt"), &spec_with("t", 1))
            .unwrap();
        cache.flush().unwrap();
        cache.clear().unwrap();
        drop(cache);

        assert!(Cache::open(&root).unwrap().is_empty());
    }

    #[test]
    fn disabled_cache_never_skips() {
        let (dir, root) = setup_project();
        fs::write(dir.path().join("a.txt"), "x").unwrap();
        let cache = Cache::disabled();
        let spec = spec_with("t", 1);

        let entry = FileEntry::from_relative(&root, "a.txt");
        cache.record(&entry, &spec).unwrap();

        assert!(cache.should_process(&entry, &spec));
        assert!(cache.is_empty());
        assert_eq!(cache.flush().unwrap(), 0);
    }

    #[test]
    fn concurrent_records_are_all_kept() {
        let (_dir, root) = setup_project();
        let cache = Cache::open(&root).unwrap();
        let spec = spec_with("t", 1);

        std::thread::scope(|scope| {
            for worker in 0..4 {
                let cache = &cache;
                let spec = &spec;
                scope.spawn(move || {
                    for i in 0..50 {
                        cache.record_hash(&format!("f{worker}-{i}"), "h", spec);
                    }
                });
            }
        });

        assert_eq!(cache.len(), 200);
        assert_eq!(cache.flush().unwrap(), 200);
    }

    #[test]
    fn stats_count_entries_and_formatters() {
        let (_dir, root) = setup_project();
        let cache = Cache::open(&root).unwrap();
        cache.record_hash("a.txt", "h1", &spec_with("one", 1));
        cache.record_hash("b.txt", "h2", &spec_with("one", 1));
        cache.record_hash("a.txt", "h1", &spec_with("two", 1));

        let stats = cache.stats();
        assert!(stats.enabled);
        assert_eq!(stats.entries, 3);
        assert_eq!(stats.formatters, 2);
        assert!(stats.last_confirmed.is_some());
    }

    #[test]
    fn test_schema_version() {
        let (_dir, root) = setup_project();
        let cache = Cache::open(&root).unwrap();

        let version: i32 = cache
            .conn
            .as_ref()
            .unwrap()
            .lock()
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, Cache::SCHEMA_VERSION);
    }
}
