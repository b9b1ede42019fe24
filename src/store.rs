//! Durable call sign → station mapping backing the enrichment cache.
//!
//! The store file is a log of JSON lines, one `{"call": .., "entry": ..}`
//! object per definitive lookup. A new entry costs one appended line. The
//! log is compacted (temp file + rename) when it holds superseded lines or
//! entries whose append failed, which happens on open and on flush.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::station::StationRecord;

/// Errors from reading or writing the store file.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Corrupt store file {path} at line {line}: {source}")]
    Json {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// A definitive lookup result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CacheEntry {
    Found(StationRecord),
    NotFound,
}

/// One line of the store file, as written.
#[derive(Serialize)]
struct LogLineRef<'a> {
    call: &'a str,
    entry: &'a CacheEntry,
}

/// One line of the store file, as read.
#[derive(Deserialize)]
struct LogLine {
    call: String,
    entry: CacheEntry,
}

/// JSON-lines station store.
#[derive(Debug)]
pub struct StationStore {
    /// `None` keeps everything in memory only.
    path: Option<PathBuf>,
    entries: BTreeMap<String, CacheEntry>,
    /// Lines currently in the file.
    log_lines: usize,
    /// Some entry failed to append and only lives in memory.
    unwritten: bool,
}

impl StationStore {
    /// Open the store at `path`, loading any existing entries.
    ///
    /// The parent directory is created if needed. A missing file is an
    /// empty store. A log with superseded lines is compacted.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        ensure_parent(&path)?;

        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
            Err(source) => return Err(StoreError::Io { path, source }),
        };

        let mut entries = BTreeMap::new();
        let mut log_lines = 0;
        for (index, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let record: LogLine =
                serde_json::from_str(line).map_err(|source| StoreError::Json {
                    path: path.clone(),
                    line: index + 1,
                    source,
                })?;
            entries.insert(record.call, record.entry);
            log_lines += 1;
        }

        info!("Opened station store {} ({} entries)", path.display(), entries.len());

        let mut store = Self {
            path: Some(path),
            entries,
            log_lines,
            unwritten: false,
        };
        store.flush()?;
        Ok(store)
    }

    /// Open the store at `path`, discarding whatever it held.
    pub fn create_fresh(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        ensure_parent(&path)?;

        let mut store = Self {
            path: Some(path),
            entries: BTreeMap::new(),
            log_lines: 0,
            unwritten: false,
        };
        store.compact()?;
        Ok(store)
    }

    /// A store that never touches the filesystem.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: BTreeMap::new(),
            log_lines: 0,
            unwritten: false,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn get(&self, call_sign: &str) -> Option<&CacheEntry> {
        self.entries.get(call_sign)
    }

    /// Record a definitive result and append it to the log.
    ///
    /// The entry stays in memory even when the write fails; the next
    /// successful flush writes it.
    pub fn insert(
        &mut self,
        call_sign: impl Into<String>,
        entry: CacheEntry,
    ) -> Result<(), StoreError> {
        let call_sign = call_sign.into();
        debug!("Storing {} ({})", call_sign, entry_kind(&entry));

        let line = serde_json::to_string(&LogLineRef {
            call: &call_sign,
            entry: &entry,
        });
        self.entries.insert(call_sign, entry);

        let Some(path) = self.path.as_ref() else {
            return Ok(());
        };
        let written = match line {
            Ok(line) => append_line(path, &line).map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            }),
            Err(source) => Err(StoreError::Json {
                path: path.clone(),
                line: self.log_lines + 1,
                source,
            }),
        };

        match written {
            Ok(()) => {
                self.log_lines += 1;
                Ok(())
            }
            Err(e) => {
                self.unwritten = true;
                Err(e)
            }
        }
    }

    /// Bring the file in line with memory, compacting if needed.
    pub fn flush(&mut self) -> Result<(), StoreError> {
        if self.unwritten || self.log_lines > self.entries.len() {
            self.compact()
        } else {
            Ok(())
        }
    }

    /// Rewrite the log with exactly one line per entry.
    fn compact(&mut self) -> Result<(), StoreError> {
        let Some(path) = self.path.as_ref() else {
            self.unwritten = false;
            return Ok(());
        };

        let mut content = String::new();
        for (index, (call, entry)) in self.entries.iter().enumerate() {
            let line = serde_json::to_string(&LogLineRef { call, entry }).map_err(|source| {
                StoreError::Json {
                    path: path.clone(),
                    line: index + 1,
                    source,
                }
            })?;
            content.push_str(&line);
            content.push('\n');
        }

        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, content).map_err(|source| StoreError::Io {
            path: temp_path.clone(),
            source,
        })?;
        fs::rename(&temp_path, path).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;

        debug!("Compacted station store to {} entries", self.entries.len());
        self.log_lines = self.entries.len();
        self.unwritten = false;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in call sign order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &CacheEntry)> {
        self.entries.iter()
    }
}

impl Drop for StationStore {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            error!("Failed to flush station store: {}", e);
        }
    }
}

fn append_line(path: &Path, line: &str) -> io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(format!("{}\n", line).as_bytes())
}

fn ensure_parent(path: &Path) -> Result<(), StoreError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        fs::create_dir_all(parent).map_err(|source| StoreError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}

fn entry_kind(entry: &CacheEntry) -> &'static str {
    match entry {
        CacheEntry::Found(_) => "found",
        CacheEntry::NotFound => "not found",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(call: &str, grid: &str) -> StationRecord {
        StationRecord {
            grid: Some(grid.to_string()),
            cq_zone: Some(5),
            ..StationRecord::new(call)
        }
    }

    #[test]
    fn test_open_missing_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let store = StationStore::open(temp.path().join("nested/stations.jsonl")).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_insert_appends_one_line() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("stations.jsonl");

        let mut store = StationStore::open(&path).unwrap();
        store
            .insert("W1AW", CacheEntry::Found(record("W1AW", "FN31")))
            .unwrap();
        let first = fs::read_to_string(&path).unwrap();
        assert_eq!(first.lines().count(), 1);
        assert!(first.contains("W1AW"));
        assert!(first.contains("FN31"));

        store.insert("ZZ9ZZZ", CacheEntry::NotFound).unwrap();
        store.insert("K1ABC", CacheEntry::NotFound).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 3);
        assert!(content.starts_with(&first));
    }

    #[test]
    fn test_superseded_lines_compacted_on_open() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("stations.jsonl");

        {
            let mut store = StationStore::open(&path).unwrap();
            store.insert("W1AW", CacheEntry::NotFound).unwrap();
            store
                .insert("W1AW", CacheEntry::Found(record("W1AW", "FN31")))
                .unwrap();
            store.insert("K1ABC", CacheEntry::NotFound).unwrap();
        }

        let store = StationStore::open(&path).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(
            store.get("W1AW"),
            Some(&CacheEntry::Found(record("W1AW", "FN31")))
        );
        assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 2);
    }

    #[test]
    fn test_failed_append_written_by_flush() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("stations.jsonl");

        let mut store = StationStore::open(&path).unwrap();
        fs::create_dir(&path).unwrap();
        assert!(matches!(
            store.insert("W1AW", CacheEntry::NotFound),
            Err(StoreError::Io { .. })
        ));
        assert_eq!(store.get("W1AW"), Some(&CacheEntry::NotFound));

        fs::remove_dir(&path).unwrap();
        store.flush().unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 1);
        assert!(content.contains("W1AW"));
    }

    #[test]
    fn test_blank_lines_ignored() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("stations.jsonl");
        fs::write(
            &path,
            "{\"call\":\"ZZ9ZZZ\",\"entry\":\"NotFound\"}\n\n",
        )
        .unwrap();

        let store = StationStore::open(&path).unwrap();
        assert_eq!(store.get("ZZ9ZZZ"), Some(&CacheEntry::NotFound));
    }

    #[test]
    fn test_store_persistence() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("stations.jsonl");

        {
            let mut store = StationStore::open(&path).unwrap();
            store
                .insert("W1AW", CacheEntry::Found(record("W1AW", "FN31")))
                .unwrap();
            store.insert("ZZ9ZZZ", CacheEntry::NotFound).unwrap();
        }

        let store = StationStore::open(&path).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(
            store.get("W1AW"),
            Some(&CacheEntry::Found(record("W1AW", "FN31")))
        );
        assert_eq!(store.get("ZZ9ZZZ"), Some(&CacheEntry::NotFound));
    }

    #[test]
    fn test_create_fresh_discards_entries() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("stations.jsonl");

        {
            let mut store = StationStore::open(&path).unwrap();
            store.insert("ZZ9ZZZ", CacheEntry::NotFound).unwrap();
        }

        let store = StationStore::create_fresh(&path).unwrap();
        assert!(store.is_empty());
        drop(store);

        let store = StationStore::open(&path).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("stations.jsonl");
        fs::write(
            &path,
            "{\"call\":\"ZZ9ZZZ\",\"entry\":\"NotFound\"}\n{not json\n",
        )
        .unwrap();

        assert!(matches!(
            StationStore::open(&path),
            Err(StoreError::Json { line: 2, .. })
        ));
    }

    #[test]
    fn test_in_memory_store() {
        let mut store = StationStore::in_memory();
        store.insert("W1AW", CacheEntry::NotFound).unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.path().is_none());
    }

    #[test]
    fn test_iter_sorted_by_call() {
        let mut store = StationStore::in_memory();
        store.insert("W1AW", CacheEntry::NotFound).unwrap();
        store.insert("K1ABC", CacheEntry::NotFound).unwrap();
        let calls: Vec<_> = store.iter().map(|(call, _)| call.as_str()).collect();
        assert_eq!(calls, vec!["K1ABC", "W1AW"]);
    }
}
