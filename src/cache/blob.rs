//! Raw persistence media for serialized tiers
//!
//! A tier that must survive past a single lookup serializes its whole map
//! into one blob, the way browser storage areas hold one string per key.
//! Each blob enforces a hard byte capacity and reports overflow as
//! [`StoreError::QuotaExceeded`] so the quota manager can react to it.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::entry::CacheEntry;
use super::store::StoreError;
use crate::model::StorageKey;

const SNAPSHOT_VERSION: u32 = 1;

/// Backing medium that holds one serialized tier
pub trait BlobStorage {
    /// Current contents, `None` if nothing has been written yet
    fn load(&self) -> Result<Option<String>, StoreError>;

    /// Replace the contents; fails with `QuotaExceeded` past `capacity()`
    fn save(&mut self, contents: &str) -> Result<(), StoreError>;

    fn remove(&mut self) -> Result<(), StoreError>;

    /// Hard capacity in bytes
    fn capacity(&self) -> usize;
}

fn check_capacity(contents: &str, capacity: usize) -> Result<(), StoreError> {
    if contents.len() > capacity {
        return Err(StoreError::QuotaExceeded {
            needed: contents.len(),
            capacity,
        });
    }
    Ok(())
}

/// Process-local blob with a fixed capacity
#[derive(Debug, Clone)]
pub struct MemoryBlob {
    contents: Option<String>,
    capacity: usize,
}

impl MemoryBlob {
    pub fn new(capacity: usize) -> Self {
        Self {
            contents: None,
            capacity,
        }
    }
}

impl BlobStorage for MemoryBlob {
    fn load(&self) -> Result<Option<String>, StoreError> {
        Ok(self.contents.clone())
    }

    fn save(&mut self, contents: &str) -> Result<(), StoreError> {
        check_capacity(contents, self.capacity)?;
        self.contents = Some(contents.to_string());
        Ok(())
    }

    fn remove(&mut self) -> Result<(), StoreError> {
        self.contents = None;
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Blob stored as a single file, created on first write
#[derive(Debug, Clone)]
pub struct FileBlob {
    path: PathBuf,
    capacity: usize,
}

impl FileBlob {
    pub fn new(path: impl Into<PathBuf>, capacity: usize) -> Self {
        Self {
            path: path.into(),
            capacity,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BlobStorage for FileBlob {
    fn load(&self) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&mut self, contents: &str) -> Result<(), StoreError> {
        check_capacity(contents, self.capacity)?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, contents)?;
        Ok(())
    }

    fn remove(&mut self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn capacity(&self) -> usize {
        self.capacity
    }
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    version: u32,
    entries: BTreeMap<&'a StorageKey, &'a CacheEntry>,
}

#[derive(Deserialize)]
struct Snapshot {
    version: u32,
    #[serde(default)]
    entries: HashMap<StorageKey, CacheEntry>,
}

/// Serialize a tier's map into blob contents, ordered by key
pub fn encode_entries(entries: &HashMap<StorageKey, CacheEntry>) -> Result<String, StoreError> {
    let snapshot = SnapshotRef {
        version: SNAPSHOT_VERSION,
        entries: entries.iter().collect(),
    };
    Ok(serde_json::to_string(&snapshot)?)
}

/// Parse blob contents; a snapshot from another format version is empty
pub fn decode_entries(contents: &str) -> Result<HashMap<StorageKey, CacheEntry>, StoreError> {
    let snapshot: Snapshot = serde_json::from_str(contents)?;
    if snapshot.version != SNAPSHOT_VERSION {
        log::debug!(
            "Discarding cache snapshot with version {} (expected {})",
            snapshot.version,
            SNAPSHOT_VERSION
        );
        return Ok(HashMap::new());
    }
    Ok(snapshot.entries)
}

/// Load and decode a blob, treating unreadable or corrupt contents as empty
pub fn load_entries(blob: &dyn BlobStorage) -> HashMap<StorageKey, CacheEntry> {
    let contents = match blob.load() {
        Ok(Some(contents)) => contents,
        Ok(None) => return HashMap::new(),
        Err(e) => {
            log::warn!("Failed to read cache blob: {}", e);
            return HashMap::new();
        }
    };

    decode_entries(&contents).unwrap_or_else(|e| {
        log::warn!("Discarding corrupt cache blob: {}", e);
        HashMap::new()
    })
}
