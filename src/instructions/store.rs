//! Instruction persistence.
//!
//! An [`InstructionStore`] is the authoritative keyed store. A
//! [`LayeredStore`] wraps one and dual-writes to any number of
//! [`MirrorPersistence`] backends on a best-effort basis; mirror failures are
//! logged and never fail the request.

use super::record::InstructionRecord;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("invalid instruction id: {0}")]
    InvalidId(String),
}

pub trait InstructionStore: Send + Sync {
    fn get(&self, id: &str) -> Result<Option<InstructionRecord>, StoreError>;

    /// Insert or replace.
    fn put(&self, record: &InstructionRecord) -> Result<(), StoreError>;

    /// Returns `false` when nothing was stored under `id`.
    fn delete(&self, id: &str) -> Result<bool, StoreError>;

    /// Newest first.
    fn list(&self) -> Result<Vec<InstructionRecord>, StoreError>;

    fn backend(&self) -> &'static str;
}

/// Secondary, best-effort copy of the store.
pub trait MirrorPersistence: Send + Sync {
    fn name(&self) -> &str;
    fn save(&self, record: &InstructionRecord) -> Result<(), StoreError>;
    fn remove(&self, id: &str) -> Result<(), StoreError>;
    fn load_all(&self) -> Result<Vec<InstructionRecord>, StoreError>;
}

fn newest_first(records: &mut [InstructionRecord]) {
    records.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
}

/// Process-local map.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, InstructionRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl InstructionStore for MemoryStore {
    fn get(&self, id: &str) -> Result<Option<InstructionRecord>, StoreError> {
        Ok(self.records.read().get(id).cloned())
    }

    fn put(&self, record: &InstructionRecord) -> Result<(), StoreError> {
        self.records
            .write()
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.records.write().remove(id).is_some())
    }

    fn list(&self) -> Result<Vec<InstructionRecord>, StoreError> {
        let mut records: Vec<_> = self.records.read().values().cloned().collect();
        newest_first(&mut records);
        Ok(records)
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

/// Paired `<id>.txt` (content) and `<id>.json` (metadata) files in one directory.
pub struct FileMirror {
    dir: PathBuf,
}

impl FileMirror {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn paths(&self, id: &str) -> Result<(PathBuf, PathBuf), StoreError> {
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(StoreError::InvalidId(id.to_string()));
        }
        Ok((
            self.dir.join(format!("{id}.txt")),
            self.dir.join(format!("{id}.json")),
        ))
    }

    fn load_one(&self, meta_path: &Path) -> Result<InstructionRecord, StoreError> {
        let raw = std::fs::read_to_string(meta_path).map_err(|source| io(meta_path, source))?;
        let mut meta: Value = serde_json::from_str(&raw)?;
        let content_path = meta_path.with_extension("txt");
        let content =
            std::fs::read_to_string(&content_path).map_err(|source| io(&content_path, source))?;
        if let Value::Object(map) = &mut meta {
            map.insert("content".into(), Value::String(content));
        }
        Ok(serde_json::from_value(meta)?)
    }
}

fn io(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl MirrorPersistence for FileMirror {
    fn name(&self) -> &str {
        "filesystem"
    }

    fn save(&self, record: &InstructionRecord) -> Result<(), StoreError> {
        let (content_path, meta_path) = self.paths(&record.id)?;
        std::fs::create_dir_all(&self.dir).map_err(|source| io(&self.dir, source))?;

        let mut meta = serde_json::to_value(record)?;
        if let Value::Object(map) = &mut meta {
            map.remove("content");
        }
        std::fs::write(&content_path, &record.content)
            .map_err(|source| io(&content_path, source))?;
        std::fs::write(&meta_path, serde_json::to_vec_pretty(&meta)?)
            .map_err(|source| io(&meta_path, source))?;
        Ok(())
    }

    fn remove(&self, id: &str) -> Result<(), StoreError> {
        let (content_path, meta_path) = self.paths(id)?;
        for path in [content_path, meta_path] {
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => return Err(io(&path, source)),
            }
        }
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<InstructionRecord>, StoreError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(io(&self.dir, source)),
        };

        let mut records = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match self.load_one(&path) {
                Ok(record) => records.push(record),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable mirror entry"),
            }
        }
        Ok(records)
    }
}

/// Authoritative store plus best-effort mirrors.
pub struct LayeredStore {
    primary: Arc<dyn InstructionStore>,
    mirrors: Vec<Arc<dyn MirrorPersistence>>,
}

impl LayeredStore {
    pub fn new(primary: Arc<dyn InstructionStore>) -> Self {
        Self {
            primary,
            mirrors: Vec::new(),
        }
    }

    pub fn with_mirror(mut self, mirror: Arc<dyn MirrorPersistence>) -> Self {
        self.mirrors.push(mirror);
        self
    }

    pub fn mirror_names(&self) -> Vec<String> {
        self.mirrors.iter().map(|m| m.name().to_string()).collect()
    }

    /// Copy mirrored records the primary does not already hold. Records
    /// already in the primary are left as they are.
    pub fn hydrate(&self) -> Result<usize, StoreError> {
        let mut restored = 0;
        for mirror in &self.mirrors {
            let records = match mirror.load_all() {
                Ok(records) => records,
                Err(e) => {
                    warn!(mirror = mirror.name(), error = %e, "Mirror load failed");
                    continue;
                }
            };
            for record in records {
                if self.primary.get(&record.id)?.is_none() {
                    self.primary.put(&record)?;
                    restored += 1;
                }
            }
        }
        if restored > 0 {
            info!(restored, "Restored instructions from mirror");
        }
        Ok(restored)
    }
}

impl InstructionStore for LayeredStore {
    fn get(&self, id: &str) -> Result<Option<InstructionRecord>, StoreError> {
        self.primary.get(id)
    }

    fn put(&self, record: &InstructionRecord) -> Result<(), StoreError> {
        self.primary.put(record)?;
        for mirror in &self.mirrors {
            match mirror.save(record) {
                Ok(()) => debug!(mirror = mirror.name(), id = %record.id, "Mirrored instruction"),
                Err(e) => warn!(mirror = mirror.name(), id = %record.id, error = %e, "Mirror write failed"),
            }
        }
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<bool, StoreError> {
        if !self.primary.delete(id)? {
            return Ok(false);
        }
        for mirror in &self.mirrors {
            if let Err(e) = mirror.remove(id) {
                warn!(mirror = mirror.name(), id, error = %e, "Mirror delete failed");
            }
        }
        Ok(true)
    }

    fn list(&self) -> Result<Vec<InstructionRecord>, StoreError> {
        self.primary.list()
    }

    fn backend(&self) -> &'static str {
        self.primary.backend()
    }
}
