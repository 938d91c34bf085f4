//! Instruction files: records, the fixed checklist, persistence, and the
//! operations exposed over HTTP.

pub mod checklist;
pub mod record;
pub mod service;
pub mod sqlite;
pub mod store;

pub use checklist::{ChecklistItem, Compliance};
pub use record::{InstructionPatch, InstructionRecord};
pub use service::{InstructionService, NewInstruction};
pub use sqlite::SqliteStore;
pub use store::{
    FileMirror, InstructionStore, LayeredStore, MemoryStore, MirrorPersistence, StoreError,
};

use crate::config::{Config, StoreBackend};
use anyhow::Result;
use std::sync::Arc;

/// Build the configured store and restore any mirrored records into it.
pub fn open_store(config: &Config) -> Result<Arc<LayeredStore>> {
    let primary: Arc<dyn InstructionStore> = match config.instructions.backend {
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
        StoreBackend::Sqlite => Arc::new(SqliteStore::open(&config.data_dir())?),
    };
    let mut store = LayeredStore::new(primary);
    if config.instructions.mirror {
        store = store.with_mirror(Arc::new(FileMirror::new(
            config.data_dir().join("instructions"),
        )));
    }
    store.hydrate()?;
    Ok(Arc::new(store))
}
