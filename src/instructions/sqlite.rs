use super::record::InstructionRecord;
use super::store::{InstructionStore, StoreError};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::Arc;

const COLUMNS: &str = "id, filename, content, is_binary, custom_prompt, is_checklist,
     feedback, checklist, fields, backup_url, created_at, updated_at";

/// SQLite-backed instruction store.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create {}", data_dir.display()))?;
        let db_path = data_dir.join("instructions.db");
        let conn = Connection::open(&db_path).context("Failed to open instructions.db")?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous  = NORMAL;
             PRAGMA temp_store   = MEMORY;",
        )?;

        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS instructions (
                id              TEXT PRIMARY KEY,
                filename        TEXT NOT NULL,
                content         TEXT NOT NULL,
                is_binary       INTEGER NOT NULL,
                custom_prompt   TEXT,
                is_checklist    INTEGER NOT NULL,
                feedback        TEXT,
                checklist       TEXT,
                fields          TEXT NOT NULL,
                backup_url      TEXT,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_instructions_created ON instructions(created_at);",
        )
        .context("Failed to init instruction schema")?;
        Ok(())
    }

    fn row_to_record(row: &Row) -> rusqlite::Result<InstructionRecord> {
        let checklist: Option<String> = row.get(7)?;
        let fields: String = row.get(8)?;
        Ok(InstructionRecord {
            id: row.get(0)?,
            filename: row.get(1)?,
            content: row.get(2)?,
            is_binary: row.get(3)?,
            custom_prompt: row.get(4)?,
            is_checklist: row.get(5)?,
            feedback: row.get(6)?,
            checklist: checklist
                .map(|json| serde_json::from_str(&json))
                .transpose()
                .map_err(|e| conversion(7, e))?,
            fields: serde_json::from_str(&fields).map_err(|e| conversion(8, e))?,
            backup_url: row.get(9)?,
            created_at: timestamp(row, 10)?,
            updated_at: timestamp(row, 11)?,
        })
    }
}

fn conversion<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn timestamp(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion(idx, e))
}

impl InstructionStore for SqliteStore {
    fn get(&self, id: &str) -> Result<Option<InstructionRecord>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM instructions WHERE id = ?1"))?;
        match stmt.query_row(params![id], Self::row_to_record) {
            Ok(r) => Ok(Some(r)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, record: &InstructionRecord) -> Result<(), StoreError> {
        let checklist = record
            .checklist
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let fields = serde_json::to_string(&record.fields)?;
        let conn = self.conn.lock();
        conn.execute(
            &format!(
                "INSERT OR REPLACE INTO instructions ({COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
            ),
            params![
                record.id,
                record.filename,
                record.content,
                record.is_binary,
                record.custom_prompt,
                record.is_checklist,
                record.feedback,
                checklist,
                fields,
                record.backup_url,
                record.created_at.to_rfc3339(),
                record.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let conn = self.conn.lock();
        let removed = conn.execute("DELETE FROM instructions WHERE id = ?1", params![id])?;
        Ok(removed > 0)
    }

    fn list(&self) -> Result<Vec<InstructionRecord>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM instructions ORDER BY created_at DESC, id DESC"
        ))?;
        let rows = stmt.query_map([], Self::row_to_record)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn backend(&self) -> &'static str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instructions::checklist::{self, Compliance};
    use std::collections::BTreeMap;

    fn sample(id: &str) -> InstructionRecord {
        let mut record = InstructionRecord::from_upload(
            id.into(),
            "guide.md",
            b"# Guide\nUse headings.",
            Some("Grade strictly".into()),
            true,
        );
        record.fields = BTreeMap::from([("owner".to_string(), "qa".to_string())]);
        let mut items = checklist::blank();
        items[4].compliance = Compliance::PartiallyCompliant;
        record.checklist = Some(items);
        record.backup_url = Some("https://drive.test/x".into());
        record
    }

    #[test]
    fn put_get_round_trip() {
        let store = SqliteStore::in_memory().unwrap();
        let record = sample("1700000000000");
        store.put(&record).unwrap();
        assert_eq!(store.get("1700000000000").unwrap(), Some(record));
        assert!(store.get("nope").unwrap().is_none());
    }

    #[test]
    fn put_replaces_and_delete_reports_absence() {
        let store = SqliteStore::in_memory().unwrap();
        let mut record = sample("1");
        store.put(&record).unwrap();
        record.feedback = Some("updated".into());
        store.put(&record).unwrap();

        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].feedback.as_deref(), Some("updated"));

        assert!(store.delete("1").unwrap());
        assert!(!store.delete("1").unwrap());
    }

    #[test]
    fn open_creates_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path()).unwrap();
        store.put(&sample("2")).unwrap();
        drop(store);

        let reopened = SqliteStore::open(dir.path()).unwrap();
        assert!(reopened.get("2").unwrap().is_some());
        assert!(dir.path().join("instructions.db").exists());
    }
}
