use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::model::TicketRecord;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record store failure: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("ticket {ticket_id} in {project} is not a valid record: {source}")]
    InvalidRecord {
        project: String,
        ticket_id: String,
        source: serde_json::Error,
    },
    #[error("failed to encode ticket {ticket_id}: {source}")]
    Encode {
        ticket_id: String,
        source: serde_json::Error,
    },
}

/// Key-value access to ticket records, scoped by project.
pub trait RecordStore {
    fn list(&self, project: &str) -> Result<Vec<String>, StoreError>;
    fn read(&self, project: &str, ticket_id: &str) -> Result<Option<TicketRecord>, StoreError>;
    /// Full overwrite of the stored record.
    fn write(&self, project: &str, ticket_id: &str, record: &TicketRecord)
        -> Result<(), StoreError>;
}

#[derive(Debug)]
pub struct SqliteRecordStore {
    conn: Mutex<Connection>,
}

impl SqliteRecordStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
CREATE TABLE IF NOT EXISTS tickets (
  project TEXT NOT NULL,
  ticket_id TEXT NOT NULL,
  record TEXT NOT NULL,
  updated_at TEXT NOT NULL,
  PRIMARY KEY (project, ticket_id)
);
",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl RecordStore for SqliteRecordStore {
    fn list(&self, project: &str) -> Result<Vec<String>, StoreError> {
        let conn = self.conn.lock().expect("record store mutex poisoned");
        let mut stmt =
            conn.prepare("SELECT ticket_id FROM tickets WHERE project = ?1 ORDER BY ticket_id")?;
        let ids = stmt
            .query_map(params![project], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    fn read(&self, project: &str, ticket_id: &str) -> Result<Option<TicketRecord>, StoreError> {
        let conn = self.conn.lock().expect("record store mutex poisoned");
        let raw: Option<String> = conn
            .query_row(
                "SELECT record FROM tickets WHERE project = ?1 AND ticket_id = ?2",
                params![project, ticket_id],
                |row| row.get(0),
            )
            .optional()?;

        raw.map(|raw| {
            serde_json::from_str(&raw).map_err(|source| StoreError::InvalidRecord {
                project: project.to_string(),
                ticket_id: ticket_id.to_string(),
                source,
            })
        })
        .transpose()
    }

    fn write(
        &self,
        project: &str,
        ticket_id: &str,
        record: &TicketRecord,
    ) -> Result<(), StoreError> {
        let raw = serde_json::to_string(record).map_err(|source| StoreError::Encode {
            ticket_id: ticket_id.to_string(),
            source,
        })?;
        let now = Utc::now().to_rfc3339();
        let conn = self.conn.lock().expect("record store mutex poisoned");
        conn.execute(
            "
INSERT INTO tickets(project, ticket_id, record, updated_at)
VALUES (?1, ?2, ?3, ?4)
ON CONFLICT(project, ticket_id) DO UPDATE SET
  record = excluded.record,
  updated_at = excluded.updated_at
",
            params![project, ticket_id, raw, now],
        )?;
        Ok(())
    }
}
