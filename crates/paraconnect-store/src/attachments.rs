use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::params;
use uuid::Uuid;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{AttachmentStatus, PendingAttachment};

/// Key-value persistence for staged attachments, keyed by attachment id and
/// grouped by case.
pub trait AttachmentStore: Send + Sync {
    /// Insert or replace.
    fn put(&self, attachment: &PendingAttachment) -> Result<()>;
    fn get(&self, id: Uuid) -> Result<PendingAttachment>;
    /// Oldest first.
    fn list_for_case(&self, case_id: &str) -> Result<Vec<PendingAttachment>>;
    fn delete(&self, id: Uuid) -> Result<bool>;
    fn clear_case(&self, case_id: &str) -> Result<usize>;
}

const SELECT_COLUMNS: &str = "SELECT id, case_id, file_name, file_size, last_modified, mime_type,
            data, status, error, created_at
     FROM pending_attachments";

impl Database {
    pub fn upsert_attachment(&self, a: &PendingAttachment) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO pending_attachments
                (id, case_id, file_name, file_size, last_modified, mime_type, data, status, error, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                a.id.to_string(),
                a.case_id,
                a.file_name,
                a.file_size,
                a.last_modified.map(|t| t.to_rfc3339_opts(SecondsFormat::Micros, true)),
                a.mime_type,
                a.data,
                a.status.as_str(),
                a.error,
                a.created_at.to_rfc3339_opts(SecondsFormat::Micros, true),
            ],
        )?;
        Ok(())
    }

    pub fn get_attachment(&self, id: Uuid) -> Result<PendingAttachment> {
        self.conn()
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE id = ?1"),
                params![id.to_string()],
                row_to_attachment,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    pub fn list_attachments_for_case(&self, case_id: &str) -> Result<Vec<PendingAttachment>> {
        let mut stmt = self.conn().prepare(&format!(
            "{SELECT_COLUMNS} WHERE case_id = ?1 ORDER BY created_at ASC, rowid ASC"
        ))?;

        let rows = stmt.query_map(params![case_id], row_to_attachment)?;

        let mut attachments = Vec::new();
        for row in rows {
            attachments.push(row?);
        }
        Ok(attachments)
    }

    pub fn delete_attachment(&self, id: Uuid) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM pending_attachments WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(affected > 0)
    }

    pub fn delete_attachments_for_case(&self, case_id: &str) -> Result<usize> {
        let affected = self.conn().execute(
            "DELETE FROM pending_attachments WHERE case_id = ?1",
            params![case_id],
        )?;
        Ok(affected)
    }
}

fn conversion_error(
    idx: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn row_to_attachment(row: &rusqlite::Row<'_>) -> rusqlite::Result<PendingAttachment> {
    let id_str: String = row.get(0)?;
    let last_modified: Option<String> = row.get(4)?;
    let status: String = row.get(7)?;
    let created_str: String = row.get(9)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| conversion_error(0, e))?;
    let last_modified = last_modified
        .as_deref()
        .map(|raw| parse_ts(4, raw))
        .transpose()?;

    Ok(PendingAttachment {
        id,
        case_id: row.get(1)?,
        file_name: row.get(2)?,
        file_size: row.get(3)?,
        last_modified,
        mime_type: row.get(5)?,
        data: row.get(6)?,
        status: AttachmentStatus::parse(&status),
        error: row.get(8)?,
        created_at: parse_ts(9, &created_str)?,
    })
}

impl AttachmentStore for Mutex<Database> {
    fn put(&self, attachment: &PendingAttachment) -> Result<()> {
        self.lock()
            .map_err(|_| StoreError::Poisoned)?
            .upsert_attachment(attachment)
    }

    fn get(&self, id: Uuid) -> Result<PendingAttachment> {
        self.lock().map_err(|_| StoreError::Poisoned)?.get_attachment(id)
    }

    fn list_for_case(&self, case_id: &str) -> Result<Vec<PendingAttachment>> {
        self.lock()
            .map_err(|_| StoreError::Poisoned)?
            .list_attachments_for_case(case_id)
    }

    fn delete(&self, id: Uuid) -> Result<bool> {
        self.lock()
            .map_err(|_| StoreError::Poisoned)?
            .delete_attachment(id)
    }

    fn clear_case(&self, case_id: &str) -> Result<usize> {
        self.lock()
            .map_err(|_| StoreError::Poisoned)?
            .delete_attachments_for_case(case_id)
    }
}

/// Non-persistent store for tests and callers without a disk.
#[derive(Debug, Default)]
pub struct MemoryAttachmentStore {
    entries: Mutex<HashMap<Uuid, PendingAttachment>>,
}

impl MemoryAttachmentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AttachmentStore for MemoryAttachmentStore {
    fn put(&self, attachment: &PendingAttachment) -> Result<()> {
        self.entries
            .lock()
            .map_err(|_| StoreError::Poisoned)?
            .insert(attachment.id, attachment.clone());
        Ok(())
    }

    fn get(&self, id: Uuid) -> Result<PendingAttachment> {
        self.entries
            .lock()
            .map_err(|_| StoreError::Poisoned)?
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    fn list_for_case(&self, case_id: &str) -> Result<Vec<PendingAttachment>> {
        let entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        let mut found: Vec<_> = entries
            .values()
            .filter(|a| a.case_id == case_id)
            .cloned()
            .collect();
        found.sort_by_key(|a| a.created_at);
        Ok(found)
    }

    fn delete(&self, id: Uuid) -> Result<bool> {
        Ok(self
            .entries
            .lock()
            .map_err(|_| StoreError::Poisoned)?
            .remove(&id)
            .is_some())
    }

    fn clear_case(&self, case_id: &str) -> Result<usize> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        let before = entries.len();
        entries.retain(|_, a| a.case_id != case_id);
        Ok(before - entries.len())
    }
}

#[cfg(test)]
mod tests {
    use chrono::SubsecRound;

    use super::*;

    fn attachment(case_id: &str, name: &str) -> PendingAttachment {
        PendingAttachment::new(
            case_id,
            name,
            Some(Utc::now().trunc_subsecs(6)),
            Some("application/pdf".into()),
            b"%PDF-1.7".to_vec(),
        )
    }

    fn exercise(store: &dyn AttachmentStore) {
        let first = attachment("c1", "brief.pdf");
        let second = attachment("c1", "exhibit.pdf");
        let other = attachment("c2", "other.pdf");
        store.put(&first).unwrap();
        store.put(&second).unwrap();
        store.put(&other).unwrap();

        let listed = store.list_for_case("c1").unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].data, b"%PDF-1.7".to_vec());

        let mut failed = first.clone();
        failed.status = AttachmentStatus::Failed;
        failed.error = Some("HTTP 500".into());
        store.put(&failed).unwrap();
        let reread = store.get(first.id).unwrap();
        assert_eq!(reread.status, AttachmentStatus::Failed);
        assert_eq!(reread.error.as_deref(), Some("HTTP 500"));

        assert!(store.delete(second.id).unwrap());
        assert!(!store.delete(second.id).unwrap());
        assert!(matches!(store.get(second.id), Err(StoreError::NotFound)));

        assert_eq!(store.clear_case("c1").unwrap(), 1);
        assert_eq!(store.list_for_case("c2").unwrap().len(), 1);
    }

    #[test]
    fn sqlite_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("queue.db")).unwrap();
        exercise(&Mutex::new(db));
    }

    #[test]
    fn memory_store_round_trip() {
        exercise(&MemoryAttachmentStore::new());
    }

    #[test]
    fn queue_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.db");
        let staged = attachment("c1", "brief.pdf");

        {
            let db = Database::open_at(&path).unwrap();
            db.upsert_attachment(&staged).unwrap();
        }

        let db = Database::open_at(&path).unwrap();
        let restored = db.list_attachments_for_case("c1").unwrap();
        assert_eq!(restored, vec![staged]);
    }
}
