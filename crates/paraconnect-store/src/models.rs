//! Records persisted in the local SQLite database.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Attachment status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentStatus {
    /// Queued, not yet attempted.
    Pending,
    Uploading,
    Uploaded,
    Failed,
    Canceled,
}

impl AttachmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Uploading => "uploading",
            Self::Uploaded => "uploaded",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        }
    }

    /// Unknown values read back as `Pending` so the entry stays retryable.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "uploading" => Self::Uploading,
            "uploaded" => Self::Uploaded,
            "failed" => Self::Failed,
            "canceled" | "cancelled" => Self::Canceled,
            _ => Self::Pending,
        }
    }

    /// Whether a send should (re)attempt this entry. Canceled entries wait
    /// for an explicit retry.
    pub fn is_sendable(&self) -> bool {
        matches!(self, Self::Pending | Self::Failed)
    }
}

// ---------------------------------------------------------------------------
// Pending attachment
// ---------------------------------------------------------------------------

/// A file staged for upload with the next message on a case.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingAttachment {
    /// Locally generated identifier.
    pub id: Uuid,
    /// Case the attachment belongs to.
    pub case_id: String,
    pub file_name: String,
    pub file_size: i64,
    /// Source file modification time; part of the dedup key.
    pub last_modified: Option<DateTime<Utc>>,
    pub mime_type: Option<String>,
    /// File contents, kept so a restart can still upload the file.
    #[serde(skip)]
    pub data: Vec<u8>,
    pub status: AttachmentStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PendingAttachment {
    pub fn new(
        case_id: impl Into<String>,
        file_name: impl Into<String>,
        last_modified: Option<DateTime<Utc>>,
        mime_type: Option<String>,
        data: Vec<u8>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            case_id: case_id.into(),
            file_name: file_name.into(),
            file_size: data.len() as i64,
            last_modified,
            mime_type,
            data,
            status: AttachmentStatus::Pending,
            error: None,
            // Stored with microsecond precision; keep the in-memory copy equal.
            created_at: Utc::now().trunc_subsecs(6),
        }
    }

    /// Same file as `other`: equal name, size and modification time.
    pub fn same_file(&self, other: &Self) -> bool {
        self.file_name == other.file_name
            && self.file_size == other.file_size
            && self.last_modified == other.last_modified
    }
}
