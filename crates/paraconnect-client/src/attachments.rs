//! Attachment staging queue for the active case.
//!
//! Files are persisted the moment they are staged so a restart can still
//! send them. Uploads run one at a time; the running one can be canceled.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use chrono::{DateTime, SubsecRound, Utc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use paraconnect_shared::constants::MAX_ATTACHMENT_SIZE;
use paraconnect_shared::{CaseId, Document, DomainError};
use paraconnect_store::{AttachmentStatus, AttachmentStore, PendingAttachment};

use crate::api::{guess_mime, CaseApi, ProgressFn, UploadRequest};
use crate::error::{ClientError, Result};
use crate::events::{emit, AttachmentSummary, EventSender, WorkspaceEvent};

#[derive(Debug, Clone)]
struct QueuedAttachment {
    attachment: PendingAttachment,
    progress: u8,
}

impl QueuedAttachment {
    fn summary(&self) -> AttachmentSummary {
        AttachmentSummary {
            id: self.attachment.id,
            file_name: self.attachment.file_name.clone(),
            file_size: self.attachment.file_size,
            status: self.attachment.status.as_str().to_string(),
            progress: self.progress,
            error: self.attachment.error.clone(),
        }
    }
}

#[derive(Default)]
struct QueueInner {
    case_id: Option<CaseId>,
    entries: Vec<QueuedAttachment>,
    in_flight: Option<(Uuid, CancellationToken)>,
}

/// What a send managed to upload before stopping.
#[derive(Debug, Default)]
pub struct UploadReport {
    pub uploaded: Vec<Document>,
    pub failure: Option<ClientError>,
}

pub struct AttachmentQueue {
    store: Arc<dyn AttachmentStore>,
    inner: Arc<Mutex<QueueInner>>,
    events: EventSender,
}

fn lock(inner: &Mutex<QueueInner>) -> MutexGuard<'_, QueueInner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

impl AttachmentQueue {
    pub fn new(store: Arc<dyn AttachmentStore>, events: EventSender) -> Self {
        Self {
            store,
            inner: Arc::new(Mutex::new(QueueInner::default())),
            events,
        }
    }

    pub fn entries(&self) -> Vec<AttachmentSummary> {
        lock(&self.inner).entries.iter().map(QueuedAttachment::summary).collect()
    }

    pub fn has_sendable(&self) -> bool {
        lock(&self.inner)
            .entries
            .iter()
            .any(|e| e.attachment.status.is_sendable())
    }

    fn changed(&self) {
        let (case_id, attachments) = {
            let inner = lock(&self.inner);
            (
                inner.case_id.clone(),
                inner.entries.iter().map(QueuedAttachment::summary).collect(),
            )
        };
        if let Some(case_id) = case_id {
            emit(&self.events, WorkspaceEvent::AttachmentsChanged { case_id, attachments });
        }
    }

    /// Load the persisted queue for `case_id`. Interrupted uploads come back
    /// as pending; entries already uploaded are dropped.
    pub fn restore_pending(&self, case_id: &CaseId) -> Result<usize> {
        let mut restored = Vec::new();
        for mut attachment in self.store.list_for_case(case_id.as_str())? {
            match attachment.status {
                AttachmentStatus::Uploaded => {
                    self.store.delete(attachment.id)?;
                    continue;
                }
                AttachmentStatus::Uploading => {
                    attachment.status = AttachmentStatus::Pending;
                    self.store.put(&attachment)?;
                }
                _ => {}
            }
            restored.push(QueuedAttachment {
                attachment,
                progress: 0,
            });
        }

        let count = restored.len();
        {
            let mut inner = lock(&self.inner);
            if let Some((_, token)) = inner.in_flight.take() {
                token.cancel();
            }
            inner.case_id = Some(case_id.clone());
            inner.entries = restored;
        }
        if count > 0 {
            tracing::info!(%case_id, count, "Restored staged attachments");
        }
        self.changed();
        Ok(count)
    }

    /// Forget the in-memory queue; persisted entries stay for the next restore.
    pub fn clear(&self) {
        let mut inner = lock(&self.inner);
        if let Some((_, token)) = inner.in_flight.take() {
            token.cancel();
        }
        inner.case_id = None;
        inner.entries.clear();
    }

    fn duplicate_of(
        &self,
        file_name: &str,
        size: u64,
        last_modified: Option<DateTime<Utc>>,
    ) -> Option<AttachmentSummary> {
        lock(&self.inner)
            .entries
            .iter()
            .find(|e| {
                e.attachment.file_name == file_name
                    && e.attachment.file_size == size as i64
                    && e.attachment.last_modified == last_modified
            })
            .map(QueuedAttachment::summary)
    }

    fn check_size(file_name: &str, size: u64) -> Result<()> {
        if size > MAX_ATTACHMENT_SIZE {
            return Err(ClientError::AttachmentTooLarge {
                name: file_name.to_string(),
                size,
                limit: MAX_ATTACHMENT_SIZE,
            });
        }
        Ok(())
    }

    /// Stage a file from disk. Staging the same file (name, size and mtime)
    /// twice returns the existing entry.
    pub async fn add_file(&self, case_id: &CaseId, path: &Path, locked: bool) -> Result<AttachmentSummary> {
        if locked {
            return Err(DomainError::Locked("Attachments are disabled until the case is funded".into()).into());
        }

        let metadata = tokio::fs::metadata(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "attachment".to_string());
        let last_modified = metadata
            .modified()
            .ok()
            .map(|t| DateTime::<Utc>::from(t).trunc_subsecs(6));

        Self::check_size(&file_name, metadata.len())?;
        if let Some(existing) = self.duplicate_of(&file_name, metadata.len(), last_modified) {
            tracing::debug!(file = %file_name, "Attachment already staged");
            return Ok(existing);
        }

        let data = tokio::fs::read(path).await?;
        self.add_bytes(case_id, file_name, last_modified, data, locked)
    }

    pub fn add_bytes(
        &self,
        case_id: &CaseId,
        file_name: String,
        last_modified: Option<DateTime<Utc>>,
        data: Vec<u8>,
        locked: bool,
    ) -> Result<AttachmentSummary> {
        if locked {
            return Err(DomainError::Locked("Attachments are disabled until the case is funded".into()).into());
        }
        Self::check_size(&file_name, data.len() as u64)?;
        if let Some(existing) = self.duplicate_of(&file_name, data.len() as u64, last_modified) {
            return Ok(existing);
        }

        if lock(&self.inner).case_id.as_ref() != Some(case_id) {
            return Err(ClientError::StaleCase(case_id.clone()));
        }

        let mime = guess_mime(&file_name);
        let attachment = PendingAttachment::new(case_id.as_str(), file_name, last_modified, Some(mime), data);
        self.store.put(&attachment)?;

        let entry = QueuedAttachment {
            attachment,
            progress: 0,
        };
        let summary = entry.summary();
        lock(&self.inner).entries.push(entry);
        tracing::debug!(%case_id, file = %summary.file_name, size = summary.file_size, "Attachment staged");
        self.changed();
        Ok(summary)
    }

    /// Update one entry in memory and on disk.
    fn update(&self, id: Uuid, f: impl FnOnce(&mut QueuedAttachment)) -> Result<()> {
        let attachment = {
            let mut inner = lock(&self.inner);
            let entry = inner
                .entries
                .iter_mut()
                .find(|e| e.attachment.id == id)
                .ok_or(ClientError::AttachmentNotFound)?;
            f(entry);
            entry.attachment.clone()
        };
        self.store.put(&attachment)?;
        self.changed();
        Ok(())
    }

    pub fn remove(&self, id: Uuid) -> Result<()> {
        {
            let mut inner = lock(&self.inner);
            if inner.in_flight.as_ref().is_some_and(|(flight, _)| *flight == id) {
                if let Some((_, token)) = inner.in_flight.take() {
                    token.cancel();
                }
            }
            let before = inner.entries.len();
            inner.entries.retain(|e| e.attachment.id != id);
            if inner.entries.len() == before {
                return Err(ClientError::AttachmentNotFound);
            }
        }
        self.store.delete(id)?;
        self.changed();
        Ok(())
    }

    /// Abort the upload if it is running. The entry stays queued as
    /// canceled and is skipped by sends until [`retry`](Self::retry).
    pub fn cancel(&self, id: Uuid) -> Result<()> {
        {
            let inner = lock(&self.inner);
            if let Some((flight, token)) = inner.in_flight.as_ref() {
                if *flight == id {
                    token.cancel();
                }
            }
        }
        self.update(id, |e| {
            e.attachment.status = AttachmentStatus::Canceled;
            e.attachment.error = None;
            e.progress = 0;
        })
    }

    pub fn retry(&self, id: Uuid) -> Result<()> {
        self.update(id, |e| {
            e.attachment.status = AttachmentStatus::Pending;
            e.attachment.error = None;
            e.progress = 0;
        })
    }

    fn progress_fn(&self, case_id: &CaseId, id: Uuid) -> ProgressFn {
        let inner = Arc::clone(&self.inner);
        let events = self.events.clone();
        let case_id = case_id.clone();
        Arc::new(move |sent, total| {
            let percent = if total == 0 {
                100
            } else {
                (sent.saturating_mul(100) / total).min(100) as u8
            };
            {
                let mut inner = lock(&inner);
                match inner.entries.iter_mut().find(|e| e.attachment.id == id) {
                    Some(entry) if entry.progress != percent => entry.progress = percent,
                    _ => return,
                }
            }
            emit(
                &events,
                WorkspaceEvent::AttachmentProgress {
                    case_id: case_id.clone(),
                    id,
                    percent,
                },
            );
        })
    }

    /// Upload every sendable entry in order, one at a time. Stops at the
    /// first failure or cancellation.
    pub async fn upload_all(&self, api: &dyn CaseApi, case_id: &CaseId) -> UploadReport {
        let mut report = UploadReport::default();

        loop {
            let next = {
                let inner = lock(&self.inner);
                if inner.case_id.as_ref() != Some(case_id) {
                    report.failure = Some(ClientError::StaleCase(case_id.clone()));
                    return report;
                }
                inner
                    .entries
                    .iter()
                    .find(|e| e.attachment.status.is_sendable())
                    .map(|e| e.attachment.clone())
            };
            let Some(attachment) = next else {
                return report;
            };

            let token = CancellationToken::new();
            lock(&self.inner).in_flight = Some((attachment.id, token.clone()));
            let marked = self.update(attachment.id, |e| {
                e.attachment.status = AttachmentStatus::Uploading;
                e.attachment.error = None;
                e.progress = 0;
            });
            if let Err(e) = marked {
                report.failure = Some(e);
                return report;
            }

            let upload = UploadRequest {
                file_name: attachment.file_name.clone(),
                mime_type: attachment
                    .mime_type
                    .clone()
                    .unwrap_or_else(|| guess_mime(&attachment.file_name)),
                data: Bytes::from(attachment.data.clone()),
            };
            let progress = self.progress_fn(case_id, attachment.id);

            let outcome = tokio::select! {
                _ = token.cancelled() => Err(ClientError::Canceled),
                res = api.upload_document(case_id, upload, progress) => res,
            };
            lock(&self.inner).in_flight = None;

            match outcome {
                Ok(document) => {
                    tracing::info!(%case_id, file = %attachment.file_name, "Attachment uploaded");
                    lock(&self.inner).entries.retain(|e| e.attachment.id != attachment.id);
                    if let Err(e) = self.store.delete(attachment.id) {
                        tracing::warn!(error = %e, "Failed to drop uploaded attachment from store");
                    }
                    self.changed();
                    report.uploaded.push(document);
                }
                Err(e) => {
                    let canceled = matches!(e, ClientError::Canceled);
                    if canceled {
                        tracing::info!(%case_id, file = %attachment.file_name, "Attachment upload canceled");
                    } else {
                        tracing::warn!(%case_id, file = %attachment.file_name, error = %e, "Attachment upload failed");
                    }
                    let message = e.to_string();
                    // A removed entry is already gone; nothing to mark.
                    let _ = self.update(attachment.id, |entry| {
                        entry.progress = 0;
                        if canceled {
                            entry.attachment.status = AttachmentStatus::Canceled;
                            entry.attachment.error = None;
                        } else {
                            entry.attachment.status = AttachmentStatus::Failed;
                            entry.attachment.error = Some(message);
                        }
                    });
                    report.failure = Some(e);
                    return report;
                }
            }
        }
    }
}
