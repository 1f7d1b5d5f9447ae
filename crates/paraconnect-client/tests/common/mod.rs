#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::json;
use tokio::sync::Notify;

use paraconnect_client::{CaseApi, ClientConfig, ClientError, ProgressFn, Result, UploadRequest};
use paraconnect_shared::{
    Application, Case, CaseId, CurrentUser, Document, DocumentStatus, Message, Role, Task, Viewer,
};

pub const ATTORNEY: &str = "att1";
pub const PARALEGAL: &str = "para1";

pub fn attorney() -> Viewer {
    Viewer::new(ATTORNEY, Role::Attorney)
}

pub fn paralegal() -> Viewer {
    Viewer::new(PARALEGAL, Role::Paralegal)
}

pub fn funded_case(id: &str) -> Case {
    serde_json::from_value(json!({
        "_id": id,
        "title": "Discovery review",
        "status": "in progress",
        "escrowStatus": "funded",
        "escrowIntentId": "pi_1",
        "attorney": ATTORNEY,
        "paralegal": PARALEGAL,
        "lockedTotalAmount": 50000,
        "tasks": [
            { "title": "Draft memo", "completed": false },
            { "title": "File motion", "completed": false }
        ]
    }))
    .unwrap()
}

pub fn open_case(id: &str) -> Case {
    serde_json::from_value(json!({
        "_id": id,
        "title": "Unfunded matter",
        "status": "open",
        "attorney": ATTORNEY,
        "tasks": []
    }))
    .unwrap()
}

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

pub fn message(id: &str, text: &str, secs: i64) -> Message {
    Message {
        id: Some(id.into()),
        text: Some(text.into()),
        created_at: Some(at(secs)),
        ..Default::default()
    }
}

pub fn document(id: &str, name: &str) -> Document {
    Document {
        id: Some(id.into()),
        original_name: Some(name.into()),
        created_at: Some(at(0)),
        ..Default::default()
    }
}

pub fn test_config() -> ClientConfig {
    ClientConfig {
        poll_interval: Duration::from_millis(50),
        stream_retry: Duration::from_millis(50),
        realtime: false,
        ..ClientConfig::default()
    }
}

/// Blocks one call until released.
#[derive(Default)]
pub struct Hold {
    pub entered: Notify,
    pub release: Notify,
}

/// In-memory `CaseApi` with call counting, injectable failures and holds.
#[derive(Default)]
pub struct FakeApi {
    pub cases: Mutex<HashMap<String, Case>>,
    pub messages: Mutex<HashMap<String, Vec<Message>>>,
    pub documents: Mutex<HashMap<String, Vec<Document>>>,
    pub calls: Mutex<Vec<String>>,
    pub failing: Mutex<HashSet<&'static str>>,
    /// One-shot holds keyed by call name.
    pub holds: Mutex<HashMap<&'static str, Arc<Hold>>>,
    pub mark_reads: Mutex<Vec<DateTime<Utc>>>,
    pub posted: Mutex<Vec<String>>,
    pub task_updates: Mutex<Vec<Vec<Task>>>,
    pub uploads: Mutex<Vec<String>>,
    /// Bodies served by successive `open_stream` calls; empty means the
    /// stream endpoint is down.
    pub streams: Mutex<VecDeque<Vec<&'static str>>>,
}

impl FakeApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_case(self: &Arc<Self>, case: Case) -> Arc<Self> {
        let id = case.case_id().unwrap().0;
        self.cases.lock().unwrap().insert(id, case);
        Arc::clone(self)
    }

    pub fn set_messages(&self, case_id: &str, messages: Vec<Message>) {
        self.messages.lock().unwrap().insert(case_id.into(), messages);
    }

    pub fn set_documents(&self, case_id: &str, documents: Vec<Document>) {
        self.documents.lock().unwrap().insert(case_id.into(), documents);
    }

    pub fn fail(&self, call: &'static str) {
        self.failing.lock().unwrap().insert(call);
    }

    /// Block the next `call` until the returned hold is released.
    pub fn hold(&self, call: &'static str) -> Arc<Hold> {
        let hold = Arc::new(Hold::default());
        self.holds.lock().unwrap().insert(call, hold.clone());
        hold
    }

    pub fn hold_messages(&self) -> Arc<Hold> {
        self.hold("list_messages")
    }

    pub fn hold_uploads(&self) -> Arc<Hold> {
        self.hold("upload_document")
    }

    async fn pause(&self, call: &'static str) {
        let hold = self.holds.lock().unwrap().remove(call);
        if let Some(hold) = hold {
            hold.entered.notify_one();
            hold.release.notified().await;
        }
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == call).count()
    }

    fn record(&self, call: &'static str) -> Result<()> {
        self.calls.lock().unwrap().push(call.to_string());
        if self.failing.lock().unwrap().contains(call) {
            return Err(ClientError::Status {
                status: 409,
                message: "Server says no".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl CaseApi for FakeApi {
    async fn current_user(&self) -> Result<CurrentUser> {
        self.record("current_user")?;
        Ok(CurrentUser {
            id: Some(ATTORNEY.into()),
            role: "attorney".into(),
            ..Default::default()
        })
    }

    async fn my_applications(&self) -> Result<Vec<Application>> {
        self.record("my_applications")?;
        Ok(Vec::new())
    }

    async fn get_case(&self, case_id: &CaseId) -> Result<Case> {
        self.record("get_case")?;
        self.pause("get_case").await;
        self.cases
            .lock()
            .unwrap()
            .get(case_id.as_str())
            .cloned()
            .ok_or(ClientError::Status {
                status: 404,
                message: "Case not found".into(),
            })
    }

    async fn update_tasks(&self, _case_id: &CaseId, tasks: &[Task]) -> Result<()> {
        self.record("update_tasks")?;
        self.task_updates.lock().unwrap().push(tasks.to_vec());
        Ok(())
    }

    async fn complete_case(&self, _case_id: &CaseId) -> Result<()> {
        self.record("complete_case")
    }

    async fn withdraw(&self, _case_id: &CaseId) -> Result<()> {
        self.record("withdraw")
    }

    async fn partial_payout(&self, _case_id: &CaseId, _amount_cents: i64) -> Result<()> {
        self.record("partial_payout")
    }

    async fn reject_payout(&self, _case_id: &CaseId) -> Result<()> {
        self.record("reject_payout")
    }

    async fn relist(&self, _case_id: &CaseId) -> Result<()> {
        self.record("relist")
    }

    async fn open_dispute(&self, _case_id: &CaseId, _message: &str) -> Result<()> {
        self.record("open_dispute")
    }

    async fn list_messages(&self, case_id: &CaseId) -> Result<Vec<Message>> {
        self.record("list_messages")?;
        // Snapshot before holding so the result reflects the call time.
        let messages = self
            .messages
            .lock()
            .unwrap()
            .get(case_id.as_str())
            .cloned()
            .unwrap_or_default();
        self.pause("list_messages").await;
        Ok(messages)
    }

    async fn post_message(&self, _case_id: &CaseId, text: &str) -> Result<()> {
        self.record("post_message")?;
        self.posted.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn mark_read(&self, _case_id: &CaseId, up_to: DateTime<Utc>) -> Result<()> {
        self.record("mark_read")?;
        self.mark_reads.lock().unwrap().push(up_to);
        Ok(())
    }

    async fn list_documents(&self, case_id: &CaseId) -> Result<Vec<Document>> {
        self.record("list_documents")?;
        Ok(self
            .documents
            .lock()
            .unwrap()
            .get(case_id.as_str())
            .cloned()
            .unwrap_or_default())
    }

    async fn upload_document(
        &self,
        _case_id: &CaseId,
        upload: UploadRequest,
        progress: ProgressFn,
    ) -> Result<Document> {
        self.pause("upload_document").await;
        self.record("upload_document")?;
        let total = upload.data.len() as u64;
        progress(total / 2, total);
        progress(total, total);
        self.uploads.lock().unwrap().push(upload.file_name.clone());
        Ok(document(&format!("srv-{}", upload.file_name), &upload.file_name))
    }

    async fn set_document_status(
        &self,
        _case_id: &CaseId,
        _file_id: &str,
        _status: DocumentStatus,
    ) -> Result<()> {
        self.record("set_document_status")
    }

    async fn open_stream(&self, _case_id: &CaseId) -> Result<BoxStream<'static, Result<Bytes>>> {
        self.record("open_stream")?;
        let next = self.streams.lock().unwrap().pop_front();
        match next {
            Some(chunks) => Ok(stream::iter(
                chunks
                    .into_iter()
                    .map(|chunk| Ok(Bytes::from_static(chunk.as_bytes())))
                    .collect::<Vec<_>>(),
            )
            .boxed()),
            None => Err(ClientError::Status {
                status: 503,
                message: "stream unavailable".into(),
            }),
        }
    }
}

/// Poll `check` until it holds or two seconds pass.
pub async fn wait_until(mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
