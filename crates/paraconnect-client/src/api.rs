//! REST client for the ParaConnect case API.
//!
//! [`CaseApi`] is the seam the workspace depends on; [`ApiClient`] is the
//! reqwest implementation. Mutating calls carry a CSRF token fetched from
//! `/api/csrf`, refetched once when the server answers 403.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use mime_guess::MimeGuess;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde_json::{json, Value};
use tokio::sync::Mutex;

use paraconnect_shared::constants::CSRF_HEADER;
use paraconnect_shared::models::{extract_list, extract_record, tasks_payload};
use paraconnect_shared::{
    Application, Case, CaseId, CurrentUser, Document, DocumentStatus, Message, Task,
};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};

/// Upload body chunk size; progress is reported per chunk.
const UPLOAD_CHUNK: usize = 64 * 1024;

/// `(bytes_sent, total_bytes)`.
pub type ProgressFn = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// A file to upload as the multipart `file` part.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub file_name: String,
    pub mime_type: String,
    pub data: Bytes,
}

#[async_trait]
pub trait CaseApi: Send + Sync {
    async fn current_user(&self) -> Result<CurrentUser>;
    async fn my_applications(&self) -> Result<Vec<Application>>;

    async fn get_case(&self, case_id: &CaseId) -> Result<Case>;
    /// Replaces the whole task array.
    async fn update_tasks(&self, case_id: &CaseId, tasks: &[Task]) -> Result<()>;
    async fn complete_case(&self, case_id: &CaseId) -> Result<()>;
    async fn withdraw(&self, case_id: &CaseId) -> Result<()>;
    async fn partial_payout(&self, case_id: &CaseId, amount_cents: i64) -> Result<()>;
    async fn reject_payout(&self, case_id: &CaseId) -> Result<()>;
    async fn relist(&self, case_id: &CaseId) -> Result<()>;
    async fn open_dispute(&self, case_id: &CaseId, message: &str) -> Result<()>;

    async fn list_messages(&self, case_id: &CaseId) -> Result<Vec<Message>>;
    async fn post_message(&self, case_id: &CaseId, text: &str) -> Result<()>;
    async fn mark_read(&self, case_id: &CaseId, up_to: DateTime<Utc>) -> Result<()>;

    async fn list_documents(&self, case_id: &CaseId) -> Result<Vec<Document>>;
    async fn upload_document(
        &self,
        case_id: &CaseId,
        upload: UploadRequest,
        progress: ProgressFn,
    ) -> Result<Document>;
    async fn set_document_status(
        &self,
        case_id: &CaseId,
        file_id: &str,
        status: DocumentStatus,
    ) -> Result<()>;

    /// Raw `text/event-stream` body for the case.
    async fn open_stream(&self, case_id: &CaseId) -> Result<BoxStream<'static, Result<Bytes>>>;
}

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
    request_timeout: Duration,
    legacy_upload_fallbacks: bool,
    /// `Some("")` means the server has no CSRF endpoint.
    csrf: Mutex<Option<String>>,
}

impl ApiClient {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        // No client-wide timeout: the event stream stays open indefinitely.
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
            request_timeout: config.request_timeout,
            legacy_upload_fallbacks: config.legacy_upload_fallbacks,
            csrf: Mutex::new(None),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .http
            .request(method, self.url(path))
            .header(reqwest::header::ACCEPT, "application/json");
        match &self.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn get_json(&self, path: &str) -> Result<Value> {
        let resp = self
            .request(Method::GET, path)
            .timeout(self.request_timeout)
            .send()
            .await?;
        read_json(check(resp).await?).await
    }

    async fn csrf_token(&self, refresh: bool) -> Result<String> {
        let mut cached = self.csrf.lock().await;
        if !refresh {
            if let Some(token) = cached.as_ref() {
                return Ok(token.clone());
            }
        }

        let token = match self.get_json("/api/csrf").await {
            Ok(body) => ["csrfToken", "token", "csrf"]
                .iter()
                .find_map(|key| body.get(*key).and_then(Value::as_str))
                .map(str::to_string)
                .ok_or_else(|| ClientError::InvalidResponse("CSRF response without a token".into()))?,
            Err(e) if e.is_endpoint_missing() => {
                tracing::debug!("Server has no CSRF endpoint");
                String::new()
            }
            Err(e) => return Err(e),
        };
        *cached = Some(token.clone());
        Ok(token)
    }

    /// Send a mutating request built by `build`, retrying once with a fresh
    /// CSRF token on 403.
    async fn send_mutating<F>(&self, build: F) -> Result<Response>
    where
        F: Fn() -> Result<RequestBuilder>,
    {
        let mut refreshed = false;
        loop {
            let token = self.csrf_token(refreshed).await?;
            let mut req = build()?;
            if !token.is_empty() {
                req = req.header(CSRF_HEADER, token);
            }
            let resp = req.send().await?;
            if resp.status() == StatusCode::FORBIDDEN && !refreshed {
                tracing::debug!("403 on mutating request, refreshing CSRF token");
                refreshed = true;
                continue;
            }
            return check(resp).await;
        }
    }

    async fn send_json(&self, method: Method, path: &str, body: Value) -> Result<Response> {
        self.send_mutating(|| {
            Ok(self
                .request(method.clone(), path)
                .timeout(self.request_timeout)
                .json(&body))
        })
        .await
    }

    fn upload_paths(&self, case_id: &CaseId) -> Vec<String> {
        let id = case_id.as_str();
        let mut paths = vec![format!("/api/uploads/case/{id}")];
        if self.legacy_upload_fallbacks {
            paths.push(format!("/api/cases/{id}/files"));
            paths.push(format!("/api/cases/{id}/documents"));
            paths.push(format!("/api/uploads/{id}"));
        }
        paths
    }

    async fn upload_to(&self, path: &str, upload: &UploadRequest, progress: &ProgressFn) -> Result<Response> {
        self.send_mutating(|| {
            let body = progress_body(upload.data.clone(), progress.clone());
            let part = reqwest::multipart::Part::stream_with_length(body, upload.data.len() as u64)
                .file_name(upload.file_name.clone())
                .mime_str(&upload.mime_type)?;
            let form = reqwest::multipart::Form::new().part("file", part);
            Ok(self.request(Method::POST, path).multipart(form))
        })
        .await
    }
}

#[async_trait]
impl CaseApi for ApiClient {
    async fn current_user(&self) -> Result<CurrentUser> {
        let body = self.get_json("/api/auth/me").await?;
        extract_record(body, &["user", "data"])
            .ok_or_else(|| ClientError::InvalidResponse("unreadable user record".into()))
    }

    async fn my_applications(&self) -> Result<Vec<Application>> {
        Ok(extract_list(self.get_json("/api/applications/my").await?))
    }

    async fn get_case(&self, case_id: &CaseId) -> Result<Case> {
        let body = self.get_json(&format!("/api/cases/{case_id}")).await?;
        extract_record(body, &["case", "data"])
            .ok_or_else(|| ClientError::InvalidResponse("unreadable case record".into()))
    }

    async fn update_tasks(&self, case_id: &CaseId, tasks: &[Task]) -> Result<()> {
        self.send_json(Method::PATCH, &format!("/api/cases/{case_id}"), tasks_payload(tasks))
            .await?;
        Ok(())
    }

    async fn complete_case(&self, case_id: &CaseId) -> Result<()> {
        self.send_json(Method::POST, &format!("/api/cases/{case_id}/complete"), json!({}))
            .await?;
        Ok(())
    }

    async fn withdraw(&self, case_id: &CaseId) -> Result<()> {
        self.send_json(Method::POST, &format!("/api/cases/{case_id}/withdraw"), json!({}))
            .await?;
        Ok(())
    }

    async fn partial_payout(&self, case_id: &CaseId, amount_cents: i64) -> Result<()> {
        self.send_json(
            Method::POST,
            &format!("/api/cases/{case_id}/partial-payout"),
            json!({ "amountCents": amount_cents }),
        )
        .await?;
        Ok(())
    }

    async fn reject_payout(&self, case_id: &CaseId) -> Result<()> {
        self.send_json(Method::POST, &format!("/api/cases/{case_id}/reject-payout"), json!({}))
            .await?;
        Ok(())
    }

    async fn relist(&self, case_id: &CaseId) -> Result<()> {
        self.send_json(Method::POST, &format!("/api/cases/{case_id}/relist"), json!({}))
            .await?;
        Ok(())
    }

    async fn open_dispute(&self, case_id: &CaseId, message: &str) -> Result<()> {
        self.send_json(
            Method::POST,
            &format!("/api/disputes/{case_id}"),
            json!({ "message": message }),
        )
        .await?;
        Ok(())
    }

    async fn list_messages(&self, case_id: &CaseId) -> Result<Vec<Message>> {
        Ok(extract_list(self.get_json(&format!("/api/messages/{case_id}")).await?))
    }

    async fn post_message(&self, case_id: &CaseId, text: &str) -> Result<()> {
        self.send_json(Method::POST, &format!("/api/messages/{case_id}"), json!({ "text": text }))
            .await?;
        Ok(())
    }

    async fn mark_read(&self, case_id: &CaseId, up_to: DateTime<Utc>) -> Result<()> {
        self.send_json(
            Method::POST,
            &format!("/api/messages/{case_id}/read"),
            json!({ "upTo": up_to.to_rfc3339_opts(SecondsFormat::Millis, true) }),
        )
        .await?;
        Ok(())
    }

    async fn list_documents(&self, case_id: &CaseId) -> Result<Vec<Document>> {
        Ok(extract_list(self.get_json(&format!("/api/uploads/case/{case_id}")).await?))
    }

    async fn upload_document(
        &self,
        case_id: &CaseId,
        upload: UploadRequest,
        progress: ProgressFn,
    ) -> Result<Document> {
        for path in self.upload_paths(case_id) {
            match self.upload_to(&path, &upload, &progress).await {
                Ok(resp) => {
                    tracing::debug!(%case_id, path = %path, file = %upload.file_name, "Upload accepted");
                    let body = read_json(resp).await.unwrap_or(Value::Null);
                    let mut doc = extract_record::<Document>(body, &["file", "document", "upload", "data"])
                        .unwrap_or_default();
                    if doc.original_name.is_none() && doc.filename.is_none() && doc.name.is_none() {
                        doc.original_name = Some(upload.file_name.clone());
                    }
                    if doc.created_at.is_none() {
                        doc.created_at = Some(Utc::now());
                    }
                    return Ok(doc);
                }
                Err(e) if e.is_endpoint_missing() => {
                    tracing::debug!(path = %path, "Upload route missing, trying next");
                }
                Err(e) => return Err(e),
            }
        }
        Err(ClientError::NoUploadEndpoint)
    }

    async fn set_document_status(
        &self,
        case_id: &CaseId,
        file_id: &str,
        status: DocumentStatus,
    ) -> Result<()> {
        self.send_json(
            Method::PATCH,
            &format!("/api/cases/{case_id}/files/{file_id}/status"),
            json!({ "status": status.as_str() }),
        )
        .await?;
        Ok(())
    }

    async fn open_stream(&self, case_id: &CaseId) -> Result<BoxStream<'static, Result<Bytes>>> {
        let resp = self
            .request(Method::GET, &format!("/api/cases/{case_id}/stream"))
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await?;
        let resp = check(resp).await?;
        Ok(resp
            .bytes_stream()
            .map(|chunk| chunk.map_err(ClientError::from))
            .boxed())
    }
}

/// Turn a non-2xx response into [`ClientError::Status`] carrying the
/// server's message.
async fn check(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let text = resp.text().await.unwrap_or_default();
    Err(ClientError::Status {
        status: status.as_u16(),
        message: server_message(&text)
            .unwrap_or_else(|| format!("Request failed ({})", status.as_u16())),
    })
}

async fn read_json(resp: Response) -> Result<Value> {
    let bytes = resp.bytes().await?;
    if bytes.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_slice(&bytes).map_err(|e| ClientError::InvalidResponse(e.to_string()))
}

fn server_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["error", "message", "msg"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .filter(|msg| !msg.trim().is_empty())
        .map(str::to_string)
}

fn progress_body(data: Bytes, progress: ProgressFn) -> reqwest::Body {
    let total = data.len() as u64;
    let chunks = (0..data.len()).step_by(UPLOAD_CHUNK).map(move |start| {
        let end = (start + UPLOAD_CHUNK).min(data.len());
        progress(end as u64, total);
        Ok::<_, std::io::Error>(data.slice(start..end))
    });
    reqwest::Body::wrap_stream(stream::iter(chunks))
}

/// MIME type from the file extension.
pub fn guess_mime(file_name: &str) -> String {
    MimeGuess::from_path(file_name).first_or_octet_stream().to_string()
}
