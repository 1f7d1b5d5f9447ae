//! Wire models for the ParaConnect REST API.
//!
//! The server is an external collaborator whose payloads vary between
//! endpoints and releases, so every model reads several fallback field names
//! and tolerates missing or malformed values instead of failing the whole
//! response.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::constants::{DEFAULT_CURRENCY, ESCROW_FUNDED, LIST_ENVELOPE_KEYS};
use crate::types::{CaseId, Role};

// ---------------------------------------------------------------------------
// Lenient field parsing
// ---------------------------------------------------------------------------

pub(crate) mod lenient {
    use chrono::{DateTime, TimeZone, Utc};
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    /// RFC 3339 string or epoch milliseconds; anything else becomes `None`.
    pub fn datetime<'de, D>(d: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(d)?;
        Ok(value.as_ref().and_then(parse_datetime))
    }

    pub fn parse_datetime(value: &Value) -> Option<DateTime<Utc>> {
        match value {
            Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
                .map(|dt| dt.with_timezone(&Utc))
                .ok(),
            Value::Number(n) => n
                .as_i64()
                .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
            _ => None,
        }
    }

    /// Integer, float (rounded) or numeric string.
    pub fn cents<'de, D>(d: D) -> Result<Option<i64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(d)?;
        Ok(match value {
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f.round() as i64)),
            Some(Value::String(s)) => s.trim().parse::<f64>().ok().map(|f| f.round() as i64),
            _ => None,
        })
    }

    /// `true`, `"true"`, `1`; everything else is `false`.
    pub fn flag<'de, D>(d: D) -> Result<bool, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(d)?;
        Ok(match value {
            Some(Value::Bool(b)) => b,
            Some(Value::Number(n)) => n.as_i64().map(|v| v != 0).unwrap_or(false),
            Some(Value::String(s)) => matches!(s.trim(), "true" | "1" | "yes"),
            _ => false,
        })
    }

    /// Like [`string`], but `null` and non-scalars read as empty.
    pub fn text<'de, D>(d: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(d)?;
        Ok(match value {
            Some(Value::String(s)) => s,
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            _ => String::new(),
        })
    }

    /// Non-negative integer or numeric string.
    pub fn count<'de, D>(d: D) -> Result<Option<u32>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(d)?;
        Ok(match value {
            Some(Value::Number(n)) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
            Some(Value::String(s)) => s.trim().parse::<u32>().ok(),
            _ => None,
        })
    }

    /// Any scalar rendered as a string; objects and arrays become `None`.
    pub fn string<'de, D>(d: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(d)?;
        Ok(match value {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        })
    }
}

fn first_non_empty<'a>(candidates: &[Option<&'a String>]) -> Option<&'a str> {
    candidates
        .iter()
        .flatten()
        .copied()
        .map(String::as_str)
        .find(|s| !s.trim().is_empty())
}

// ---------------------------------------------------------------------------
// PartyRef
// ---------------------------------------------------------------------------

/// A reference to a user: either a bare id or a populated user object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum PartyRef {
    Id(String),
    Object(PartyObject),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct PartyObject {
    #[serde(deserialize_with = "lenient::string")]
    pub id: Option<String>,
    #[serde(rename = "_id", deserialize_with = "lenient::string")]
    pub mongo_id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub name: Option<String>,
    pub role: Option<String>,
}

impl PartyRef {
    pub fn id(&self) -> Option<&str> {
        match self {
            PartyRef::Id(id) => Some(id.as_str()).filter(|s| !s.trim().is_empty()),
            PartyRef::Object(obj) => first_non_empty(&[obj.id.as_ref(), obj.mongo_id.as_ref()]),
        }
    }

    pub fn display_name(&self) -> Option<String> {
        match self {
            PartyRef::Id(_) => None,
            PartyRef::Object(obj) => {
                if let Some(name) = obj.name.as_ref().filter(|n| !n.trim().is_empty()) {
                    return Some(name.clone());
                }
                let full = [obj.first_name.as_deref(), obj.last_name.as_deref()]
                    .iter()
                    .flatten()
                    .copied()
                    .collect::<Vec<_>>()
                    .join(" ");
                (!full.trim().is_empty()).then_some(full)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// A checklist item embedded in a case. Identity is positional.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Task {
    #[serde(deserialize_with = "lenient::text")]
    pub title: String,
    #[serde(deserialize_with = "lenient::flag")]
    pub completed: bool,
    /// Fields the client does not model; sent back untouched on PATCH.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl Task {
    pub fn new(title: impl Into<String>, completed: bool) -> Self {
        Self {
            title: title.into(),
            completed,
            extra: serde_json::Map::new(),
        }
    }
}

/// Full, ordered task payload for `PATCH /api/cases/:id`.
///
/// The API has no per-task patch, so a partial array drops the missing tasks.
pub fn tasks_payload(tasks: &[Task]) -> Value {
    serde_json::json!({ "tasks": tasks })
}

// ---------------------------------------------------------------------------
// Case
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Case {
    #[serde(deserialize_with = "lenient::string")]
    pub id: Option<String>,
    #[serde(rename = "_id", deserialize_with = "lenient::string")]
    pub mongo_id: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub title: String,
    #[serde(deserialize_with = "lenient::text")]
    pub status: String,
    pub escrow_status: Option<String>,
    pub escrow_intent_id: Option<String>,
    pub attorney: Option<PartyRef>,
    pub attorney_id: Option<String>,
    pub paralegal: Option<PartyRef>,
    pub paralegal_id: Option<String>,
    pub tasks: Vec<Task>,
    #[serde(alias = "pausedReason")]
    pub pause_reason: Option<String>,
    #[serde(deserialize_with = "lenient::datetime")]
    pub paused_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "lenient::datetime")]
    pub dispute_deadline: Option<DateTime<Utc>>,
    #[serde(alias = "paralegalWithdrawnAt", deserialize_with = "lenient::datetime")]
    pub withdrawn_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "lenient::count")]
    pub completed_tasks_at_withdrawal: Option<u32>,
    #[serde(alias = "payoutFinalizedAt", deserialize_with = "lenient::datetime")]
    pub withdrawal_finalized_at: Option<DateTime<Utc>>,
    #[serde(rename = "lockedTotalAmount", deserialize_with = "lenient::cents")]
    pub locked_total_cents: Option<i64>,
    #[serde(rename = "partialPayoutAmount", deserialize_with = "lenient::cents")]
    pub partial_payout_cents: Option<i64>,
    #[serde(deserialize_with = "lenient::datetime")]
    pub relisted_at: Option<DateTime<Utc>>,
    pub currency: Option<String>,
    #[serde(deserialize_with = "lenient::flag")]
    pub read_only: bool,
    #[serde(deserialize_with = "lenient::flag")]
    pub archived: bool,
    #[serde(alias = "fundsReleased", deserialize_with = "lenient::flag")]
    pub payment_released: bool,
    #[serde(deserialize_with = "lenient::datetime")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "lenient::datetime")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Case {
    pub fn case_id(&self) -> Option<CaseId> {
        first_non_empty(&[self.id.as_ref(), self.mongo_id.as_ref()]).map(CaseId::from)
    }

    pub fn paralegal_ref_id(&self) -> Option<&str> {
        first_non_empty(&[self.paralegal_id.as_ref()])
            .or_else(|| self.paralegal.as_ref().and_then(PartyRef::id))
    }

    pub fn attorney_ref_id(&self) -> Option<&str> {
        first_non_empty(&[self.attorney_id.as_ref()])
            .or_else(|| self.attorney.as_ref().and_then(PartyRef::id))
    }

    pub fn has_paralegal(&self) -> bool {
        self.paralegal_ref_id().is_some()
    }

    /// Escrow is funded: an intent exists and the captured status is `funded`.
    pub fn escrow_funded(&self) -> bool {
        let has_intent = self
            .escrow_intent_id
            .as_deref()
            .is_some_and(|s| !s.trim().is_empty());
        let funded = self
            .escrow_status
            .as_deref()
            .is_some_and(|s| s.trim().eq_ignore_ascii_case(ESCROW_FUNDED));
        has_intent && funded
    }

    pub fn currency(&self) -> &str {
        self.currency
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .unwrap_or(DEFAULT_CURRENCY)
    }

    pub fn completed_task_count(&self) -> usize {
        self.tasks.iter().filter(|t| t.completed).count()
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Message {
    #[serde(deserialize_with = "lenient::string")]
    pub id: Option<String>,
    #[serde(rename = "_id", deserialize_with = "lenient::string")]
    pub mongo_id: Option<String>,
    #[serde(rename = "caseId", deserialize_with = "lenient::string")]
    pub case_id: Option<String>,
    pub sender: Option<PartyRef>,
    pub sender_id: Option<String>,
    pub sender_role: Option<String>,
    pub text: Option<String>,
    pub content: Option<String>,
    pub body: Option<String>,
    #[serde(deserialize_with = "lenient::datetime")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn message_id(&self) -> Option<&str> {
        first_non_empty(&[self.id.as_ref(), self.mongo_id.as_ref()])
    }

    pub fn body_text(&self) -> &str {
        first_non_empty(&[self.text.as_ref(), self.content.as_ref(), self.body.as_ref()])
            .unwrap_or("")
    }

    pub fn sender_ref_id(&self) -> Option<&str> {
        first_non_empty(&[self.sender_id.as_ref()])
            .or_else(|| self.sender.as_ref().and_then(PartyRef::id))
    }
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum DocumentStatus {
    #[default]
    Pending,
    Approved,
    RevisionRequested,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::RevisionRequested => "revision_requested",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "approved" => Self::Approved,
            "revision_requested" | "needs_revision" | "revision" => Self::RevisionRequested,
            _ => Self::Pending,
        }
    }
}

impl Serialize for DocumentStatus {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for DocumentStatus {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = Option::<Value>::deserialize(d)?;
        Ok(match raw {
            Some(Value::String(s)) => Self::parse(&s),
            _ => Self::Pending,
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Document {
    #[serde(deserialize_with = "lenient::string")]
    pub id: Option<String>,
    #[serde(rename = "_id", deserialize_with = "lenient::string")]
    pub mongo_id: Option<String>,
    #[serde(rename = "caseId", deserialize_with = "lenient::string")]
    pub case_id: Option<String>,
    pub storage_key: Option<String>,
    pub key: Option<String>,
    pub original_name: Option<String>,
    pub filename: Option<String>,
    pub name: Option<String>,
    #[serde(alias = "mimetype")]
    pub mime_type: Option<String>,
    pub uploaded_by: Option<PartyRef>,
    pub status: DocumentStatus,
    #[serde(alias = "uploadedAt", deserialize_with = "lenient::datetime")]
    pub created_at: Option<DateTime<Utc>>,
    /// Known locally but not yet confirmed by the server's document list.
    #[serde(skip)]
    pub optimistic: bool,
}

impl Document {
    pub fn document_id(&self) -> Option<&str> {
        first_non_empty(&[self.id.as_ref(), self.mongo_id.as_ref()])
    }

    pub fn storage_key(&self) -> Option<&str> {
        first_non_empty(&[self.storage_key.as_ref(), self.key.as_ref()])
    }

    pub fn display_name(&self) -> &str {
        first_non_empty(&[
            self.original_name.as_ref(),
            self.filename.as_ref(),
            self.name.as_ref(),
        ])
        .unwrap_or("document")
    }
}

// ---------------------------------------------------------------------------
// Users & applications
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CurrentUser {
    #[serde(deserialize_with = "lenient::string")]
    pub id: Option<String>,
    #[serde(rename = "_id", deserialize_with = "lenient::string")]
    pub mongo_id: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub role: String,
    pub email: Option<String>,
}

impl CurrentUser {
    pub fn user_id(&self) -> Option<&str> {
        first_non_empty(&[self.id.as_ref(), self.mongo_id.as_ref()])
    }

    pub fn role(&self) -> Option<Role> {
        Role::parse(&self.role)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Application {
    #[serde(deserialize_with = "lenient::string")]
    pub case_id: Option<String>,
    pub case: Option<PartyRef>,
    pub job_id: Option<String>,
}

impl Application {
    pub fn applied_case(&self) -> Option<CaseId> {
        first_non_empty(&[self.case_id.as_ref()])
            .or_else(|| self.case.as_ref().and_then(PartyRef::id))
            .or_else(|| first_non_empty(&[self.job_id.as_ref()]))
            .map(CaseId::from)
    }
}

// ---------------------------------------------------------------------------
// Envelopes
// ---------------------------------------------------------------------------

/// Read a list from a bare array or from the first envelope key that holds
/// one. Entries that fail to deserialize are skipped.
pub fn extract_list<T: DeserializeOwned>(value: Value) -> Vec<T> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => LIST_ENVELOPE_KEYS
            .iter()
            .find_map(|key| match map.remove(*key) {
                Some(Value::Array(items)) => Some(items),
                _ => None,
            })
            .unwrap_or_default(),
        _ => Vec::new(),
    };

    items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect()
}

/// Read a single record from a bare object or from a `case`/`document`/
/// `message`/`user`/`data` envelope.
pub fn extract_record<T: DeserializeOwned>(value: Value, keys: &[&str]) -> Option<T> {
    if let Value::Object(map) = &value {
        for key in keys {
            if let Some(inner @ Value::Object(_)) = map.get(*key) {
                if let Ok(record) = serde_json::from_value(inner.clone()) {
                    return Some(record);
                }
            }
        }
    }
    serde_json::from_value(value).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn case_reads_fallback_fields() {
        let case: Case = serde_json::from_value(json!({
            "_id": "c1",
            "title": "Discovery review",
            "status": "in progress",
            "escrowIntentId": "pi_1",
            "escrowStatus": "funded",
            "paralegal": { "_id": "p1", "firstName": "Dana", "lastName": "Ruiz" },
            "pausedReason": "paralegal_withdrew",
            "lockedTotalAmount": "45000",
            "withdrawnAt": "not a date",
            "tasks": [{ "title": "Draft", "completed": "true", "notes": "x" }]
        }))
        .unwrap();

        assert_eq!(case.case_id(), Some(CaseId::from("c1")));
        assert_eq!(case.paralegal_ref_id(), Some("p1"));
        assert_eq!(case.pause_reason.as_deref(), Some("paralegal_withdrew"));
        assert_eq!(case.locked_total_cents, Some(45_000));
        assert!(case.withdrawn_at.is_none());
        assert!(case.escrow_funded());
        assert!(case.tasks[0].completed);
        assert_eq!(case.tasks[0].extra.get("notes"), Some(&json!("x")));
        assert_eq!(
            case.paralegal.as_ref().and_then(PartyRef::display_name),
            Some("Dana Ruiz".to_string())
        );
    }

    #[test]
    fn nulls_and_numeric_strings_do_not_fail_the_record() {
        let case: Case = serde_json::from_value(json!({
            "_id": "c1",
            "title": null,
            "status": null,
            "completedTasksAtWithdrawal": "1",
            "tasks": [{ "title": null, "completed": true }]
        }))
        .unwrap();

        assert_eq!(case.title, "");
        assert_eq!(case.status, "");
        assert_eq!(case.completed_tasks_at_withdrawal, Some(1));
        assert_eq!(case.tasks[0].title, "");
        assert!(case.tasks[0].completed);

        let user: CurrentUser = serde_json::from_value(json!({ "_id": "u1", "role": null })).unwrap();
        assert_eq!(user.role(), None);
    }

    #[test]
    fn task_payload_keeps_order_and_unknown_fields() {
        let tasks: Vec<Task> = serde_json::from_value(json!([
            { "title": "a", "completed": false, "due": "2026-01-01" },
            { "title": "b", "completed": true }
        ]))
        .unwrap();

        let payload = tasks_payload(&tasks);
        assert_eq!(
            payload,
            json!({ "tasks": [
                { "title": "a", "completed": false, "due": "2026-01-01" },
                { "title": "b", "completed": true }
            ]})
        );
    }

    #[test]
    fn extract_list_tolerates_envelopes() {
        let bare: Vec<Message> = extract_list(json!([{ "_id": "m1", "text": "hi" }]));
        assert_eq!(bare.len(), 1);

        let wrapped: Vec<Message> =
            extract_list(json!({ "messages": [{ "id": "m1", "content": "hello" }] }));
        assert_eq!(wrapped[0].body_text(), "hello");

        let items: Vec<Document> =
            extract_list(json!({ "items": [{ "key": "k1", "filename": "a.pdf" }, 42] }));
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].storage_key(), Some("k1"));

        let nothing: Vec<Document> = extract_list(json!({ "ok": true }));
        assert!(nothing.is_empty());
    }

    #[test]
    fn document_status_parsing_is_lenient() {
        assert_eq!(DocumentStatus::parse("Revision-Requested"), DocumentStatus::RevisionRequested);
        assert_eq!(DocumentStatus::parse("approved"), DocumentStatus::Approved);
        assert_eq!(DocumentStatus::parse("weird"), DocumentStatus::Pending);

        let doc: Document = serde_json::from_value(json!({ "status": null })).unwrap();
        assert_eq!(doc.status, DocumentStatus::Pending);
    }

    #[test]
    fn epoch_millis_timestamps_parse() {
        let msg: Message =
            serde_json::from_value(json!({ "id": "m", "createdAt": 1_700_000_000_000i64 })).unwrap();
        assert_eq!(msg.created_at.map(|t| t.timestamp()), Some(1_700_000_000));
    }

    #[test]
    fn application_resolves_case_reference() {
        let app: Application =
            serde_json::from_value(json!({ "case": { "_id": "c9" } })).unwrap();
        assert_eq!(app.applied_case(), Some(CaseId::from("c9")));
    }
}
