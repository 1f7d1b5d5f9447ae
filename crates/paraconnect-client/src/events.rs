use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use paraconnect_shared::{CaseId, CaseView, Document, Message, Task};

use crate::realtime::TransportMode;

pub const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusLevel {
    Info,
    Error,
}

/// Case action with an optimistic busy marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseAction {
    Complete,
    Withdraw,
    PartialPayout,
    RejectPayout,
    Relist,
    Dispute,
    UpdateTasks,
    ReviewDocument,
    SendMessage,
}

impl CaseAction {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Complete => "Complete & release funds",
            Self::Withdraw => "Withdraw",
            Self::PartialPayout => "Partial payout",
            Self::RejectPayout => "Close without release",
            Self::Relist => "Relist case",
            Self::Dispute => "Open dispute",
            Self::UpdateTasks => "Update tasks",
            Self::ReviewDocument => "Review document",
            Self::SendMessage => "Send message",
        }
    }
}

/// Snapshot of one staged attachment for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttachmentSummary {
    pub id: Uuid,
    pub file_name: String,
    pub file_size: i64,
    pub status: String,
    pub progress: u8,
    pub error: Option<String>,
}

/// Everything a view layer binds to. Lists carry the full rebuilt contents
/// and are only emitted after a snapshot change.
#[derive(Debug, Clone)]
pub enum WorkspaceEvent {
    CaseUpdated {
        case_id: CaseId,
        view: Box<CaseView>,
    },
    MessagesUpdated {
        case_id: CaseId,
        messages: Vec<Message>,
    },
    DocumentsUpdated {
        case_id: CaseId,
        documents: Vec<Document>,
    },
    TasksUpdated {
        case_id: CaseId,
        tasks: Vec<Task>,
    },
    Status {
        case_id: Option<CaseId>,
        level: StatusLevel,
        message: String,
    },
    ActionStarted {
        case_id: CaseId,
        action: CaseAction,
    },
    ActionFinished {
        case_id: CaseId,
        action: CaseAction,
        ok: bool,
    },
    AttachmentsChanged {
        case_id: CaseId,
        attachments: Vec<AttachmentSummary>,
    },
    AttachmentProgress {
        case_id: CaseId,
        id: Uuid,
        percent: u8,
    },
    TransportChanged {
        mode: TransportMode,
    },
}

pub type EventSender = broadcast::Sender<WorkspaceEvent>;

/// Send without caring whether anyone is listening.
pub fn emit(tx: &EventSender, event: WorkspaceEvent) {
    if tx.send(event).is_err() {
        tracing::trace!("No workspace event subscribers");
    }
}
