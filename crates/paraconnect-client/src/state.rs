//! Mutable workspace state.
//!
//! [`WorkspaceState`] lives behind a `std::sync::Mutex` inside the
//! workspace and is never held across an `.await`. Every async operation
//! captures `(case_id, generation)` before awaiting and re-checks it with
//! [`WorkspaceState::is_current`] before applying results.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use paraconnect_shared::documents::merge_documents;
use paraconnect_shared::snapshot::{CollectionSnapshot, TaskSnapshot};
use paraconnect_shared::{Case, CaseId, CaseView, Document, Message, RefreshGate, Suppression};

use crate::events::CaseAction;

/// Per-case data that survives switching away and back.
#[derive(Debug, Default)]
pub struct CaseCache {
    pub messages: Vec<Message>,
    /// Last list the server returned.
    pub server_documents: Vec<Document>,
    /// Uploaded locally, not yet listed by the server.
    pub optimistic_documents: Vec<Document>,
    /// What the view currently shows: server list plus optimistic entries.
    pub documents: Vec<Document>,
    pub message_snapshot: Option<CollectionSnapshot>,
    pub document_snapshot: Option<CollectionSnapshot>,
    pub task_snapshot: Option<TaskSnapshot>,
    /// Newest message timestamp already reported via mark-read.
    pub last_read: Option<DateTime<Utc>>,
}

impl CaseCache {
    pub fn remerge_documents(&mut self) -> &[Document] {
        self.documents = merge_documents(&self.server_documents, &self.optimistic_documents);
        &self.documents
    }
}

#[derive(Debug)]
pub struct WorkspaceState {
    pub active_case: Option<CaseId>,
    /// Bumped on every case switch.
    pub generation: u64,
    pub case: Option<Case>,
    pub view: Option<CaseView>,
    pub caches: HashMap<CaseId, CaseCache>,
    pub gate: RefreshGate,
    pub visible: bool,
    pub send_in_flight: bool,
    /// Checkbox states as currently drawn, when the view reports them.
    pub rendered_tasks: Option<Vec<bool>>,
    pub busy: HashSet<CaseAction>,
}

impl Default for WorkspaceState {
    fn default() -> Self {
        Self {
            active_case: None,
            generation: 0,
            case: None,
            view: None,
            caches: HashMap::new(),
            gate: RefreshGate::new(),
            visible: true,
            send_in_flight: false,
            rendered_tasks: None,
            busy: HashSet::new(),
        }
    }
}

impl WorkspaceState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `case_id` the active case and return the new generation.
    pub fn activate(&mut self, case_id: CaseId) -> u64 {
        self.generation += 1;
        // Reopening renders from scratch; read markers and optimistic
        // uploads carry over.
        let cache = self.caches.entry(case_id.clone()).or_default();
        cache.message_snapshot = None;
        cache.document_snapshot = None;
        cache.task_snapshot = None;
        self.active_case = Some(case_id);
        self.case = None;
        self.view = None;
        self.gate.reset();
        self.send_in_flight = false;
        self.rendered_tasks = None;
        self.busy.clear();
        self.generation
    }

    pub fn deactivate(&mut self) {
        self.generation += 1;
        self.active_case = None;
        self.case = None;
        self.view = None;
        self.gate.reset();
        self.send_in_flight = false;
        self.rendered_tasks = None;
        self.busy.clear();
    }

    pub fn active(&self) -> Option<(CaseId, u64)> {
        self.active_case.clone().map(|id| (id, self.generation))
    }

    pub fn is_current(&self, case_id: &CaseId, generation: u64) -> bool {
        self.generation == generation && self.active_case.as_ref() == Some(case_id)
    }

    pub fn workspace_locked(&self) -> bool {
        self.view.as_ref().map_or(true, CaseView::workspace_locked)
    }

    /// First applicable reason to hold refreshes back.
    pub fn suppression(&self) -> Option<Suppression> {
        if !self.visible {
            Some(Suppression::Hidden)
        } else if self.send_in_flight {
            Some(Suppression::SendInFlight)
        } else if self.workspace_locked() {
            Some(Suppression::WorkspaceLocked)
        } else {
            None
        }
    }

    pub fn cache_mut(&mut self, case_id: &CaseId) -> &mut CaseCache {
        self.caches.entry(case_id.clone()).or_default()
    }

    pub fn cache(&self, case_id: &CaseId) -> Option<&CaseCache> {
        self.caches.get(case_id)
    }
}
