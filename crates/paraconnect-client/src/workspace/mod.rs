//! The case workspace session.
//!
//! One [`Workspace`] per signed-in viewer. It owns the active case, the
//! per-case caches, the refresh gate, the attachment queue and the realtime
//! transport, and publishes [`WorkspaceEvent`]s for a view layer to bind to.

mod actions;

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::Utc;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use paraconnect_shared::documents::prune_confirmed;
use paraconnect_shared::snapshot::{changed, document_snapshot, message_snapshot, task_snapshot};
use paraconnect_shared::{
    Case, CaseId, CaseView, Document, Message, RefreshDecision, RefreshFlags, Viewer,
};
use paraconnect_store::AttachmentStore;

use crate::api::CaseApi;
use crate::attachments::AttachmentQueue;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::events::{emit, AttachmentSummary, EventSender, WorkspaceEvent, EVENT_CHANNEL_CAPACITY};
use crate::realtime::{RealtimeTransport, TransportMode, TransportSignal};
use crate::state::WorkspaceState;

/// Result of a refresh request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Ran (together with any follow-ups that piled up meanwhile).
    Completed,
    /// Merged into the pending set; an in-flight or later refresh covers it.
    Deferred,
}

pub struct Workspace {
    api: Arc<dyn CaseApi>,
    viewer: Viewer,
    config: ClientConfig,
    state: Mutex<WorkspaceState>,
    attachments: AttachmentQueue,
    transport: Arc<RealtimeTransport>,
    events: EventSender,
}

impl Workspace {
    /// Must be called inside a Tokio runtime; spawns the signal pump.
    pub fn new(
        api: Arc<dyn CaseApi>,
        store: Arc<dyn AttachmentStore>,
        viewer: Viewer,
        config: ClientConfig,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let transport = RealtimeTransport::new(Arc::clone(&api), &config, signal_tx);

        let workspace = Arc::new(Self {
            api,
            viewer,
            config,
            state: Mutex::new(WorkspaceState::new()),
            attachments: AttachmentQueue::new(store, events.clone()),
            transport,
            events,
        });

        tokio::spawn(Self::pump(Arc::downgrade(&workspace), signal_rx));
        workspace
    }

    fn lock(&self) -> MutexGuard<'_, WorkspaceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Turns transport signals into refreshes. Exits when the workspace is
    /// dropped.
    async fn pump(workspace: Weak<Self>, mut signals: mpsc::UnboundedReceiver<TransportSignal>) {
        while let Some(signal) = signals.recv().await {
            let Some(ws) = workspace.upgrade() else {
                break;
            };
            match signal {
                TransportSignal::Mode(mode) => {
                    emit(&ws.events, WorkspaceEvent::TransportChanged { mode });
                }
                TransportSignal::Refresh { case_id, flags } => {
                    if ws.active_case().as_ref() != Some(&case_id) {
                        continue;
                    }
                    // The gate serialises these; extra requests only merge.
                    tokio::spawn(async move {
                        ws.request_refresh(flags).await;
                    });
                }
            }
        }
        tracing::debug!("Workspace signal pump stopped");
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn subscribe(&self) -> broadcast::Receiver<WorkspaceEvent> {
        self.events.subscribe()
    }

    pub fn viewer(&self) -> &Viewer {
        &self.viewer
    }

    pub fn active_case(&self) -> Option<CaseId> {
        self.lock().active_case.clone()
    }

    pub fn case(&self) -> Option<Case> {
        self.lock().case.clone()
    }

    pub fn case_view(&self) -> Option<CaseView> {
        self.lock().view.clone()
    }

    pub fn messages(&self) -> Vec<Message> {
        let st = self.lock();
        st.active_case
            .as_ref()
            .and_then(|id| st.cache(id))
            .map(|c| c.messages.clone())
            .unwrap_or_default()
    }

    /// Server documents plus optimistic uploads, as last rendered.
    pub fn documents(&self) -> Vec<Document> {
        let st = self.lock();
        st.active_case
            .as_ref()
            .and_then(|id| st.cache(id))
            .map(|c| c.documents.clone())
            .unwrap_or_default()
    }

    pub fn attachments(&self) -> Vec<AttachmentSummary> {
        self.attachments.entries()
    }

    pub fn transport_mode(&self) -> TransportMode {
        self.transport.mode()
    }

    fn require_active(&self) -> Result<(CaseId, u64)> {
        self.lock().active().ok_or(ClientError::NoActiveCase)
    }

    // -----------------------------------------------------------------------
    // Case lifecycle
    // -----------------------------------------------------------------------

    /// Close the current case (if any) and open `case_id`.
    pub async fn open_case(&self, case_id: CaseId) -> Result<CaseView> {
        self.close_case();
        self.lock().activate(case_id.clone());
        tracing::info!(%case_id, "Opening case");

        if let Err(e) = self.attachments.restore_pending(&case_id) {
            tracing::warn!(%case_id, error = %e, "Failed to restore staged attachments");
        }

        let view = self.reload_case().await?;
        if !view.workspace_locked() {
            self.request_refresh(RefreshFlags::all()).await;
        }

        self.transport.set_case(case_id.clone());
        if self.config.realtime {
            self.transport.start_stream(case_id);
        } else {
            self.transport.start_polling();
        }
        Ok(view)
    }

    /// Tear down the transport and forget the active case. Cached
    /// collections are kept for a later reopen.
    pub fn close_case(&self) {
        self.transport.shutdown();
        self.attachments.clear();
        let mut st = self.lock();
        if let Some(case_id) = st.active_case.take() {
            tracing::debug!(%case_id, "Closing case");
        }
        st.deactivate();
    }

    /// Refetch the case record, re-derive the view and resume deferred
    /// refreshes if the workspace just unlocked.
    pub async fn reload_case(&self) -> Result<CaseView> {
        let (case_id, generation) = self.require_active()?;
        let case = self.api.get_case(&case_id).await?;
        let (view, unlocked) = self
            .apply_case(&case_id, generation, case)
            .ok_or_else(|| ClientError::StaleCase(case_id.clone()))?;

        if unlocked {
            tracing::info!(%case_id, "Workspace unlocked");
            self.resume_refresh().await;
        }
        Ok(view)
    }

    /// Store a fetched case record. Returns the new view and whether the
    /// workspace went from locked to unlocked; `None` when stale.
    fn apply_case(&self, case_id: &CaseId, generation: u64, case: Case) -> Option<(CaseView, bool)> {
        let snapshot = task_snapshot(&case.tasks);
        let tasks = case.tasks.clone();

        let (view, view_changed, tasks_changed, unlocked) = {
            let mut st = self.lock();
            if !st.is_current(case_id, generation) {
                return None;
            }
            let was_locked = st.workspace_locked();

            let cache = st.cache_mut(case_id);
            let tasks_changed = changed(cache.task_snapshot.as_ref(), &snapshot);
            if tasks_changed {
                cache.task_snapshot = Some(snapshot);
                st.rendered_tasks = None;
            }

            let view = CaseView::derive(&case, &self.viewer, st.rendered_tasks.as_deref(), Utc::now());
            let view_changed = st.view.as_ref() != Some(&view);
            let unlocked = was_locked && !view.workspace_locked();
            st.case = Some(case);
            st.view = Some(view.clone());
            (view, view_changed, tasks_changed, unlocked)
        };

        if tasks_changed {
            emit(
                &self.events,
                WorkspaceEvent::TasksUpdated {
                    case_id: case_id.clone(),
                    tasks,
                },
            );
        }
        if view_changed || tasks_changed {
            emit(
                &self.events,
                WorkspaceEvent::CaseUpdated {
                    case_id: case_id.clone(),
                    view: Box::new(view.clone()),
                },
            );
        }
        Some((view, unlocked))
    }

    // -----------------------------------------------------------------------
    // Refresh
    // -----------------------------------------------------------------------

    /// Ask for a refresh of `flags`. Suppressed or overlapping requests are
    /// merged into the pending set and picked up later.
    pub async fn request_refresh(&self, flags: RefreshFlags) -> RefreshOutcome {
        let (active, decision) = {
            let mut st = self.lock();
            let Some(active) = st.active() else {
                return RefreshOutcome::Deferred;
            };
            let suppression = st.suppression();
            let decision = st.gate.request(flags, suppression);
            if let (RefreshDecision::Deferred, Some(reason)) = (decision, suppression) {
                tracing::trace!(?reason, pending = ?st.gate.pending(), "Refresh deferred");
            }
            (active, decision)
        };

        match decision {
            RefreshDecision::Deferred => RefreshOutcome::Deferred,
            RefreshDecision::Start(scope) => {
                let (case_id, generation) = active;
                self.drive_refresh(&case_id, generation, scope).await;
                RefreshOutcome::Completed
            }
        }
    }

    /// Runs with the gate's in-flight slot for `case_id` held, draining
    /// follow-ups.
    async fn drive_refresh(&self, case_id: &CaseId, generation: u64, mut scope: RefreshFlags) {
        loop {
            self.fetch_and_apply(case_id, generation, scope).await;

            let next = {
                let mut st = self.lock();
                // A case switch reset the gate; the slot is no longer ours.
                if !st.is_current(case_id, generation) {
                    return;
                }
                let suppression = st.suppression();
                st.gate.finish(suppression)
            };
            match next {
                Some(flags) => {
                    tracing::trace!(?flags, "Running coalesced follow-up refresh");
                    scope = flags;
                }
                None => return,
            }
        }
    }

    async fn fetch_and_apply(&self, case_id: &CaseId, generation: u64, scope: RefreshFlags) {
        let api = self.api.as_ref();
        let (case, messages, documents) = tokio::join!(
            async {
                if scope.tasks {
                    Some(api.get_case(case_id).await)
                } else {
                    None
                }
            },
            async {
                if scope.messages {
                    Some(api.list_messages(case_id).await)
                } else {
                    None
                }
            },
            async {
                if scope.documents {
                    Some(api.list_documents(case_id).await)
                } else {
                    None
                }
            },
        );

        match case {
            Some(Ok(case)) => match self.apply_case(case_id, generation, case) {
                Some((_, true)) => tracing::info!(%case_id, "Workspace unlocked"),
                Some(_) => {}
                None => tracing::debug!(%case_id, "Discarding stale case refresh"),
            },
            Some(Err(e)) => tracing::warn!(%case_id, error = %e, "Case refresh failed"),
            None => {}
        }

        match messages {
            Some(Ok(messages)) => self.apply_messages(case_id, generation, messages).await,
            Some(Err(e)) => tracing::warn!(%case_id, error = %e, "Message refresh failed"),
            None => {}
        }

        match documents {
            Some(Ok(documents)) => self.apply_documents(case_id, generation, documents),
            Some(Err(e)) => tracing::warn!(%case_id, error = %e, "Document refresh failed"),
            None => {}
        }
    }

    async fn apply_messages(&self, case_id: &CaseId, generation: u64, messages: Vec<Message>) {
        let snapshot = message_snapshot(&messages);
        let mark_read = {
            let mut st = self.lock();
            if !st.is_current(case_id, generation) {
                tracing::debug!(%case_id, "Discarding stale message refresh");
                return;
            }
            let cache = st.cache_mut(case_id);
            if !changed(cache.message_snapshot.as_ref(), &snapshot) {
                return;
            }
            let latest = snapshot.latest_timestamp;
            cache.message_snapshot = Some(snapshot);
            cache.messages = messages.clone();

            // Claimed under the lock so concurrent refreshes report it once.
            match latest {
                Some(latest) if cache.last_read.map_or(true, |read| latest > read) => {
                    cache.last_read = Some(latest);
                    Some(latest)
                }
                _ => None,
            }
        };

        emit(
            &self.events,
            WorkspaceEvent::MessagesUpdated {
                case_id: case_id.clone(),
                messages,
            },
        );

        if let Some(up_to) = mark_read {
            if let Err(e) = self.api.mark_read(case_id, up_to).await {
                tracing::warn!(%case_id, error = %e, "Failed to mark messages read");
            }
        }
    }

    fn apply_documents(&self, case_id: &CaseId, generation: u64, server: Vec<Document>) {
        let documents = {
            let mut st = self.lock();
            if !st.is_current(case_id, generation) {
                tracing::debug!(%case_id, "Discarding stale document refresh");
                return;
            }
            let cache = st.cache_mut(case_id);
            let confirmed = prune_confirmed(&mut cache.optimistic_documents, &server);
            if confirmed > 0 {
                tracing::debug!(%case_id, confirmed, "Optimistic documents confirmed");
            }
            cache.server_documents = server;
            let snapshot = document_snapshot(cache.remerge_documents());
            if !changed(cache.document_snapshot.as_ref(), &snapshot) {
                return;
            }
            cache.document_snapshot = Some(snapshot);
            cache.documents.clone()
        };

        emit(
            &self.events,
            WorkspaceEvent::DocumentsUpdated {
                case_id: case_id.clone(),
                documents,
            },
        );
    }

    /// Add uploaded documents to the optimistic set and re-render.
    fn add_optimistic_documents(&self, case_id: &CaseId, generation: u64, uploaded: Vec<Document>) {
        if uploaded.is_empty() {
            return;
        }
        let documents = {
            let mut st = self.lock();
            if !st.is_current(case_id, generation) {
                return;
            }
            let cache = st.cache_mut(case_id);
            cache.optimistic_documents.extend(uploaded);
            let snapshot = document_snapshot(cache.remerge_documents());
            cache.document_snapshot = Some(snapshot);
            cache.documents.clone()
        };
        emit(
            &self.events,
            WorkspaceEvent::DocumentsUpdated {
                case_id: case_id.clone(),
                documents,
            },
        );
    }

    /// Resume refreshes deferred while a suppression was active.
    async fn resume_refresh(&self) {
        let resumed = {
            let mut st = self.lock();
            let Some(active) = st.active() else {
                return;
            };
            let suppression = st.suppression();
            st.gate.resume(suppression).map(|flags| (active, flags))
        };
        if let Some(((case_id, generation), flags)) = resumed {
            tracing::debug!(?flags, "Resuming deferred refresh");
            self.drive_refresh(&case_id, generation, flags).await;
        }
    }

    // -----------------------------------------------------------------------
    // View inputs
    // -----------------------------------------------------------------------

    /// Visibility of the workspace view. Becoming visible runs whatever was
    /// deferred while hidden.
    pub async fn set_visible(&self, visible: bool) {
        let was_visible = std::mem::replace(&mut self.lock().visible, visible);
        if visible && !was_visible {
            self.resume_refresh().await;
        }
    }

    /// Checkbox states as currently drawn. These take precedence over the
    /// fetched task list when deciding whether the case can be completed.
    pub fn set_rendered_task_states(&self, states: Vec<bool>) {
        let update = {
            let mut st = self.lock();
            st.rendered_tasks = Some(states);
            let Some((case_id, _)) = st.active() else {
                return;
            };
            let Some(case) = st.case.as_ref() else {
                return;
            };
            let view = CaseView::derive(case, &self.viewer, st.rendered_tasks.as_deref(), Utc::now());
            if st.view.as_ref() == Some(&view) {
                None
            } else {
                st.view = Some(view.clone());
                Some((case_id, view))
            }
        };
        if let Some((case_id, view)) = update {
            emit(
                &self.events,
                WorkspaceEvent::CaseUpdated {
                    case_id,
                    view: Box::new(view),
                },
            );
        }
    }

    // -----------------------------------------------------------------------
    // Attachments
    // -----------------------------------------------------------------------

    pub async fn attach_file(&self, path: &Path) -> Result<AttachmentSummary> {
        let (case_id, _) = self.require_active()?;
        let locked = self.lock().workspace_locked();
        self.attachments.add_file(&case_id, path, locked).await
    }

    pub fn attach_bytes(&self, file_name: impl Into<String>, data: Vec<u8>) -> Result<AttachmentSummary> {
        let (case_id, _) = self.require_active()?;
        let locked = self.lock().workspace_locked();
        self.attachments
            .add_bytes(&case_id, file_name.into(), None, data, locked)
    }

    pub fn remove_attachment(&self, id: Uuid) -> Result<()> {
        self.attachments.remove(id)
    }

    pub fn cancel_attachment(&self, id: Uuid) -> Result<()> {
        self.attachments.cancel(id)
    }

    pub fn retry_attachment(&self, id: Uuid) -> Result<()> {
        self.attachments.retry(id)
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.transport.shutdown();
    }
}
