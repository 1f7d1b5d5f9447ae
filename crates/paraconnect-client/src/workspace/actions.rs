//! Case actions.
//!
//! Every action follows the same shape: eligibility check, busy marker,
//! server call, then either an inline error with the previous state
//! restored or a full case reload.

use paraconnect_shared::payout::validate_partial_payout;
use paraconnect_shared::snapshot::task_snapshot;
use paraconnect_shared::{ActionEligibility, CaseId, DocumentStatus, DomainError, RefreshFlags, Task};

use super::Workspace;
use crate::error::{ClientError, Result};
use crate::events::{emit, CaseAction, StatusLevel, WorkspaceEvent};

impl Workspace {
    pub fn is_busy(&self, action: CaseAction) -> bool {
        self.lock().busy.contains(&action)
    }

    fn status(&self, case_id: Option<CaseId>, level: StatusLevel, message: String) {
        emit(
            &self.events,
            WorkspaceEvent::Status {
                case_id,
                level,
                message,
            },
        );
    }

    /// Report a failure inline and hand the error back.
    fn fail(&self, case_id: Option<CaseId>, err: ClientError) -> ClientError {
        self.status(case_id, StatusLevel::Error, err.to_string());
        err
    }

    /// Check eligibility and take the busy marker.
    fn begin_action(
        &self,
        action: CaseAction,
        allowed: impl FnOnce(&ActionEligibility) -> bool,
    ) -> Result<(CaseId, u64)> {
        let checked = {
            let mut st = self.lock();
            match st.active() {
                None => Err((None, ClientError::NoActiveCase)),
                Some((case_id, generation)) => {
                    let permitted = st.view.as_ref().is_some_and(|v| allowed(&v.actions));
                    if !permitted {
                        let reason = format!("{} is not available right now", action.label());
                        Err((Some(case_id), DomainError::NotPermitted(reason).into()))
                    } else if !st.busy.insert(action) {
                        Err((Some(case_id), ClientError::Busy(action.label().to_string())))
                    } else {
                        Ok((case_id, generation))
                    }
                }
            }
        };

        match checked {
            Ok((case_id, generation)) => {
                tracing::debug!(%case_id, ?action, "Action started");
                emit(
                    &self.events,
                    WorkspaceEvent::ActionStarted {
                        case_id: case_id.clone(),
                        action,
                    },
                );
                Ok((case_id, generation))
            }
            Err((case_id, err)) => Err(self.fail(case_id, err)),
        }
    }

    /// Release the busy marker, report the outcome and reload the case on
    /// success when `reload` is set.
    async fn finish_action(
        &self,
        action: CaseAction,
        case_id: &CaseId,
        generation: u64,
        result: Result<()>,
        reload: bool,
    ) -> Result<()> {
        let current = {
            let mut st = self.lock();
            let current = st.is_current(case_id, generation);
            if current {
                st.busy.remove(&action);
            }
            current
        };

        let ok = result.is_ok();
        emit(
            &self.events,
            WorkspaceEvent::ActionFinished {
                case_id: case_id.clone(),
                action,
                ok,
            },
        );

        match result {
            Ok(()) => {
                tracing::info!(%case_id, ?action, "Action succeeded");
                if reload && current {
                    if let Err(e) = self.reload_case().await {
                        tracing::warn!(%case_id, error = %e, "Reload after action failed");
                    }
                }
                Ok(())
            }
            Err(e) => {
                tracing::warn!(%case_id, ?action, error = %e, "Action failed");
                Err(self.fail(Some(case_id.clone()), e))
            }
        }
    }

    /// Release funds and archive the case.
    pub async fn complete(&self) -> Result<()> {
        let (case_id, generation) = self.begin_action(CaseAction::Complete, |a| a.complete)?;
        let result = self.api.complete_case(&case_id).await;
        self.finish_action(CaseAction::Complete, &case_id, generation, result, true)
            .await
    }

    pub async fn withdraw(&self) -> Result<()> {
        let (case_id, generation) = self.begin_action(CaseAction::Withdraw, |a| a.withdraw)?;
        let result = self.api.withdraw(&case_id).await;
        self.finish_action(CaseAction::Withdraw, &case_id, generation, result, true)
            .await
    }

    /// Finalize a withdrawal with a partial payout of `amount_cents`.
    pub async fn partial_payout(&self, amount_cents: i64) -> Result<()> {
        let (active, remaining) = {
            let st = self.lock();
            (
                st.active_case.clone(),
                st.view.as_ref().map(|v| v.withdrawal.remaining_cents),
            )
        };
        let remaining = remaining.ok_or_else(|| self.fail(active.clone(), ClientError::NoActiveCase))?;
        let amount = validate_partial_payout(amount_cents, remaining)
            .map_err(|e| self.fail(active, e.into()))?;

        let (case_id, generation) = self.begin_action(CaseAction::PartialPayout, |a| a.partial_payout)?;
        let result = self.api.partial_payout(&case_id, amount).await;
        self.finish_action(CaseAction::PartialPayout, &case_id, generation, result, true)
            .await
    }

    /// Close a withdrawn case without releasing funds.
    pub async fn reject_payout(&self) -> Result<()> {
        let (case_id, generation) = self.begin_action(CaseAction::RejectPayout, |a| a.reject_payout)?;
        let result = self.api.reject_payout(&case_id).await;
        self.finish_action(CaseAction::RejectPayout, &case_id, generation, result, true)
            .await
    }

    pub async fn relist(&self) -> Result<()> {
        let (case_id, generation) = self.begin_action(CaseAction::Relist, |a| a.relist)?;
        let result = self.api.relist(&case_id).await;
        self.finish_action(CaseAction::Relist, &case_id, generation, result, true)
            .await
    }

    /// Disputes are not opened from the case view; this always fails the
    /// eligibility check.
    pub async fn open_dispute(&self, message: &str) -> Result<()> {
        let (case_id, generation) = self.begin_action(CaseAction::Dispute, |a| a.dispute)?;
        let result = self.api.open_dispute(&case_id, message).await;
        self.finish_action(CaseAction::Dispute, &case_id, generation, result, true)
            .await
    }

    /// Flip one task and save the whole list. The change is shown at once
    /// and rolled back if the server rejects it.
    pub async fn toggle_task(&self, index: usize, completed: bool) -> Result<()> {
        let (case_id, generation) = self.begin_action(CaseAction::UpdateTasks, |a| a.edit_tasks)?;

        let swapped = self.swap_tasks(&case_id, generation, |tasks| match tasks.get_mut(index) {
            Some(task) => {
                task.completed = completed;
                true
            }
            None => false,
        });
        let Some((previous, next)) = swapped else {
            let err = DomainError::NotPermitted(format!("No task at position {index}")).into();
            return self
                .finish_action(CaseAction::UpdateTasks, &case_id, generation, Err(err), false)
                .await;
        };

        let result = self.api.update_tasks(&case_id, &next).await;
        if result.is_err() {
            self.swap_tasks(&case_id, generation, |tasks| {
                *tasks = previous;
                true
            });
        }
        self.finish_action(CaseAction::UpdateTasks, &case_id, generation, result, true)
            .await
    }

    /// Edit the active case's tasks in place and re-render. Returns the
    /// previous and edited lists, or `None` if stale or `edit` refused.
    fn swap_tasks(
        &self,
        case_id: &CaseId,
        generation: u64,
        edit: impl FnOnce(&mut Vec<Task>) -> bool,
    ) -> Option<(Vec<Task>, Vec<Task>)> {
        let (previous, tasks) = {
            let mut st = self.lock();
            if !st.is_current(case_id, generation) {
                return None;
            }
            let case = st.case.as_mut()?;
            let previous = case.tasks.clone();
            if !edit(&mut case.tasks) {
                return None;
            }
            let tasks = case.tasks.clone();
            st.cache_mut(case_id).task_snapshot = Some(task_snapshot(&tasks));
            st.rendered_tasks = None;
            (previous, tasks)
        };
        emit(
            &self.events,
            WorkspaceEvent::TasksUpdated {
                case_id: case_id.clone(),
                tasks: tasks.clone(),
            },
        );
        Some((previous, tasks))
    }

    /// Approve a document or request a revision.
    pub async fn set_document_status(&self, file_id: &str, status: DocumentStatus) -> Result<()> {
        let (case_id, generation) = self.begin_action(CaseAction::ReviewDocument, |a| a.review_documents)?;
        let result = self.api.set_document_status(&case_id, file_id, status).await;
        let outcome = self
            .finish_action(CaseAction::ReviewDocument, &case_id, generation, result, true)
            .await;
        if outcome.is_ok() {
            self.request_refresh(RefreshFlags::documents()).await;
        }
        outcome
    }

    /// Upload staged attachments one by one, then post `text` if it is not
    /// empty. A failed upload keeps the text unsent. Refreshes are held back
    /// for the duration and caught up afterwards.
    pub async fn send_message(&self, text: &str) -> Result<()> {
        let text = text.trim();
        if text.is_empty() && !self.attachments.has_sendable() {
            return Ok(());
        }

        let (case_id, generation) = self.begin_action(CaseAction::SendMessage, |a| a.send_messages)?;
        self.lock().send_in_flight = true;

        let report = self.attachments.upload_all(self.api.as_ref(), &case_id).await;
        self.add_optimistic_documents(&case_id, generation, report.uploaded);

        let result = match report.failure {
            Some(e) => Err(e),
            None if !text.is_empty() => self.api.post_message(&case_id, text).await,
            None => Ok(()),
        };

        {
            let mut st = self.lock();
            if st.is_current(&case_id, generation) {
                st.send_in_flight = false;
            }
        }
        let outcome = self
            .finish_action(CaseAction::SendMessage, &case_id, generation, result, false)
            .await;

        self.request_refresh(RefreshFlags::messages() | RefreshFlags::documents())
            .await;
        outcome
    }
}
