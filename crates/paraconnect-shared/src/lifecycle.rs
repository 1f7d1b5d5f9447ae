//! Case lifecycle state resolver and action eligibility.
//!
//! The server exposes raw status, escrow and pause fields rather than a
//! single enum. The client derives a view state from them on every load and
//! gates each action with its own explicit guard.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::Case;
use crate::payout::WithdrawalView;
use crate::types::{Role, Viewer};

/// Client-derived case state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseState {
    Draft,
    Open,
    Applied,
    FundedInProgress,
    InProgress,
    Paused,
    Disputed,
    Completed,
    Closed,
    Other(String),
}

impl CaseState {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Draft => "draft",
            Self::Open => "open",
            Self::Applied => "applied",
            Self::FundedInProgress => "funded_in_progress",
            Self::InProgress => "in progress",
            Self::Paused => "paused",
            Self::Disputed => "disputed",
            Self::Completed => "completed",
            Self::Closed => "closed",
            Self::Other(raw) => raw.as_str(),
        }
    }

    fn from_normalized(status: &str) -> Self {
        match status {
            "draft" => Self::Draft,
            "open" => Self::Open,
            "applied" => Self::Applied,
            "in progress" => Self::InProgress,
            "paused" => Self::Paused,
            "disputed" => Self::Disputed,
            "completed" => Self::Completed,
            "closed" => Self::Closed,
            other => Self::Other(other.to_string()),
        }
    }

    /// Messaging, documents and tasks are only unlocked while funded and in progress.
    pub fn workspace_unlocked(&self) -> bool {
        matches!(self, Self::FundedInProgress)
    }
}

impl std::fmt::Display for CaseState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lowercase, trim and fold the server's status aliases.
pub fn normalize_status(raw: &str) -> String {
    let status = raw.trim().to_ascii_lowercase();
    let folded = match status.as_str() {
        "" => "open",
        "in_progress" => "in progress",
        "cancelled" | "canceled" => "closed",
        "assigned" | "awaiting_funding" => "open",
        "active" | "awaiting_documents" | "reviewing" | "funded_in_progress" => "in progress",
        other => other,
    };
    folded.to_string()
}

/// Derive the view state of a case. Pure over the case fields and viewer.
pub fn resolve_case_state(case: &Case, viewer: Option<&Viewer>) -> CaseState {
    let raw = case.status.trim().to_ascii_lowercase();

    let in_progress = raw == "in progress" || raw == "in_progress";
    if case.has_paralegal() && case.escrow_funded() && in_progress {
        return CaseState::FundedInProgress;
    }

    if raw == "applied" {
        return CaseState::Applied;
    }
    if raw == "open" {
        let applied = viewer.is_some_and(|v| {
            v.role == Role::Paralegal && case.case_id().is_some_and(|id| v.has_applied(&id))
        });
        if applied {
            return CaseState::Applied;
        }
    }

    CaseState::from_normalized(&normalize_status(&case.status))
}

/// Dispute entry from the case workspace. Currently disabled server-side.
pub fn can_open_dispute_from_case(_case: &Case, _viewer: &Viewer) -> bool {
    false
}

/// Every task is complete. Rendered checkbox states win over the raw task
/// data when the view has the list on screen.
pub fn all_tasks_complete(case: &Case, rendered: Option<&[bool]>) -> bool {
    match rendered {
        Some(states) if !states.is_empty() => states.iter().all(|done| *done),
        _ => case.tasks.iter().all(|t| t.completed),
    }
}

pub fn is_case_attorney(case: &Case, viewer: &Viewer) -> bool {
    viewer.role == Role::Attorney
        && case
            .attorney_ref_id()
            .is_some_and(|id| id == viewer.user_id)
}

pub fn is_assigned_paralegal(case: &Case, viewer: &Viewer) -> bool {
    viewer.role == Role::Paralegal && case.paralegal_ref_id() == Some(viewer.user_id.as_str())
}

/// Which case actions are legal right now.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActionEligibility {
    pub complete: bool,
    pub withdraw: bool,
    pub partial_payout: bool,
    pub reject_payout: bool,
    pub relist: bool,
    pub dispute: bool,
    pub edit_tasks: bool,
    pub review_documents: bool,
    pub send_messages: bool,
}

impl ActionEligibility {
    pub fn evaluate(
        case: &Case,
        state: &CaseState,
        viewer: &Viewer,
        rendered_tasks: Option<&[bool]>,
        withdrawal: &WithdrawalView,
    ) -> Self {
        let attorney = is_case_attorney(case, viewer);
        let paralegal = is_assigned_paralegal(case, viewer);
        let unlocked = state.workspace_unlocked();
        let finished = case.read_only || case.archived || case.payment_released;
        let disputed = *state == CaseState::Disputed;

        let complete = attorney
            && *state == CaseState::FundedInProgress
            && !finished
            && case.has_paralegal()
            && all_tasks_complete(case, rendered_tasks);

        let tasks_done = !case.tasks.is_empty() && all_tasks_complete(case, rendered_tasks);
        let withdraw = paralegal
            && !matches!(
                state,
                CaseState::Paused | CaseState::Disputed | CaseState::Completed | CaseState::Closed
            )
            && !tasks_done;

        Self {
            complete,
            withdraw,
            partial_payout: !disputed && withdrawal.show_partial,
            reject_payout: !disputed && withdrawal.show_reject,
            relist: !disputed && withdrawal.show_relist,
            dispute: can_open_dispute_from_case(case, viewer),
            edit_tasks: unlocked && !finished && (attorney || paralegal),
            review_documents: unlocked && attorney,
            send_messages: unlocked && (attorney || paralegal),
        }
    }
}

/// Everything the view needs to draw the case header and action bar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseView {
    pub state: CaseState,
    pub actions: ActionEligibility,
    pub withdrawal: WithdrawalView,
}

impl CaseView {
    pub fn derive(
        case: &Case,
        viewer: &Viewer,
        rendered_tasks: Option<&[bool]>,
        now: DateTime<Utc>,
    ) -> Self {
        let state = resolve_case_state(case, Some(viewer));
        let withdrawal = WithdrawalView::evaluate(case, is_case_attorney(case, viewer), now);
        let actions = ActionEligibility::evaluate(case, &state, viewer, rendered_tasks, &withdrawal);
        Self {
            state,
            actions,
            withdrawal,
        }
    }

    pub fn workspace_locked(&self) -> bool {
        !self.state.workspace_unlocked()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::constants::PAUSE_REASON_WITHDRAWAL;
    use crate::models::{PartyRef, Task};
    use crate::payout::ZERO_PAYOUT_BANNER;
    use crate::types::CaseId;

    fn funded_case() -> Case {
        Case {
            id: Some("c1".into()),
            status: "in progress".into(),
            escrow_intent_id: Some("pi_1".into()),
            escrow_status: Some("funded".into()),
            attorney_id: Some("a1".into()),
            paralegal_id: Some("p1".into()),
            tasks: vec![Task::new("Draft motion", true), Task::new("File", true)],
            ..Case::default()
        }
    }

    fn attorney() -> Viewer {
        Viewer::new("a1", Role::Attorney)
    }

    fn paralegal() -> Viewer {
        Viewer::new("p1", Role::Paralegal)
    }

    #[test]
    fn funded_in_progress_requires_funded_escrow() {
        let case = funded_case();
        assert_eq!(resolve_case_state(&case, None), CaseState::FundedInProgress);

        let pending = Case {
            escrow_status: Some("pending".into()),
            ..funded_case()
        };
        assert_eq!(resolve_case_state(&pending, None), CaseState::InProgress);

        let no_intent = Case {
            escrow_intent_id: None,
            ..funded_case()
        };
        assert_eq!(resolve_case_state(&no_intent, None), CaseState::InProgress);

        let via_object = Case {
            paralegal_id: None,
            paralegal: Some(PartyRef::Id("p1".into())),
            status: "in_progress".into(),
            ..funded_case()
        };
        assert_eq!(resolve_case_state(&via_object, None), CaseState::FundedInProgress);
    }

    #[test]
    fn status_aliases_fold() {
        assert_eq!(normalize_status("In_Progress"), "in progress");
        assert_eq!(normalize_status("cancelled"), "closed");
        assert_eq!(normalize_status("canceled"), "closed");
        assert_eq!(normalize_status("awaiting_funding"), "open");
        assert_eq!(normalize_status("assigned"), "open");
        assert_eq!(normalize_status("reviewing"), "in progress");
        assert_eq!(normalize_status("funded_in_progress"), "in progress");
        assert_eq!(normalize_status("  "), "open");
        assert_eq!(normalize_status("paused"), "paused");
    }

    #[test]
    fn applied_for_open_case_with_application() {
        let case = Case {
            id: Some("c7".into()),
            status: "open".into(),
            ..Case::default()
        };
        let viewer = paralegal().with_applications([CaseId::from("c7")]);
        assert_eq!(resolve_case_state(&case, Some(&viewer)), CaseState::Applied);
        assert_eq!(resolve_case_state(&case, Some(&paralegal())), CaseState::Open);

        let applied = Case {
            status: "applied".into(),
            ..case
        };
        assert_eq!(resolve_case_state(&applied, None), CaseState::Applied);
    }

    #[test]
    fn complete_requires_every_task_done() {
        let now = Utc::now();
        let case = funded_case();
        assert!(CaseView::derive(&case, &attorney(), None, now).actions.complete);

        let view = CaseView::derive(&case, &attorney(), Some(&[true, false]), now);
        assert!(!view.actions.complete, "rendered checkboxes take precedence");

        let mut open_task = funded_case();
        open_task.tasks[1].completed = false;
        assert!(!CaseView::derive(&open_task, &attorney(), None, now).actions.complete);

        let released = Case {
            payment_released: true,
            ..funded_case()
        };
        assert!(!CaseView::derive(&released, &attorney(), None, now).actions.complete);
        assert!(!CaseView::derive(&case, &paralegal(), None, now).actions.complete);
    }

    #[test]
    fn withdraw_only_for_assigned_paralegal_with_open_tasks() {
        let now = Utc::now();
        let mut case = funded_case();
        case.tasks[0].completed = false;

        assert!(CaseView::derive(&case, &paralegal(), None, now).actions.withdraw);
        assert!(!CaseView::derive(&case, &Viewer::new("p2", Role::Paralegal), None, now)
            .actions
            .withdraw);

        let all_done = funded_case();
        assert!(!CaseView::derive(&all_done, &paralegal(), None, now).actions.withdraw);

        let paused = Case {
            status: "paused".into(),
            ..case
        };
        assert!(!CaseView::derive(&paused, &paralegal(), None, now).actions.withdraw);
    }

    #[test]
    fn unassigned_attorney_field_grants_nothing() {
        let case = Case {
            attorney_id: None,
            attorney: None,
            ..funded_case()
        };
        assert!(!is_case_attorney(&case, &attorney()));
        let view = CaseView::derive(&case, &attorney(), None, Utc::now());
        assert!(!view.actions.complete);
        assert!(!view.actions.edit_tasks);
        assert!(!view.actions.send_messages);
    }

    #[test]
    fn dispute_entry_stays_disabled() {
        let view = CaseView::derive(&funded_case(), &paralegal(), None, Utc::now());
        assert!(!view.actions.dispute);
    }

    #[test]
    fn disputed_case_locks_financial_actions() {
        let now = Utc::now();
        let case = Case {
            status: "disputed".into(),
            pause_reason: Some(PAUSE_REASON_WITHDRAWAL.into()),
            withdrawn_at: Some(now - Duration::hours(48)),
            tasks: vec![Task::new("a", true), Task::new("b", false)],
            ..funded_case()
        };
        let view = CaseView::derive(&case, &attorney(), None, now);
        assert_eq!(view.state, CaseState::Disputed);
        assert!(!view.actions.complete);
        assert!(!view.actions.partial_payout);
        assert!(!view.actions.reject_payout);
        assert!(!view.actions.relist);
        assert!(view.workspace_locked());
    }

    #[test]
    fn withdrawal_scenarios_for_attorney() {
        let now = Utc::now();
        let withdrawn = |done: usize| Case {
            status: "paused".into(),
            pause_reason: Some(PAUSE_REASON_WITHDRAWAL.into()),
            withdrawn_at: Some(now - Duration::hours(25)),
            tasks: (0..3).map(|i| Task::new(format!("t{i}"), i < done)).collect(),
            ..funded_case()
        };

        let none_done = CaseView::derive(&withdrawn(0), &attorney(), None, now);
        assert!(!none_done.actions.partial_payout);
        assert!(!none_done.actions.reject_payout);
        assert_eq!(none_done.withdrawal.banner.as_deref(), Some(ZERO_PAYOUT_BANNER));

        let one_done = CaseView::derive(&withdrawn(1), &attorney(), None, now);
        assert!(one_done.actions.partial_payout);
        assert!(one_done.actions.reject_payout);
    }
}
