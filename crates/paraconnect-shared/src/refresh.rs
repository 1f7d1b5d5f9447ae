//! Refresh scopes and the coalescing gate that serialises refreshes.
//!
//! At most one refresh runs per workspace. Requests that arrive while one is
//! in flight, or while refreshing is suppressed, are OR-merged into a single
//! pending set which is drained as exactly one follow-up. While the
//! workspace is locked only the case record (the `tasks` scope) is fetched.

use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RefreshFlags {
    pub messages: bool,
    pub documents: bool,
    pub tasks: bool,
}

impl RefreshFlags {
    pub const NONE: Self = Self {
        messages: false,
        documents: false,
        tasks: false,
    };

    pub fn all() -> Self {
        Self {
            messages: true,
            documents: true,
            tasks: true,
        }
    }

    pub fn messages() -> Self {
        Self {
            messages: true,
            ..Self::NONE
        }
    }

    pub fn documents() -> Self {
        Self {
            documents: true,
            ..Self::NONE
        }
    }

    pub fn tasks() -> Self {
        Self {
            tasks: true,
            ..Self::NONE
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.messages || self.documents || self.tasks)
    }

    pub fn merge(self, other: Self) -> Self {
        Self {
            messages: self.messages || other.messages,
            documents: self.documents || other.documents,
            tasks: self.tasks || other.tasks,
        }
    }

    /// Scope requested by a named stream event. `ping` and unknown events
    /// request nothing.
    pub fn from_stream_event(name: &str) -> Option<Self> {
        match name {
            "messages" => Some(Self::messages()),
            "documents" => Some(Self::documents()),
            "tasks" => Some(Self::tasks()),
            "case" => Some(Self::all()),
            _ => None,
        }
    }
}

impl std::ops::BitOr for RefreshFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.merge(rhs)
    }
}

impl std::ops::BitOrAssign for RefreshFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = self.merge(rhs);
    }
}

/// Why a refresh was held back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Suppression {
    Hidden,
    SendInFlight,
    WorkspaceLocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshDecision {
    /// Caller owns the in-flight slot and must call [`RefreshGate::finish`].
    Start(RefreshFlags),
    /// Merged into the pending set.
    Deferred,
}

#[derive(Debug, Default)]
pub struct RefreshGate {
    in_flight: bool,
    pending: RefreshFlags,
}

impl RefreshGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn pending(&self) -> RefreshFlags {
        self.pending
    }

    /// The part of the pending set that may run under `suppression`. A
    /// locked workspace still reloads the case record, since that is what
    /// unlocks it.
    fn take_runnable(&mut self, suppression: Option<Suppression>) -> Option<RefreshFlags> {
        let scope = match suppression {
            None => std::mem::take(&mut self.pending),
            Some(Suppression::WorkspaceLocked) if self.pending.tasks => {
                self.pending.tasks = false;
                RefreshFlags::tasks()
            }
            Some(_) => return None,
        };
        (!scope.is_empty()).then_some(scope)
    }

    pub fn request(&mut self, flags: RefreshFlags, suppression: Option<Suppression>) -> RefreshDecision {
        self.pending |= flags;
        if self.in_flight {
            return RefreshDecision::Deferred;
        }

        // An eligible request catches up on everything deferred before it.
        match self.take_runnable(suppression) {
            Some(scope) => {
                self.in_flight = true;
                RefreshDecision::Start(scope)
            }
            None => RefreshDecision::Deferred,
        }
    }

    /// Ends the in-flight refresh. Returns the follow-up scope when requests
    /// piled up meanwhile; the slot stays taken for that follow-up.
    pub fn finish(&mut self, suppression: Option<Suppression>) -> Option<RefreshFlags> {
        let next = self.take_runnable(suppression);
        if next.is_none() {
            self.in_flight = false;
        }
        next
    }

    /// Called when a suppression lifts. Starts whatever deferred work may
    /// now run, if idle.
    pub fn resume(&mut self, suppression: Option<Suppression>) -> Option<RefreshFlags> {
        if self.in_flight {
            return None;
        }
        let next = self.take_runnable(suppression);
        self.in_flight = next.is_some();
        next
    }

    /// Forget everything; used when the active case changes.
    pub fn reset(&mut self) {
        self.in_flight = false;
        self.pending = RefreshFlags::NONE;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_events_map_to_scopes() {
        assert_eq!(RefreshFlags::from_stream_event("messages"), Some(RefreshFlags::messages()));
        assert_eq!(RefreshFlags::from_stream_event("case"), Some(RefreshFlags::all()));
        assert_eq!(RefreshFlags::from_stream_event("ping"), None);
        assert_eq!(RefreshFlags::from_stream_event("other"), None);
    }

    #[test]
    fn overlapping_requests_coalesce_into_one_follow_up() {
        let mut gate = RefreshGate::new();
        assert_eq!(
            gate.request(RefreshFlags::tasks(), None),
            RefreshDecision::Start(RefreshFlags::tasks())
        );

        assert_eq!(gate.request(RefreshFlags::messages(), None), RefreshDecision::Deferred);
        assert_eq!(gate.request(RefreshFlags::documents(), None), RefreshDecision::Deferred);

        let follow_up = gate.finish(None).expect("one follow-up");
        assert_eq!(
            follow_up,
            RefreshFlags {
                messages: true,
                documents: true,
                tasks: false
            }
        );
        assert!(gate.in_flight());

        assert_eq!(gate.finish(None), None);
        assert!(!gate.in_flight());
    }

    #[test]
    fn suppressed_requests_are_remembered() {
        let mut gate = RefreshGate::new();
        assert_eq!(
            gate.request(RefreshFlags::messages(), Some(Suppression::Hidden)),
            RefreshDecision::Deferred
        );
        assert_eq!(
            gate.request(RefreshFlags::tasks(), Some(Suppression::SendInFlight)),
            RefreshDecision::Deferred
        );
        assert!(!gate.in_flight());

        let resumed = gate.resume(None).expect("pending scope");
        assert!(resumed.messages && resumed.tasks && !resumed.documents);
    }

    #[test]
    fn eligible_request_absorbs_pending() {
        let mut gate = RefreshGate::new();
        gate.request(RefreshFlags::documents(), Some(Suppression::WorkspaceLocked));
        match gate.request(RefreshFlags::messages(), None) {
            RefreshDecision::Start(scope) => {
                assert!(scope.messages && scope.documents);
            }
            other => panic!("expected start, got {other:?}"),
        }
        assert!(gate.pending().is_empty());
    }

    #[test]
    fn finish_while_suppressed_keeps_pending() {
        let mut gate = RefreshGate::new();
        gate.request(RefreshFlags::tasks(), None);
        gate.request(RefreshFlags::messages(), None);
        assert_eq!(gate.finish(Some(Suppression::Hidden)), None);
        assert!(!gate.in_flight());
        assert_eq!(gate.pending(), RefreshFlags::messages());
    }

    #[test]
    fn locked_workspace_only_reloads_the_case() {
        let mut gate = RefreshGate::new();
        let locked = Some(Suppression::WorkspaceLocked);
        assert_eq!(
            gate.request(RefreshFlags::messages(), locked),
            RefreshDecision::Deferred
        );
        assert_eq!(
            gate.request(RefreshFlags::all(), locked),
            RefreshDecision::Start(RefreshFlags::tasks())
        );
        assert_eq!(gate.request(RefreshFlags::all(), locked), RefreshDecision::Deferred);

        // The reload unlocked the workspace: everything else follows once.
        let follow_up = gate.finish(None).expect("follow-up");
        assert_eq!(follow_up, RefreshFlags::all());
        assert_eq!(gate.finish(None), None);
        assert!(!gate.in_flight());
    }

    #[test]
    fn hidden_workspace_fetches_nothing() {
        let mut gate = RefreshGate::new();
        let hidden = Some(Suppression::Hidden);
        assert_eq!(gate.request(RefreshFlags::all(), hidden), RefreshDecision::Deferred);
        assert_eq!(gate.resume(hidden), None);
        assert!(!gate.in_flight());
        assert_eq!(gate.resume(None), Some(RefreshFlags::all()));
    }
}
