use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Server-assigned case identifier (opaque string, usually an ObjectId).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct CaseId(pub String);

impl CaseId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CaseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CaseId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Attorney,
    Paralegal,
    Admin,
}

impl Role {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "attorney" => Some(Self::Attorney),
            "paralegal" => Some(Self::Paralegal),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

/// The signed-in user looking at the workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Viewer {
    pub user_id: String,
    pub role: Role,
    /// Cases the viewer (as a paralegal) has applied to.
    pub applied_case_ids: HashSet<CaseId>,
}

impl Viewer {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
            applied_case_ids: HashSet::new(),
        }
    }

    pub fn with_applications(mut self, ids: impl IntoIterator<Item = CaseId>) -> Self {
        self.applied_case_ids.extend(ids);
        self
    }

    pub fn has_applied(&self, case_id: &CaseId) -> bool {
        self.applied_case_ids.contains(case_id)
    }
}
