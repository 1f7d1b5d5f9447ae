//! # paraconnect-shared
//!
//! Pure domain logic for the ParaConnect case workspace: wire models, the
//! lifecycle state resolver, withdrawal/payout rules, snapshot change
//! detection, document reconciliation and refresh coalescing. Nothing here
//! performs I/O, so all of it is unit-testable without a server.

pub mod constants;
pub mod documents;
pub mod error;
pub mod lifecycle;
pub mod models;
pub mod payout;
pub mod refresh;
pub mod snapshot;
pub mod types;

pub use error::{DomainError, PayoutError};
pub use lifecycle::{ActionEligibility, CaseState, CaseView};
pub use models::{Application, Case, CurrentUser, Document, DocumentStatus, Message, PartyRef, Task};
pub use refresh::{RefreshDecision, RefreshFlags, RefreshGate, Suppression};
pub use types::{CaseId, Role, Viewer};
