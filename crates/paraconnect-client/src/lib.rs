//! # paraconnect-client
//!
//! Live case workspace for the ParaConnect marketplace: REST client,
//! realtime transport (event stream with polling fallback), the workspace
//! session with its case actions, and the attachment staging queue.

pub mod api;
pub mod attachments;
pub mod config;
pub mod error;
pub mod events;
pub mod realtime;
pub mod sse;
pub mod state;
pub mod workspace;

pub use api::{ApiClient, CaseApi, ProgressFn, UploadRequest};
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use events::{CaseAction, StatusLevel, WorkspaceEvent};
pub use realtime::TransportMode;
pub use workspace::{RefreshOutcome, Workspace};

use tracing_subscriber::{fmt, EnvFilter};

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// filter.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("paraconnect_client=debug,paraconnect_store=info,paraconnect_shared=info,warn")
    });

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
