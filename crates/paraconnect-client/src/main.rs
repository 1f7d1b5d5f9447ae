//! # paraconnect-watch
//!
//! Opens one case workspace against a ParaConnect server and logs every
//! workspace event until interrupted.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tracing::info;

use paraconnect_client::{init_tracing, ApiClient, CaseApi, ClientConfig, Workspace, WorkspaceEvent};
use paraconnect_shared::constants::APP_NAME;
use paraconnect_shared::{CaseId, Viewer};
use paraconnect_store::Database;

#[derive(Parser, Debug)]
#[command(name = "paraconnect-watch", version, about = "Watch a ParaConnect case workspace")]
struct Args {
    /// Case to open.
    case_id: String,

    /// API origin; overrides PARACONNECT_BASE_URL.
    #[arg(long)]
    base_url: Option<String>,

    /// Attachment queue database; overrides PARACONNECT_DB_PATH.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Poll instead of opening the event stream.
    #[arg(long)]
    no_stream: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();

    // -----------------------------------------------------------------------
    // 1. Configuration
    // -----------------------------------------------------------------------
    let mut config = ClientConfig::from_env();
    if let Some(url) = args.base_url {
        config.base_url = url.trim_end_matches('/').to_string();
    }
    if let Some(path) = args.db_path {
        config.db_path = Some(path);
    }
    if args.no_stream {
        config.realtime = false;
    }
    info!("Starting {} watcher v{}", APP_NAME, env!("CARGO_PKG_VERSION"));
    info!(
        base_url = %config.base_url,
        realtime = config.realtime,
        poll_interval = ?config.poll_interval,
        authenticated = config.auth_token.is_some(),
        "Loaded configuration"
    );

    // -----------------------------------------------------------------------
    // 2. Local store and API client
    // -----------------------------------------------------------------------
    let db = match &config.db_path {
        Some(path) => Database::open_at(path),
        None => Database::new(),
    }
    .context("opening attachment queue database")?;
    info!(path = ?db.path(), "Attachment queue ready");

    let api = Arc::new(ApiClient::new(&config)?);

    // -----------------------------------------------------------------------
    // 3. Resolve the viewer
    // -----------------------------------------------------------------------
    let user = api.current_user().await.context("fetching current user")?;
    let user_id = user
        .user_id()
        .map(str::to_string)
        .context("current user has no id")?;
    let role = user.role().context("current user has an unknown role")?;

    let applications = match api.my_applications().await {
        Ok(apps) => apps,
        Err(e) => {
            tracing::warn!(error = %e, "Could not load applications");
            Vec::new()
        }
    };
    let viewer = Viewer::new(user_id, role)
        .with_applications(applications.iter().filter_map(|a| a.applied_case()));
    info!(user = %viewer.user_id, role = ?viewer.role, "Signed in");

    // -----------------------------------------------------------------------
    // 4. Open the workspace and log events
    // -----------------------------------------------------------------------
    let workspace = Workspace::new(api, Arc::new(Mutex::new(db)), viewer, config);
    let mut events = workspace.subscribe();

    let view = workspace.open_case(CaseId::new(args.case_id)).await?;
    info!(state = %view.state, locked = view.workspace_locked(), "Case opened");
    if let Some(banner) = &view.withdrawal.banner {
        info!("{banner}");
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
            event = events.recv() => match event {
                Ok(event) => log_event(&event),
                Err(RecvError::Lagged(skipped)) => tracing::warn!(skipped, "Event log fell behind"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    workspace.close_case();
    Ok(())
}

fn log_event(event: &WorkspaceEvent) {
    match event {
        WorkspaceEvent::CaseUpdated { case_id, view } => {
            info!(%case_id, state = %view.state, actions = ?view.actions, "Case updated");
        }
        WorkspaceEvent::MessagesUpdated { case_id, messages } => {
            info!(%case_id, count = messages.len(), "Messages updated");
            if let Some(last) = messages.last() {
                info!(%case_id, "  latest: {}", last.body_text());
            }
        }
        WorkspaceEvent::DocumentsUpdated { case_id, documents } => {
            let pending = documents.iter().filter(|d| d.optimistic).count();
            info!(%case_id, count = documents.len(), pending, "Documents updated");
        }
        WorkspaceEvent::TasksUpdated { case_id, tasks } => {
            let done = tasks.iter().filter(|t| t.completed).count();
            info!(%case_id, done, total = tasks.len(), "Tasks updated");
        }
        WorkspaceEvent::Status { level, message, .. } => {
            info!(?level, "{message}");
        }
        WorkspaceEvent::TransportChanged { mode } => {
            info!(?mode, "Transport changed");
        }
        other => tracing::debug!(event = ?other, "Workspace event"),
    }
}
