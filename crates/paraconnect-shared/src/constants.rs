/// Application name
pub const APP_NAME: &str = "Let's-ParaConnect";

/// Fallback polling interval while the event stream is down (milliseconds)
pub const POLL_INTERVAL_MS: u64 = 3_000;

/// Reconnect delay for the event stream when the server sends no `retry:` hint
pub const STREAM_RETRY_MS: u64 = 3_000;

/// Hold window after a paralegal withdrawal before payout decisions unlock
pub const WITHDRAWAL_HOLD_HOURS: i64 = 24;

/// Maximum attachment size accepted by the staging queue (25 MiB)
pub const MAX_ATTACHMENT_SIZE: u64 = 25 * 1024 * 1024;

/// Pause reason the server records when the assigned paralegal withdraws
pub const PAUSE_REASON_WITHDRAWAL: &str = "paralegal_withdrew";

/// Escrow status of a captured, held payment
pub const ESCROW_FUNDED: &str = "funded";

/// Default currency when a case carries none
pub const DEFAULT_CURRENCY: &str = "usd";

/// Header carrying the CSRF token on mutating requests
pub const CSRF_HEADER: &str = "X-CSRF-Token";

/// Envelope keys tried, in order, when a response wraps its list
pub const LIST_ENVELOPE_KEYS: &[&str] = &[
    "items",
    "messages",
    "documents",
    "files",
    "uploads",
    "cases",
    "applications",
    "data",
];
