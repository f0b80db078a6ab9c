use thiserror::Error;

/// Top-level error type for the `strata-api` crate.
///
/// Covers every failure mode across the REST surface and the change feed.
/// `strata-core` maps these into its own taxonomy -- consumers of the core
/// crate never see HTTP status codes directly.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// The portal rejected the bearer token or the caller lacks scope.
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// Session has expired (token revoked or timed out).
    #[error("Session expired -- re-authentication required")]
    SessionExpired,

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// TLS handshake or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Rate limited by the portal. Includes retry-after in seconds.
    #[error("Rate limited -- retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    // ── REST API ────────────────────────────────────────────────────
    /// The requested resource does not exist (HTTP 404).
    #[error("Not found: {resource}")]
    NotFound { resource: String },

    /// The server rejected a write because the entity changed underneath
    /// it (HTTP 409). The caller must refetch, never force-overwrite.
    #[error("Write conflict on {resource}: {message}")]
    Conflict { resource: String, message: String },

    /// Any other structured error from the portal API.
    #[error("Portal API error (HTTP {status}): {message}")]
    Api { message: String, status: u16 },

    // ── Change feed ─────────────────────────────────────────────────
    /// WebSocket connection to the change feed failed.
    #[error("Feed connection failed: {0}")]
    FeedConnect(String),

    /// Change feed closed unexpectedly.
    #[error("Feed closed (code {code}): {reason}")]
    FeedClosed { code: u16, reason: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with a body preview for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if this error indicates auth has expired
    /// and re-authentication might resolve it.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::Authentication { .. } | Self::SessionExpired)
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Timeout { .. } | Self::RateLimited { .. } | Self::FeedConnect(_) => true,
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Returns `true` if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Transport(e) => e.status() == Some(reqwest::StatusCode::NOT_FOUND),
            Self::NotFound { .. } => true,
            _ => false,
        }
    }

    /// Returns `true` if this is a stale-write conflict (HTTP 409).
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}
