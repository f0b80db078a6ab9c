// ── Core error types ──
//
// User-facing errors from strata-core. These are NOT transport-specific --
// consumers never see HTTP status codes or JSON parse failures directly.
// The `From<strata_api::Error>` impl translates transport-layer errors
// into the three classes the sync layer reasons about: transient (absorbed
// by cache self-correction), authorization (fatal, surfaced), and stale
// write (discard the optimistic edit and refetch).

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Recoverable ──────────────────────────────────────────────────
    /// Connectivity failure on a fetch, write, or subscribe. Recovered by
    /// corrective refetch or feed reconnect; never fatal on its own.
    #[error("Transient network failure: {reason}")]
    TransientNetwork { reason: String },

    /// The server rejected a write because the entity changed underneath
    /// it. Resolved by discarding the optimistic edit and refetching.
    #[error("Stale write rejected for {identifier}")]
    StaleWrite { identifier: String },

    // ── Fatal ────────────────────────────────────────────────────────
    /// Session or scope is no longer valid. Requires re-authentication;
    /// never retried.
    #[error("Authorization failed: {message}")]
    Authorization { message: String },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Entity not found: {identifier}")]
    NotFound { identifier: String },

    // ── Lifecycle / configuration ────────────────────────────────────
    #[error("Portal disconnected")]
    PortalDisconnected,

    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Other server failures ────────────────────────────────────────
    #[error("Portal API error: {message}")]
    Api {
        message: String,
        status: Option<u16>,
    },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Transient failures are absorbed into cache self-correction and
    /// never surfaced as hard UI failures.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientNetwork { .. })
    }

    /// Only authorization failures propagate past the action surface.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Authorization { .. })
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<strata_api::Error> for CoreError {
    fn from(err: strata_api::Error) -> Self {
        match err {
            strata_api::Error::Authentication { message } => CoreError::Authorization { message },
            strata_api::Error::SessionExpired => CoreError::Authorization {
                message: "session expired -- re-authentication required".into(),
            },
            strata_api::Error::Conflict { resource, .. } => CoreError::StaleWrite {
                identifier: resource,
            },
            strata_api::Error::NotFound { resource } => CoreError::NotFound {
                identifier: resource,
            },
            strata_api::Error::Transport(e) => {
                if e.is_timeout() || e.is_connect() {
                    CoreError::TransientNetwork {
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Api {
                        message: e.to_string(),
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            strata_api::Error::Api { message, status } if status >= 500 => {
                CoreError::TransientNetwork {
                    reason: format!("HTTP {status}: {message}"),
                }
            }
            strata_api::Error::Api { message, status } => CoreError::Api {
                message,
                status: Some(status),
            },
            strata_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("invalid URL: {e}"),
            },
            strata_api::Error::Tls(msg) => CoreError::Config {
                message: format!("TLS error: {msg}"),
            },
            e @ (strata_api::Error::Timeout { .. }
            | strata_api::Error::RateLimited { .. }
            | strata_api::Error::FeedConnect(_)
            | strata_api::Error::FeedClosed { .. }) => CoreError::TransientNetwork {
                reason: e.to_string(),
            },
            strata_api::Error::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("deserialization error: {message}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_maps_to_stale_write() {
        let err = CoreError::from(strata_api::Error::Conflict {
            resource: "/api/v1/notifications/n-1".into(),
            message: "entity changed".into(),
        });
        assert!(matches!(err, CoreError::StaleWrite { .. }));
        assert!(!err.is_fatal());
        assert!(!err.is_transient());
    }

    #[test]
    fn session_expired_is_fatal() {
        let err = CoreError::from(strata_api::Error::SessionExpired);
        assert!(err.is_fatal());
    }

    #[test]
    fn server_error_is_transient() {
        let err = CoreError::from(strata_api::Error::Api {
            message: "maintenance".into(),
            status: 503,
        });
        assert!(err.is_transient());
    }
}
