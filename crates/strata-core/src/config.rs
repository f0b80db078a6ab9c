// ── Runtime session configuration ──
//
// These types describe *how* to talk to a portal deployment. They carry
// credential data and sync tuning, but never touch disk. The embedding
// application constructs a `PortalConfig` and hands it in.

use std::time::Duration;

use secrecy::SecretString;
use url::Url;

/// TLS verification strategy.
#[derive(Debug, Clone, Default)]
pub enum TlsVerification {
    /// System CA store (strict). Default -- portals run on public certs.
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(std::path::PathBuf),
    /// Skip verification (staging portals with self-signed certs).
    DangerAcceptInvalid,
}

/// Configuration for one portal session.
///
/// Built by the embedding application, passed to `Portal` -- core never
/// reads config files.
#[derive(Debug, Clone)]
pub struct PortalConfig {
    /// Portal base URL (e.g., `https://portal.example.com`).
    pub url: Url,
    /// Bearer token for the signed-in user.
    pub token: SecretString,
    /// TLS verification strategy.
    pub tls: TlsVerification,
    /// Request timeout.
    pub timeout: Duration,
    /// Page window size for both synchronized stores.
    pub page_size: u32,
    /// How long a soft-delete undo token stays valid.
    pub undo_grace: Duration,
    /// Feed outages longer than this trigger a corrective refetch on
    /// reconnect.
    pub reconnect_gap: Duration,
    /// How often to perform a full refresh (seconds). 0 = never.
    pub refresh_interval_secs: u64,
    /// Enable the change-feed WebSocket.
    pub feed_enabled: bool,
}

impl PortalConfig {
    /// A config with production defaults for the given portal and token.
    pub fn new(url: Url, token: SecretString) -> Self {
        Self {
            url,
            token,
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(30),
            page_size: 25,
            undo_grace: Duration::from_secs(6),
            reconnect_gap: Duration::from_secs(5),
            refresh_interval_secs: 300,
            feed_enabled: true,
        }
    }
}
