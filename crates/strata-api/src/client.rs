// Portal REST client
//
// Wraps `reqwest::Client` with portal-specific URL construction and
// status-code mapping. All endpoint methods return deserialized payloads;
// the HTTP layer never leaks into callers beyond the `Error` taxonomy.

use reqwest::StatusCode;
use secrecy::SecretString;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::transport::TransportConfig;
use crate::types::{
    ActiveAdministrator, AdministratorRecord, NotificationPatch, NotificationRecord, Page,
    PageQuery,
};

/// Async HTTP client for the portal's REST API.
///
/// Every listing endpoint is paged and idempotent; every write reports a
/// definitive success or failure. A 409 response surfaces as
/// [`Error::Conflict`] so the caller can refetch instead of retrying the
/// same patch.
pub struct PortalClient {
    http: reqwest::Client,
    base_url: Url,
}

impl PortalClient {
    /// Create a client that authenticates with a bearer token.
    pub fn new(
        base_url: Url,
        token: &SecretString,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let http = transport.build_client_with_bearer(token)?;
        Ok(Self { http, base_url })
    }

    /// Create a client with a pre-built `reqwest::Client`.
    ///
    /// Use this when the token is already baked into the client's default
    /// headers, or in tests against a mock server.
    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    /// The portal base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The change-feed WebSocket URL derived from the base URL.
    pub fn feed_url(&self) -> Result<Url, Error> {
        let scheme = if self.base_url.scheme() == "https" {
            "wss"
        } else {
            "ws"
        };
        let host = self.base_url.host_str().unwrap_or("localhost");
        let url_str = match self.base_url.port() {
            Some(p) => format!("{scheme}://{host}:{p}/api/v1/feed"),
            None => format!("{scheme}://{host}/api/v1/feed"),
        };
        Ok(Url::parse(&url_str)?)
    }

    // ── URL builder ──────────────────────────────────────────────────

    /// Build a full URL for an API path: `{base}/api/v1/{path}`.
    pub(crate) fn api_url(&self, path: &str) -> Url {
        let base = self.base_url.as_str().trim_end_matches('/');
        let full = format!("{base}/api/v1/{path}");
        Url::parse(&full).expect("invalid API URL")
    }

    // ── Notification endpoints ───────────────────────────────────────

    /// Fetch one page of notifications for the signed-in user.
    pub async fn list_notifications(
        &self,
        query: &PageQuery,
    ) -> Result<Page<NotificationRecord>, Error> {
        self.get_with_params(self.api_url("notifications"), &query.params())
            .await
    }

    /// Fetch a single notification (used for corrective refetch).
    pub async fn get_notification(&self, id: &str) -> Result<NotificationRecord, Error> {
        self.get(self.api_url(&format!("notifications/{id}"))).await
    }

    /// Apply a partial update to a notification.
    pub async fn update_notification(
        &self,
        id: &str,
        patch: &NotificationPatch,
    ) -> Result<(), Error> {
        self.patch_no_content(self.api_url(&format!("notifications/{id}")), patch)
            .await
    }

    /// Restore a soft-deleted notification.
    ///
    /// The portal honors this even after the client-side undo window has
    /// elapsed -- restore is convergent, safe to retry.
    pub async fn restore_notification(&self, id: &str) -> Result<(), Error> {
        self.post_no_content(self.api_url(&format!("notifications/{id}/restore")))
            .await
    }

    // ── Administrator endpoints ──────────────────────────────────────

    /// Fetch one page of administrators visible to the signed-in manager.
    pub async fn list_administrators(
        &self,
        query: &PageQuery,
    ) -> Result<Page<AdministratorRecord>, Error> {
        self.get_with_params(self.api_url("administrators"), &query.params())
            .await
    }

    /// Fetch a single administrator.
    pub async fn get_administrator(&self, id: &str) -> Result<AdministratorRecord, Error> {
        self.get(self.api_url(&format!("administrators/{id}")))
            .await
    }

    // ── Selection persistence ────────────────────────────────────────

    /// Read the server-persisted active administrator preference.
    pub async fn get_active_administrator(&self) -> Result<Option<String>, Error> {
        let body: ActiveAdministrator = self.get(self.api_url("me/active-administrator")).await?;
        Ok(body.administrator_id)
    }

    /// Persist the active administrator preference. `None` clears it.
    pub async fn set_active_administrator(&self, id: Option<&str>) -> Result<(), Error> {
        let body = ActiveAdministrator {
            administrator_id: id.map(str::to_owned),
        };
        self.put_no_content(self.api_url("me/active-administrator"), &body)
            .await
    }

    // ── Request helpers ──────────────────────────────────────────────

    async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, Error> {
        debug!("GET {}", url);
        let resp = self.http.get(url).send().await.map_err(Error::Transport)?;
        Self::parse_json(resp).await
    }

    async fn get_with_params<T: DeserializeOwned>(
        &self,
        url: Url,
        params: &[(String, String)],
    ) -> Result<T, Error> {
        debug!("GET {}", url);
        let resp = self
            .http
            .get(url)
            .query(params)
            .send()
            .await
            .map_err(Error::Transport)?;
        Self::parse_json(resp).await
    }

    async fn patch_no_content(
        &self,
        url: Url,
        body: &(impl Serialize + Sync),
    ) -> Result<(), Error> {
        debug!("PATCH {}", url);
        let resp = self
            .http
            .patch(url)
            .json(body)
            .send()
            .await
            .map_err(Error::Transport)?;
        Self::expect_no_content(resp).await
    }

    async fn put_no_content(&self, url: Url, body: &(impl Serialize + Sync)) -> Result<(), Error> {
        debug!("PUT {}", url);
        let resp = self
            .http
            .put(url)
            .json(body)
            .send()
            .await
            .map_err(Error::Transport)?;
        Self::expect_no_content(resp).await
    }

    async fn post_no_content(&self, url: Url) -> Result<(), Error> {
        debug!("POST {}", url);
        let resp = self.http.post(url).send().await.map_err(Error::Transport)?;
        Self::expect_no_content(resp).await
    }

    // ── Response handling ────────────────────────────────────────────

    /// Map error statuses into the crate taxonomy; pass successes through.
    async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, Error> {
        let status = resp.status();

        if status.is_success() {
            return Ok(resp);
        }

        let path = resp.url().path().to_owned();
        let retry_after = resp
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        let body = resp.text().await.unwrap_or_default();
        let preview = body[..body.len().min(200)].to_owned();

        Err(match status {
            StatusCode::UNAUTHORIZED => Error::SessionExpired,
            StatusCode::FORBIDDEN => Error::Authentication {
                message: format!("insufficient scope for {path}"),
            },
            StatusCode::NOT_FOUND => Error::NotFound { resource: path },
            StatusCode::CONFLICT => Error::Conflict {
                resource: path,
                message: preview,
            },
            StatusCode::TOO_MANY_REQUESTS => Error::RateLimited {
                retry_after_secs: retry_after.unwrap_or(1),
            },
            _ => Error::Api {
                message: preview,
                status: status.as_u16(),
            },
        })
    }

    async fn parse_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, Error> {
        let resp = Self::check_status(resp).await?;
        let body = resp.text().await.map_err(Error::Transport)?;
        serde_json::from_str(&body).map_err(|e| {
            let preview = body[..body.len().min(200)].to_owned();
            Error::Deserialization {
                message: format!("{e} (body preview: {preview:?})"),
                body,
            }
        })
    }

    async fn expect_no_content(resp: reqwest::Response) -> Result<(), Error> {
        Self::check_status(resp).await.map(|_| ())
    }
}
