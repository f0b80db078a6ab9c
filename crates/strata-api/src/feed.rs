//! Change-feed WebSocket client with auto-reconnect.
//!
//! Connects to the portal's `/api/v1/feed` endpoint and streams parsed
//! change events through a [`tokio::sync::broadcast`] channel. Handles
//! reconnection with exponential backoff + jitter automatically, and
//! flags reconnections that follow an outage long enough that events may
//! have been missed (the consumer should refetch).
//!
//! Delivery is at-least-once: the portal may redeliver events around a
//! reconnect. Per-entity events arrive in non-decreasing version order,
//! so a version-checked upsert downstream makes redelivery harmless.

use std::time::Duration;

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;

// ── Broadcast channel capacity ───────────────────────────────────────

const FEED_CHANNEL_CAPACITY: usize = 1024;

// ── Wire types ───────────────────────────────────────────────────────

/// Which synchronized store an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Notification,
    Administrator,
}

/// Whether the entity is newly visible to this user or an update to a
/// known entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Insert,
    Update,
}

/// A parsed event from the change feed.
///
/// `entity` is kept as raw JSON here -- `strata-core` deserializes it into
/// the matching domain type once it has routed on `kind`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    #[serde(rename = "event")]
    pub action: ChangeAction,

    pub kind: ChangeKind,

    pub entity: serde_json::Value,
}

/// What the feed hands to subscribers.
#[derive(Debug, Clone)]
pub enum FeedMessage {
    /// A change event delivered by the portal.
    Change(ChangeEvent),

    /// The feed reconnected after an outage longer than the configured
    /// gap threshold. Events may have been missed -- refetch.
    Resync,
}

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Exponential backoff configuration for feed reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,

    /// Maximum reconnection attempts before giving up.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,

    /// Outages longer than this trigger a [`FeedMessage::Resync`] once
    /// the connection is re-established. Default: 5s.
    pub gap_threshold: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: None,
            gap_threshold: Duration::from_secs(5),
        }
    }
}

// ── ChangeFeedHandle ─────────────────────────────────────────────────

/// Handle to a running change-feed stream.
///
/// [`subscribe`](Self::subscribe) vends independent receivers. Call
/// [`shutdown`](Self::shutdown) to tear down the background task; no
/// further messages are delivered once the cancellation takes effect,
/// even for frames already in flight. Shutdown is idempotent.
pub struct ChangeFeedHandle {
    feed_rx: broadcast::Receiver<FeedMessage>,
    cancel: CancellationToken,
}

impl ChangeFeedHandle {
    /// Connect to the portal feed and spawn the reconnection loop.
    ///
    /// Returns immediately once the background task is spawned. The first
    /// connection attempt happens asynchronously -- subscribe to the
    /// receiver to start consuming messages. `bearer` is injected as an
    /// `Authorization` header on the upgrade request.
    pub fn connect(
        feed_url: Url,
        reconnect: ReconnectConfig,
        cancel: CancellationToken,
        bearer: Option<String>,
    ) -> Result<Self, Error> {
        let (feed_tx, feed_rx) = broadcast::channel(FEED_CHANNEL_CAPACITY);

        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            feed_loop(feed_url, feed_tx, reconnect, task_cancel, bearer).await;
        });

        Ok(Self { feed_rx, cancel })
    }

    /// Get a new broadcast receiver for the feed.
    ///
    /// Multiple consumers can subscribe concurrently. If a consumer falls
    /// behind, it receives [`broadcast::error::RecvError::Lagged`].
    pub fn subscribe(&self) -> broadcast::Receiver<FeedMessage> {
        self.feed_rx.resubscribe()
    }

    /// Signal the background task to shut down gracefully.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

// ── Background reconnection loop ─────────────────────────────────────

/// Main loop: connect → read → on error, backoff → reconnect.
///
/// Tracks when the connection dropped so a reconnect after a long outage
/// can emit [`FeedMessage::Resync`] before any further events flow.
async fn feed_loop(
    feed_url: Url,
    feed_tx: broadcast::Sender<FeedMessage>,
    reconnect: ReconnectConfig,
    cancel: CancellationToken,
    bearer: Option<String>,
) {
    let mut attempt: u32 = 0;
    let mut down_since: Option<Instant> = None;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = connect_and_read(
                &feed_url,
                &feed_tx,
                &cancel,
                bearer.as_deref(),
                reconnect.gap_threshold,
                &mut down_since,
            ) => {
                match result {
                    // Clean disconnect (server close frame or stream ended).
                    // Reset attempt counter and reconnect immediately.
                    Ok(()) => {
                        tracing::info!("feed disconnected cleanly, reconnecting");
                        attempt = 0;
                        down_since.get_or_insert_with(Instant::now);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, attempt, "feed error");
                        down_since.get_or_insert_with(Instant::now);

                        if let Some(max) = reconnect.max_retries {
                            if attempt >= max {
                                tracing::error!(
                                    max_retries = max,
                                    "feed reconnection limit reached, giving up"
                                );
                                break;
                            }
                        }

                        let delay = calculate_backoff(attempt, &reconnect);
                        tracing::info!(
                            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                            attempt,
                            "waiting before reconnect"
                        );

                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => break,
                            _ = tokio::time::sleep(delay) => {}
                        }

                        attempt += 1;
                    }
                }
            }
        }
    }

    tracing::debug!("feed loop exiting");
}

// ── Single connection lifecycle ──────────────────────────────────────

/// Establish a single WebSocket connection, read frames until it drops.
///
/// On a successful handshake after an outage longer than `gap_threshold`,
/// a [`FeedMessage::Resync`] is broadcast before any event from the new
/// connection -- the consumer cannot assume it saw every change while the
/// feed was down.
async fn connect_and_read(
    url: &Url,
    feed_tx: &broadcast::Sender<FeedMessage>,
    cancel: &CancellationToken,
    bearer: Option<&str>,
    gap_threshold: Duration,
    down_since: &mut Option<Instant>,
) -> Result<(), Error> {
    tracing::info!(url = %url, "connecting to change feed");

    let uri: tungstenite::http::Uri = url
        .as_str()
        .parse()
        .map_err(|e: tungstenite::http::uri::InvalidUri| Error::FeedConnect(e.to_string()))?;

    let mut request = ClientRequestBuilder::new(uri);
    if let Some(token) = bearer {
        request = request.with_header("Authorization", format!("Bearer {token}"));
    }

    let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(|e| Error::FeedConnect(e.to_string()))?;

    tracing::info!("change feed connected");

    if let Some(since) = down_since.take() {
        if since.elapsed() > gap_threshold {
            tracing::warn!(
                outage_ms = u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX),
                "reconnected after gap, requesting resync"
            );
            let _ = feed_tx.send(FeedMessage::Resync);
        }
    }

    let (_write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            frame = read.next() => {
                match frame {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        parse_and_broadcast(&text, feed_tx);
                    }
                    Some(Ok(tungstenite::Message::Ping(_))) => {
                        // tungstenite handles pong replies automatically
                        tracing::trace!("feed ping");
                    }
                    Some(Ok(tungstenite::Message::Close(frame))) => {
                        if let Some(ref cf) = frame {
                            tracing::info!(
                                code = %cf.code,
                                reason = %cf.reason,
                                "feed close frame received"
                            );
                        } else {
                            tracing::info!("feed close frame received (no payload)");
                        }
                        return Ok(());
                    }
                    Some(Err(e)) => {
                        return Err(Error::FeedConnect(e.to_string()));
                    }
                    None => {
                        // Stream ended without a close frame
                        tracing::info!("feed stream ended");
                        return Ok(());
                    }
                    _ => {
                        // Binary, Pong, Frame -- ignore
                    }
                }
            }
        }
    }
}

// ── Message parsing ──────────────────────────────────────────────────

/// Parse a feed text frame and broadcast the event, if well-formed.
///
/// Malformed frames are logged and skipped -- one bad frame must not kill
/// the stream.
fn parse_and_broadcast(text: &str, feed_tx: &broadcast::Sender<FeedMessage>) {
    let event: ChangeEvent = match serde_json::from_str(text) {
        Ok(e) => e,
        Err(e) => {
            tracing::debug!(error = %e, "failed to parse feed frame");
            return;
        }
    };

    // Ignore send errors -- just means no active subscribers right now
    let _ = feed_tx.send(FeedMessage::Change(event));
}

// ── Backoff calculation ──────────────────────────────────────────────

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) + jitter`
///
/// Jitter is +-25% to spread out reconnection storms from multiple clients.
fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    #[allow(clippy::as_conversions, clippy::cast_possible_wrap)]
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(attempt as i32);
    let capped = base.min(config.max_delay.as_secs_f64());

    // Deterministic "jitter" seeded from the attempt number.
    // Not cryptographically random, but good enough for backoff spread.
    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    let with_jitter = (capped * jitter_factor).max(0.0);

    Duration::from_secs_f64(with_jitter)
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_reconnect_config() {
        let config = ReconnectConfig::default();
        assert_eq!(config.initial_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(30));
        assert_eq!(config.gap_threshold, Duration::from_secs(5));
        assert!(config.max_retries.is_none());
    }

    #[test]
    fn backoff_increases_exponentially() {
        let config = ReconnectConfig::default();

        let d0 = calculate_backoff(0, &config);
        let d1 = calculate_backoff(1, &config);
        let d2 = calculate_backoff(2, &config);

        // Each step should roughly double (within jitter bounds)
        assert!(d1 > d0, "d1 ({d1:?}) should be greater than d0 ({d0:?})");
        assert!(d2 > d1, "d2 ({d2:?}) should be greater than d1 ({d1:?})");
    }

    #[test]
    fn backoff_caps_at_max_delay() {
        let config = ReconnectConfig {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            max_retries: None,
            gap_threshold: Duration::from_secs(5),
        };

        let d10 = calculate_backoff(10, &config);
        // With jitter factor up to 1.25, max effective is 12.5s
        assert!(
            d10 <= Duration::from_secs(13),
            "delay at attempt 10 ({d10:?}) should be capped near max_delay"
        );
    }

    #[test]
    fn deserialize_insert_event() {
        let json = r#"{
            "event": "insert",
            "kind": "notification",
            "entity": {
                "id": "n-100",
                "title": "Levy notice issued",
                "category": "payment",
                "is_read": false,
                "created_at": "2026-03-01T09:00:00Z",
                "updated_at": "2026-03-01T09:00:00Z"
            }
        }"#;

        let event: ChangeEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.action, ChangeAction::Insert);
        assert_eq!(event.kind, ChangeKind::Notification);
        assert_eq!(event.entity["id"], "n-100");
    }

    #[test]
    fn deserialize_update_event() {
        let json = r#"{
            "event": "update",
            "kind": "administrator",
            "entity": { "id": "a-1", "name": "Harbour Strata", "updated_at": "2026-03-01T10:00:00Z" }
        }"#;

        let event: ChangeEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.action, ChangeAction::Update);
        assert_eq!(event.kind, ChangeKind::Administrator);
    }

    #[test]
    fn parse_and_broadcast_change() {
        let (tx, mut rx) = broadcast::channel(16);

        let raw = serde_json::json!({
            "event": "update",
            "kind": "notification",
            "entity": { "id": "n-1" }
        });

        parse_and_broadcast(&raw.to_string(), &tx);

        match rx.try_recv().unwrap() {
            FeedMessage::Change(event) => {
                assert_eq!(event.kind, ChangeKind::Notification);
                assert_eq!(event.entity["id"], "n-1");
            }
            FeedMessage::Resync => panic!("expected a change event"),
        }
    }

    #[test]
    fn parse_and_broadcast_malformed_json() {
        let (tx, mut rx) = broadcast::channel::<FeedMessage>(16);

        parse_and_broadcast("not json at all", &tx);

        // Should not panic, should just log and skip
        assert!(rx.try_recv().is_err());
    }
}
