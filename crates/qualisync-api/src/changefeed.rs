//! Websocket change feed with auto-reconnect.
//!
//! Connects to the backend's change-feed endpoint, subscribes to an
//! explicit table list, and streams parsed [`ChangeEvent`]s through a
//! [`tokio::sync::broadcast`] channel. Reconnection with exponential
//! backoff + jitter is handled automatically; the subscribe frame is
//! re-sent on every (re)connect.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;
use crate::record::{Record, RecordId};

// ── Broadcast channel capacity ───────────────────────────────────────

const EVENT_CHANNEL_CAPACITY: usize = 1024;

// ── ChangeOp / ChangeEvent ───────────────────────────────────────────

/// Row operation carried by a change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeOp {
    Insert,
    Update,
    Delete,
}

impl ChangeOp {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

/// A parsed event from the change feed.
///
/// `record` carries the new row for inserts/updates; `old_record`
/// carries the previous row for updates/deletes (the backend sends at
/// least the identifier columns there).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: String,

    #[serde(rename = "type")]
    pub op: ChangeOp,

    #[serde(default)]
    pub record: Option<Record>,

    #[serde(default)]
    pub old_record: Option<Record>,
}

impl ChangeEvent {
    /// The identifier of the affected row, wherever the event carries it.
    pub fn row_id(&self) -> Option<RecordId> {
        self.record
            .as_ref()
            .and_then(Record::id)
            .or_else(|| self.old_record.as_ref().and_then(Record::id))
    }
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
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: None,
        }
    }
}

// ── ChangeFeed ───────────────────────────────────────────────────────

/// Handle to a running change-feed subscription.
///
/// One logical subscription per session: the table list is fixed at
/// connect time. Drop all receivers and call [`shutdown`](Self::shutdown)
/// to tear down the background task.
pub struct ChangeFeed {
    event_rx: broadcast::Receiver<Arc<ChangeEvent>>,
    cancel: CancellationToken,
}

impl ChangeFeed {
    /// Connect to the feed endpoint and spawn the reconnection loop.
    ///
    /// Returns immediately once the background task is spawned; the
    /// first connection attempt happens asynchronously.
    pub fn connect(
        ws_url: Url,
        tables: Vec<String>,
        reconnect: ReconnectConfig,
        cancel: CancellationToken,
        bearer: Option<SecretString>,
    ) -> Self {
        let (event_tx, event_rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            feed_loop(ws_url, tables, event_tx, reconnect, task_cancel, bearer).await;
        });

        Self { event_rx, cancel }
    }

    /// Get a new broadcast receiver for the event stream.
    ///
    /// Multiple consumers can subscribe concurrently. A consumer that
    /// falls behind receives [`broadcast::error::RecvError::Lagged`].
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<ChangeEvent>> {
        self.event_rx.resubscribe()
    }

    /// Signal the background task to shut down gracefully.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

// ── Background reconnection loop ─────────────────────────────────────

/// Main loop: connect → subscribe → read → on error, backoff → reconnect.
async fn feed_loop(
    ws_url: Url,
    tables: Vec<String>,
    event_tx: broadcast::Sender<Arc<ChangeEvent>>,
    reconnect: ReconnectConfig,
    cancel: CancellationToken,
    bearer: Option<SecretString>,
) {
    let subscribed: HashSet<String> = tables.iter().cloned().collect();
    let mut attempt: u32 = 0;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = connect_and_read(
                &ws_url, &tables, &subscribed, &event_tx, &cancel, bearer.as_ref()
            ) => {
                match result {
                    // Clean disconnect (server close frame or stream ended).
                    Ok(()) => {
                        tracing::info!("change feed disconnected cleanly, reconnecting");
                        attempt = 0;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, attempt, "change feed error");

                        if let Some(max) = reconnect.max_retries {
                            if attempt >= max {
                                tracing::error!(
                                    max_retries = max,
                                    "change feed reconnection limit reached, giving up"
                                );
                                break;
                            }
                        }

                        let delay = backoff_delay(attempt, &reconnect);
                        tracing::info!(
                            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                            attempt,
                            "waiting before reconnect"
                        );

                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => break,
                            () = tokio::time::sleep(delay) => {}
                        }

                        attempt += 1;
                    }
                }
            }
        }
    }

    tracing::debug!("change feed loop exiting");
}

// ── Single connection lifecycle ──────────────────────────────────────

/// Establish one connection, send the subscribe frame, then read
/// messages until the stream drops.
async fn connect_and_read(
    url: &Url,
    tables: &[String],
    subscribed: &HashSet<String>,
    event_tx: &broadcast::Sender<Arc<ChangeEvent>>,
    cancel: &CancellationToken,
    bearer: Option<&SecretString>,
) -> Result<(), Error> {
    tracing::info!(url = %url, ?tables, "connecting to change feed");

    let uri: tungstenite::http::Uri = url
        .as_str()
        .parse()
        .map_err(|e: tungstenite::http::uri::InvalidUri| Error::FeedConnect(e.to_string()))?;

    let mut request = ClientRequestBuilder::new(uri);
    if let Some(token) = bearer {
        request = request.with_header(
            "Authorization",
            format!("Bearer {}", token.expose_secret()),
        );
    }

    let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(|e| Error::FeedConnect(e.to_string()))?;

    let (mut write, mut read) = ws_stream.split();

    write
        .send(tungstenite::Message::text(subscribe_frame(tables)))
        .await
        .map_err(|e| Error::FeedConnect(format!("subscribe frame rejected: {e}")))?;

    tracing::info!("change feed subscribed");

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            frame = read.next() => {
                match frame {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        parse_and_broadcast(&text, subscribed, event_tx);
                    }
                    Some(Ok(tungstenite::Message::Ping(_))) => {
                        // tungstenite replies with pong automatically
                        tracing::trace!("change feed ping");
                    }
                    Some(Ok(tungstenite::Message::Close(frame))) => {
                        if let Some(ref cf) = frame {
                            tracing::info!(
                                code = %cf.code,
                                reason = %cf.reason,
                                "change feed close frame received"
                            );
                        } else {
                            tracing::info!("change feed close frame received (no payload)");
                        }
                        return Ok(());
                    }
                    Some(Err(e)) => {
                        return Err(Error::FeedConnect(e.to_string()));
                    }
                    None => {
                        tracing::info!("change feed stream ended");
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

/// The JSON frame that registers the table subscription.
fn subscribe_frame(tables: &[String]) -> String {
    serde_json::json!({
        "action": "subscribe",
        "tables": tables,
    })
    .to_string()
}

// ── Message parsing ──────────────────────────────────────────────────

/// Parse a text frame and broadcast the event if it belongs to a
/// subscribed table. Heartbeats and acks have no `table`/`type` fields
/// and are silently skipped.
fn parse_and_broadcast(
    text: &str,
    subscribed: &HashSet<String>,
    event_tx: &broadcast::Sender<Arc<ChangeEvent>>,
) {
    let event: ChangeEvent = match serde_json::from_str(text) {
        Ok(e) => e,
        Err(e) => {
            tracing::trace!(error = %e, "skipping non-event frame");
            return;
        }
    };

    if !subscribed.contains(&event.table) {
        tracing::trace!(table = %event.table, "event for unsubscribed table, dropping");
        return;
    }

    // Ignore send errors -- just means no active subscribers right now
    let _ = event_tx.send(Arc::new(event));
}

// ── Backoff calculation ──────────────────────────────────────────────

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) + jitter`
///
/// Jitter is +-25%, deterministically seeded from the attempt number,
/// to spread out reconnection storms from multiple clients.
fn backoff_delay(attempt: u32, config: &ReconnectConfig) -> Duration {
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(i32::try_from(attempt).unwrap_or(i32::MAX));
    let capped = base.min(config.max_delay.as_secs_f64());

    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    let with_jitter = (capped * jitter_factor).max(0.0);

    Duration::from_secs_f64(with_jitter)
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tables() -> HashSet<String> {
        ["tasks", "quality_costs", "documents"]
            .into_iter()
            .map(str::to_owned)
            .collect()
    }

    #[test]
    fn default_reconnect_config() {
        let config = ReconnectConfig::default();
        assert_eq!(config.initial_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(30));
        assert!(config.max_retries.is_none());
    }

    #[test]
    fn backoff_increases_exponentially() {
        let config = ReconnectConfig::default();

        let d0 = backoff_delay(0, &config);
        let d1 = backoff_delay(1, &config);
        let d2 = backoff_delay(2, &config);

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
        };

        let d10 = backoff_delay(10, &config);
        // With jitter factor up to 1.25, max effective is 12.5s
        assert!(
            d10 <= Duration::from_secs(13),
            "delay at attempt 10 ({d10:?}) should be capped near max_delay"
        );
    }

    #[test]
    fn subscribe_frame_lists_tables() {
        let frame = subscribe_frame(&["tasks".to_owned(), "kpis".to_owned()]);
        let parsed: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(parsed["action"], "subscribe");
        assert_eq!(parsed["tables"], json!(["tasks", "kpis"]));
    }

    #[test]
    fn parse_insert_event() {
        let (tx, mut rx) = broadcast::channel(16);

        let raw = json!({
            "table": "quality_costs",
            "type": "INSERT",
            "record": { "id": 101, "amount": 420.0, "cost_type": "internal" }
        });

        parse_and_broadcast(&raw.to_string(), &tables(), &tx);

        let event = rx.try_recv().unwrap();
        assert_eq!(event.table, "quality_costs");
        assert_eq!(event.op, ChangeOp::Insert);
        assert_eq!(event.row_id(), Some(RecordId::Int(101)));
    }

    #[test]
    fn parse_delete_event_takes_id_from_old_record() {
        let (tx, mut rx) = broadcast::channel(16);

        let raw = json!({
            "table": "documents",
            "type": "DELETE",
            "old_record": { "id": "550e8400-e29b-41d4-a716-446655440000" }
        });

        parse_and_broadcast(&raw.to_string(), &tables(), &tx);

        let event = rx.try_recv().unwrap();
        assert_eq!(event.op, ChangeOp::Delete);
        assert!(matches!(event.row_id(), Some(RecordId::Uuid(_))));
    }

    #[test]
    fn unsubscribed_table_is_dropped() {
        let (tx, mut rx) = broadcast::channel::<Arc<ChangeEvent>>(16);

        let raw = json!({
            "table": "vehicle_timeline_events",
            "type": "INSERT",
            "record": { "id": 1 }
        });

        parse_and_broadcast(&raw.to_string(), &tables(), &tx);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn heartbeat_frame_is_skipped() {
        let (tx, mut rx) = broadcast::channel::<Arc<ChangeEvent>>(16);

        parse_and_broadcast(r#"{"heartbeat": true}"#, &tables(), &tx);
        parse_and_broadcast("not json at all", &tables(), &tx);

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn change_op_round_trips_wire_names() {
        assert_eq!(serde_json::to_string(&ChangeOp::Insert).unwrap(), "\"INSERT\"");
        let op: ChangeOp = serde_json::from_str("\"DELETE\"").unwrap();
        assert_eq!(op, ChangeOp::Delete);
        assert_eq!(ChangeOp::Update.as_str(), "UPDATE");
    }
}
