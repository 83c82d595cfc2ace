//! Live wallet balance updates.
//!
//! A [`WalletFeed`] opens a stream of wallet rows for one wallet. Two feeds
//! exist: [`RealtimeFeed`] speaks the Phoenix channel protocol over a
//! websocket, [`PollingFeed`] re-reads the row on an interval.
//!
//! A [`WalletSubscription`] owns the background task that keeps a feed open.
//! When the stream errors or closes it waits the configured delay and opens
//! it again. Dropping the handle stops the task.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{SinkExt, StreamExt};
use hwmarket_core::{Wallet, WalletId};
use secrecy::ExposeSecret;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, instrument, warn};

use crate::backend::{Backend, Query, RestBackend, Table, fetch_optional};
use crate::error::{ClientError, Result};

/// Interval between Phoenix heartbeats.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);

/// Stream of wallet rows. An `Err` item ends the stream.
pub type WalletStream = BoxStream<'static, Result<Wallet>>;

/// Source of live wallet rows.
#[async_trait]
pub trait WalletFeed: Send + Sync {
    /// Start streaming updates for one wallet.
    async fn open(&self, wallet_id: WalletId) -> Result<WalletStream>;
}

// =============================================================================
// Websocket feed
// =============================================================================

/// Phoenix channel feed on `/realtime/v1/websocket`.
#[derive(Clone)]
pub struct RealtimeFeed {
    backend: RestBackend,
}

impl RealtimeFeed {
    #[must_use]
    pub const fn new(backend: RestBackend) -> Self {
        Self { backend }
    }

    fn socket_url(&self) -> Result<String> {
        let config = self.backend.config();
        let mut url = config.api_url.clone();
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|()| ClientError::Realtime(format!("cannot use {scheme} for {url}")))?;
        url.set_path("/realtime/v1/websocket");
        url.query_pairs_mut()
            .clear()
            .append_pair("apikey", config.anon_key.expose_secret())
            .append_pair("vsn", "1.0.0");
        Ok(url.to_string())
    }
}

#[async_trait]
impl WalletFeed for RealtimeFeed {
    #[instrument(skip(self), fields(wallet_id = %wallet_id))]
    async fn open(&self, wallet_id: WalletId) -> Result<WalletStream> {
        let (socket, _) = tokio_tungstenite::connect_async(self.socket_url()?)
            .await
            .map_err(|e| ClientError::Realtime(e.to_string()))?;
        let (mut sink, mut incoming) = socket.split();

        let topic = wallet_topic(wallet_id);
        let refs = AtomicU64::new(1);
        let next_ref = move || refs.fetch_add(1, Ordering::Relaxed).to_string();

        let join = join_message(wallet_id, &self.backend.bearer(), &next_ref());
        sink.send(Message::Text(join.to_string()))
            .await
            .map_err(|e| ClientError::Realtime(e.to_string()))?;
        debug!(%topic, "Joined wallet channel");

        let (tx, rx) = mpsc::channel::<Result<Wallet>>(16);
        tokio::spawn(async move {
            let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
            heartbeat.tick().await;
            loop {
                tokio::select! {
                    _ = heartbeat.tick() => {
                        if tx.is_closed() {
                            break;
                        }
                        let beat = heartbeat_message(&next_ref());
                        if let Err(e) = sink.send(Message::Text(beat.to_string())).await {
                            let _ = tx.send(Err(ClientError::Realtime(e.to_string()))).await;
                            break;
                        }
                    }
                    frame = incoming.next() => {
                        let item = match frame {
                            Some(Ok(Message::Text(text))) => decode_message(&text, &topic),
                            Some(Ok(Message::Close(_))) | None => {
                                Some(Err(ClientError::Realtime("socket closed".to_string())))
                            }
                            Some(Ok(_)) => None,
                            Some(Err(e)) => Some(Err(ClientError::Realtime(e.to_string()))),
                        };
                        if let Some(item) = item {
                            let failed = item.is_err();
                            if tx.send(item).await.is_err() || failed {
                                break;
                            }
                        }
                    }
                }
            }
            let _ = sink.close().await;
        });

        Ok(receiver_stream(rx))
    }
}

fn wallet_topic(wallet_id: WalletId) -> String {
    format!("realtime:wallet:{wallet_id}")
}

fn join_message(wallet_id: WalletId, access_token: &str, msg_ref: &str) -> Value {
    json!({
        "topic": wallet_topic(wallet_id),
        "event": "phx_join",
        "payload": {
            "config": {
                "broadcast": { "self": false },
                "presence": { "key": "" },
                "postgres_changes": [{
                    "event": "*",
                    "schema": "public",
                    "table": Table::Wallets.as_str(),
                    "filter": format!("id=eq.{wallet_id}"),
                }],
            },
            "access_token": access_token,
        },
        "ref": msg_ref,
    })
}

fn heartbeat_message(msg_ref: &str) -> Value {
    json!({ "topic": "phoenix", "event": "heartbeat", "payload": {}, "ref": msg_ref })
}

/// Decode one channel frame.
///
/// `None` for frames that carry nothing for the caller (replies, heartbeats,
/// presence). Errors for channel failures on `topic`.
fn decode_message(text: &str, topic: &str) -> Option<Result<Wallet>> {
    let frame: Value = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => return Some(Err(ClientError::Realtime(format!("bad frame: {e}")))),
    };
    if frame.get("topic").and_then(Value::as_str) != Some(topic) {
        return None;
    }

    let payload = frame.get("payload").unwrap_or(&Value::Null);
    match frame.get("event").and_then(Value::as_str)? {
        "postgres_changes" => {
            let record = payload.get("data")?.get("record")?;
            Some(serde_json::from_value(record.clone()).map_err(ClientError::from))
        }
        "phx_reply" if payload.get("status").and_then(Value::as_str) == Some("error") => {
            let reason = payload
                .pointer("/response/reason")
                .and_then(Value::as_str)
                .unwrap_or("join refused");
            Some(Err(ClientError::Realtime(reason.to_string())))
        }
        "phx_error" => Some(Err(ClientError::Realtime("channel error".to_string()))),
        "phx_close" => Some(Err(ClientError::Realtime("channel closed".to_string()))),
        _ => None,
    }
}

fn receiver_stream<T: Send + 'static>(rx: mpsc::Receiver<T>) -> BoxStream<'static, T> {
    futures::stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) })
        .boxed()
}

// =============================================================================
// Polling feed
// =============================================================================

/// Feed that re-reads the wallet row every `interval` and emits changes.
#[derive(Clone)]
pub struct PollingFeed {
    backend: Arc<dyn Backend>,
    interval: Duration,
}

impl PollingFeed {
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>, interval: Duration) -> Self {
        Self { backend, interval }
    }
}

struct PollState {
    backend: Arc<dyn Backend>,
    wallet_id: WalletId,
    interval: Duration,
    last: Option<Wallet>,
    failed: bool,
}

#[async_trait]
impl WalletFeed for PollingFeed {
    async fn open(&self, wallet_id: WalletId) -> Result<WalletStream> {
        let state = PollState {
            backend: Arc::clone(&self.backend),
            wallet_id,
            interval: self.interval,
            last: None,
            failed: false,
        };

        let stream = futures::stream::unfold(state, |mut state| async move {
            if state.failed {
                return None;
            }
            loop {
                tokio::time::sleep(state.interval).await;
                let query = Query::table(Table::Wallets).eq("id", state.wallet_id);
                match fetch_optional::<Wallet>(state.backend.as_ref(), query).await {
                    Ok(Some(wallet)) if state.last.as_ref() != Some(&wallet) => {
                        state.last = Some(wallet.clone());
                        return Some((Ok(wallet), state));
                    }
                    Ok(Some(_)) => {}
                    Ok(None) => {
                        state.failed = true;
                        let err = ClientError::NotFound(format!("wallet {}", state.wallet_id));
                        return Some((Err(err), state));
                    }
                    Err(e) => {
                        state.failed = true;
                        return Some((Err(e), state));
                    }
                }
            }
        });

        Ok(stream.boxed())
    }
}

// =============================================================================
// Subscription handle
// =============================================================================

/// A running wallet subscription.
///
/// Aborts its task when dropped.
#[derive(Debug)]
pub struct WalletSubscription {
    wallet_id: WalletId,
    task: JoinHandle<()>,
}

impl WalletSubscription {
    /// Keep `feed` open for `wallet_id`, calling `on_update` for every row.
    ///
    /// Errors and closed streams are logged and retried after `retry`.
    pub fn spawn<F>(feed: Arc<dyn WalletFeed>, wallet_id: WalletId, retry: Duration, on_update: F) -> Self
    where
        F: Fn(Wallet) + Send + Sync + 'static,
    {
        let task = tokio::spawn(async move {
            loop {
                match feed.open(wallet_id).await {
                    Ok(mut stream) => {
                        info!(wallet_id = %wallet_id, "Wallet subscription open");
                        while let Some(item) = stream.next().await {
                            match item {
                                Ok(wallet) if wallet.id == wallet_id => on_update(wallet),
                                Ok(other) => {
                                    debug!(wallet_id = %other.id, "Ignoring update for another wallet");
                                }
                                Err(e) => {
                                    warn!(wallet_id = %wallet_id, error = %e, "Wallet subscription failed");
                                    break;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        warn!(wallet_id = %wallet_id, error = %e, "Could not open wallet subscription");
                    }
                }
                debug!(wallet_id = %wallet_id, retry_secs = retry.as_secs(), "Retrying wallet subscription");
                tokio::time::sleep(retry).await;
            }
        });

        Self { wallet_id, task }
    }

    /// Wallet this subscription follows.
    #[must_use]
    pub const fn wallet_id(&self) -> WalletId {
        self.wallet_id
    }

    /// Returns `true` while the task is running.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop the subscription.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for WalletSubscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}
