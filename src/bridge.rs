//! Live feed bridge (C10): an independent broker subscription that pushes
//! `{tid, lat, lon, alt, icon, ts}` events to every connected viewer.
//!
//! The broadcast-per-key fanout is grounded on the teacher's `LiveFixService`
//! (`live_fixes.rs`): a `broadcast::channel` feeding every subscriber, with
//! the websocket handler in `actions/fixes.rs` split into a read half and a
//! write half. Spec.md §4.9 is simpler than the teacher's per-device
//! subscription protocol — "no history, latest wins per tid" and every
//! viewer gets every event — so there is exactly one channel, not one per
//! aircraft, and no subscribe/unsubscribe message type.
//!
//! Icon classification is ported from `original_source/web/server.py`'s
//! `on_message` classifier: topic-family-based, with the Autel serial's
//! `TH`-prefix distinguishing a smart controller from the drone itself.

use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::get;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{info, warn};

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize)]
pub struct LiveFeedEvent {
    pub tid: String,
    pub lat: f64,
    pub lon: f64,
    pub alt: Option<f64>,
    pub icon: &'static str,
    pub ts: f64,
}

/// Topic-family icon classifier (spec.md §4.9; `original_source/web/server.py`).
pub fn classify_icon(topic: &str, tid: &str) -> &'static str {
    if topic.starts_with("owntracks/") {
        "mobile"
    } else if topic.starts_with("dronetag/") {
        "plane"
    } else if topic.starts_with("thing/product/") {
        if tid.starts_with("TH") { "controller" } else { "helicopter" }
    } else {
        "question"
    }
}

#[derive(Clone)]
pub struct LiveFeedBridge {
    tx: broadcast::Sender<LiveFeedEvent>,
}

impl Default for LiveFeedBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl LiveFeedBridge {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Feeds one inbound `(topic, tid, lat, lon, alt)` tuple into the bridge.
    /// Dropped (not pushed) if `|lat| <= 1°`, matching the sentinel-zero
    /// filter on the "Null Island" ground-truth noise (spec.md §4.9).
    pub fn push(&self, topic: &str, tid: &str, lat: f64, lon: f64, alt: Option<f64>, ts: f64) {
        if lat.abs() <= 1.0 {
            return;
        }
        let event = LiveFeedEvent {
            tid: tid.to_string(),
            lat,
            lon,
            alt,
            icon: classify_icon(topic, tid),
            ts,
        };
        // No receivers is normal (no viewers connected yet); not an error.
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LiveFeedEvent> {
        self.tx.subscribe()
    }

    pub fn router(self) -> Router {
        Router::new().route("/live", get(live_feed_handler)).with_state(self)
    }

    /// The bridge's own broker subscription (spec.md §4.9: "independently
    /// subscribes to the same broker" — it never reads the fleet table).
    pub async fn run(
        &self,
        endpoint: &crate::ingest::BrokerEndpoint,
        clock: std::sync::Arc<dyn crate::clock::Clock>,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        use crate::ingest::{PRODUCT_SUBSCRIPTIONS, SUBSCRIPTIONS};
        use rumqttc::{AsyncClient, Event, Packet, QoS};

        let mut opts = rumqttc::MqttOptions::new("agcs-bridge", &endpoint.host, endpoint.port);
        opts.set_keep_alive(std::time::Duration::from_secs(60));
        if let (Some(user), Some(pass)) = (&endpoint.username, &endpoint.password) {
            opts.set_credentials(user, pass);
        }
        if endpoint.tls {
            opts.set_transport(rumqttc::Transport::tls_with_default_config());
        }
        let (client, mut eventloop) = AsyncClient::new(opts, 64);
        for topic in SUBSCRIPTIONS.iter().chain(PRODUCT_SUBSCRIPTIONS.iter()) {
            client.subscribe(*topic, QoS::AtMostOnce).await?;
        }

        loop {
            tokio::select! {
                _ = shutdown.changed() => return Ok(()),
                event = eventloop.poll() => {
                    match event {
                        Ok(Event::Incoming(Packet::Publish(publish))) => {
                            self.handle_raw(&publish.topic, &publish.payload, clock.now_ts());
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warn!("bridge: connection error: {}", e);
                            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                        }
                    }
                }
            }
        }
    }

    /// Extracts `(tid, lat, lon, alt)` directly from the raw payload, without
    /// going through the vendor decoders (the bridge keeps its own
    /// lightweight classification, per spec.md §4.9).
    fn handle_raw(&self, topic: &str, payload: &[u8], now: f64) {
        let Ok(value) = serde_json::from_slice::<serde_json::Value>(payload) else {
            return;
        };

        let lat = find_coord(&value, &["lat", "latitude", "gps_lat"]);
        let lon = find_coord(&value, &["lon", "longitude", "gps_lon"]);
        let (Some(lat), Some(lon)) = (lat, lon) else { return };

        let tid = if topic.starts_with("owntracks/") {
            value.get("tid").and_then(|v| v.as_str()).unwrap_or_else(|| topic.rsplit('/').next().unwrap_or("UNK")).to_string()
        } else if topic.starts_with("dronetag/") {
            value.get("id").and_then(|v| v.as_str()).unwrap_or("RID").to_string()
        } else if topic.starts_with("thing/product/") {
            topic.split('/').nth(2).unwrap_or("AUTEL_UNK").to_string()
        } else {
            "UNK".to_string()
        };

        let alt = value.get("alt").or_else(|| value.get("altitude")).and_then(|v| v.as_f64());
        self.push(topic, &tid, lat, lon, alt, now);
    }
}

fn find_coord(value: &serde_json::Value, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|key| value.get(*key).and_then(|v| v.as_f64()))
}

async fn live_feed_handler(ws: WebSocketUpgrade, State(bridge): State<LiveFeedBridge>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, bridge))
}

async fn handle_socket(socket: WebSocket, bridge: LiveFeedBridge) {
    info!("bridge: viewer connected");
    let (mut sender, mut receiver) = socket.split();
    let mut events = bridge.subscribe();

    let mut read_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(_) => break,
            }
        }
    });

    let mut write_task = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let Ok(json) = serde_json::to_string(&event) else { continue };
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("bridge: viewer lagged {} events, continuing", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    tokio::select! {
        _ = &mut read_task => write_task.abort(),
        _ = &mut write_task => read_task.abort(),
    }
    info!("bridge: viewer disconnected");
}
