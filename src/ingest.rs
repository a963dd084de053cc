//! MQTT ingest dispatcher (C4/C5): the receive-and-merge path.
//!
//! Grounded on the teacher's `commands/run/workers.rs` NATS subscribe loop,
//! re-pointed at `rumqttc` — the broker described in spec.md §6 (QoS 0, port
//! 1883, `+`/`#` wildcards, TLS + username/password) is MQTT, not NATS, so
//! this is a deliberate stack substitution (see DESIGN.md) rather than a
//! hand-rolled replacement.
//!
//! `Dispatcher::handle_message` is the pure(ish) merge step and is tested in
//! isolation; `Dispatcher::run` is the thin real-transport loop around it,
//! matching Design Notes §9's "isolate the suspendable operation" guidance —
//! here the suspension point is the broker read, never the merge itself.

use crate::decoders;
use crate::fleet::FleetState;
use crate::recorder::Recorder;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS, Transport};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Topic families subscribed per spec.md §6.
pub const SUBSCRIPTIONS: [&str; 2] = ["owntracks/#", "dronetag/#"];
pub const PRODUCT_SUBSCRIPTIONS: [&str; 4] = [
    "thing/product/+/osd",
    "thing/product/+/events",
    "thing/product/+/state",
    "thing/product/sn",
];

pub struct BrokerEndpoint {
    pub host: String,
    pub port: u16,
    pub tls: bool,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl BrokerEndpoint {
    fn mqtt_options(&self, client_id: &str) -> MqttOptions {
        let mut opts = MqttOptions::new(client_id, &self.host, self.port);
        opts.set_keep_alive(Duration::from_secs(60));
        if let (Some(user), Some(pass)) = (&self.username, &self.password) {
            opts.set_credentials(user, pass);
        }
        if self.tls {
            opts.set_transport(Transport::tls_with_default_config());
        }
        opts
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    fleet: FleetState,
    recorder: Recorder,
    traffic_classes: bool,
}

impl Dispatcher {
    pub fn new(fleet: FleetState, recorder: Recorder, traffic_classes: bool) -> Self {
        Self {
            fleet,
            recorder,
            traffic_classes,
        }
    }

    /// Decodes and merges one inbound `(topic, payload)` pair. Always
    /// records the raw packet first (spec.md §4.3: the forensic log captures
    /// every packet, decodable or not), then applies whatever the decoder
    /// yields. Malformed payloads decode to `DecodedPacket::None` and cause
    /// no state change (spec.md §7).
    pub async fn handle_message(&self, topic: &str, payload: &[u8], now: f64) {
        if let Ok(value) = serde_json::from_slice::<serde_json::Value>(payload) {
            self.recorder.record(now, topic, value).await;
        } else {
            self.recorder.record(now, topic, serde_json::Value::Null).await;
        }

        match decoders::decode(topic, payload, now, self.traffic_classes) {
            decoders::DecodedPacket::Updates(updates) => {
                for update in updates {
                    self.fleet.apply_update(update, now);
                }
            }
            decoders::DecodedPacket::Visual(event) => {
                self.fleet.apply_visual(event, now);
            }
            decoders::DecodedPacket::None => {}
        }
    }

    /// The real subscribe loop. Never returns except on shutdown or an
    /// unrecoverable connection error (spec.md §7 "Fatal").
    pub async fn run(
        &self,
        endpoint: &BrokerEndpoint,
        clock: Arc<dyn crate::clock::Clock>,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        let (client, mut eventloop) = AsyncClient::new(endpoint.mqtt_options("agcs-ingest"), 64);

        for topic in SUBSCRIPTIONS.iter().chain(PRODUCT_SUBSCRIPTIONS.iter()) {
            client.subscribe(*topic, QoS::AtMostOnce).await?;
        }
        info!("ingest: subscribed to {} topic families", SUBSCRIPTIONS.len() + PRODUCT_SUBSCRIPTIONS.len());

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("ingest: shutdown signal received");
                    return Ok(());
                }
                event = eventloop.poll() => {
                    match event {
                        Ok(Event::Incoming(Packet::Publish(publish))) => {
                            let now = clock.now_ts();
                            self.handle_message(&publish.topic, &publish.payload, now).await;
                        }
                        Ok(_) => {}
                        Err(e) => {
                            // Transient network error (spec.md §7): log once,
                            // let rumqttc's own reconnect loop retry.
                            warn!("ingest: connection error: {}", e);
                            tokio::time::sleep(Duration::from_secs(1)).await;
                        }
                    }
                }
            }
        }
    }
}

pub fn log_subscription_summary() {
    debug!(
        "ingest: {} base families, {} product families",
        SUBSCRIPTIONS.len(),
        PRODUCT_SUBSCRIPTIONS.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::AssetKind;

    #[tokio::test]
    async fn scenario1_rtk_fixed_drone_merges_into_fleet() {
        let fleet = FleetState::new();
        let recorder = Recorder::new(tempfile::tempdir().unwrap().path(), false).await;
        let dispatcher = Dispatcher::new(fleet.clone(), recorder, false);

        let payload = serde_json::json!({
            "data": {
                "drone_list": [{
                    "latitude": 60.3195, "longitude": 24.8310, "height": 100.0,
                    "battery": {"capacity_percent": 59},
                    "position_state": {"rtk_used": 1, "is_fixed": 3, "rtk_number": 18}
                }]
            }
        });
        dispatcher
            .handle_message("thing/product/AAAA1234/osd", payload.to_string().as_bytes(), 0.0)
            .await;

        let record = fleet.get("UAV-1234").unwrap();
        assert_eq!(record.kind, AssetKind::AirUavVendorA);
        assert_eq!(record.battery_pct, 59);
    }

    #[tokio::test]
    async fn malformed_payload_causes_no_state_change() {
        let fleet = FleetState::new();
        let recorder = Recorder::new(tempfile::tempdir().unwrap().path(), false).await;
        let dispatcher = Dispatcher::new(fleet.clone(), recorder, false);

        dispatcher.handle_message("thing/product/AAAA1234/osd", b"not json", 0.0).await;
        assert!(fleet.is_empty());
    }

    #[tokio::test]
    async fn unroutable_topic_is_ignored() {
        let fleet = FleetState::new();
        let recorder = Recorder::new(tempfile::tempdir().unwrap().path(), false).await;
        let dispatcher = Dispatcher::new(fleet.clone(), recorder, false);

        dispatcher.handle_message("some/other/topic", b"{}", 0.0).await;
        assert!(fleet.is_empty());
    }
}
