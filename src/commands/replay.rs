//! `agcs replay`: re-publish a forensic log against the local broker
//! (spec.md §4.8, `--replay PATH --speed F --jump`).

use crate::clock::{Clock, SystemClock};
use crate::ingest::BrokerEndpoint;
use crate::replay::{Publisher, ReplayEngine};
use async_trait::async_trait;
use rumqttc::{AsyncClient, QoS};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

struct MqttPublisher {
    client: AsyncClient,
}

#[async_trait]
impl Publisher for MqttPublisher {
    async fn publish(&self, topic: &str, data: &serde_json::Value) {
        let Ok(payload) = serde_json::to_vec(data) else { return };
        if let Err(e) = self.client.publish(topic, QoS::AtMostOnce, false, payload).await {
            tracing::warn!("replay: publish to {} failed: {}", topic, e);
        }
    }
}

pub async fn replay(path: &Path, speed: f64, jump_to_action: bool, endpoint: &BrokerEndpoint) -> anyhow::Result<()> {
    let mut opts = rumqttc::MqttOptions::new("agcs-replay", &endpoint.host, endpoint.port);
    opts.set_keep_alive(std::time::Duration::from_secs(60));
    if let (Some(user), Some(pass)) = (&endpoint.username, &endpoint.password) {
        opts.set_credentials(user, pass);
    }
    let (client, mut eventloop) = AsyncClient::new(opts, 64);

    // Drive the connection's own event loop in the background so publishes
    // actually flush to the broker.
    tokio::spawn(async move {
        loop {
            if eventloop.poll().await.is_err() {
                break;
            }
        }
    });

    let publisher = MqttPublisher { client };
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    let engine = ReplayEngine::new(clock);

    let emitted = engine.run(path, speed, jump_to_action, &publisher).await?;
    info!("replay: {} records emitted from {}", emitted, path.display());
    Ok(())
}
