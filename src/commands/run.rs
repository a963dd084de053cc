//! `agcs run`: live ingest against a real broker (spec.md §5 scheduling model).
//!
//! Wires up the five long-lived tasks named in spec.md §5: the ingest
//! dispatcher, the SITREP ticker, the live feed bridge (its own broker
//! subscription plus its axum server), and the shutdown signal. Grounded on
//! the teacher's `commands/run.rs` top-level orchestration, which spawns one
//! task per worker and joins on all of them before returning.

use crate::auditor::AuditLog;
use crate::bridge::LiveFeedBridge;
use crate::clock::{Clock, SystemClock};
use crate::commands::shutdown::spawn_shutdown_handler;
use crate::config::{AgcsConfig, LlmProvider};
use crate::fleet::FleetState;
use crate::ingest::{BrokerEndpoint, Dispatcher};
use crate::persona;
use crate::recorder::Recorder;
use crate::sitrep::{CloudLlmClient, LlmClient, LocalLlmClient, SitrepEngine};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

pub async fn run(config: AgcsConfig) -> anyhow::Result<()> {
    let config = Arc::new(config);
    let fleet = FleetState::new();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());

    let recorder = Recorder::new(&config.data_dir, config.record_enabled).await;
    let audit_log = Arc::new(AuditLog::new(&config.data_dir, config.metrics_enabled).await);
    let persona_prompt = persona::load_persona_prompt(&config.persona_dir, config.persona);

    let llm: Arc<dyn LlmClient> = build_llm_client(&config)?;

    let endpoint = BrokerEndpoint {
        host: config.broker_host.clone(),
        port: config.broker_port,
        tls: config.tls,
        username: config.username.clone(),
        password: config.password.clone(),
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    spawn_shutdown_handler(shutdown_tx);

    let dispatcher = Dispatcher::new(fleet.clone(), recorder.clone(), config.traffic_classes);
    let ingest_task = {
        let dispatcher = dispatcher.clone();
        let clock = clock.clone();
        let rx = shutdown_rx.clone();
        tokio::spawn(async move { dispatcher.run(&endpoint, clock, rx).await })
    };

    let sitrep_engine = Arc::new(SitrepEngine::new(fleet.clone(), clock.clone(), config.clone(), llm, persona_prompt, audit_log));
    let sitrep_task = {
        let engine = sitrep_engine.clone();
        let rx = shutdown_rx.clone();
        tokio::spawn(async move { engine.run(rx).await })
    };

    let bridge_tasks = if config.bridge_enabled {
        let bridge = LiveFeedBridge::new();
        let bridge_mqtt_endpoint = BrokerEndpoint {
            host: config.broker_host.clone(),
            port: config.broker_port,
            tls: config.tls,
            username: config.username.clone(),
            password: config.password.clone(),
        };

        let mqtt_task = {
            let bridge = bridge.clone();
            let clock = clock.clone();
            let rx = shutdown_rx.clone();
            tokio::spawn(async move { bridge.run(&bridge_mqtt_endpoint, clock, rx).await })
        };

        let http_task = {
            let router = bridge.clone().router();
            let addr = format!("0.0.0.0:{}", config.bridge_port);
            let mut rx = shutdown_rx.clone();
            tokio::spawn(async move {
                let listener = tokio::net::TcpListener::bind(&addr).await?;
                info!("bridge: serving live feed on {}", addr);
                axum::serve(listener, router)
                    .with_graceful_shutdown(async move {
                        let _ = rx.changed().await;
                    })
                    .await?;
                Ok::<(), anyhow::Error>(())
            })
        };

        Some((mqtt_task, http_task))
    } else {
        None
    };

    ingest_task.await??;
    sitrep_task.await?;
    if let Some((mqtt_task, http_task)) = bridge_tasks {
        mqtt_task.await??;
        http_task.await??;
    }

    info!("run: clean shutdown");
    Ok(())
}

fn build_llm_client(config: &AgcsConfig) -> anyhow::Result<Arc<dyn LlmClient>> {
    match config.llm_provider {
        LlmProvider::Local => {
            let endpoint = config
                .llm_endpoint
                .clone()
                .ok_or_else(|| anyhow::anyhow!("llm_endpoint is required for llm_provider = local"))?;
            Ok(Arc::new(LocalLlmClient::new(endpoint, config.llm_model.clone())))
        }
        LlmProvider::Cloud => {
            let endpoint = config
                .llm_endpoint
                .clone()
                .ok_or_else(|| anyhow::anyhow!("llm_endpoint is required for llm_provider = cloud"))?;
            let api_key = config
                .api_key
                .clone()
                .ok_or_else(|| anyhow::anyhow!("api_key is required for llm_provider = cloud"))?;
            Ok(Arc::new(CloudLlmClient::new(endpoint, config.llm_model.clone(), api_key)))
        }
    }
}
