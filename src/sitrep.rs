//! The SITREP engine (C7): periodic fleet snapshot → persona-guided LLM call
//! → auditor handoff.
//!
//! The LLM call is modeled as an injectable [`LlmClient`] (Design Notes §9:
//! "treat as an unreliable outbound RPC with a deadline"), grounded on the
//! teacher's `NominatimClient`/`PhotonClient` pattern in `geocoding/` — a
//! thin struct wrapping a shared `reqwest::Client`, constructed once and
//! cloned cheaply. Single-flight is an `AtomicBool` guard rather than a
//! queue, per the state machine in spec.md §4.6: a tick whose predecessor
//! hasn't resolved by the next timer edge is dropped, not deferred.

use crate::asset::{AssetKind, AssetRecord};
use crate::auditor::{self, AuditLog};
use crate::clock::Clock;
use crate::config::{AgcsConfig, HomeBase};
use crate::fleet::FleetState;
use crate::geo;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

pub const ERROR_TEXT: &str = "SITREP: SYSTEM ERROR. AI UNAVAILABLE.";
const MAX_TOKENS: u32 = 150;
const TEMPERATURE: f64 = 0.3;
pub const LOCAL_TIMEOUT: Duration = Duration::from_secs(90);
pub const CLOUD_TIMEOUT: Duration = Duration::from_secs(30);

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_message: &str, max_tokens: u32, temperature: f64) -> anyhow::Result<String>;
    fn model_name(&self) -> &str;
    fn call_timeout(&self) -> Duration;
}

/// A local, Ollama-style chat endpoint (`llm_provider = local`).
pub struct LocalLlmClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl LocalLlmClient {
    pub fn new(endpoint: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            model,
        }
    }
}

#[derive(Debug, Deserialize)]
struct LocalResponse {
    response: String,
}

#[async_trait]
impl LlmClient for LocalLlmClient {
    async fn complete(&self, system_prompt: &str, user_message: &str, max_tokens: u32, temperature: f64) -> anyhow::Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "system": system_prompt,
            "prompt": user_message,
            "stream": false,
            "options": { "temperature": temperature, "num_predict": max_tokens },
        });
        let response = self.client.post(&self.endpoint).json(&body).send().await?;
        let response = response.error_for_status()?;
        let parsed: LocalResponse = response.json().await?;
        Ok(parsed.response)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn call_timeout(&self) -> Duration {
        LOCAL_TIMEOUT
    }
}

/// A cloud, OpenAI-chat-style endpoint (`llm_provider = cloud`).
pub struct CloudLlmClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl CloudLlmClient {
    pub fn new(endpoint: String, model: String, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            model,
            api_key,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CloudResponse {
    choices: Vec<CloudChoice>,
}

#[derive(Debug, Deserialize)]
struct CloudChoice {
    message: CloudMessage,
}

#[derive(Debug, Deserialize)]
struct CloudMessage {
    content: String,
}

#[async_trait]
impl LlmClient for CloudLlmClient {
    async fn complete(&self, system_prompt: &str, user_message: &str, max_tokens: u32, temperature: f64) -> anyhow::Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_message},
            ],
            "max_tokens": max_tokens,
            "temperature": temperature,
        });
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let response = response.error_for_status()?;
        let parsed: CloudResponse = response.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| anyhow::anyhow!("empty choices in cloud LLM response"))?;
        Ok(content)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn call_timeout(&self) -> Duration {
        CLOUD_TIMEOUT
    }
}

fn find_operator(snapshot: &[AssetRecord]) -> Option<&AssetRecord> {
    snapshot
        .iter()
        .filter(|r| r.kind == AssetKind::GroundOperator && r.lat.is_some())
        .max_by(|a, b| a.last_seen_ts.partial_cmp(&b.last_seen_ts).unwrap_or(std::cmp::Ordering::Equal))
}

/// One context line per snapshot entry (spec.md §4.6 step 2).
pub fn context_line(record: &AssetRecord, now: f64, home: HomeBase, operator: Option<&AssetRecord>, stale_threshold_s: f64) -> String {
    let mut fields = vec![format!("Asset: {}", record.tid), record.kind.as_str().to_string()];

    if let Some(mode) = &record.mode {
        fields.push(mode.clone());
    }

    let battery = if record.battery_pct == -1 {
        "BATT: Unknown".to_string()
    } else {
        format!("BATT: {}%", record.battery_pct)
    };
    fields.push(battery);

    fields.push(format!("GPS: {}", record.gps_grade()));
    fields.push(format!("NAV: {}", record.nav.as_str()));

    if let Some(alt) = record.alt_m {
        fields.push(format!("ALT: {alt:.1}m"));
    }

    if let Some(h_speed) = record.h_speed_mps {
        if record.kind.is_air() {
            fields.push(format!("SPEED: {:.1}km/h", h_speed * 3.6));
        } else {
            fields.push(format!("SPEED: {h_speed:.1}m/s"));
        }
    }

    if record.lat.is_some() {
        let home_dist = geo::distance_2d(record.lat, record.lon, Some(home.lat), Some(home.lon));
        fields.push(format!("HOME_DIST: {home_dist:.0}m"));

        if let Some(operator) = operator
            && operator.tid != record.tid
        {
            let op_dist = geo::distance_2d(record.lat, record.lon, operator.lat, operator.lon);
            fields.push(format!("OPERATOR_DIST: {op_dist:.0}m"));
        }
    }

    if !record.ai_sightings.is_empty() {
        let mut sightings: Vec<String> = record.ai_sightings.iter().map(|(k, v)| format!("{k}:{v}")).collect();
        sightings.sort();
        fields.push(format!("SIGHTINGS: {}", sightings.join(",")));
    }

    if record.is_stale(now, stale_threshold_s) {
        let age = (now - record.last_seen_ts).round() as i64;
        fields.push(format!("SIGNAL_LOST age={age}s"));
    }

    fields.join(" | ")
}

pub struct SitrepEngine {
    fleet: FleetState,
    clock: Arc<dyn Clock>,
    config: Arc<AgcsConfig>,
    llm: Arc<dyn LlmClient>,
    persona_prompt: String,
    audit_log: Arc<AuditLog>,
    in_flight: AtomicBool,
}

impl SitrepEngine {
    pub fn new(fleet: FleetState, clock: Arc<dyn Clock>, config: Arc<AgcsConfig>, llm: Arc<dyn LlmClient>, persona_prompt: String, audit_log: Arc<AuditLog>) -> Self {
        Self {
            fleet,
            clock,
            config,
            llm,
            persona_prompt,
            audit_log,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn build_context_lines(&self, snapshot: &[AssetRecord], now: f64) -> Vec<String> {
        let operator = find_operator(snapshot);
        snapshot
            .iter()
            .map(|record| context_line(record, now, self.config.home_base, operator, self.config.stale_threshold_s))
            .collect()
    }

    /// Runs one tick end-to-end. `None` means the tick produced no output
    /// (single-flight busy, or the LLM call timed out — spec.md §4.6 step 3).
    pub async fn tick(&self) -> Option<String> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            info!("sitrep: prior call still in flight, dropping this tick");
            return None;
        }
        let result = self.run_tick().await;
        self.in_flight.store(false, Ordering::SeqCst);
        result
    }

    async fn run_tick(&self) -> Option<String> {
        let start = self.clock.now_ts();
        let snapshot = self.fleet.snapshot();
        let now = self.clock.now_ts();
        let context_lines = self.build_context_lines(&snapshot, now);
        let user_message = context_lines.join("\n");
        let any_sightings = snapshot.iter().any(|r| !r.ai_sightings.is_empty());

        let call = self.llm.complete(&self.persona_prompt, &user_message, MAX_TOKENS, TEMPERATURE);
        let text = match tokio::time::timeout(self.llm.call_timeout(), call).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                warn!("sitrep: llm error: {}", e);
                ERROR_TEXT.to_string()
            }
            Err(_) => {
                warn!("sitrep: llm call timed out after {:?}", self.llm.call_timeout());
                return None;
            }
        };

        let latency_s = self.clock.now_ts() - start;
        let row = auditor::audit(self.llm.model_name(), latency_s, &context_lines, &text, any_sightings);
        self.audit_log.append(&row).await;

        info!("SITREP: {}", text);
        Some(text)
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(self.config.sitrep_interval_s));
        ticker.tick().await; // first tick fires immediately; skip it as the "armed" edge
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("sitrep: shutdown signal received");
                    return;
                }
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::{AssetUpdate, Nav};
    use crate::clock::FakeClock;
    use tokio::sync::Mutex;

    struct ScriptedLlm {
        response: Mutex<Option<anyhow::Result<String>>>,
        delay: Duration,
        calls: std::sync::atomic::AtomicUsize,
    }

    impl ScriptedLlm {
        fn ok(text: &str) -> Self {
            Self {
                response: Mutex::new(Some(Ok(text.to_string()))),
                delay: Duration::ZERO,
                calls: std::sync::atomic::AtomicUsize::new(0),
            }
        }

        fn slow_forever() -> Self {
            Self {
                response: Mutex::new(None),
                delay: Duration::from_secs(120),
                calls: std::sync::atomic::AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(&self, _system_prompt: &str, _user_message: &str, _max_tokens: u32, _temperature: f64) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            let mut guard = self.response.lock().await;
            match guard.take() {
                Some(r) => r,
                None => Ok("unused".to_string()),
            }
        }

        fn model_name(&self) -> &str {
            "scripted"
        }

        fn call_timeout(&self) -> Duration {
            Duration::from_millis(50)
        }
    }

    fn make_config() -> Arc<AgcsConfig> {
        Arc::new(AgcsConfig::default())
    }

    #[test]
    fn p8_no_air_assets_yields_no_uavs_active_guardrail_text() {
        let fleet = FleetState::new();
        let mut ground = AssetUpdate::new("PHONE");
        ground.kind = Some(AssetKind::GroundOperator);
        ground.lat = Some(60.0);
        ground.lon = Some(24.0);
        fleet.apply_update(ground, 0.0);

        let snapshot = fleet.snapshot();
        assert!(!snapshot.iter().any(|r| r.kind.is_air()));
        // The guardrail text itself lives in persona::GUARDRAIL and is asserted
        // as part of the system prompt; here we only confirm the context the
        // engine builds contains no AIR kind, which is the guardrail's trigger.
    }

    #[test]
    fn p10_rtk_nav_forces_good_rtk_grade_regardless_of_accuracy() {
        let mut record = AssetRecord::new("UAV-0001", AssetKind::AirUavVendorA, 0.0);
        record.nav = Nav::Rtk;
        record.accuracy_m = 50.0;
        assert_eq!(record.gps_grade(), "GOOD (RTK)");
    }

    #[test]
    fn context_line_reports_signal_lost_with_age() {
        let mut record = AssetRecord::new("UAV-0001", AssetKind::AirUavVendorA, 0.0);
        record.last_seen_ts = 0.0;
        let line = context_line(&record, 95.0, HomeBase::default(), None, 90.0);
        assert!(line.contains("SIGNAL_LOST"));
        assert!(line.contains("age=95s"));
    }

    #[test]
    fn context_line_converts_air_speed_to_kmh_and_ground_stays_mps() {
        let mut air = AssetRecord::new("UAV-0001", AssetKind::AirUavVendorA, 0.0);
        air.h_speed_mps = Some(10.0);
        let air_line = context_line(&air, 0.0, HomeBase::default(), None, 90.0);
        assert!(air_line.contains("SPEED: 36.0km/h"));

        let mut ground = AssetRecord::new("PHONE", AssetKind::GroundOperator, 0.0);
        ground.h_speed_mps = Some(10.0);
        let ground_line = context_line(&ground, 0.0, HomeBase::default(), None, 90.0);
        assert!(ground_line.contains("SPEED: 10.0m/s"));
    }

    #[tokio::test]
    async fn p7_single_flight_drops_overlapping_tick() {
        let fleet = FleetState::new();
        let clock: Arc<dyn Clock> = Arc::new(FakeClock::new());
        let llm: Arc<dyn LlmClient> = Arc::new(ScriptedLlm::slow_forever());
        let audit_log = Arc::new(AuditLog::new(tempfile::tempdir().unwrap().path(), false).await);
        let engine = Arc::new(SitrepEngine::new(fleet, clock, make_config(), llm, "prompt".to_string(), audit_log));

        let e1 = engine.clone();
        let first = tokio::spawn(async move { e1.tick().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = engine.tick().await;

        assert_eq!(second, None);
        let _ = first.await;
    }

    #[tokio::test]
    async fn timeout_produces_no_output_and_clears_flight_flag() {
        let fleet = FleetState::new();
        let clock: Arc<dyn Clock> = Arc::new(FakeClock::new());
        let llm: Arc<dyn LlmClient> = Arc::new(ScriptedLlm::slow_forever());
        let audit_log = Arc::new(AuditLog::new(tempfile::tempdir().unwrap().path(), false).await);
        let engine = SitrepEngine::new(fleet, clock, make_config(), llm, "prompt".to_string(), audit_log);

        assert_eq!(engine.tick().await, None);
        assert!(!engine.in_flight.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn successful_call_is_audited_and_returned() {
        let fleet = FleetState::new();
        let mut u = AssetUpdate::new("UAV-0001");
        u.kind = Some(AssetKind::AirUavVendorA);
        u.lat = Some(60.0);
        u.lon = Some(24.0);
        u.battery_pct = Some(59);
        fleet.apply_update(u, 0.0);

        let clock: Arc<dyn Clock> = Arc::new(FakeClock::new());
        let llm: Arc<dyn LlmClient> = Arc::new(ScriptedLlm::ok("UAV-0001 nominal, 59% battery."));
        let audit_log = Arc::new(AuditLog::new(tempfile::tempdir().unwrap().path(), false).await);
        let engine = SitrepEngine::new(fleet, clock, make_config(), llm, "prompt".to_string(), audit_log);

        let text = engine.tick().await;
        assert_eq!(text.as_deref(), Some("UAV-0001 nominal, 59% battery."));
    }
}
