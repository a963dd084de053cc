//! Persona loader (C6): trained few-shot prompt, or a static default, plus a
//! fixed guardrail trailer appended in all cases.
//!
//! The trained prompt file itself is produced by the few-shot prompt
//! optimizer, which is out of scope here (§1) — we only consume its output
//! as data, per `original_source/labs/optimizer/*`.

use serde::Deserialize;
use std::fmt;
use std::path::Path;
use tracing::{info, warn};

/// Cap on how many trained exemplars are folded into the prompt.
const MAX_EXEMPLARS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persona {
    Pilot,
    Commander,
    Analyst,
}

impl Persona {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pilot" => Some(Persona::Pilot),
            "commander" => Some(Persona::Commander),
            "analyst" => Some(Persona::Analyst),
            _ => None,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Persona::Pilot => "PILOT",
            Persona::Commander => "COMMANDER",
            Persona::Analyst => "ANALYST",
        }
    }

    fn default_prompt(self) -> &'static str {
        match self {
            Persona::Pilot => {
                "You are the PILOT. Report airspace and aircraft status in short, \
                 crew-facing callouts: altitude, battery, nav quality, and anything \
                 that demands an immediate decision."
            }
            Persona::Commander => {
                "You are the COMMANDER. Summarize the tactical picture for a \
                 decision-maker: asset status, threats, and recommended next action, \
                 in the fewest words that preserve the facts."
            }
            Persona::Analyst => {
                "You are the ANALYST. Produce a factual situation report: per-asset \
                 state, navigation quality, and any detections, without speculation."
            }
        }
    }
}

impl fmt::Display for Persona {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[derive(Debug, Deserialize)]
struct OptimizedPromptFile {
    predict: PredictSection,
}

#[derive(Debug, Deserialize)]
struct PredictSection {
    demos: Vec<Exemplar>,
}

#[derive(Debug, Deserialize)]
struct Exemplar {
    raw_telemetry: String,
    report: String,
}

/// The fixed guardrail trailer appended to every persona prompt (spec.md §4.5).
pub const GUARDRAIL: &str = "\
GUARDRAILS (follow exactly):\n\
- Assets of type GROUND_OPERATOR or GROUND_CONTROLLER are OPERATOR or GCS. Never call them drones.\n\
- Assets of type AIR_UAV_VENDOR_A or AIR_REMOTE_ID are UAV or DRONE.\n\
- You may assert RTK only when the asset's nav is RTK_FIX, RTK_FLOAT, or RTK.\n\
- If no AIR asset is present in the data, your output must state \"No UAVs active.\"";

/// Loads `<dir>/optimized_<persona>.json` if present and well-formed;
/// otherwise falls back to the persona's static default. The guardrail
/// trailer is appended in either case.
pub fn load_persona_prompt(dir: &Path, persona: Persona) -> String {
    let filename = format!("optimized_{}.json", persona.label().to_lowercase());
    let path = dir.join(&filename);

    let body = match std::fs::read_to_string(&path) {
        Ok(contents) => match serde_json::from_str::<OptimizedPromptFile>(&contents) {
            Ok(parsed) => {
                info!("persona: loaded trained prompt from {}", path.display());
                build_trained_prompt(persona, &parsed.predict.demos)
            }
            Err(e) => {
                warn!("persona: {} is malformed ({}), using default prompt", path.display(), e);
                persona.default_prompt().to_string()
            }
        },
        Err(_) => persona.default_prompt().to_string(),
    };

    format!("{body}\n\n{GUARDRAIL}")
}

fn build_trained_prompt(persona: Persona, demos: &[Exemplar]) -> String {
    let mut out = format!("You are the {}. Follow these trained examples:\n", persona.label());
    for demo in demos.iter().take(MAX_EXEMPLARS) {
        out.push_str(&format!("DATA: {}\nREPORT: {}\n---\n", demo.raw_telemetry, demo.report));
    }
    out.push_str("Now generate the REPORT for the current DATA.");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_personas_case_insensitively() {
        assert_eq!(Persona::parse("Pilot"), Some(Persona::Pilot));
        assert_eq!(Persona::parse("ANALYST"), Some(Persona::Analyst));
        assert_eq!(Persona::parse("nope"), None);
    }

    #[test]
    fn missing_file_falls_back_to_default_and_appends_guardrail() {
        let dir = tempfile::tempdir().unwrap();
        let prompt = load_persona_prompt(dir.path(), Persona::Analyst);
        assert!(prompt.contains("ANALYST"));
        assert!(prompt.contains("No UAVs active"));
    }

    #[test]
    fn malformed_file_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("optimized_pilot.json"), "not json").unwrap();
        let prompt = load_persona_prompt(dir.path(), Persona::Pilot);
        assert!(prompt.contains("PILOT"));
        assert!(prompt.contains("crew-facing") || prompt.contains("GUARDRAILS"));
    }

    #[test]
    fn valid_file_builds_trained_prompt_with_exemplars() {
        let dir = tempfile::tempdir().unwrap();
        let contents = serde_json::json!({
            "predict": {
                "demos": [
                    {"raw_telemetry": "Asset: UAV-0001 | BATT: 80%", "report": "UAV-0001 nominal."}
                ]
            }
        });
        std::fs::write(dir.path().join("optimized_commander.json"), contents.to_string()).unwrap();
        let prompt = load_persona_prompt(dir.path(), Persona::Commander);
        assert!(prompt.contains("trained examples"));
        assert!(prompt.contains("UAV-0001 nominal."));
        assert!(prompt.contains("Now generate the REPORT"));
    }
}
