//! Replay engine (C9): re-publishes a forensic log at a scaled cadence, with
//! drift-correcting sleeps and an optional "jump-to-action" pre-roll.
//!
//! Grounded on `original_source/labs/replay/replay_tool.py`'s own
//! drift-correction loop (spec.md §4.8 step 3). The publish step is
//! abstracted behind [`Publisher`] so the timing algorithm (P5/P6) is
//! testable without a real broker, the same separation `ingest::Dispatcher`
//! makes between `handle_message` and `run`.

use crate::clock::Clock;
use crate::recorder::ForensicRecord;
use async_trait::async_trait;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Any topic under this family is "enterprise UAV traffic" for jump-to-action
/// purposes (spec.md §4.8 step 1).
const ACTION_TOPIC_PREFIX: &str = "thing/product/";
const PRE_ROLL_S: f64 = 5.0;

#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, topic: &str, data: &serde_json::Value);
}

/// Reads every well-formed line of a JSONL forensic log, skipping malformed
/// ones silently (spec.md §4.8 step 4).
fn read_records(path: &Path) -> std::io::Result<Vec<ForensicRecord>> {
    let file = std::fs::File::open(path)?;
    let reader = BufReader::new(file);
    let mut records = Vec::new();
    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(_) => continue,
        };
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<ForensicRecord>(&line) {
            Ok(record) => records.push(record),
            Err(_) => continue,
        }
    }
    Ok(records)
}

/// Index of the first record to emit under jump-to-action: `ts - 5s` pre-roll
/// before the first enterprise-UAV-family record. `None` means "no skip".
fn jump_start_index(records: &[ForensicRecord]) -> usize {
    let Some(action_ts) = records
        .iter()
        .find(|r| r.topic.starts_with(ACTION_TOPIC_PREFIX))
        .map(|r| r.ts)
    else {
        return 0;
    };
    let skip_until = action_ts - PRE_ROLL_S;
    records.iter().position(|r| r.ts >= skip_until).unwrap_or(0)
}

pub struct ReplayEngine {
    clock: Arc<dyn Clock>,
}

impl ReplayEngine {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Runs the full replay session against `publisher`, honoring `speed`
    /// and `jump_to_action`. Returns the number of records emitted.
    pub async fn run(&self, path: &Path, speed: f64, jump_to_action: bool, publisher: &dyn Publisher) -> std::io::Result<usize> {
        let records = read_records(path)?;
        if records.is_empty() {
            return Ok(0);
        }

        let start_index = if jump_to_action { jump_start_index(&records) } else { 0 };
        let records = &records[start_index..];
        if records.is_empty() {
            return Ok(0);
        }

        let log_t0 = records[0].ts;
        let wall_t0 = self.clock.now_ts();
        let mut emitted = 0usize;

        for record in records {
            let log_elapsed = record.ts - log_t0;
            let wall_elapsed = (self.clock.now_ts() - wall_t0) * speed;
            let sleep_s = ((log_elapsed - wall_elapsed) / speed).max(0.0);
            if sleep_s > 0.0 {
                tokio::time::sleep(Duration::from_secs_f64(sleep_s)).await;
            }

            publisher.publish(&record.topic, &record.data).await;
            emitted += 1;
        }

        info!("replay: session complete, {} records emitted", emitted);
        Ok(emitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use tokio::sync::Mutex;

    struct RecordingPublisher {
        emitted: Mutex<Vec<(String, f64)>>,
        clock: Arc<FakeClock>,
    }

    impl RecordingPublisher {
        fn new(clock: Arc<FakeClock>) -> Self {
            Self {
                emitted: Mutex::new(Vec::new()),
                clock,
            }
        }
    }

    #[async_trait]
    impl Publisher for RecordingPublisher {
        async fn publish(&self, topic: &str, _data: &serde_json::Value) {
            let mut guard = self.emitted.lock().await;
            guard.push((topic.to_string(), self.clock.now_ts()));
        }
    }

    fn write_log(dir: &Path, lines: &[&str]) -> std::path::PathBuf {
        let path = dir.join("mission.jsonl");
        std::fs::write(&path, lines.join("\n")).unwrap();
        path
    }

    #[tokio::test]
    async fn p6_replay_preserves_ordering() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_log(
            &dir.path(),
            &[
                r#"{"ts":0.0,"topic":"owntracks/phone","data":{}}"#,
                r#"{"ts":1.0,"topic":"dronetag/x","data":{}}"#,
                r#"{"ts":2.0,"topic":"owntracks/phone","data":{}}"#,
            ],
        );

        let clock = Arc::new(FakeClock::new());
        let engine = ReplayEngine::new(clock.clone());
        let publisher = RecordingPublisher::new(clock.clone());

        // FakeClock never advances on its own; speed is irrelevant here since
        // sleeps always compute a positive remainder against a frozen wall
        // clock, which tokio::time::sleep still honors under paused time.
        tokio::time::pause();
        let handle = tokio::spawn(async move { engine.run(&path, 1.0, false, &publisher).await.map(|n| (n, publisher)) });
        tokio::time::advance(Duration::from_secs(5)).await;
        let (count, publisher) = handle.await.unwrap().unwrap();
        assert_eq!(count, 3);

        let emitted = publisher.emitted.lock().await;
        assert_eq!(emitted[0].0, "owntracks/phone");
        assert_eq!(emitted[1].0, "dronetag/x");
        assert_eq!(emitted[2].0, "owntracks/phone");
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_log(
            &dir.path(),
            &[r#"{"ts":0.0,"topic":"owntracks/phone","data":{}}"#, "not json at all", r#"{"ts":1.0,"topic":"dronetag/x","data":{}}"#],
        );
        let records = read_records(&path).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn jump_to_action_preroll_finds_enterprise_topic() {
        let records = vec![
            ForensicRecord {
                ts: 0.0,
                topic: "owntracks/phone".to_string(),
                data: serde_json::json!({}),
            },
            ForensicRecord {
                ts: 20.0,
                topic: "thing/product/AAAA1234/osd".to_string(),
                data: serde_json::json!({}),
            },
            ForensicRecord {
                ts: 21.0,
                topic: "thing/product/AAAA1234/osd".to_string(),
                data: serde_json::json!({}),
            },
        ];
        let idx = jump_start_index(&records);
        // skip_until = 20 - 5 = 15; first record with ts >= 15 is index 1 (ts=20).
        assert_eq!(idx, 1);
    }

    #[test]
    fn jump_to_action_no_match_does_not_skip() {
        let records = vec![ForensicRecord {
            ts: 0.0,
            topic: "owntracks/phone".to_string(),
            data: serde_json::json!({}),
        }];
        assert_eq!(jump_start_index(&records), 0);
    }
}
