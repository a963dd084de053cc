//! Forensic "black box" recorder (C3).
//!
//! Grounded on `original_source/securingskies/outputs/recorder.py`: one JSON
//! line per inbound packet, flushed after every write, failures swallowed so
//! a disk hiccup never takes down the mission. The Python version held a
//! single file handle written from whichever thread called `log()`; this
//! port instead runs the writer on its own task fed by a bounded channel, per
//! Design Notes §9's "block briefly then drop" back-pressure policy for the
//! recorder (preserve forensic fidelity up to a small bound rather than ever
//! blocking the ingest path indefinitely).

use chrono::Local;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

const QUEUE_DEPTH: usize = 256;
const SEND_GRACE: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Serialize)]
pub struct ForensicRecord {
    pub ts: f64,
    pub topic: String,
    pub data: Value,
}

#[derive(Clone)]
pub struct Recorder {
    tx: Option<mpsc::Sender<ForensicRecord>>,
}

impl Recorder {
    /// Creates `<dir>/mission_<YYYYMMDD_HHMMSS>.jsonl` and spawns the writer
    /// task. If `enabled` is false or the file can't be opened, recording is
    /// silently disabled (spec.md §4.3: "Failures to open the file disable
    /// the recorder silently").
    pub async fn new(dir: &Path, enabled: bool) -> Self {
        if !enabled {
            return Self { tx: None };
        }

        let filename = format!("mission_{}.jsonl", Local::now().format("%Y%m%d_%H%M%S"));
        let path: PathBuf = dir.join(filename);

        let file = match OpenOptions::new().create(true).append(true).open(&path).await {
            Ok(file) => file,
            Err(e) => {
                warn!("recorder: failed to open {}: {} — recording disabled", path.display(), e);
                return Self { tx: None };
            }
        };

        info!("recorder: session started at {}", path.display());
        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        tokio::spawn(writer_loop(file, rx));
        Self { tx: Some(tx) }
    }

    /// Records one inbound `(topic, data)` pair under the current server
    /// timestamp. Never blocks the caller beyond a small grace period; if the
    /// queue is still full after that, the record is dropped (spec.md §4.3,
    /// §7 "Auxiliary sink down" is not this path — this is the core recorder,
    /// whose own failure policy is "swallow and continue").
    pub async fn record(&self, ts: f64, topic: &str, data: Value) {
        let Some(tx) = &self.tx else { return };
        let record = ForensicRecord {
            ts,
            topic: topic.to_string(),
            data,
        };
        match tokio::time::timeout(SEND_GRACE, tx.send(record)).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => {} // writer task gone; mission continues without recording
            Err(_) => {}     // queue still full after grace period; drop
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }
}

async fn writer_loop(mut file: File, mut rx: mpsc::Receiver<ForensicRecord>) {
    while let Some(record) = rx.recv().await {
        let line = match serde_json::to_string(&record) {
            Ok(line) => line,
            Err(e) => {
                error!("recorder: failed to serialize record: {}", e);
                continue;
            }
        };
        if let Err(e) = file.write_all(line.as_bytes()).await {
            error!("recorder: write failed: {}", e);
            continue;
        }
        if let Err(e) = file.write_all(b"\n").await {
            error!("recorder: write failed: {}", e);
            continue;
        }
        if let Err(e) = file.flush().await {
            error!("recorder: flush failed: {}", e);
        }
    }
}
