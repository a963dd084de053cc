//! Mobile-operator location decoder (OwnTracks-style `_type: "location"`).
//!
//! Grounded on `original_source/securingskies/drivers/owntracks.py`.

use crate::asset::{AssetKind, AssetUpdate, DecodedPacket, Nav};
use chrono::{DateTime, Utc};
use serde_json::Value;

pub fn decode(_topic: &str, payload: &[u8], now: f64) -> DecodedPacket {
    let Ok(data) = serde_json::from_slice::<Value>(payload) else {
        return DecodedPacket::None;
    };

    if data.get("_type").and_then(Value::as_str) != Some("location") {
        return DecodedPacket::None;
    }

    let tid = data
        .get("tid")
        .and_then(Value::as_str)
        .unwrap_or("PHONE")
        .to_string();

    let mut update = AssetUpdate::new(tid);
    update.kind = Some(AssetKind::GroundOperator);
    update.lat = data.get("lat").and_then(Value::as_f64);
    update.lon = data.get("lon").and_then(Value::as_f64);
    update.alt_m = Some(data.get("alt").and_then(Value::as_f64).unwrap_or(0.0));
    update.battery_pct = Some(data.get("batt").and_then(Value::as_i64).unwrap_or(-1) as i32);
    update.accuracy_m = Some(data.get("acc").and_then(Value::as_f64).unwrap_or(0.0));
    update.h_speed_mps = Some(data.get("vel").and_then(Value::as_f64).unwrap_or(0.0));
    update.nav = Some(Nav::Gps);
    update.mode = Some("Active".to_string());

    if let Some(device_ts) = data.get("tst").and_then(Value::as_i64) {
        update.link_latency_s = Some(now - device_ts as f64);
    } else if let Some(device_ts) = data.get("timestamp").and_then(Value::as_str)
        && let Ok(parsed) = DateTime::parse_from_rfc3339(device_ts)
    {
        let device_ts: DateTime<Utc> = parsed.with_timezone(&Utc);
        update.link_latency_s = Some(now - device_ts.timestamp() as f64);
    }

    DecodedPacket::Updates(vec![update])
}
