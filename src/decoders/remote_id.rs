//! Remote-ID (ASTM F3411-style) transponder decoder.
//!
//! Grounded on `original_source/securingskies/drivers/dronetag.py`, per the
//! rules of SPEC_FULL.md §4.2.

use crate::asset::{AssetKind, AssetUpdate, DecodedPacket, Nav};
use chrono::{DateTime, Utc};
use serde_json::Value;

fn last4(id: &str) -> String {
    if id.len() <= 4 {
        id.to_string()
    } else {
        id[id.len() - 4..].to_string()
    }
}

pub fn decode(_topic: &str, payload: &[u8], now: f64) -> DecodedPacket {
    let Ok(data) = serde_json::from_slice::<Value>(payload) else {
        return DecodedPacket::None;
    };

    let raw_id = data
        .get("sensor_id")
        .or_else(|| data.get("uas_id"))
        .and_then(Value::as_str)
        .unwrap_or("UNK");
    let tid = format!("TAG-{}", last4(raw_id));

    let mut update = AssetUpdate::new(tid);
    update.kind = Some(AssetKind::AirRemoteId);
    update.battery_pct = Some(-1);
    update.nav = Some(Nav::RemoteId);

    let location = data.get("location");
    update.lat = location.and_then(|l| l.get("latitude")).and_then(Value::as_f64);
    update.lon = location.and_then(|l| l.get("longitude")).and_then(Value::as_f64);
    update.accuracy_m = Some(
        location
            .and_then(|l| l.get("accuracy"))
            .and_then(Value::as_f64)
            .unwrap_or(0.0),
    );

    update.alt_m = Some(resolve_altitude(&data));
    update.h_speed_mps = Some(resolve_speed(&data));

    let mut state = data
        .get("operational_state")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_uppercase();
    if state == "UNKNOWN" && update.alt_m.unwrap_or(0.0) > 5.0 {
        state = "AIRBORNE".to_string();
    }
    update.mode = Some(state);

    if let Some(device_ts) = data.get("timestamp").and_then(Value::as_str)
        && let Ok(parsed) = DateTime::parse_from_rfc3339(device_ts)
    {
        let device_ts: DateTime<Utc> = parsed.with_timezone(&Utc);
        update.link_latency_s = Some(now - device_ts.timestamp() as f64);
    }

    DecodedPacket::Updates(vec![update])
}

fn resolve_altitude(data: &Value) -> f64 {
    if let Some(altitudes) = data.get("altitudes").and_then(Value::as_array) {
        if let Some(msl) = altitudes
            .iter()
            .find(|a| a.get("type").and_then(Value::as_str) == Some("MSL"))
        {
            return msl.get("value").and_then(Value::as_f64).unwrap_or(0.0);
        }
        if let Some(first) = altitudes.first() {
            return first.get("value").and_then(Value::as_f64).unwrap_or(0.0);
        }
        return 0.0;
    }
    data.get("altitude").and_then(Value::as_f64).unwrap_or(0.0)
}

fn resolve_speed(data: &Value) -> f64 {
    let velocity = data.get("velocity");
    if let Some(speed) = velocity.and_then(|v| v.get("horizontal_speed")).and_then(Value::as_f64) {
        return speed;
    }
    if let Some(velocity) = velocity {
        let vx = velocity.get("x").and_then(Value::as_f64);
        let vy = velocity.get("y").and_then(Value::as_f64);
        if let (Some(vx), Some(vy)) = (vx, vy) {
            return (vx * vx + vy * vy).sqrt();
        }
    }
    0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_id_airborne_scenario() {
        let payload = serde_json::json!({
            "sensor_id": "xxxxxx9999",
            "location": {"latitude": 60.32, "longitude": 24.83, "accuracy": 3},
            "altitudes": [
                {"type": "HAE-WGS84", "value": 110},
                {"type": "MSL", "value": 100}
            ],
            "velocity": {"horizontal_speed": 12},
            "operational_state": "unknown"
        });
        let packet = decode("dronetag/x", payload.to_string().as_bytes(), 0.0);
        let DecodedPacket::Updates(updates) = packet else {
            panic!("expected updates");
        };
        let u = &updates[0];
        assert_eq!(u.tid, "TAG-9999");
        assert_eq!(u.alt_m, Some(100.0));
        assert_eq!(u.h_speed_mps, Some(12.0));
        assert_eq!(u.mode, Some("AIRBORNE".to_string()));
        assert_eq!(u.nav, Some(Nav::RemoteId));
        assert_eq!(u.battery_pct, Some(-1));
    }

    #[test]
    fn velocity_vector_falls_back_to_magnitude() {
        let payload = serde_json::json!({
            "sensor_id": "abcd1111",
            "location": {"latitude": 1.0, "longitude": 1.0},
            "altitude": 20.0,
            "velocity": {"x": 3.0, "y": 4.0},
            "operational_state": "AIRBORNE"
        });
        let packet = decode("dronetag/x", payload.to_string().as_bytes(), 0.0);
        let DecodedPacket::Updates(updates) = packet else {
            panic!("expected updates");
        };
        assert_eq!(updates[0].h_speed_mps, Some(5.0));
    }

    #[test]
    fn malformed_payload_dropped() {
        assert!(matches!(
            decode("dronetag/x", b"{not json", 0.0),
            DecodedPacket::None
        ));
    }
}
