//! Enterprise UAV vendor decoder (OSD/state/sn topic family).
//!
//! Grounded on `original_source/securingskies/drivers/autel.py`, generalized
//! to the rules of SPEC_FULL.md §4.2. Dynamic-dictionary inspection (the
//! Python driver's signature move) is modeled here as `serde_json::Value`
//! tree-walking rather than a rigid struct, per the Design Notes' guidance
//! not to force a unified vendor schema.

use crate::asset::{AssetKind, AssetUpdate, DecodedPacket, Nav, VisualEvent};
use crate::decoders::visual;
use serde_json::Value;

fn last4(sn: &str) -> String {
    if sn.len() <= 4 {
        sn.to_string()
    } else {
        sn[sn.len() - 4..].to_string()
    }
}

fn serial_from_topic(topic: &str) -> String {
    topic
        .split('/')
        .nth(2)
        .filter(|s| !s.is_empty())
        .unwrap_or("UNK")
        .to_string()
}

/// Entry point for the enterprise family: routes by topic suffix.
pub fn decode(topic: &str, payload: &[u8]) -> DecodedPacket {
    decode_with_traffic(topic, payload, false)
}

pub fn decode_with_traffic(topic: &str, payload: &[u8], traffic_classes: bool) -> DecodedPacket {
    let Ok(data) = serde_json::from_slice::<Value>(payload) else {
        return DecodedPacket::None;
    };

    if topic.ends_with("/osd") {
        if let Some(osd_data) = data.get("data") {
            return parse_osd(topic, osd_data);
        }
        DecodedPacket::None
    } else if topic.ends_with("/state") {
        if data.get("method").and_then(Value::as_str) == Some("target_detect_result_report") {
            parse_vision(&data, traffic_classes)
        } else {
            DecodedPacket::None
        }
    } else {
        // "/sn" heartbeat and "/events" carry nothing this platform decodes.
        DecodedPacket::None
    }
}

fn parse_osd(topic: &str, osd: &Value) -> DecodedPacket {
    let mut updates = Vec::new();
    let sn_from_topic = serial_from_topic(topic);

    let capacity_percent = osd.get("capacity_percent").and_then(Value::as_f64);
    let has_drone_list = osd.get("drone_list").and_then(Value::as_array).is_some();

    if let Some(pct) = capacity_percent
        && pct > 0.0
        && has_drone_list
    {
        let tid = format!("CTRL-{}", last4(&sn_from_topic));
        let mut update = AssetUpdate::new(tid);
        update.kind = Some(AssetKind::GroundController);
        update.lat = osd.get("latitude").and_then(Value::as_f64);
        update.lon = osd.get("longitude").and_then(Value::as_f64);
        update.battery_pct = Some(pct as i32);
        update.mode = Some("Active".to_string());
        updates.push(update);
    }

    if let Some(drones) = osd.get("drone_list").and_then(Value::as_array) {
        for drone_raw in drones {
            if let Some(update) = normalize_uav(drone_raw, &sn_from_topic) {
                updates.push(update);
            }
        }
    } else if osd.get("height").is_some() || osd.get("battery").is_some() {
        if let Some(update) = normalize_uav(osd, &sn_from_topic) {
            updates.push(update);
        }
    }

    if updates.is_empty() {
        DecodedPacket::None
    } else {
        DecodedPacket::Updates(updates)
    }
}

fn normalize_uav(raw: &Value, sn_from_topic: &str) -> Option<AssetUpdate> {
    let sn = raw
        .get("sn")
        .and_then(Value::as_str)
        .unwrap_or(sn_from_topic);
    let tid = format!("UAV-{}", last4(sn));
    let mut update = AssetUpdate::new(tid);
    update.kind = Some(AssetKind::AirUavVendorA);

    update.lat = raw.get("latitude").and_then(Value::as_f64);
    update.lon = raw.get("longitude").and_then(Value::as_f64);
    let height = raw.get("height").and_then(Value::as_f64).unwrap_or(0.0);
    update.alt_m = Some(height);
    update.heading_deg = raw.get("attitude_head").and_then(Value::as_f64);
    update.h_speed_mps = raw.get("horizontal_speed").and_then(Value::as_f64);

    update.battery_pct = Some(battery_pct(raw));

    let pos_state = raw.get("position_state");
    let rtk_used = pos_state
        .and_then(|p| p.get("rtk_used"))
        .and_then(Value::as_i64)
        .unwrap_or(0);
    let is_fixed = pos_state
        .and_then(|p| p.get("is_fixed"))
        .and_then(Value::as_i64)
        .unwrap_or(0);
    let rtk_number = pos_state
        .and_then(|p| p.get("rtk_number"))
        .and_then(Value::as_i64)
        .unwrap_or(0);
    let gps_number = pos_state
        .and_then(|p| p.get("gps_number"))
        .and_then(Value::as_i64)
        .unwrap_or(0);

    if rtk_used == 1 {
        update.accuracy_m = Some(0.1);
        update.nav = Some(match is_fixed {
            3 => Nav::RtkFix,
            2 => Nav::RtkFloat,
            _ => Nav::Rtk,
        });
        let _sats = rtk_number;
    } else if gps_number > 10 {
        update.accuracy_m = Some(3.0);
        update.nav = Some(Nav::Gps3d);
    } else {
        update.accuracy_m = Some(10.0);
        update.nav = Some(Nav::Gps);
    }

    update.mode = Some(resolve_mode(raw, height));

    Some(update)
}

fn battery_pct(raw: &Value) -> i32 {
    if let Some(pct) = raw
        .get("battery")
        .and_then(|b| b.get("capacity_percent"))
        .and_then(Value::as_f64)
    {
        return pct as i32;
    }
    if let Some(pct) = raw.get("capacity_percent").and_then(Value::as_f64) {
        return pct as i32;
    }

    let total_mv = raw
        .get("battery")
        .and_then(|b| b.get("voltage"))
        .and_then(Value::as_f64)
        .or_else(|| raw.get("voltage").and_then(Value::as_f64));

    match total_mv {
        Some(total_mv) => {
            let cells = if total_mv <= 14_000.0 { 3 } else { 4 };
            let per_cell = (total_mv / 1000.0) / cells as f64;
            let clamped = per_cell.clamp(3.5, 4.3);
            (((clamped - 3.5) / 0.8) * 100.0).round() as i32
        }
        None => -1,
    }
}

fn resolve_mode(raw: &Value, height: f64) -> String {
    let code = raw.get("mode").and_then(Value::as_i64);
    let name = match code {
        Some(1) => "Manual",
        Some(2) => "ATTI",
        Some(3) => "GPS",
        Some(10) => "RTH",
        Some(11) => "Landing",
        Some(12) => "Mission",
        Some(13) => "Precision_Landing",
        Some(14) => "Takeoff",
        Some(15) => "Hover",
        _ => "Unknown",
    };

    if height <= 0.1 {
        "Ground_Idle".to_string()
    } else if name == "Hover" {
        "Hovering".to_string()
    } else {
        name.to_string()
    }
}

fn parse_vision(data: &Value, traffic_classes: bool) -> DecodedPacket {
    let objs = data
        .get("data")
        .and_then(|d| d.get("objs"))
        .and_then(Value::as_array);

    let Some(objs) = objs else {
        return DecodedPacket::None;
    };

    let cls_ids: Vec<i64> = objs
        .iter()
        .filter_map(|o| o.get("cls_id").and_then(Value::as_i64))
        .collect();

    match visual::tally(&cls_ids, traffic_classes) {
        Some(sightings) => DecodedPacket::Visual(VisualEvent { sightings }),
        None => DecodedPacket::None,
    }
}
