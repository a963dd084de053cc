//! The normalized asset record and its supporting enums.
//!
//! This is the common currency every decoder emits into and every reader
//! (SITREP engine, live feed bridge) reads from. Field semantics are defined
//! in full in SPEC_FULL.md §3.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssetKind {
    AirUavVendorA,
    AirRemoteId,
    GroundOperator,
    GroundController,
}

impl AssetKind {
    pub fn is_air(self) -> bool {
        matches!(self, AssetKind::AirUavVendorA | AssetKind::AirRemoteId)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AssetKind::AirUavVendorA => "AIR_UAV_VENDOR_A",
            AssetKind::AirRemoteId => "AIR_REMOTE_ID",
            AssetKind::GroundOperator => "GROUND_OPERATOR",
            AssetKind::GroundController => "GROUND_CONTROLLER",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Nav {
    Gps,
    Gps3d,
    Rtk,
    RtkFloat,
    RtkFix,
    RemoteId,
    Unknown,
}

impl Nav {
    /// True for everything spec.md P10 considers "RTK asserted".
    pub fn is_rtk(self) -> bool {
        matches!(self, Nav::RtkFix | Nav::RtkFloat | Nav::Rtk)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Nav::Gps => "GPS",
            Nav::Gps3d => "GPS_3D",
            Nav::Rtk => "RTK",
            Nav::RtkFloat => "RTK_FLOAT",
            Nav::RtkFix => "RTK_FIX",
            Nav::RemoteId => "REMOTE_ID",
            Nav::Unknown => "UNKNOWN",
        }
    }
}

/// The normalized, per-`tid` fleet record (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetRecord {
    pub tid: String,
    pub kind: AssetKind,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub alt_m: Option<f64>,
    pub h_speed_mps: Option<f64>,
    pub v_speed_mps: Option<f64>,
    pub heading_deg: Option<f64>,
    /// 0..100, or -1 = unknown.
    pub battery_pct: i32,
    pub nav: Nav,
    pub accuracy_m: f64,
    pub mode: Option<String>,
    pub ai_sightings: HashMap<String, u32>,
    pub link_latency_s: Option<f64>,
    pub last_seen_ts: f64,
    pub first_seen_ts: f64,
}

impl AssetRecord {
    /// A freshly-decoded, otherwise-empty record for `tid`/`kind`, stamped at `now`.
    pub fn new(tid: impl Into<String>, kind: AssetKind, now: f64) -> Self {
        Self {
            tid: tid.into(),
            kind,
            lat: None,
            lon: None,
            alt_m: None,
            h_speed_mps: None,
            v_speed_mps: None,
            heading_deg: None,
            battery_pct: -1,
            nav: Nav::Unknown,
            accuracy_m: 10.0,
            mode: None,
            ai_sightings: HashMap::new(),
            link_latency_s: None,
            last_seen_ts: now,
            first_seen_ts: now,
        }
    }

    /// A numeric-sentinel-zero position: |lat| < 1 degree (spec.md §4.4 rule 3).
    pub fn is_sentinel_zero(lat: Option<f64>) -> bool {
        match lat {
            Some(lat) => lat.abs() < 1.0,
            None => true,
        }
    }

    pub fn gps_grade(&self) -> &'static str {
        if self.nav.is_rtk() {
            "GOOD (RTK)"
        } else if self.accuracy_m < 5.0 {
            "GOOD"
        } else if self.accuracy_m < 10.0 {
            "FAIR"
        } else {
            "POOR"
        }
    }

    pub fn is_stale(&self, now: f64, stale_threshold_s: f64) -> bool {
        now - self.last_seen_ts > stale_threshold_s
    }
}

/// One decoded update to merge into the fleet table. `None` fields leave the
/// prior value untouched (spec.md §4.4 rule, P2).
#[derive(Debug, Clone, Default)]
pub struct AssetUpdate {
    pub tid: String,
    pub kind: Option<AssetKind>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub alt_m: Option<f64>,
    pub h_speed_mps: Option<f64>,
    pub v_speed_mps: Option<f64>,
    pub heading_deg: Option<f64>,
    pub battery_pct: Option<i32>,
    pub nav: Option<Nav>,
    pub accuracy_m: Option<f64>,
    pub mode: Option<String>,
    pub link_latency_s: Option<f64>,
}

impl AssetUpdate {
    pub fn new(tid: impl Into<String>) -> Self {
        Self {
            tid: tid.into(),
            ..Default::default()
        }
    }
}

/// A transient visual-event sighting, attached to the most recently updated
/// AIR record rather than stored under its own key (spec.md §3, §4.4 rule 4).
#[derive(Debug, Clone)]
pub struct VisualEvent {
    pub sightings: HashMap<String, u32>,
}

/// What a decoder can produce for one inbound packet (Design Notes §9: model
/// the vendor dispatch as a tagged sum type rather than unifying schemas).
#[derive(Debug, Clone)]
pub enum DecodedPacket {
    Updates(Vec<AssetUpdate>),
    Visual(VisualEvent),
    None,
}
