//! The in-memory fleet state table (C4) and its merge rules.
//!
//! Grounded on the teacher's `AircraftStatesMap` in `flight_tracker/mod.rs`:
//! an `Arc<DashMap<tid, AssetRecord>>` giving concurrent per-key locking so
//! one aircraft's update never blocks another's. Mutation is confined to the
//! dispatcher (C5); every other reader gets an owned snapshot (Design Notes §9).

use crate::asset::{AssetKind, AssetRecord, AssetUpdate, VisualEvent};
use dashmap::DashMap;
use std::sync::Arc;

#[derive(Clone)]
pub struct FleetState {
    table: Arc<DashMap<String, AssetRecord>>,
}

impl Default for FleetState {
    fn default() -> Self {
        Self::new()
    }
}

impl FleetState {
    pub fn new() -> Self {
        Self {
            table: Arc::new(DashMap::new()),
        }
    }

    /// Merge one decoded update into the table under its `tid` (spec.md §4.4,
    /// P1/P2/P3). `now` becomes the record's `last_seen_ts`.
    pub fn apply_update(&self, update: AssetUpdate, now: f64) {
        let mut entry = self
            .table
            .entry(update.tid.clone())
            .or_insert_with(|| AssetRecord::new(&update.tid, update.kind.unwrap_or(AssetKind::GroundOperator), now));

        let record = entry.value_mut();

        if let Some(kind) = update.kind {
            record.kind = kind;
        }

        if update.lat.is_some() {
            let incoming_is_sentinel = AssetRecord::is_sentinel_zero(update.lat);
            let prior_is_valid = record
                .lat
                .map(|lat| !AssetRecord::is_sentinel_zero(Some(lat)))
                .unwrap_or(false);

            if !(incoming_is_sentinel && prior_is_valid) {
                record.lat = update.lat;
                record.lon = update.lon.or(record.lon);
            }
            // else: reject the update's position outright, keep prior fix (P3).
        }

        if update.alt_m.is_some() {
            record.alt_m = update.alt_m;
        }
        if update.h_speed_mps.is_some() {
            record.h_speed_mps = update.h_speed_mps;
        }
        if update.v_speed_mps.is_some() {
            record.v_speed_mps = update.v_speed_mps;
        }
        if update.heading_deg.is_some() {
            record.heading_deg = update.heading_deg;
        }
        if let Some(batt) = update.battery_pct {
            record.battery_pct = batt;
        }
        if let Some(nav) = update.nav {
            record.nav = nav;
        }
        if let Some(acc) = update.accuracy_m {
            record.accuracy_m = acc;
        }
        if let Some(mode) = update.mode {
            record.mode = Some(mode);
        }
        if update.link_latency_s.is_some() {
            record.link_latency_s = update.link_latency_s;
        }

        record.last_seen_ts = record.last_seen_ts.max(now);
    }

    /// Attach a visual event to the AIR record with the max `last_seen_ts`
    /// at or before `t` (spec.md §4.4 rule 4, P4). Dropped if no AIR record exists.
    pub fn apply_visual(&self, event: VisualEvent, t: f64) {
        let target = self
            .table
            .iter()
            .filter(|entry| entry.value().kind.is_air() && entry.value().last_seen_ts <= t)
            .max_by(|a, b| {
                a.value()
                    .last_seen_ts
                    .partial_cmp(&b.value().last_seen_ts)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|entry| entry.key().clone());

        if let Some(tid) = target
            && let Some(mut record) = self.table.get_mut(&tid)
        {
            record.ai_sightings = event.sightings;
        }
    }

    /// A consistent point-in-time read of every record (spec.md §4.6 step 1).
    pub fn snapshot(&self) -> Vec<AssetRecord> {
        self.table.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn get(&self, tid: &str) -> Option<AssetRecord> {
        self.table.get(tid).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::Nav;

    #[test]
    fn p1_last_seen_is_monotonic() {
        let fleet = FleetState::new();
        let mut u = AssetUpdate::new("UAV-0001");
        u.kind = Some(AssetKind::AirUavVendorA);
        u.lat = Some(60.0);
        u.lon = Some(24.0);
        fleet.apply_update(u.clone(), 10.0);
        fleet.apply_update(u, 20.0);
        assert_eq!(fleet.get("UAV-0001").unwrap().last_seen_ts, 20.0);
    }

    #[test]
    fn p2_merge_preserves_absent_fields() {
        let fleet = FleetState::new();
        let mut u = AssetUpdate::new("UAV-0001");
        u.kind = Some(AssetKind::AirUavVendorA);
        u.lat = Some(60.0);
        u.lon = Some(24.0);
        u.battery_pct = Some(80);
        fleet.apply_update(u, 0.0);

        let mut partial = AssetUpdate::new("UAV-0001");
        partial.heading_deg = Some(90.0);
        fleet.apply_update(partial, 1.0);

        let record = fleet.get("UAV-0001").unwrap();
        assert_eq!(record.battery_pct, 80);
        assert_eq!(record.lat, Some(60.0));
        assert_eq!(record.heading_deg, Some(90.0));
    }

    #[test]
    fn p3_sentinel_zero_rejected_in_favor_of_prior_fix() {
        let fleet = FleetState::new();
        let mut good = AssetUpdate::new("UAV-0001");
        good.kind = Some(AssetKind::AirUavVendorA);
        good.lat = Some(60.0);
        good.lon = Some(24.0);
        fleet.apply_update(good, 0.0);

        let mut heartbeat = AssetUpdate::new("UAV-0001");
        heartbeat.lat = Some(0.0);
        heartbeat.lon = Some(0.0);
        fleet.apply_update(heartbeat, 1.0);

        let record = fleet.get("UAV-0001").unwrap();
        assert_eq!(record.lat, Some(60.0));
        assert_eq!(record.lon, Some(24.0));
    }

    #[test]
    fn p4_visual_attaches_to_most_recent_air_record() {
        let fleet = FleetState::new();
        let mut older = AssetUpdate::new("UAV-0001");
        older.kind = Some(AssetKind::AirUavVendorA);
        older.lat = Some(60.0);
        older.lon = Some(24.0);
        fleet.apply_update(older, 5.0);

        let mut newer = AssetUpdate::new("UAV-0002");
        newer.kind = Some(AssetKind::AirUavVendorA);
        newer.lat = Some(61.0);
        newer.lon = Some(25.0);
        fleet.apply_update(newer, 10.0);

        let mut sightings = std::collections::HashMap::new();
        sightings.insert("Human".to_string(), 2);
        fleet.apply_visual(VisualEvent { sightings }, 10.0);

        assert!(fleet.get("UAV-0002").unwrap().ai_sightings.contains_key("Human"));
        assert!(fleet.get("UAV-0001").unwrap().ai_sightings.is_empty());
    }

    #[test]
    fn p4_visual_dropped_when_no_air_record_exists() {
        let fleet = FleetState::new();
        let mut ground = AssetUpdate::new("PHONE");
        ground.kind = Some(AssetKind::GroundOperator);
        ground.lat = Some(60.0);
        ground.lon = Some(24.0);
        fleet.apply_update(ground, 1.0);

        let mut sightings = std::collections::HashMap::new();
        sightings.insert("Human".to_string(), 1);
        fleet.apply_visual(VisualEvent { sightings }, 1.0);

        assert!(fleet.get("PHONE").unwrap().ai_sightings.is_empty());
    }

    #[test]
    fn staleness_reported_but_record_retained() {
        let fleet = FleetState::new();
        let mut u = AssetUpdate::new("UAV-0001");
        u.kind = Some(AssetKind::AirUavVendorA);
        u.lat = Some(60.0);
        u.lon = Some(24.0);
        fleet.apply_update(u, 0.0);

        let record = fleet.get("UAV-0001").unwrap();
        assert!(record.is_stale(95.0, 90.0));
        assert_eq!(record.nav, Nav::Unknown);
        assert_eq!(fleet.len(), 1);
    }
}
