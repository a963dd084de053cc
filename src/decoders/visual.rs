//! Shared AI detection class table for the enterprise vendor's vision events.
//!
//! Grounded on `AutelDriver.AI_CLASSES`/`HIGH_VALUE_TARGETS` in the original
//! driver: a class-id -> name table, filtered to an allowed subset that
//! widens when "traffic" tracking is enabled.

/// Maps a vendor class id to its human-readable name, or `None` if unknown.
fn class_name(cls_id: i64) -> Option<&'static str> {
    match cls_id {
        3 => Some("Car"),
        4 => Some("Human"),
        5 => Some("Cyclist"),
        6 => Some("Truck"),
        30 => Some("Human"),
        34 => Some("Drone"),
        36 => Some("Fire"),
        _ => None,
    }
}

/// Default allowed class ids: Human(4), Human(30), Drone(34), Fire(36).
/// With `traffic` enabled, widens to additionally allow Car(3), Cyclist(5), Truck(6).
fn is_allowed(cls_id: i64, traffic: bool) -> bool {
    match cls_id {
        4 | 30 | 34 | 36 => true,
        3 | 5 | 6 => traffic,
        _ => false,
    }
}

/// Count occurrences of each allowed class name across a list of raw class ids.
/// Unknown and disallowed classes are dropped. Returns `None` if nothing survives.
pub fn tally(cls_ids: &[i64], traffic: bool) -> Option<std::collections::HashMap<String, u32>> {
    let mut sightings = std::collections::HashMap::new();
    for &id in cls_ids {
        if !is_allowed(id, traffic) {
            continue;
        }
        if let Some(name) = class_name(id) {
            *sightings.entry(name.to_string()).or_insert(0) += 1;
        }
    }
    if sightings.is_empty() { None } else { Some(sightings) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_classes_merge_by_name() {
        let sightings = tally(&[4, 30], false).expect("non-empty");
        assert_eq!(sightings.get("Human"), Some(&2));
    }

    #[test]
    fn traffic_only_classes_dropped_when_disabled() {
        assert!(tally(&[3], false).is_none());
        let sightings = tally(&[3], true).expect("non-empty");
        assert_eq!(sightings.get("Car"), Some(&1));
    }

    #[test]
    fn unknown_class_dropped() {
        assert!(tally(&[999], true).is_none());
    }
}
