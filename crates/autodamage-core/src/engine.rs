use serde::{Deserialize, Serialize};

use crate::{CostProfile, DetectionSet, Severity};

/// Damage counts strictly above this are `Severity::High`.
pub const SEVERITY_THRESHOLD: usize = 3;

/// Shown as the vehicle type when nothing was detected.
pub const NO_VEHICLE: &str = "N/A";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Assessment {
    pub vehicle_type: String,
    pub damage_count: usize,
    pub severity: Severity,
    pub estimated_cost: u64,
}

/// Pure assessment of a detection set.
///
/// The vehicle type is taken from the first detection in detector order, not
/// the most confident one.
pub fn assess(detections: &DetectionSet, costs: &CostProfile) -> Assessment {
    let damage_count = detections.len();
    let vehicle_type = detections
        .first()
        .map(|d| d.class_label().to_string())
        .unwrap_or_else(|| NO_VEHICLE.to_string());

    Assessment {
        vehicle_type,
        damage_count,
        severity: severity_for(damage_count),
        estimated_cost: estimate_cost(damage_count, costs),
    }
}

pub fn severity_for(damage_count: usize) -> Severity {
    if damage_count > SEVERITY_THRESHOLD {
        Severity::High
    } else {
        Severity::Low
    }
}

pub fn estimate_cost(damage_count: usize, costs: &CostProfile) -> u64 {
    costs
        .base_cost
        .saturating_add((damage_count as u64).saturating_mul(costs.per_damage))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BoundingBox, Detection, VehicleClass};

    fn set_of(classes: &[VehicleClass]) -> DetectionSet {
        let bbox = BoundingBox::new(0.1, 0.1, 0.9, 0.9).unwrap();
        classes
            .iter()
            .enumerate()
            .map(|(i, c)| Detection::new(*c, 0.9 - i as f32 * 0.1, bbox).unwrap())
            .collect()
    }

    #[test]
    fn empty_set_uses_sentinel_and_base_cost() {
        let a = assess(&DetectionSet::new(), &CostProfile::STANDARD);
        assert_eq!(a.vehicle_type, NO_VEHICLE);
        assert_eq!(a.damage_count, 0);
        assert_eq!(a.severity, Severity::Low);
        assert_eq!(a.estimated_cost, 800);
    }

    #[test]
    fn severity_threshold_is_strict() {
        assert_eq!(severity_for(3), Severity::Low);
        assert_eq!(severity_for(4), Severity::High);
    }

    #[test]
    fn cost_formula_per_profile() {
        let two = set_of(&[VehicleClass::Car, VehicleClass::Car]);
        assert_eq!(assess(&two, &CostProfile::STANDARD).estimated_cost, 1300);
        assert_eq!(assess(&two, &CostProfile::COMPACT).estimated_cost, 900);
    }

    #[test]
    fn vehicle_type_follows_detector_order() {
        // second detection is more confident, first still wins
        let bbox = BoundingBox::new(0.0, 0.0, 0.5, 0.5).unwrap();
        let set: DetectionSet = vec![
            Detection::new(VehicleClass::Bus, 0.41, bbox).unwrap(),
            Detection::new(VehicleClass::Car, 0.99, bbox).unwrap(),
        ]
        .into_iter()
        .collect();
        assert_eq!(assess(&set, &CostProfile::STANDARD).vehicle_type, "bus");
    }

    #[test]
    fn assessment_is_deterministic() {
        let set = set_of(&[VehicleClass::Truck, VehicleClass::Car, VehicleClass::Motorcycle, VehicleClass::Bus, VehicleClass::Car]);
        let a = assess(&set, &CostProfile::COMPACT);
        let b = assess(&set, &CostProfile::COMPACT);
        assert_eq!(a, b);
        assert_eq!(a.damage_count, 5);
        assert_eq!(a.severity, Severity::High);
        assert_eq!(a.estimated_cost, 1500);
    }
}
