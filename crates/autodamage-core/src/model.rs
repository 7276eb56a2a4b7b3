use serde::{Deserialize, Serialize};

/// Object classes the detector is restricted to. Anything else is dropped
/// before it can reach a `DetectionSet`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum VehicleClass {
    Car,
    Motorcycle,
    Bus,
    Truck,
}

impl VehicleClass {
    pub const ALL: [VehicleClass; 4] = [
        VehicleClass::Car,
        VehicleClass::Motorcycle,
        VehicleClass::Bus,
        VehicleClass::Truck,
    ];

    /// COCO class index as used by YOLO-family detectors.
    pub fn coco_id(self) -> u32 {
        match self {
            VehicleClass::Car => 2,
            VehicleClass::Motorcycle => 3,
            VehicleClass::Bus => 5,
            VehicleClass::Truck => 7,
        }
    }

    pub fn from_coco_id(id: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.coco_id() == id)
    }

    pub fn label(self) -> &'static str {
        match self {
            VehicleClass::Car => "car",
            VehicleClass::Motorcycle => "motorcycle",
            VehicleClass::Bus => "bus",
            VehicleClass::Truck => "truck",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.label().eq_ignore_ascii_case(label))
    }
}

impl std::fmt::Display for VehicleClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Severity {
    Low,
    High,
}

/// How a severity tier is worded in reports.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SeverityScale {
    #[default]
    LowHigh,
    MinorMajor,
}

impl SeverityScale {
    pub fn label(self, severity: Severity) -> &'static str {
        match (self, severity) {
            (SeverityScale::LowHigh, Severity::Low) => "Low",
            (SeverityScale::LowHigh, Severity::High) => "High",
            (SeverityScale::MinorMajor, Severity::Low) => "Minor",
            (SeverityScale::MinorMajor, Severity::High) => "Major",
        }
    }
}

/// Repair cost constants: `base + damage_count * per_damage`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CostProfile {
    pub base_cost: u64,
    pub per_damage: u64,
}

impl CostProfile {
    /// Default profile (800 + 250 per damaged area).
    pub const STANDARD: CostProfile = CostProfile { base_cost: 800, per_damage: 250 };
    pub const COMPACT: CostProfile = CostProfile { base_cost: 500, per_damage: 200 };

    pub fn named(name: &str) -> Option<Self> {
        match name {
            "standard" => Some(Self::STANDARD),
            "compact" => Some(Self::COMPACT),
            _ => None,
        }
    }
}

impl Default for CostProfile {
    fn default() -> Self {
        Self::STANDARD
    }
}

/// Integer amount prefixed with a currency symbol, e.g. `€1300`.
pub fn format_cost(amount: u64, currency: &str) -> String {
    format!("{}{}", currency, amount)
}
