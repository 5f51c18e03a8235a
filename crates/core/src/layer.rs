//! Hazard layer tags.
//!
//! A layer is a named hazard-data overlay the map viewer can display. The
//! tag names match the `relevant_layers` values curated on evidence chunks.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// The hazard overlays the assistant knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HazardLayer {
    PassiveMarineFlooding,
    GroundwaterInundation,
    LowLyingFlooding,
    CompoundFlooding,
    DrainageBackflow,
    FutureErosionHazardZone,
    AnnualHighWaveFlooding,
    EmergentAndShallowGroundwater,
}

/// Broad grouping used to pick prompt examples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LayerCategory {
    Flooding,
    CoastalHazard,
}

impl HazardLayer {
    pub const ALL: [HazardLayer; 8] = [
        HazardLayer::PassiveMarineFlooding,
        HazardLayer::GroundwaterInundation,
        HazardLayer::LowLyingFlooding,
        HazardLayer::CompoundFlooding,
        HazardLayer::DrainageBackflow,
        HazardLayer::FutureErosionHazardZone,
        HazardLayer::AnnualHighWaveFlooding,
        HazardLayer::EmergentAndShallowGroundwater,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HazardLayer::PassiveMarineFlooding => "passive_marine_flooding",
            HazardLayer::GroundwaterInundation => "groundwater_inundation",
            HazardLayer::LowLyingFlooding => "low_lying_flooding",
            HazardLayer::CompoundFlooding => "compound_flooding",
            HazardLayer::DrainageBackflow => "drainage_backflow",
            HazardLayer::FutureErosionHazardZone => "future_erosion_hazard_zone",
            HazardLayer::AnnualHighWaveFlooding => "annual_high_wave_flooding",
            HazardLayer::EmergentAndShallowGroundwater => "emergent_and_shallow_groundwater",
        }
    }

    /// Plain-language definition shown to the model.
    pub fn definition(&self) -> &'static str {
        match self {
            HazardLayer::PassiveMarineFlooding => {
                "Ocean water flooding the land as sea levels rise"
            }
            HazardLayer::GroundwaterInundation => {
                "Flooding from groundwater rising to the surface"
            }
            HazardLayer::LowLyingFlooding => "Low-elevation areas vulnerable to flooding",
            HazardLayer::CompoundFlooding => "Multiple types of flooding happening at once",
            HazardLayer::DrainageBackflow => {
                "Storm drains and sewers backing up during floods"
            }
            HazardLayer::FutureErosionHazardZone => {
                "Areas where beaches and shorelines are eroding"
            }
            HazardLayer::AnnualHighWaveFlooding => "Coastal flooding from large waves",
            HazardLayer::EmergentAndShallowGroundwater => {
                "Groundwater very close to the surface"
            }
        }
    }

    pub fn category(&self) -> LayerCategory {
        match self {
            HazardLayer::FutureErosionHazardZone
            | HazardLayer::AnnualHighWaveFlooding
            | HazardLayer::EmergentAndShallowGroundwater => LayerCategory::CoastalHazard,
            _ => LayerCategory::Flooding,
        }
    }
}

impl std::fmt::Display for HazardLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HazardLayer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HazardLayer::ALL
            .iter()
            .copied()
            .find(|l| l.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown hazard layer: {s}"))
    }
}
