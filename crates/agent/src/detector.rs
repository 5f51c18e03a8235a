//! Keyword-based hazard layer detection.
//!
//! Matching is a case-insensitive substring test of each keyword against
//! the query. The detected set gates whether evidence retrieval and action
//! selection happen at all.

use std::collections::BTreeSet;
use tidemark_core::HazardLayer;

/// The built-in keyword table, one row per layer.
///
/// Keyword order only affects how fast a row short-circuits.
pub const LAYER_KEYWORDS: &[(HazardLayer, &[&str])] = &[
    (
        HazardLayer::PassiveMarineFlooding,
        &[
            "marine inundation",
            "coastal flooding",
            "flooded area",
            "flood zone",
            "bathtub model",
            "passive flooding",
            "flood depth",
            "ocean flooding",
            "sea water inundation",
        ],
    ),
    (
        HazardLayer::GroundwaterInundation,
        &[
            "groundwater",
            "water table",
            "subsurface flooding",
            "groundwater emergence",
            "aquifer",
            "groundwater flooding",
            "water table rise",
            "underground water",
            // The viewer's foot-increment layers are the passive GWI family.
            "feet of flooding",
            "foot of flooding",
            "ft of flooding",
            "foot flooding",
            "feet flooding",
            "ft flooding",
        ],
    ),
    (
        HazardLayer::LowLyingFlooding,
        &[
            "low-lying",
            "low elevation",
            "critical elevation",
            "elevation threshold",
            "below elevation",
            "low areas",
            "low lying areas",
        ],
    ),
    (
        HazardLayer::CompoundFlooding,
        &[
            "compound flooding",
            "multiple flood",
            "combined flooding",
            "concurrent flooding",
            "storm surge and rain",
            "multiple mechanisms",
        ],
    ),
    (
        HazardLayer::DrainageBackflow,
        &[
            "storm drain",
            "drainage",
            "sewer",
            "backflow",
            "stormwater",
            "drainage system",
            "sewer flooding",
            "drain capacity",
        ],
    ),
    (
        HazardLayer::FutureErosionHazardZone,
        &[
            "erosion",
            "shoreline retreat",
            "beach loss",
            "coastal erosion",
            "shoreline change",
            "erosion rate",
            "beach erosion",
            "hazard zone",
        ],
    ),
    (
        HazardLayer::AnnualHighWaveFlooding,
        &[
            "wave",
            "wave runup",
            "wave-driven",
            "overwash",
            "wave setup",
            "high wave",
            "extreme wave",
            "wave impact",
            "wave flooding",
        ],
    ),
    (
        HazardLayer::EmergentAndShallowGroundwater,
        &[
            "shallow groundwater",
            "emergent groundwater",
            "groundwater depth",
            "groundwater level",
            "subsurface water",
            "water table depth",
        ],
    ),
];

/// Maps free text to the hazard layers it talks about.
#[derive(Debug, Clone)]
pub struct LayerDetector {
    table: Vec<(HazardLayer, Vec<String>)>,
}

impl LayerDetector {
    /// Build a detector from a custom table. Keywords are lowercased once here.
    pub fn new<I, K, S>(table: I) -> Self
    where
        I: IntoIterator<Item = (HazardLayer, K)>,
        K: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let table = table
            .into_iter()
            .map(|(layer, keywords)| {
                let keywords = keywords
                    .into_iter()
                    .map(|k| k.as_ref().to_lowercase())
                    .filter(|k| !k.is_empty())
                    .collect();
                (layer, keywords)
            })
            .collect();
        Self { table }
    }

    /// Every layer with at least one keyword contained in `query`.
    pub fn detect(&self, query: &str) -> BTreeSet<HazardLayer> {
        let query = query.to_lowercase();
        self.table
            .iter()
            .filter(|(_, keywords)| keywords.iter().any(|k| query.contains(k.as_str())))
            .map(|(layer, _)| *layer)
            .collect()
    }
}

impl Default for LayerDetector {
    fn default() -> Self {
        Self::new(LAYER_KEYWORDS.iter().map(|(layer, kws)| (*layer, kws.iter().copied())))
    }
}
