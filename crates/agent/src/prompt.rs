//! Prompt construction for the two generation stages.
//!
//! The synthesis prompt asks for a plain-language answer grounded in the
//! retrieved evidence. The action prompt asks for a JSON object selecting
//! map changes. Both render from the same inputs and are pure functions of
//! them, so a query always produces the same prompt text.

use std::collections::BTreeSet;
use std::fmt::Write;
use tidemark_core::evidence::EvidenceChunk;
use tidemark_core::layer::{HazardLayer, LayerCategory};
use tidemark_core::map::{GeoBounds, LatLng, MAX_ZOOM, MIN_ZOOM, MapActionKind, MapState};
use tidemark_core::message::Message;

/// A named region with canonical bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KnownLocation {
    pub name: &'static str,
    pub bounds: GeoBounds,
}

/// Oahu regions the model can target without guessing coordinates.
pub const KNOWN_LOCATIONS: &[KnownLocation] = &[
    KnownLocation {
        name: "Waikiki",
        bounds: GeoBounds::new(LatLng(21.2570, -157.8350), LatLng(21.2830, -157.8050)),
    },
    KnownLocation {
        name: "Koolaupoko",
        bounds: GeoBounds::new(LatLng(21.3090, -157.9000), LatLng(21.6500, -157.6500)),
    },
    KnownLocation {
        name: "Honolulu",
        bounds: GeoBounds::new(LatLng(21.2600, -157.9500), LatLng(21.3600, -157.7700)),
    },
];

const SEPARATOR: &str =
    "--------------------------------------------------------------------------------";

/// Builds the synthesis and action-selection prompts.
#[derive(Debug, Clone)]
pub struct PromptComposer {
    history_window: usize,
    max_actions: usize,
    region: GeoBounds,
}

impl Default for PromptComposer {
    fn default() -> Self {
        Self::new(20, 4, GeoBounds::HAWAII)
    }
}

impl PromptComposer {
    pub fn new(history_window: usize, max_actions: usize, region: GeoBounds) -> Self {
        Self {
            history_window,
            max_actions,
            region,
        }
    }

    pub fn region(&self) -> &GeoBounds {
        &self.region
    }

    /// The answer-synthesis prompt.
    pub fn synthesis_prompt(
        &self,
        query: &str,
        history: &[Message],
        map_state: &MapState,
        evidence: &[EvidenceChunk],
    ) -> String {
        let mut p = String::new();

        p.push_str(
            "You are a helpful climate assistant for Hawaii. You explain sea level rise, \
             flooding and coastal hazards to residents, planners and students, using the \
             scientific literature retrieved below.\n\n",
        );

        p.push_str("=== RETRIEVED SCIENTIFIC LITERATURE ===\n");
        if evidence.is_empty() {
            p.push_str("No sources were retrieved for this question.\n");
        }
        for (i, chunk) in evidence.iter().enumerate() {
            render_source(&mut p, i + 1, chunk);
        }
        p.push('\n');

        p.push_str("=== CURRENT MAP STATE ===\n");
        render_map_summary(&mut p, map_state);
        p.push('\n');

        p.push_str("=== LAYER DEFINITIONS ===\n");
        render_layer_definitions(&mut p);
        p.push('\n');

        p.push_str("=== CONVERSATION CONTEXT ===\n");
        self.render_history(&mut p, history);
        p.push('\n');

        p.push_str("=== YOUR ROLE ===\n");
        let _ = writeln!(p, "Answer the user's question: \"{query}\"\n");

        p.push_str(
            "=== HOW TO RESPOND ===\n\
             Tone: plain language a resident can follow, warm and direct. Define any \
             technical term the first time you use it.\n\
             Structure:\n\
             1. Give the direct answer first.\n\
             2. Quote specific numbers from the sources (feet of sea level rise, years, \
             areas, percentages).\n\
             3. Name the locations the numbers apply to.\n\
             4. State the uncertainty: say which findings are HIGH confidence and which \
             are less certain.\n\
             Include: concrete figures, place names, what the map layers show.\n\
             Avoid: inventing numbers, citing sources not listed above, long preambles.\n\
             If the sources do not answer the question, say so plainly and describe what \
             the map layers can still show.\n\n",
        );

        p.push_str(
            "Example answer: \"With 3 feet of sea level rise, much of Waikiki's low-lying \
             streets would see groundwater reach the surface, especially around the Ala Wai \
             Canal. The sources rate this finding HIGH confidence.\"\n\n",
        );

        p.push_str("Begin your response:\n");
        p
    }

    /// The action-selection prompt. `layers` are the layers detected in the query.
    pub fn action_prompt(
        &self,
        query: &str,
        history: &[Message],
        map_state: &MapState,
        evidence: &[EvidenceChunk],
        layers: &BTreeSet<HazardLayer>,
    ) -> String {
        let mut p = String::new();

        p.push_str(
            "You control a climate hazard map viewer for Hawaii. Decide which map changes \
             best illustrate the answer to the user's request.\n\n",
        );

        p.push_str("=== USER REQUEST ===\n");
        let _ = writeln!(p, "{query}\n");

        p.push_str("=== DETECTED TOPICS ===\n");
        for layer in layers {
            let _ = writeln!(p, "- {}: {}", layer.as_str(), layer.definition());
        }
        p.push('\n');

        p.push_str("=== CURRENT MAP STATE ===\n");
        render_map_state(&mut p, map_state);
        p.push('\n');

        if !evidence.is_empty() {
            p.push_str("=== EVIDENCE LOCATIONS ===\n");
            for chunk in evidence {
                let places = if chunk.location_tags.is_empty() {
                    "unspecified".to_string()
                } else {
                    chunk.location_tags.join(", ")
                };
                let _ = writeln!(p, "- [{}] {} ({})", chunk.id, places, chunk.confidence);
            }
            p.push('\n');
        }

        p.push_str("=== CONVERSATION CONTEXT ===\n");
        self.render_history(&mut p, history);
        p.push('\n');

        p.push_str(
            "=== OUTPUT SCHEMA ===\n\
             {\"response\": string, \"map_actions\": [{\"type\": string, \"parameters\": object}]}\n\n",
        );

        p.push_str("=== ALLOWED ACTIONS ===\n");
        for kind in MapActionKind::ALL {
            let _ = writeln!(p, "- {}: {}", kind.as_str(), kind.parameter_shape());
        }
        p.push('\n');

        p.push_str("=== KNOWN LOCATIONS ===\n");
        for location in KNOWN_LOCATIONS {
            let _ = writeln!(p, "- {}: {}", location.name, bounds_json(&location.bounds));
        }
        p.push('\n');

        p.push_str("=== RULES ===\n");
        let _ = writeln!(
            p,
            "- Every coordinate must fall inside the service region {}.",
            bounds_json(&self.region)
        );
        p.push_str("- Bounds are [latitude, longitude] pairs, southwest corner first.\n");
        let _ = writeln!(p, "- zoom_level must be between {MIN_ZOOM} and {MAX_ZOOM}.");
        let _ = writeln!(
            p,
            "- basemap_name must be one of: {}.",
            map_state.basemap_catalog().join(", ")
        );
        if !map_state.available_layers.is_empty() {
            p.push_str("- layer_name must be one of the available layers listed above.\n");
        }
        p.push_str(
            "- When the user asks for a sea level rise height without a number, use 3 feet.\n",
        );
        let _ = writeln!(p, "- Return at most {} actions.", self.max_actions);
        p.push_str("- Use an empty map_actions list when no map change helps.\n\n");

        p.push_str("=== EXAMPLES ===\n");
        let categories: BTreeSet<LayerCategory> = layers.iter().map(|l| l.category()).collect();
        for category in categories {
            p.push_str(example_for(category));
            p.push('\n');
        }
        p.push('\n');

        p.push_str(
            "Return ONLY the JSON object. No markdown fences, no text before or after it.\n",
        );
        p
    }

    fn render_history(&self, p: &mut String, history: &[Message]) {
        let start = history.len().saturating_sub(self.history_window);
        let recent = &history[start..];
        if recent.is_empty() {
            p.push_str("(new conversation)\n");
            return;
        }
        for message in recent {
            let _ = writeln!(p, "{}: {}", message.role.as_str(), message.content);
        }
    }
}

fn render_source(p: &mut String, n: usize, chunk: &EvidenceChunk) {
    let _ = writeln!(p, "=== SOURCE {n} ===");
    let _ = writeln!(
        p,
        "Document: {}",
        chunk.filename.as_deref().unwrap_or(chunk.id.as_str())
    );
    let _ = writeln!(p, "Confidence: {}", chunk.confidence);
    if !chunk.layer_tags.is_empty() {
        let tags: Vec<&str> = chunk.layer_tags.iter().map(|l| l.as_str()).collect();
        let _ = writeln!(p, "Relevant Layers: {}", tags.join(", "));
    }
    if !chunk.location_tags.is_empty() {
        let _ = writeln!(p, "Locations: {}", chunk.location_tags.join(", "));
    }
    if let Some(slr) = &chunk.slr_projections {
        let _ = writeln!(p, "SLR Projections: {slr}");
    }
    if !chunk.measurement_tags.is_empty() {
        let _ = writeln!(p, "Measurements: {}", chunk.measurement_tags.join(", "));
    }
    if !chunk.timeframe_tags.is_empty() {
        let _ = writeln!(p, "Timeframes: {}", chunk.timeframe_tags.join(", "));
    }
    if let Some(findings) = &chunk.key_findings {
        let _ = writeln!(p, "Key Findings: {findings}");
    }
    let _ = writeln!(p, "Text:\n{}", chunk.text.trim());
    let _ = writeln!(p, "{SEPARATOR}");
}

fn render_map_summary(p: &mut String, map_state: &MapState) {
    let _ = writeln!(p, "Basemap: {}", map_state.basemap_name);
    if map_state.active_layers.is_empty() {
        p.push_str("Active layers: none\n");
    } else {
        let _ = writeln!(p, "Active layers: {}", map_state.active_layers.join(", "));
    }
    if !map_state.foot_increment.is_empty() {
        let _ = writeln!(p, "Sea level rise scenario: {} ft", map_state.foot_increment);
    }
}

fn render_map_state(p: &mut String, map_state: &MapState) {
    render_map_summary(p, map_state);
    let _ = writeln!(p, "Bounds: {}", bounds_json(&map_state.bounds));
    let _ = writeln!(p, "Zoom level: {}", map_state.zoom_level);
    if !map_state.available_layers.is_empty() {
        let _ = writeln!(p, "Available layers: {}", map_state.available_layers.join(", "));
    }
    let _ = writeln!(p, "Available basemaps: {}", map_state.basemap_catalog().join(", "));
}

fn render_layer_definitions(p: &mut String) {
    for (title, category) in [
        ("FLOODING TYPES", LayerCategory::Flooding),
        ("COASTAL HAZARDS", LayerCategory::CoastalHazard),
    ] {
        let _ = writeln!(p, "{title}:");
        for layer in HazardLayer::ALL.iter().filter(|l| l.category() == category) {
            let _ = writeln!(p, "- {}: {}", layer.as_str(), layer.definition());
        }
    }
}

fn bounds_json(bounds: &GeoBounds) -> String {
    serde_json::to_string(bounds).unwrap_or_else(|_| bounds.to_string())
}

fn example_for(category: LayerCategory) -> &'static str {
    match category {
        LayerCategory::Flooding => {
            r#"User: "show me 3 feet of flooding in Koolaupoko"
{"response": "Showing groundwater inundation with 3 feet of sea level rise across Koolaupoko.", "map_actions": [{"type": "add_layer", "parameters": {"layer_name": "CRC:HI_State_80prob_03ft_GWI", "display_name": "Groundwater inundation, 3 ft", "reason": "3 ft scenario requested"}}, {"type": "set_bounds", "parameters": {"bounds": {"southwest": [21.309, -157.9], "northeast": [21.65, -157.65]}, "zoom_level": 12, "reason": "Frame Koolaupoko"}}]}"#
        }
        LayerCategory::CoastalHazard => {
            r#"User: "where is erosion a risk in Waikiki?"
{"response": "Highlighting Waikiki, where the future erosion hazard zone reaches the shoreline.", "map_actions": [{"type": "set_bounds", "parameters": {"bounds": {"southwest": [21.257, -157.835], "northeast": [21.283, -157.805]}, "zoom_level": 15, "reason": "Frame Waikiki"}}, {"type": "change_basemap", "parameters": {"basemap_name": "satellite", "reason": "Shoreline detail"}}, {"type": "highlight_area", "parameters": {"bounds": {"southwest": [21.27, -157.83], "northeast": [21.28, -157.82]}, "label": "Erosion hazard", "reason": "Most exposed beach segment"}}]}"#
        }
    }
}
