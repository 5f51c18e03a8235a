//! Map view model: what the viewer is showing, and what the assistant may
//! ask it to change.
//!
//! One canonical geometry is used everywhere: bounds are a pair of
//! `[lat, lng]` corners, `{"southwest": [..], "northeast": [..]}`.
//! Actions travel as `{"type": "<kind>", "parameters": {..}}`.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;

/// Lowest zoom level the viewer allows.
pub const MIN_ZOOM: f64 = 7.0;
/// Highest zoom level the viewer allows.
pub const MAX_ZOOM: f64 = 19.0;

/// Basemaps offered when the viewer does not send its own list.
pub const DEFAULT_BASEMAPS: &[&str] = &["light", "satellite", "hybrid"];

/// A `[lat, lng]` coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng(pub f64, pub f64);

impl LatLng {
    pub fn lat(&self) -> f64 {
        self.0
    }

    pub fn lng(&self) -> f64 {
        self.1
    }
}

impl std::fmt::Display for LatLng {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.0, self.1)
    }
}

/// A rectangular region given by its southwest and northeast corners.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoBounds {
    pub southwest: LatLng,
    pub northeast: LatLng,
}

impl GeoBounds {
    /// The fixed service region: the Hawaiian Islands.
    pub const HAWAII: GeoBounds = GeoBounds {
        southwest: LatLng(18.0, -162.0),
        northeast: LatLng(23.0, -154.0),
    };

    pub const fn new(southwest: LatLng, northeast: LatLng) -> Self {
        Self {
            southwest,
            northeast,
        }
    }

    /// Corners are finite and ordered (south ≤ north, west ≤ east).
    pub fn is_well_formed(&self) -> bool {
        let coords = [
            self.southwest.0,
            self.southwest.1,
            self.northeast.0,
            self.northeast.1,
        ];
        coords.iter().all(|c| c.is_finite())
            && self.southwest.0 <= self.northeast.0
            && self.southwest.1 <= self.northeast.1
    }

    pub fn contains_point(&self, point: LatLng) -> bool {
        point.0 >= self.southwest.0
            && point.0 <= self.northeast.0
            && point.1 >= self.southwest.1
            && point.1 <= self.northeast.1
    }

    pub fn contains(&self, other: &GeoBounds) -> bool {
        self.contains_point(other.southwest) && self.contains_point(other.northeast)
    }
}

impl std::fmt::Display for GeoBounds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "southwest {} / northeast {}", self.southwest, self.northeast)
    }
}

/// The viewer's current state, sent with every chat request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapState {
    /// Layers currently displayed.
    #[serde(default)]
    pub active_layers: Vec<String>,

    /// Layers the viewer can display.
    #[serde(default)]
    pub available_layers: Vec<String>,

    /// Selected sea-level-rise scenario step, in feet.
    #[serde(default, deserialize_with = "string_or_number")]
    pub foot_increment: String,

    /// Visible region.
    pub bounds: GeoBounds,

    pub zoom_level: f64,

    #[serde(default = "default_basemap")]
    pub basemap_name: String,

    #[serde(default)]
    pub available_basemaps: Vec<String>,
}

fn default_basemap() -> String {
    "light".into()
}

impl MapState {
    /// The viewer's basemaps, or [`DEFAULT_BASEMAPS`] when it sent none.
    pub fn basemap_catalog(&self) -> Vec<&str> {
        if self.available_basemaps.is_empty() {
            DEFAULT_BASEMAPS.to_vec()
        } else {
            self.available_basemaps.iter().map(String::as_str).collect()
        }
    }
}

/// Accept `"3"` or `3` for fields the viewer has sent both ways.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

impl Default for MapState {
    fn default() -> Self {
        Self {
            active_layers: Vec::new(),
            available_layers: Vec::new(),
            foot_increment: String::new(),
            bounds: GeoBounds::HAWAII,
            zoom_level: MIN_ZOOM,
            basemap_name: default_basemap(),
            available_basemaps: Vec::new(),
        }
    }
}

/// The closed catalog of things the assistant may ask the map to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MapActionKind {
    AddLayer,
    RemoveLayer,
    SetBounds,
    ClearLayers,
    SetZoomLevel,
    ChangeBasemap,
    HighlightArea,
}

impl MapActionKind {
    pub const ALL: [MapActionKind; 7] = [
        MapActionKind::AddLayer,
        MapActionKind::RemoveLayer,
        MapActionKind::SetBounds,
        MapActionKind::ClearLayers,
        MapActionKind::SetZoomLevel,
        MapActionKind::ChangeBasemap,
        MapActionKind::HighlightArea,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MapActionKind::AddLayer => "add_layer",
            MapActionKind::RemoveLayer => "remove_layer",
            MapActionKind::SetBounds => "set_bounds",
            MapActionKind::ClearLayers => "clear_layers",
            MapActionKind::SetZoomLevel => "set_zoom_level",
            MapActionKind::ChangeBasemap => "change_basemap",
            MapActionKind::HighlightArea => "highlight_area",
        }
    }

    /// The parameter shape, as shown to the model.
    pub fn parameter_shape(&self) -> &'static str {
        match self {
            MapActionKind::AddLayer => {
                r#"{"layer_name": string, "display_name": string (optional), "reason": string}"#
            }
            MapActionKind::RemoveLayer => r#"{"layer_name": string, "reason": string}"#,
            MapActionKind::SetBounds => {
                r#"{"bounds": {"southwest": [lat, lng], "northeast": [lat, lng]}, "zoom_level": number (optional), "reason": string}"#
            }
            MapActionKind::ClearLayers => r#"{"reason": string}"#,
            MapActionKind::SetZoomLevel => r#"{"zoom_level": number, "reason": string}"#,
            MapActionKind::ChangeBasemap => r#"{"basemap_name": string, "reason": string}"#,
            MapActionKind::HighlightArea => {
                r#"{"bounds": {"southwest": [lat, lng], "northeast": [lat, lng]}, "label": string (optional), "reason": string}"#
            }
        }
    }
}

impl std::fmt::Display for MapActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MapActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MapActionKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown action type: {s}"))
    }
}

/// What a proposed action may refer to: the service region plus the
/// viewer's layer and basemap catalogs.
///
/// An empty layer catalog leaves `layer_name` unchecked.
#[derive(Debug, Clone)]
pub struct ActionScope<'a> {
    pub region: &'a GeoBounds,
    pub layers: &'a [String],
    pub active_layers: &'a [String],
    pub basemaps: Vec<&'a str>,
}

impl<'a> ActionScope<'a> {
    pub fn new(region: &'a GeoBounds, map_state: &'a MapState) -> Self {
        Self {
            region,
            layers: &map_state.available_layers,
            active_layers: &map_state.active_layers,
            basemaps: map_state.basemap_catalog(),
        }
    }

    fn knows_layer(&self, name: &str, include_active: bool) -> bool {
        self.layers.is_empty()
            || self.layers.iter().any(|l| l == name)
            || (include_active && self.active_layers.iter().any(|l| l == name))
    }
}

/// A structured instruction for the map viewer.
///
/// `action_type` is kept as the raw string the model produced; use
/// [`MapAction::kind`] or [`MapAction::validate`] to interpret it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapAction {
    #[serde(rename = "type")]
    pub action_type: String,

    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl MapAction {
    pub fn new(kind: MapActionKind, parameters: Map<String, Value>) -> Self {
        Self {
            action_type: kind.as_str().to_string(),
            parameters,
        }
    }

    pub fn kind(&self) -> Option<MapActionKind> {
        self.action_type.parse().ok()
    }

    /// Check the action against the catalog and its per-type parameter rules.
    /// Returns the reason on rejection.
    pub fn validate(&self, scope: &ActionScope<'_>) -> Result<MapActionKind, String> {
        let kind = self.kind().ok_or_else(|| {
            format!("unknown action type '{}'", self.action_type)
        })?;

        match kind {
            MapActionKind::AddLayer | MapActionKind::RemoveLayer => {
                let name = self.require_string("layer_name")?;
                if !scope.knows_layer(name, kind == MapActionKind::RemoveLayer) {
                    return Err(format!("layer '{name}' is not available"));
                }
            }
            MapActionKind::ChangeBasemap => {
                let name = self.require_string("basemap_name")?;
                if !scope.basemaps.iter().any(|b| *b == name) {
                    return Err(format!("basemap '{name}' is not available"));
                }
            }
            MapActionKind::SetZoomLevel => {
                self.require_zoom()?;
            }
            MapActionKind::SetBounds | MapActionKind::HighlightArea => {
                let bounds = self.require_bounds()?;
                if !scope.region.contains(&bounds) {
                    return Err(format!("bounds {bounds} fall outside the service region"));
                }
                if self.parameters.contains_key("zoom_level") {
                    self.require_zoom()?;
                }
            }
            MapActionKind::ClearLayers => {}
        }

        Ok(kind)
    }

    fn require_string(&self, key: &str) -> Result<&str, String> {
        match self.parameters.get(key).and_then(Value::as_str) {
            Some(s) if !s.trim().is_empty() => Ok(s),
            _ => Err(format!("missing '{key}'")),
        }
    }

    fn require_zoom(&self) -> Result<f64, String> {
        let zoom = self
            .parameters
            .get("zoom_level")
            .and_then(Value::as_f64)
            .ok_or_else(|| "missing numeric 'zoom_level'".to_string())?;
        if !(MIN_ZOOM..=MAX_ZOOM).contains(&zoom) {
            return Err(format!("zoom_level {zoom} outside {MIN_ZOOM}-{MAX_ZOOM}"));
        }
        Ok(zoom)
    }

    fn require_bounds(&self) -> Result<GeoBounds, String> {
        let raw = self
            .parameters
            .get("bounds")
            .ok_or_else(|| "missing 'bounds'".to_string())?;
        let bounds: GeoBounds = serde_json::from_value(raw.clone())
            .map_err(|e| format!("malformed 'bounds': {e}"))?;
        if !bounds.is_well_formed() {
            return Err(format!("bounds {bounds} are not ordered southwest → northeast"));
        }
        Ok(bounds)
    }
}

/// The single structured result of a chat turn.
///
/// `map_actions` is `None` when there are no actions, so callers can tell
/// "no actions" apart from an empty list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    pub response: String,
    pub map_actions: Option<Vec<MapAction>>,
}

impl AgentResponse {
    /// A text-only response.
    pub fn text(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            map_actions: None,
        }
    }

    /// Build a response; an empty action list collapses to `None`.
    pub fn with_actions(response: impl Into<String>, actions: Vec<MapAction>) -> Self {
        Self {
            response: response.into(),
            map_actions: if actions.is_empty() {
                None
            } else {
                Some(actions)
            },
        }
    }

    pub fn actions(&self) -> &[MapAction] {
        self.map_actions.as_deref().unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn action(value: Value) -> MapAction {
        serde_json::from_value(value).unwrap()
    }

    fn validate(action: &MapAction) -> Result<MapActionKind, String> {
        let state = MapState::default();
        action.validate(&ActionScope::new(&GeoBounds::HAWAII, &state))
    }

    #[test]
    fn bounds_use_corner_pairs() {
        let bounds: GeoBounds = serde_json::from_value(json!({
            "southwest": [21.309, -157.9],
            "northeast": [21.65, -157.65]
        }))
        .unwrap();
        assert_eq!(bounds.southwest.lat(), 21.309);
        assert_eq!(bounds.northeast.lng(), -157.65);
        assert!(GeoBounds::HAWAII.contains(&bounds));
    }

    #[test]
    fn map_state_accepts_numeric_foot_increment() {
        let state: MapState = serde_json::from_value(json!({
            "active_layers": ["flooding_passive_gwi_03ft"],
            "foot_increment": 3,
            "bounds": {"southwest": [21.25, -157.9], "northeast": [21.35, -157.7]},
            "zoom_level": 10
        }))
        .unwrap();
        assert_eq!(state.foot_increment, "3");
        assert_eq!(state.basemap_name, "light");
        assert!(state.available_basemaps.is_empty());
    }

    #[test]
    fn map_state_requires_bounds() {
        let result: Result<MapState, _> = serde_json::from_value(json!({"zoom_level": 10}));
        assert!(result.is_err());
    }

    #[test]
    fn validate_add_layer() {
        let ok = action(json!({"type": "add_layer", "parameters": {"layer_name": "CRC:HI_Oahu_GWI_03ft"}}));
        assert_eq!(validate(&ok), Ok(MapActionKind::AddLayer));

        let missing = action(json!({"type": "add_layer", "parameters": {}}));
        assert!(validate(&missing).is_err());
    }

    #[test]
    fn validate_rejects_unknown_type() {
        let unknown = action(json!({"type": "launch_rocket"}));
        let err = validate(&unknown).unwrap_err();
        assert!(err.contains("launch_rocket"));
    }

    #[test]
    fn validate_rejects_bounds_outside_region() {
        let tokyo = action(json!({
            "type": "set_bounds",
            "parameters": {"bounds": {"southwest": [35.5, 139.5], "northeast": [35.8, 139.9]}}
        }));
        assert!(validate(&tokyo).is_err());

        let inverted = action(json!({
            "type": "highlight_area",
            "parameters": {"bounds": {"southwest": [21.65, -157.65], "northeast": [21.3, -157.9]}}
        }));
        assert!(validate(&inverted).is_err());
    }

    #[test]
    fn validate_zoom_range() {
        let too_far = action(json!({"type": "set_zoom_level", "parameters": {"zoom_level": 3}}));
        assert!(validate(&too_far).is_err());

        let fine = action(json!({"type": "set_zoom_level", "parameters": {"zoom_level": 12}}));
        assert!(validate(&fine).is_ok());
    }

    #[test]
    fn validate_checks_layer_and_basemap_catalogs() {
        let state = MapState {
            available_layers: vec!["CRC:HI_Oahu_GWI_03ft".into()],
            active_layers: vec!["CRC:HI_Oahu_PMF_03ft".into()],
            available_basemaps: vec!["light".into(), "dark".into()],
            ..MapState::default()
        };
        let scope = ActionScope::new(&GeoBounds::HAWAII, &state);

        let known = action(json!({"type": "add_layer", "parameters": {"layer_name": "CRC:HI_Oahu_GWI_03ft"}}));
        assert!(known.validate(&scope).is_ok());

        let invented = action(json!({"type": "add_layer", "parameters": {"layer_name": "CRC:made_up"}}));
        assert!(invented.validate(&scope).unwrap_err().contains("CRC:made_up"));

        let remove_active = action(json!({"type": "remove_layer", "parameters": {"layer_name": "CRC:HI_Oahu_PMF_03ft"}}));
        assert!(remove_active.validate(&scope).is_ok());
        let add_active = action(json!({"type": "add_layer", "parameters": {"layer_name": "CRC:HI_Oahu_PMF_03ft"}}));
        assert!(add_active.validate(&scope).is_err());

        let dark = action(json!({"type": "change_basemap", "parameters": {"basemap_name": "dark"}}));
        assert!(dark.validate(&scope).is_ok());
        let satellite = action(json!({"type": "change_basemap", "parameters": {"basemap_name": "satellite"}}));
        assert!(satellite.validate(&scope).is_err());
    }

    #[test]
    fn default_scope_uses_default_basemaps_and_any_layer() {
        let terrain = action(json!({"type": "change_basemap", "parameters": {"basemap_name": "terrain"}}));
        assert!(validate(&terrain).unwrap_err().contains("terrain"));

        let hybrid = action(json!({"type": "change_basemap", "parameters": {"basemap_name": "hybrid"}}));
        assert_eq!(validate(&hybrid), Ok(MapActionKind::ChangeBasemap));

        let any_layer = action(json!({"type": "add_layer", "parameters": {"layer_name": "CRC:anything"}}));
        assert!(validate(&any_layer).is_ok());
    }

    #[test]
    fn empty_action_list_collapses_to_none() {
        let resp = AgentResponse::with_actions("Aloha", vec![]);
        assert!(resp.map_actions.is_none());
        assert!(resp.actions().is_empty());

        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json, json!({"response": "Aloha", "map_actions": null}));
    }
}
