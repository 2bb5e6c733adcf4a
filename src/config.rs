// Copyright (C) 2023, Alex Badics
// This file is part of ar-scene
// Licensed under the MIT license. See LICENSE file in the project root for details.

//! JSON scene configuration. See [`SceneConfig`]
//!
//! Parsing is lenient: only a document that is not JSON at all (or not an
//! object) is an error. Fields of the wrong type are logged and defaulted,
//! markers without a marker string are skipped.

use std::{collections::HashMap, path::Path};

use tinyjson::JsonValue;
use tracing::{info, warn};

use crate::{
    options::{resolve_named_int, MarkerOptions},
    source::ModelSource,
    util::{
        get_array, get_bool, get_f64, get_object, get_str, get_string_list, scalar_to_string,
        JsonObject,
    },
    Error, Result,
};

/// Configuration used when no config file exists: a single Hiro marker with
/// a gizmo on it
pub const DEFAULT_CONFIG: &str = r#"{
    "marker": [
        {
            "marker": "single;Data/hiro.patt;80",
            "name": "hiro",
            "lerping": true,
            "gizmo": true
        }
    ]
}"#;

/// Whole scene
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SceneConfig {
    /// Tracker pattern detection mode, literal or constant name
    pub pattern_detection_mode: Option<String>,
    /// Tracker matrix code type, literal or constant name
    pub matrix_code_type: Option<String>,
    /// Extensions run once the scene is built
    pub extensions: Vec<String>,
    /// Tracked markers
    pub markers: Vec<MarkerConfig>,
}

/// One tracked marker
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerConfig {
    /// Tracker configuration string of the marker
    pub marker: String,
    /// Display name. Defaults to the marker string.
    pub name: Option<String>,
    /// Enable pose smoothing
    pub lerping: bool,
    /// Attach a coordinate axes gizmo
    pub gizmo: bool,
    /// Extensions run after the marker is built
    pub extensions: Vec<String>,
    /// Named offsets
    pub tags: Vec<TagConfig>,
    /// Lights following the marker
    pub lights: Vec<LightConfig>,
    /// Tracker options
    pub options: MarkerOptions,
    /// Models attached to the marker
    pub models: Vec<ModelConfig>,
}

/// A named point in marker space
#[derive(Debug, Clone, PartialEq)]
pub struct TagConfig {
    /// Tag name
    pub name: String,
    /// Offset from the marker origin
    pub x: f32,
    /// Offset from the marker origin
    pub y: f32,
    /// Offset from the marker origin
    pub z: f32,
}

/// A light attached to a marker
#[derive(Debug, Clone, PartialEq)]
pub struct LightConfig {
    /// RGB intensity
    pub color: [f32; 3],
}

/// A model attached to a marker
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    /// Model source descriptor, see [`ModelSource::parse`]
    pub model: Option<String>,
    /// Uniform scale
    pub scale: f32,
    /// Offset from the marker origin
    pub x: f32,
    /// Offset from the marker origin
    pub y: f32,
    /// Offset from the marker origin
    pub z: f32,
    /// Rotation around X in radians, applied first
    pub rx: f32,
    /// Rotation around Y in radians
    pub ry: f32,
    /// Rotation around Z in radians, applied last
    pub rz: f32,
    /// Renderer transparency level
    pub transparency: i32,
    /// Extensions run after the model is loaded
    pub extensions: Vec<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: None,
            scale: 1.0,
            x: 0.0,
            y: 0.0,
            z: 0.0,
            rx: 0.0,
            ry: 0.0,
            rz: 0.0,
            transparency: 20,
            extensions: Vec::new(),
        }
    }
}

impl std::str::FromStr for SceneConfig {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let json: JsonValue = s
            .parse()
            .map_err(|e| Error::Config(format!("JSON parse error: {e}")))?;
        let root = json
            .get::<JsonObject>()
            .ok_or_else(|| Error::Config("top level is not an object".into()))?;
        Ok(Self::from_json(root))
    }
}

impl SceneConfig {
    /// Read and parse a config file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        std::fs::read_to_string(path)?.parse()
    }

    /// The built-in [`DEFAULT_CONFIG`]
    pub fn default_scene() -> Self {
        Self::from_json(
            DEFAULT_CONFIG
                .parse::<JsonValue>()
                .ok()
                .as_ref()
                .and_then(|json| json.get::<JsonObject>())
                .unwrap_or(&JsonObject::new()),
        )
    }

    fn from_json(root: &JsonObject) -> Self {
        let markers = get_array(root, "marker", "scene")
            .iter()
            .enumerate()
            .filter_map(|(index, value)| match value.get::<JsonObject>() {
                Some(obj) => MarkerConfig::from_json(obj, index),
                None => {
                    warn!("marker #{}: not an object, skipped", index);
                    None
                }
            })
            .collect();
        Self {
            pattern_detection_mode: get_str(root, "PatternDetectionMode", "scene").map(Into::into),
            matrix_code_type: get_str(root, "MatrixCodeType", "scene").map(Into::into),
            extensions: get_string_list(root, "extensions", "scene"),
            markers,
        }
    }

    /// Resolved pattern detection mode. Unknown names are logged and ignored.
    pub fn pattern_detection_mode_value(&self) -> Option<i32> {
        Self::resolve_global("PatternDetectionMode", self.pattern_detection_mode.as_deref())
    }

    /// Resolved matrix code type. Unknown names are logged and ignored.
    pub fn matrix_code_type_value(&self) -> Option<i32> {
        Self::resolve_global("MatrixCodeType", self.matrix_code_type.as_deref())
    }

    fn resolve_global(what: &str, value: Option<&str>) -> Option<i32> {
        let value = value?;
        let result = resolve_named_int(value);
        match result {
            Some(_) => info!("Set {} to {}", what, value),
            None => warn!("Can't find '{}' {}", value, what),
        }
        result
    }

    /// Every distinct model source referenced by the scene, for preloading.
    /// Unparsable descriptors are skipped here, they are reported when the scene is built.
    pub fn model_sources(&self) -> Vec<ModelSource> {
        let mut result: Vec<ModelSource> = Vec::new();
        for model in self.markers.iter().flat_map(|m| &m.models) {
            if let Some(source) = model.model.as_deref().and_then(|d| ModelSource::parse(d).ok()) {
                if !result.contains(&source) {
                    result.push(source);
                }
            }
        }
        result
    }

    /// Back to JSON, for logging
    pub fn to_json(&self) -> JsonValue {
        let mut root: JsonObject = HashMap::new();
        if let Some(mode) = &self.pattern_detection_mode {
            root.insert("PatternDetectionMode".into(), mode.clone().into());
        }
        if let Some(code_type) = &self.matrix_code_type {
            root.insert("MatrixCodeType".into(), code_type.clone().into());
        }
        root.insert("extensions".into(), string_list(&self.extensions));
        root.insert(
            "marker".into(),
            JsonValue::Array(self.markers.iter().map(MarkerConfig::to_json).collect()),
        );
        root.into()
    }
}

impl MarkerConfig {
    fn from_json(obj: &JsonObject, index: usize) -> Option<Self> {
        let context = format!("marker #{index}");
        let Some(marker) = get_str(obj, "marker", &context) else {
            warn!("{}: no marker string, skipped", context);
            return None;
        };
        let context = format!("marker '{marker}'");
        let tags = get_array(obj, "tags", &context)
            .iter()
            .filter_map(|v| v.get::<JsonObject>())
            .filter_map(|tag| {
                let Some(name) = get_str(tag, "name", &context) else {
                    warn!("{}: tag without a name, skipped", context);
                    return None;
                };
                Some(TagConfig {
                    name: name.into(),
                    x: get_f64(tag, "x", 0.0, &context) as f32,
                    y: get_f64(tag, "y", 0.0, &context) as f32,
                    z: get_f64(tag, "z", 0.0, &context) as f32,
                })
            })
            .collect();
        let lights = get_array(obj, "lights", &context)
            .iter()
            .filter_map(|v| v.get::<JsonObject>())
            .map(|light| LightConfig {
                color: Self::parse_color(get_array(light, "color", &context), &context),
            })
            .collect();
        let models = get_array(obj, "models", &context)
            .iter()
            .filter_map(|v| v.get::<JsonObject>())
            .map(|model| ModelConfig::from_json(model, &context))
            .collect();

        Some(Self {
            marker: marker.into(),
            name: get_str(obj, "name", &context).map(Into::into),
            lerping: get_bool(obj, "lerping", false, &context),
            gizmo: get_bool(obj, "gizmo", false, &context),
            extensions: get_string_list(obj, "extensions", &context),
            tags,
            lights,
            options: get_object(obj, "options", &context)
                .map(|o| Self::parse_options(o, &context))
                .unwrap_or_default(),
            models,
        })
    }

    fn parse_color(values: &[JsonValue], context: &str) -> [f32; 3] {
        let mut color = [1.0; 3];
        if values.is_empty() {
            return color;
        }
        if values.len() != 3 {
            warn!("{}: light color needs 3 components, using white", context);
            return color;
        }
        for (c, v) in color.iter_mut().zip(values) {
            *c = v.get::<f64>().copied().unwrap_or(1.0) as f32;
        }
        color
    }

    fn parse_options(obj: &JsonObject, context: &str) -> MarkerOptions {
        let mut options = MarkerOptions::default();
        if let Some(ints) = get_object(obj, "int_type", context) {
            for (key, value) in ints {
                match scalar_to_string(value) {
                    Some(value) => options.int_type.push((key.clone(), value)),
                    None => warn!("{}: int option '{}' has no usable value", context, key),
                }
            }
        }
        if let Some(floats) = get_object(obj, "float_type", context) {
            for (key, value) in floats {
                match value.get::<f64>() {
                    Some(value) => options.float_type.push((key.clone(), *value as f32)),
                    None => warn!("{}: float option '{}' is not a number", context, key),
                }
            }
        }
        if let Some(bools) = get_object(obj, "bool_type", context) {
            for (key, value) in bools {
                match value.get::<bool>() {
                    Some(value) => options.bool_type.push((key.clone(), *value)),
                    None => warn!("{}: bool option '{}' is not a boolean", context, key),
                }
            }
        }
        // HashMap order is random, keep application order stable
        options.int_type.sort();
        options.float_type.sort_by(|a, b| a.0.cmp(&b.0));
        options.bool_type.sort();
        options
    }

    /// Name used for display and overlay anchors
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.marker)
    }

    fn to_json(&self) -> JsonValue {
        let mut obj: JsonObject = HashMap::new();
        obj.insert("marker".into(), self.marker.clone().into());
        if let Some(name) = &self.name {
            obj.insert("name".into(), name.clone().into());
        }
        obj.insert("lerping".into(), self.lerping.into());
        obj.insert("gizmo".into(), self.gizmo.into());
        obj.insert("extensions".into(), string_list(&self.extensions));
        obj.insert(
            "tags".into(),
            JsonValue::Array(
                self.tags
                    .iter()
                    .map(|t| {
                        let mut tag: JsonObject = HashMap::new();
                        tag.insert("name".into(), t.name.clone().into());
                        tag.insert("x".into(), (t.x as f64).into());
                        tag.insert("y".into(), (t.y as f64).into());
                        tag.insert("z".into(), (t.z as f64).into());
                        tag.into()
                    })
                    .collect(),
            ),
        );
        obj.insert(
            "lights".into(),
            JsonValue::Array(
                self.lights
                    .iter()
                    .map(|l| {
                        let mut light: JsonObject = HashMap::new();
                        light.insert(
                            "color".into(),
                            JsonValue::Array(l.color.iter().map(|c| (*c as f64).into()).collect()),
                        );
                        light.into()
                    })
                    .collect(),
            ),
        );
        let mut options: JsonObject = HashMap::new();
        options.insert(
            "int_type".into(),
            self.options
                .int_type
                .iter()
                .map(|(k, v)| (k.clone(), JsonValue::from(v.clone())))
                .collect::<JsonObject>()
                .into(),
        );
        options.insert(
            "float_type".into(),
            self.options
                .float_type
                .iter()
                .map(|(k, v)| (k.clone(), JsonValue::from(*v as f64)))
                .collect::<JsonObject>()
                .into(),
        );
        options.insert(
            "bool_type".into(),
            self.options
                .bool_type
                .iter()
                .map(|(k, v)| (k.clone(), JsonValue::from(*v)))
                .collect::<JsonObject>()
                .into(),
        );
        obj.insert("options".into(), options.into());
        obj.insert(
            "models".into(),
            JsonValue::Array(self.models.iter().map(ModelConfig::to_json).collect()),
        );
        obj.into()
    }
}

impl ModelConfig {
    fn from_json(obj: &JsonObject, context: &str) -> Self {
        let defaults = ModelConfig::default();
        let get = |key: &str, default: f32| get_f64(obj, key, default as f64, context) as f32;
        Self {
            model: get_str(obj, "model", context).map(Into::into),
            scale: get("scale", defaults.scale),
            x: get("x", defaults.x),
            y: get("y", defaults.y),
            z: get("z", defaults.z),
            rx: get("rx", defaults.rx),
            ry: get("ry", defaults.ry),
            rz: get("rz", defaults.rz),
            transparency: get_f64(obj, "transparency", defaults.transparency as f64, context)
                as i32,
            extensions: get_string_list(obj, "extensions", context),
        }
    }

    fn to_json(&self) -> JsonValue {
        let mut obj: JsonObject = HashMap::new();
        if let Some(model) = &self.model {
            obj.insert("model".into(), model.clone().into());
        }
        for (key, value) in [
            ("scale", self.scale),
            ("x", self.x),
            ("y", self.y),
            ("z", self.z),
            ("rx", self.rx),
            ("ry", self.ry),
            ("rz", self.rz),
        ] {
            obj.insert(key.into(), (value as f64).into());
        }
        obj.insert("transparency".into(), (self.transparency as f64).into());
        obj.insert("extensions".into(), string_list(&self.extensions));
        obj.into()
    }
}

fn string_list(values: &[String]) -> JsonValue {
    JsonValue::Array(values.iter().map(|s| s.clone().into()).collect())
}
