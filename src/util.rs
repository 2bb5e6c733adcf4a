// Copyright (C) 2023, Alex Badics
// This file is part of ar-scene
// Licensed under the MIT license. See LICENSE file in the project root for details.

//! Lenient accessors for `tinyjson` objects. A field of the wrong type is
//! logged and treated as missing.

use std::collections::HashMap;

use tinyjson::JsonValue;
use tracing::warn;

pub type JsonObject = HashMap<String, JsonValue>;

pub fn get_object<'a>(obj: &'a JsonObject, key: &str, context: &str) -> Option<&'a JsonObject> {
    let value = obj.get(key)?;
    let result = value.get::<JsonObject>();
    if result.is_none() && !is_null(value) {
        warn!("{}: '{}' is not an object, ignored", context, key);
    }
    result
}

pub fn get_str<'a>(obj: &'a JsonObject, key: &str, context: &str) -> Option<&'a str> {
    let value = obj.get(key)?;
    let result = value.get::<String>().map(String::as_str);
    if result.is_none() && !is_null(value) {
        warn!("{}: '{}' is not a string, ignored", context, key);
    }
    result
}

pub fn get_f64(obj: &JsonObject, key: &str, default: f64, context: &str) -> f64 {
    match obj.get(key) {
        None => default,
        Some(value) => value.get::<f64>().copied().unwrap_or_else(|| {
            warn!("{}: '{}' is not a number, using {}", context, key, default);
            default
        }),
    }
}

pub fn get_bool(obj: &JsonObject, key: &str, default: bool, context: &str) -> bool {
    match obj.get(key) {
        None => default,
        Some(value) => value.get::<bool>().copied().unwrap_or_else(|| {
            warn!("{}: '{}' is not a boolean, using {}", context, key, default);
            default
        }),
    }
}

pub fn get_array<'a>(obj: &'a JsonObject, key: &str, context: &str) -> &'a [JsonValue] {
    match obj.get(key) {
        None => &[],
        Some(value) => match value.get::<Vec<JsonValue>>() {
            Some(array) => array,
            None => {
                if !is_null(value) {
                    warn!("{}: '{}' is not an array, ignored", context, key);
                }
                &[]
            }
        },
    }
}

pub fn get_string_list(obj: &JsonObject, key: &str, context: &str) -> Vec<String> {
    get_array(obj, key, context)
        .iter()
        .filter_map(|v| {
            let s = v.get::<String>().cloned();
            if s.is_none() {
                warn!("{}: non-string entry in '{}' ignored", context, key);
            }
            s
        })
        .collect()
}

/// Accepts both `"42"`/`"NAME"` and `42`
pub fn scalar_to_string(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) if n.fract() == 0.0 => Some(format!("{}", *n as i64)),
        _ => None,
    }
}

fn is_null(value: &JsonValue) -> bool {
    value.get::<()>().is_some()
}
