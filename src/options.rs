// Copyright (C) 2023, Alex Badics
// This file is part of ar-scene
// Licensed under the MIT license. See LICENSE file in the project root for details.

//! Tracker options, given either as literal integers or by the tracker's constant names

use tracing::{info, warn};

use crate::MarkerTracker;

/// Named constants understood by ARToolKit style trackers
const NAMED_CONSTANTS: &[(&str, i32)] = &[
    // Per-marker options
    ("ARW_MARKER_OPTION_FILTERED", 1),
    ("ARW_MARKER_OPTION_FILTER_SAMPLE_RATE", 2),
    ("ARW_MARKER_OPTION_FILTER_CUTOFF_FREQ", 3),
    ("ARW_MARKER_OPTION_SQUARE_USE_CONT_POSE_ESTIMATION", 4),
    ("ARW_MARKER_OPTION_SQUARE_CONFIDENCE", 5),
    ("ARW_MARKER_OPTION_SQUARE_CONFIDENCE_CUTOFF", 6),
    ("ARW_MARKER_OPTION_NFT_SCALE", 7),
    ("ARW_MARKER_OPTION_MULTI_MIN_SUBMARKERS", 8),
    ("ARW_MARKER_OPTION_MULTI_MIN_CONF_MATRIX", 9),
    ("ARW_MARKER_OPTION_MULTI_MIN_CONF_PATTERN", 10),
    // Pattern detection modes
    ("AR_TEMPLATE_MATCHING_COLOR", 0),
    ("AR_TEMPLATE_MATCHING_MONO", 1),
    ("AR_MATRIX_CODE_DETECTION", 2),
    ("AR_TEMPLATE_MATCHING_COLOR_AND_MATRIX", 3),
    ("AR_TEMPLATE_MATCHING_MONO_AND_MATRIX", 4),
    // Matrix code types
    ("AR_MATRIX_CODE_3x3", 0x03),
    ("AR_MATRIX_CODE_3x3_PARITY65", 0x103),
    ("AR_MATRIX_CODE_3x3_HAMMING63", 0x203),
    ("AR_MATRIX_CODE_4x4", 0x04),
    ("AR_MATRIX_CODE_4x4_BCH_13_9_3", 0x304),
    ("AR_MATRIX_CODE_4x4_BCH_13_5_5", 0x404),
    ("AR_MATRIX_CODE_5x5", 0x05),
    ("AR_MATRIX_CODE_6x6", 0x06),
    ("AR_MATRIX_CODE_GLOBAL_ID", 0xb0e),
];

/// Resolve an option key or value: a literal integer, or one of the tracker's
/// constant names. `None` if it is neither.
pub fn resolve_named_int(value: &str) -> Option<i32> {
    let value = value.trim();
    value.parse().ok().or_else(|| {
        NAMED_CONSTANTS
            .iter()
            .find(|(name, _)| *name == value)
            .map(|(_, v)| *v)
    })
}

/// Per-marker tracker options, as written in the scene config.
/// Keys (and integer values) are kept unresolved until they are applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarkerOptions {
    /// Integer options. Both the key and the value may be a constant name.
    pub int_type: Vec<(String, String)>,
    /// Float options
    pub float_type: Vec<(String, f32)>,
    /// Boolean options
    pub bool_type: Vec<(String, bool)>,
}

impl MarkerOptions {
    /// `true` if no option is set
    pub fn is_empty(&self) -> bool {
        self.int_type.is_empty() && self.float_type.is_empty() && self.bool_type.is_empty()
    }

    /// Push every option to the tracker. Unresolvable names and options the
    /// tracker refuses are logged and skipped. Returns the number of options applied.
    pub fn apply(&self, tracker: &mut dyn MarkerTracker, handle: i32) -> usize {
        let mut applied = 0;
        for (key, value) in &self.int_type {
            let (Some(option), Some(int_value)) = (resolve_named_int(key), resolve_named_int(value))
            else {
                warn!("Can't resolve int option of marker {}: '{}' -> '{}'", handle, key, value);
                continue;
            };
            match tracker.set_marker_option_int(handle, option, int_value) {
                Ok(()) => {
                    info!("Did set marker int option of {}: '{}' -> '{}'", handle, key, value);
                    applied += 1;
                }
                Err(e) => warn!("Can't apply int option '{}' to marker {}: {}", key, handle, e),
            }
        }
        for (key, value) in &self.float_type {
            let Some(option) = resolve_named_int(key) else {
                warn!("Can't resolve float option of marker {}: '{}'", handle, key);
                continue;
            };
            match tracker.set_marker_option_float(handle, option, *value) {
                Ok(()) => {
                    info!("Did set marker float option of {}: '{}' -> '{}'", handle, key, value);
                    applied += 1;
                }
                Err(e) => warn!("Can't apply float option '{}' to marker {}: {}", key, handle, e),
            }
        }
        for (key, value) in &self.bool_type {
            let Some(option) = resolve_named_int(key) else {
                warn!("Can't resolve bool option of marker {}: '{}'", handle, key);
                continue;
            };
            match tracker.set_marker_option_bool(handle, option, *value) {
                Ok(()) => {
                    info!("Did set marker bool option of {}: '{}' -> '{}'", handle, key, value);
                    applied += 1;
                }
                Err(e) => warn!("Can't apply bool option '{}' to marker {}: {}", key, handle, e),
            }
        }
        applied
    }
}
