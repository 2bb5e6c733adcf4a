// Copyright (C) 2023, Alex Badics
// This file is part of ar-scene
// Licensed under the MIT license. See LICENSE file in the project root for details.
#![warn(missing_docs)]
//! ar-scene is the portable core of a marker based AR engine.
//! It takes raw marker poses from a tracker, stabilizes them, and keeps an
//! owned scene graph and 2D overlay anchors in sync with them.
//!
//! The native tracker is reached through the [`MarkerTracker`] trait, the
//! renderer reads the [`scene_graph::SceneGraph`], and the UI layer drains
//! [`scene::OverlayUpdate`]s from a channel.
//!
//! Example usage (on the render thread):
//! ```ignore
//! let cache = Arc::new(ModelCache::new());
//! let loader = ConfigLoader::start("arapp.json", SourceResolver::default(), cache.clone());
//! while !loader.is_finished() { /* show a splash screen */ }
//! let config = loader.wait()?;
//! let mut scene = Scene::build(&config, Box::new(tracker), &cache, &SourceResolver::default(), &ExtensionRegistry::new())?;
//! loop {
//!     scene.update_frame();
//!     renderer.draw(scene.graph());
//! }
//! ```
//!
//! Everything in the per-frame path is infallible: tracking anomalies are
//! logged and absorbed, never returned.

use std::fmt::Display;

pub mod cache;
pub mod config;
pub mod entity;
pub mod extension;
pub mod loader;
pub mod mesh;
pub mod options;
pub mod pose;
pub mod projector;
#[cfg(feature = "replay")]
pub mod replay;
pub mod scene;
pub mod scene_graph;
pub mod smoother;
pub mod source;
pub mod sync;
mod util;

pub use pose::Pose;

/// Possible errors resulting from `ar-scene` API calls
#[derive(Debug)]
pub enum Error {
    /// An I/O error happened while reading a config, a model or a recording
    IoError(std::io::Error),
    /// The scene configuration could not be parsed at all.
    /// Individual bad fields are not errors, they fall back to defaults.
    Config(String),
    /// A model file could not be parsed
    Mesh(String),
    /// The tracker refused to register a marker
    MarkerRegistration(String),
    /// The background configuration loader has not finished yet
    NotReady,
    /// Other fatal error, usually a problem with the library itself
    Other(&'static str),
}

/// Shorthand result type for `ar-scene` calls
pub type Result<T> = std::result::Result<T, Error>;

/// Common interface of a marker tracker, the thing that finds printed
/// markers in camera frames and estimates their pose.
///
/// Handles are the tracker's own integer marker IDs. Transformations are
/// column-major OpenGL style 4x4 matrices, in camera space.
pub trait MarkerTracker: Send {
    /// Register a marker from its configuration string
    /// (e.g. `single;Data/hiro.patt;80`) and return its handle.
    fn add_marker(&mut self, config: &str) -> Result<i32>;

    /// Advance to the next camera frame. Trackers driven by their own
    /// camera callback can keep the default no-op.
    fn next_frame(&mut self) {}

    /// Whether the marker was detected in the current frame
    fn query_marker_visible(&mut self, handle: i32) -> bool;

    /// Marker to camera transformation in the current frame, if any
    fn query_marker_transformation(&mut self, handle: i32) -> Option<[f32; 16]>;

    /// Camera projection matrix (column-major)
    fn projection_matrix(&self) -> [f32; 16];

    /// Set an integer option of a single marker
    fn set_marker_option_int(&mut self, _handle: i32, _option: i32, _value: i32) -> Result<()> {
        Err(Error::Other("Marker option not supported"))
    }

    /// Set a float option of a single marker
    fn set_marker_option_float(&mut self, _handle: i32, _option: i32, _value: f32) -> Result<()> {
        Err(Error::Other("Marker option not supported"))
    }

    /// Set a boolean option of a single marker
    fn set_marker_option_bool(&mut self, _handle: i32, _option: i32, _value: bool) -> Result<()> {
        Err(Error::Other("Marker option not supported"))
    }

    /// Set the global pattern detection mode
    fn set_pattern_detection_mode(&mut self, _mode: i32) -> Result<()> {
        Err(Error::Other("Pattern detection mode not supported"))
    }

    /// Set the global matrix code type
    fn set_matrix_code_type(&mut self, _code_type: i32) -> Result<()> {
        Err(Error::Other("Matrix code type not supported"))
    }

    /// Name of the tracker backend
    fn name(&self) -> &'static str;
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::IoError(e)
    }
}

impl From<&'static str> for Error {
    fn from(e: &'static str) -> Self {
        Error::Other(e)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Error::IoError(e) => return e.fmt(f),
            Error::Config(s) => return write!(f, "Invalid scene config: {s}"),
            Error::Mesh(s) => return write!(f, "Invalid model: {s}"),
            Error::MarkerRegistration(s) => return write!(f, "Could not register marker {s}"),
            Error::NotReady => "Configuration is still loading",
            Error::Other(s) => s,
        })
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(e) => Some(e),
            _ => None,
        }
    }
}
