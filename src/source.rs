// Copyright (C) 2023, Alex Badics
// This file is part of ar-scene
// Licensed under the MIT license. See LICENSE file in the project root for details.

//! Where models come from. See [`ModelSource`] and [`SourceResolver`]

use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use tracing::debug;

use crate::{mesh::Mesh, Error, Result};

/// Parsed model descriptor, like `asset:models/teapot.obj`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ModelSource {
    /// File bundled with the application, relative to the asset root
    Asset(String),
    /// File in user storage, relative to the storage root
    Storage(String),
    /// Built-in shape: `gizmo` or `cube`
    Builtin(String),
}

impl ModelSource {
    /// Parse a descriptor. Without a `kind:` prefix, assets are assumed.
    pub fn parse(descriptor: &str) -> Result<Self> {
        let descriptor = descriptor.trim();
        let (kind, path) = descriptor.split_once(':').unwrap_or(("asset", descriptor));
        if path.is_empty() {
            return Err(Error::Config(format!("empty model path in '{descriptor}'")));
        }
        match kind {
            "asset" => Ok(ModelSource::Asset(path.into())),
            "storage" => Ok(ModelSource::Storage(path.into())),
            "builtin" => Ok(ModelSource::Builtin(path.into())),
            _ => Err(Error::Config(format!("unknown model source kind '{kind}'"))),
        }
    }

    /// Canonical descriptor, used as the cache key
    pub fn key(&self) -> String {
        match self {
            ModelSource::Asset(p) => format!("asset:{p}"),
            ModelSource::Storage(p) => format!("storage:{p}"),
            ModelSource::Builtin(p) => format!("builtin:{p}"),
        }
    }
}

/// Turns [`ModelSource`]s into meshes
#[derive(Debug, Clone)]
pub struct SourceResolver {
    /// Directory of bundled assets
    pub asset_root: PathBuf,
    /// Directory of user storage
    pub storage_root: PathBuf,
}

impl Default for SourceResolver {
    fn default() -> Self {
        Self {
            asset_root: PathBuf::from("assets"),
            storage_root: PathBuf::from("."),
        }
    }
}

impl SourceResolver {
    /// Resolver with explicit roots
    pub fn new(asset_root: impl AsRef<Path>, storage_root: impl AsRef<Path>) -> Self {
        Self {
            asset_root: asset_root.as_ref().into(),
            storage_root: storage_root.as_ref().into(),
        }
    }

    /// Filesystem path of a file based source
    pub fn path_of(&self, source: &ModelSource) -> Option<PathBuf> {
        match source {
            ModelSource::Asset(p) => Some(self.asset_root.join(p)),
            ModelSource::Storage(p) => Some(self.storage_root.join(p)),
            ModelSource::Builtin(_) => None,
        }
    }

    /// Load and parse a model. This does the actual I/O, see
    /// [`crate::cache::ModelCache`] to avoid doing it twice.
    pub fn load(&self, source: &ModelSource) -> Result<Mesh> {
        if let ModelSource::Builtin(name) = source {
            return match name.as_str() {
                "gizmo" => Ok(Mesh::gizmo(60.0, 4.0)),
                "cube" => Ok(Mesh::cube(40.0)),
                _ => Err(Error::Mesh(format!("unknown built-in model '{name}'"))),
            };
        }
        let path = self
            .path_of(source)
            .ok_or(Error::Other("Model source has no path"))?;
        debug!("Loading model file {}", path.display());
        Mesh::from_obj(BufReader::new(File::open(&path)?))
    }
}
