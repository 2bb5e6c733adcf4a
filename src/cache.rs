// Copyright (C) 2023, Alex Badics
// This file is part of ar-scene
// Licensed under the MIT license. See LICENSE file in the project root for details.

//! Shared cache of loaded meshes. See [`ModelCache`]

use std::{collections::HashMap, sync::Arc};

use parking_lot::Mutex;
use tracing::debug;

use crate::{mesh::Mesh, Result};

/// Meshes keyed by their source descriptor, so that every marker referencing
/// the same file shares one parsed copy.
///
/// Safe to share between the preloading thread and scene construction.
/// Loading happens outside the lock; if two threads race on the same key,
/// both load, and the first one to finish wins.
#[derive(Debug, Default)]
pub struct ModelCache {
    meshes: Mutex<HashMap<String, Arc<Mesh>>>,
}

impl ModelCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached mesh for `key`, if present
    pub fn get(&self, key: &str) -> Option<Arc<Mesh>> {
        self.meshes.lock().get(key).cloned()
    }

    /// Return the cached mesh, or run `load` and cache its result.
    /// Errors are not cached, the next call retries.
    pub fn get_or_load(&self, key: &str, load: impl FnOnce() -> Result<Mesh>) -> Result<Arc<Mesh>> {
        if let Some(mesh) = self.get(key) {
            return Ok(mesh);
        }
        let mesh = Arc::new(load()?);
        debug!(
            "Cached model {} ({} triangles)",
            key,
            mesh.triangles.len()
        );
        Ok(self
            .meshes
            .lock()
            .entry(key.to_owned())
            .or_insert(mesh)
            .clone())
    }

    /// Number of cached meshes
    pub fn len(&self) -> usize {
        self.meshes.lock().len()
    }

    /// `true` if nothing is cached
    pub fn is_empty(&self) -> bool {
        self.meshes.lock().is_empty()
    }

    /// Drop every cached mesh. Meshes still used by a scene stay alive.
    pub fn clear(&self) {
        self.meshes.lock().clear();
    }
}
