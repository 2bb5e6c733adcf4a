// Copyright (C) 2023, Alex Badics
// This file is part of ar-scene
// Licensed under the MIT license. See LICENSE file in the project root for details.

//! Background configuration loading and model preloading

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    thread::{self, JoinHandle},
};

use crossbeam_channel::{bounded, Receiver, TryRecvError};
use tracing::{debug, error, info, warn};

use crate::{cache::ModelCache, config::SceneConfig, source::SourceResolver, Error, Result};

/// Loads a [`SceneConfig`] on a background thread, and warms up the
/// [`ModelCache`] with every model it references.
///
/// The render thread polls [`ConfigLoader::is_finished`] and only builds
/// the scene once a configuration is available.
#[derive(Debug)]
pub struct ConfigLoader {
    handle: Option<JoinHandle<()>>,
    result: Receiver<Result<SceneConfig>>,
}

impl ConfigLoader {
    /// Start loading `path`. A missing file is not an error, the built-in
    /// default scene is used instead.
    pub fn start(path: impl Into<PathBuf>, resolver: SourceResolver, cache: Arc<ModelCache>) -> Self {
        let path = path.into();
        let (sender, result) = bounded(1);
        let handle = thread::spawn(move || {
            let loaded = load_config(&path);
            if let Ok(config) = &loaded {
                preload_models(config, &resolver, &cache);
            }
            // The receiving side may have been dropped already, nothing to do then
            let _ = sender.send(loaded);
        });
        Self {
            handle: Some(handle),
            result,
        }
    }

    /// `true` once loading and preloading are done
    pub fn is_finished(&self) -> bool {
        !self.result.is_empty() || self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Take the result without blocking. Returns [`Error::NotReady`] while
    /// the loader is still working. The result can only be taken once.
    pub fn try_take(&mut self) -> Result<SceneConfig> {
        match self.result.try_recv() {
            Ok(result) => {
                self.join();
                result
            }
            Err(TryRecvError::Empty) => Err(Error::NotReady),
            Err(TryRecvError::Disconnected) => {
                Err(Error::Other("Configuration loader has no result"))
            }
        }
    }

    /// Block until the configuration is loaded
    pub fn wait(mut self) -> Result<SceneConfig> {
        let result = self
            .result
            .recv()
            .map_err(|_| Error::Other("Configuration loader has no result"))?;
        self.join();
        result
    }

    fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Configuration loader thread panicked");
            }
        }
    }
}

fn load_config(path: &Path) -> Result<SceneConfig> {
    if !path.exists() {
        info!(
            "No configuration at {}, using the default scene",
            path.display()
        );
        return Ok(SceneConfig::default_scene());
    }
    let config = SceneConfig::from_path(path).map_err(|e| {
        error!("Could not load configuration {}: {}", path.display(), e);
        e
    })?;
    info!(
        "Loaded configuration {} with {} markers",
        path.display(),
        config.markers.len()
    );
    debug!("Configuration: {}", config.to_json().stringify().unwrap_or_default());
    Ok(config)
}

fn preload_models(config: &SceneConfig, resolver: &SourceResolver, cache: &ModelCache) {
    for source in config.model_sources() {
        match cache.get_or_load(&source.key(), || resolver.load(&source)) {
            Ok(mesh) => debug!(
                "Preloaded {} ({} triangles)",
                source.key(),
                mesh.triangles.len()
            ),
            Err(e) => warn!("Could not preload {}: {}", source.key(), e),
        }
    }
}
