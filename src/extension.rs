// Copyright (C) 2023, Alex Badics
// This file is part of ar-scene
// Licensed under the MIT license. See LICENSE file in the project root for details.

//! Per-marker, per-model and per-scene customization hooks.
//!
//! Extensions are compiled in and registered by name; the scene config
//! refers to them in `"extensions"` lists. See [`SceneExtension`]

use std::{collections::HashMap, sync::Arc};

use tracing::warn;

use crate::{
    config::{MarkerConfig, ModelConfig},
    entity::TrackedEntity,
    mesh::Mesh,
    scene::Scene,
    scene_graph::{NodeId, SceneGraph},
};

/// What a marker hook gets to see
pub struct MarkerContext<'a> {
    /// The freshly built entity
    pub entity: &'a mut TrackedEntity,
    /// Its configuration
    pub config: &'a MarkerConfig,
    /// The scene graph, to attach more nodes
    pub graph: &'a mut SceneGraph,
}

/// What a model hook gets to see
pub struct ModelContext<'a> {
    /// The entity the model belongs to
    pub entity: &'a mut TrackedEntity,
    /// The model's configuration
    pub config: &'a ModelConfig,
    /// Node holding the model. `None` if the model failed to load.
    pub node: Option<NodeId>,
    /// The loaded geometry, if any
    pub mesh: Option<Arc<Mesh>>,
    /// The scene graph
    pub graph: &'a mut SceneGraph,
}

/// A customization hook. Every method defaults to doing nothing.
pub trait SceneExtension: Send + Sync {
    /// Called once a marker and all its models are built
    fn on_marker(&self, _ctx: &mut MarkerContext) {}

    /// Called once a model is loaded (or failed to load)
    fn on_model(&self, _ctx: &mut ModelContext) {}

    /// Called once the whole scene is built
    fn on_scene(&self, _scene: &mut Scene) {}
}

/// Named extensions available to a scene config
#[derive(Default, Clone)]
pub struct ExtensionRegistry {
    extensions: HashMap<String, Arc<dyn SceneExtension>>,
}

impl ExtensionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an extension, replacing any previous one with the same name
    pub fn register(&mut self, name: &str, extension: impl SceneExtension + 'static) {
        self.extensions.insert(name.to_owned(), Arc::new(extension));
    }

    /// Look up an extension
    pub fn get(&self, name: &str) -> Option<Arc<dyn SceneExtension>> {
        self.extensions.get(name).cloned()
    }

    /// Look up a list of names, in order. Unknown names are logged and skipped.
    pub fn resolve(&self, names: &[String], context: &str) -> Vec<Arc<dyn SceneExtension>> {
        names
            .iter()
            .filter_map(|name| {
                let extension = self.get(name);
                if extension.is_none() {
                    warn!("{}: unknown extension '{}', skipped", context, name);
                }
                extension
            })
            .collect()
    }
}

impl std::fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.extensions.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;
    impl SceneExtension for Noop {}

    #[test]
    fn resolve_skips_unknown_names() {
        let mut registry = ExtensionRegistry::new();
        registry.register("noop", Noop);
        let resolved = registry.resolve(&["noop".into(), "missing".into(), "noop".into()], "test");
        assert_eq!(resolved.len(), 2);
        assert!(registry.get("missing").is_none());
    }
}
