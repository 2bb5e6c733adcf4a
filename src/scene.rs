// Copyright (C) 2023, Alex Badics
// This file is part of ar-scene
// Licensed under the MIT license. See LICENSE file in the project root for details.

//! The per-frame driver tying the tracker, the entities, the scene graph and
//! the overlay together. See [`Scene`]

use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use nalgebra::{Isometry3, Point2, Translation3, UnitQuaternion, Vector3};
use tracing::{debug, error, info, warn};

use crate::{
    cache::ModelCache,
    config::{MarkerConfig, ModelConfig, SceneConfig},
    entity::TrackedEntity,
    extension::{ExtensionRegistry, MarkerContext, ModelContext},
    mesh::Mesh,
    projector::ScreenProjector,
    scene_graph::{NodeId, SceneGraph},
    source::{ModelSource, SourceResolver},
    sync::{self, VisibilityObserver},
    Error, MarkerTracker, Pose, Result,
};

const DEFAULT_VIEWPORT: (u32, u32) = (640, 480);
const GIZMO_SOURCE: &str = "builtin:gizmo";
/// Overlay updates waiting for the UI thread, at most
pub const OVERLAY_QUEUE_CAPACITY: usize = 64;

/// New screen position of an overlay widget
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayUpdate {
    /// Name the anchor was registered with
    pub name: String,
    /// Position in pixels, or `None` if the widget should be hidden
    pub position: Option<Point2<f32>>,
}

#[derive(Debug)]
struct OverlayAnchor {
    name: String,
    entity: usize,
    tag: Option<String>,
    last_sent: Option<Option<Point2<f32>>>,
}

/// A built scene: every registered marker with its nodes, lights and tags.
///
/// Call [`Scene::update_frame`] once per rendered frame, then draw
/// [`Scene::graph`]. Overlay positions are sent to [`Scene::overlay_receiver`]
/// whenever they change. The queue is bounded: while it is full, changes are
/// held back and the latest position is sent once there is room again.
pub struct Scene {
    tracker: Box<dyn MarkerTracker>,
    entities: Vec<TrackedEntity>,
    graph: SceneGraph,
    projector: ScreenProjector,
    anchors: Vec<OverlayAnchor>,
    overlay_sender: Option<Sender<OverlayUpdate>>,
    observer: Option<Box<dyn VisibilityObserver>>,
    frame_count: u64,
}

impl Scene {
    /// Register every configured marker with the tracker and build its nodes.
    ///
    /// Markers the tracker refuses and models that fail to load are logged
    /// and skipped. Fails only if there were markers configured and none of
    /// them could be registered.
    pub fn build(
        config: &SceneConfig,
        mut tracker: Box<dyn MarkerTracker>,
        cache: &ModelCache,
        resolver: &SourceResolver,
        extensions: &ExtensionRegistry,
    ) -> Result<Self> {
        info!(
            "Building scene with {} markers on {} tracker",
            config.markers.len(),
            tracker.name()
        );
        if let Some(mode) = config.pattern_detection_mode_value() {
            if let Err(e) = tracker.set_pattern_detection_mode(mode) {
                warn!("Could not set pattern detection mode: {}", e);
            }
        }
        if let Some(code_type) = config.matrix_code_type_value() {
            if let Err(e) = tracker.set_matrix_code_type(code_type) {
                warn!("Could not set matrix code type: {}", e);
            }
        }

        let mut graph = SceneGraph::new();
        let mut entities = Vec::new();
        for marker in &config.markers {
            if let Some(entity) = build_entity(
                marker,
                tracker.as_mut(),
                &mut graph,
                cache,
                resolver,
                extensions,
            ) {
                entities.push(entity);
            }
        }
        if entities.is_empty() && !config.markers.is_empty() {
            return Err(Error::MarkerRegistration(
                "none of the configured markers".into(),
            ));
        }

        let projector = ScreenProjector::new(
            &tracker.projection_matrix(),
            DEFAULT_VIEWPORT.0,
            DEFAULT_VIEWPORT.1,
        );
        let mut scene = Self {
            tracker,
            entities,
            graph,
            projector,
            anchors: Vec::new(),
            overlay_sender: None,
            observer: None,
            frame_count: 0,
        };
        for extension in extensions.resolve(&config.extensions, "scene") {
            extension.on_scene(&mut scene);
        }
        Ok(scene)
    }

    /// Advance the tracker and push the new poses through the pipeline:
    /// smoothing, scene graph sync, then overlay placement.
    pub fn update_frame(&mut self) {
        self.tracker.next_frame();
        self.frame_count += 1;
        for entity in &mut self.entities {
            let handle = entity.handle();
            let visible = self.tracker.query_marker_visible(handle);
            let transform = if visible {
                self.tracker.query_marker_transformation(handle)
            } else {
                None
            };
            let update = entity.update(visible, transform.as_ref());
            let observer = self
                .observer
                .as_mut()
                .map(|o| &mut **o as &mut dyn VisibilityObserver);
            sync::apply(entity, &update, &mut self.graph, observer);
        }
        self.send_overlay_updates();
    }

    fn send_overlay_updates(&mut self) {
        let Some(sender) = &self.overlay_sender else {
            return;
        };
        let mut disconnected = false;
        for anchor in &mut self.anchors {
            let Some(entity) = self.entities.get(anchor.entity) else {
                continue;
            };
            let position = match &anchor.tag {
                Some(tag) => self.projector.project_tag(entity, tag),
                None => self.projector.project_entity(entity),
            };
            if anchor.last_sent == Some(position) {
                continue;
            }
            let update = OverlayUpdate {
                name: anchor.name.clone(),
                position,
            };
            match sender.try_send(update) {
                Ok(()) => anchor.last_sent = Some(position),
                // Retried next frame with whatever the position is by then
                Err(TrySendError::Full(_)) => {}
                Err(TrySendError::Disconnected(_)) => {
                    disconnected = true;
                    break;
                }
            }
        }
        if disconnected {
            debug!("Overlay receiver dropped, overlay updates stopped");
            self.overlay_sender = None;
        }
    }

    /// Anchor an overlay widget called `name` to an entity (by display name),
    /// or to one of its tags
    pub fn add_overlay_anchor(&mut self, name: &str, entity: &str, tag: Option<&str>) -> Result<()> {
        let index = self
            .entities
            .iter()
            .position(|e| e.name() == entity)
            .ok_or(Error::Other("No such entity"))?;
        if let Some(tag) = tag {
            if self.entities[index].tag(tag).is_none() {
                warn!("{} has no tag '{}' yet, overlay {} stays hidden", entity, tag, name);
            }
        }
        self.anchors.push(OverlayAnchor {
            name: name.to_owned(),
            entity: index,
            tag: tag.map(Into::into),
            last_sent: None,
        });
        Ok(())
    }

    /// Receiving end of the overlay updates, to be drained on the UI thread.
    ///
    /// Replaces any earlier receiver, which gets disconnected. The new one
    /// starts with the current position of every anchor on the next frame.
    pub fn overlay_receiver(&mut self) -> Receiver<OverlayUpdate> {
        let (sender, receiver) = bounded(OVERLAY_QUEUE_CAPACITY);
        self.overlay_sender = Some(sender);
        for anchor in &mut self.anchors {
            anchor.last_sent = None;
        }
        receiver
    }

    /// Get notified when markers appear or disappear
    pub fn set_visibility_observer(&mut self, observer: impl VisibilityObserver + 'static) {
        self.observer = Some(Box::new(observer));
    }

    /// The surface size changed
    pub fn set_viewport(&mut self, width: u32, height: u32) {
        self.projector.set_viewport(width, height);
    }

    /// The scene graph to render
    pub fn graph(&self) -> &SceneGraph {
        &self.graph
    }

    /// Mutable scene graph, for attaching things at runtime
    pub fn graph_mut(&mut self) -> &mut SceneGraph {
        &mut self.graph
    }

    /// All entities, in configuration order
    pub fn entities(&self) -> &[TrackedEntity] {
        &self.entities
    }

    /// Find an entity by display name
    pub fn entity(&self, name: &str) -> Option<&TrackedEntity> {
        self.entities.iter().find(|e| e.name() == name)
    }

    /// Find an entity by display name, mutably
    pub fn entity_mut(&mut self, name: &str) -> Option<&mut TrackedEntity> {
        self.entities.iter_mut().find(|e| e.name() == name)
    }

    /// Screen projection of the current camera
    pub fn projector(&self) -> &ScreenProjector {
        &self.projector
    }

    /// The tracker feeding the scene
    pub fn tracker(&self) -> &dyn MarkerTracker {
        self.tracker.as_ref()
    }

    /// Number of frames processed so far
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

impl std::fmt::Debug for Scene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scene")
            .field("tracker", &self.tracker.name())
            .field("entities", &self.entities)
            .field("anchors", &self.anchors)
            .field("frame_count", &self.frame_count)
            .finish_non_exhaustive()
    }
}

fn build_entity(
    config: &MarkerConfig,
    tracker: &mut dyn MarkerTracker,
    graph: &mut SceneGraph,
    cache: &ModelCache,
    resolver: &SourceResolver,
    extensions: &ExtensionRegistry,
) -> Option<TrackedEntity> {
    let handle = match tracker.add_marker(&config.marker) {
        Ok(handle) if handle >= 0 => handle,
        Ok(handle) => {
            error!("Tracker returned handle {} for marker {}, skipped", handle, config.marker);
            return None;
        }
        Err(e) => {
            error!("Could not register marker {}: {}", config.marker, e);
            return None;
        }
    };
    info!("Added marker {} as {}", config.marker, handle);

    let root = graph.add_node();
    graph.set_visibility(root, false);
    let mut entity = TrackedEntity::new(&config.marker, handle, root, config.lerping);
    if let Some(name) = &config.name {
        entity.set_name(name);
    }
    for tag in &config.tags {
        entity.set_tag(&tag.name, Pose::from_translation(tag.x, tag.y, tag.z));
    }
    for light in &config.lights {
        let light = graph.add_light(Vector3::from(light.color));
        entity.add_light(light);
    }

    for model in &config.models {
        build_model(&mut entity, model, graph, cache, resolver, extensions);
    }
    if config.gizmo || config.models.is_empty() {
        let gizmo = ModelSource::Builtin("gizmo".into());
        match cache.get_or_load(GIZMO_SOURCE, || resolver.load(&gizmo)) {
            Ok(mesh) => {
                attach(&mut entity, graph, mesh, Isometry3::identity(), 1.0, None);
            }
            Err(e) => warn!("{}: could not create gizmo: {}", entity.name(), e),
        }
    }

    entity.set_options(config.options.clone());
    if !config.options.is_empty() {
        let applied = entity.options().apply(tracker, handle);
        debug!("{}: {} tracker options applied", entity.name(), applied);
    }

    for extension in extensions.resolve(&config.extensions, config.display_name()) {
        extension.on_marker(&mut MarkerContext {
            entity: &mut entity,
            config,
            graph: &mut *graph,
        });
    }
    Some(entity)
}

fn build_model(
    entity: &mut TrackedEntity,
    config: &ModelConfig,
    graph: &mut SceneGraph,
    cache: &ModelCache,
    resolver: &SourceResolver,
    extensions: &ExtensionRegistry,
) {
    let mesh = match config.model.as_deref() {
        None => {
            warn!("{}: model without source, no geometry", entity.name());
            None
        }
        Some(descriptor) => match ModelSource::parse(descriptor)
            .and_then(|source| cache.get_or_load(&source.key(), || resolver.load(&source)))
        {
            Ok(mesh) => Some(mesh),
            Err(e) => {
                warn!("{}: could not load '{}': {}", entity.name(), descriptor, e);
                None
            }
        },
    };

    let node = match &mesh {
        Some(mesh) => {
            let transform = Isometry3::from_parts(
                Translation3::new(config.x, config.y, config.z),
                UnitQuaternion::from_euler_angles(config.rx, config.ry, config.rz),
            );
            attach(
                entity,
                graph,
                mesh.clone(),
                transform,
                config.scale,
                Some(config.transparency),
            )
        }
        None => None,
    };

    for extension in extensions.resolve(&config.extensions, entity.name()) {
        extension.on_model(&mut ModelContext {
            entity: &mut *entity,
            config,
            node,
            mesh: mesh.clone(),
            graph: &mut *graph,
        });
    }
}

/// Add a mesh node under the entity's root
fn attach(
    entity: &mut TrackedEntity,
    graph: &mut SceneGraph,
    mesh: Arc<Mesh>,
    transform: Isometry3<f32>,
    scale: f32,
    transparency: Option<i32>,
) -> Option<NodeId> {
    let node = graph.add_mesh_node(mesh);
    graph.set_transform(node, transform);
    if let Some(node) = graph.node_mut(node) {
        node.scale = scale;
    }
    if let Err(e) = graph.add_child(entity.root(), node) {
        error!("{}: could not attach model node: {}", entity.name(), e);
        return None;
    }
    if let Some(transparency) = transparency {
        graph.set_transparency(node, transparency);
    }
    graph.set_visibility(node, false);
    entity.add_child(node);
    Some(node)
}

#[cfg(all(test, feature = "replay"))]
mod tests {
    use super::*;
    use crate::{replay::ReplayFrame, replay::ReplayTracker, scene_graph::OPAQUE};

    const HIRO: &str = "single;Data/hiro.patt;80";

    fn config() -> SceneConfig {
        r#"{
            "PatternDetectionMode": "AR_MATRIX_CODE_DETECTION",
            "marker": [
                {"marker": "single;Data/hiro.patt;80", "name": "hiro",
                 "tags": [{"name": "tip", "z": 50}],
                 "lights": [{"color": [1, 0.5, 0.5]}],
                 "options": {"bool_type": {"ARW_MARKER_OPTION_SQUARE_USE_CONT_POSE_ESTIMATION": true}},
                 "models": [
                    {"model": "builtin:cube", "x": 10, "scale": 2, "transparency": -1},
                    {"model": "asset:does/not/exist.obj"}
                 ]},
                {"marker": "", "name": "refused"}
            ]
        }"#
        .parse()
        .unwrap()
    }

    fn tracker(frames: Vec<ReplayFrame>) -> Box<ReplayTracker> {
        Box::new(ReplayTracker::from_frames([0.0; 16], frames))
    }

    #[test]
    fn build_skips_bad_markers_and_models() {
        let cache = ModelCache::new();
        let scene = Scene::build(
            &config(),
            tracker(Vec::new()),
            &cache,
            &SourceResolver::default(),
            &ExtensionRegistry::new(),
        )
        .unwrap();

        assert_eq!(scene.entities().len(), 1);
        let hiro = scene.entity("hiro").unwrap();
        assert_eq!(hiro.children().len(), 1);
        assert_eq!(hiro.lights().len(), 1);
        assert!(hiro.tag("tip").is_some());

        let cube = scene.graph().node(hiro.children()[0]).unwrap();
        assert_eq!(cube.scale, 2.0);
        assert_eq!(cube.transparency, OPAQUE);
        assert_eq!(cube.parent(), Some(hiro.root()));
        assert!(!scene.graph().node(hiro.root()).unwrap().visible);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn marker_without_models_gets_a_gizmo() {
        let config: SceneConfig = format!(r#"{{"marker": [{{"marker": "{HIRO}"}}]}}"#)
            .parse()
            .unwrap();
        let cache = ModelCache::new();
        let scene = Scene::build(
            &config,
            tracker(Vec::new()),
            &cache,
            &SourceResolver::default(),
            &ExtensionRegistry::new(),
        )
        .unwrap();
        assert_eq!(scene.entities()[0].children().len(), 1);
        assert!(cache.get(GIZMO_SOURCE).is_some());
    }

    #[test]
    fn nothing_registered_is_an_error() {
        let config: SceneConfig = r#"{"marker": [{"marker": " "}]}"#.parse().unwrap();
        let result = Scene::build(
            &config,
            tracker(Vec::new()),
            &ModelCache::new(),
            &SourceResolver::default(),
            &ExtensionRegistry::new(),
        );
        assert!(matches!(result, Err(Error::MarkerRegistration(_))));
    }

    #[test]
    fn overlay_updates_only_on_change() {
        let transform = Pose::from_translation(0.0, 0.0, -300.0).to_matrix();
        let seen = ReplayFrame::from([(HIRO.to_owned(), transform)]);
        let frames = vec![seen.clone(), seen, ReplayFrame::new()];
        let mut projection = [0.0; 16];
        projection[0] = 1.0;
        projection[5] = 1.0;
        projection[11] = -1.0;
        projection[14] = -1.0;
        let tracker = Box::new(ReplayTracker::from_frames(projection, frames));

        let mut scene = Scene::build(
            &config(),
            tracker,
            &ModelCache::new(),
            &SourceResolver::default(),
            &ExtensionRegistry::new(),
        )
        .unwrap();
        scene.add_overlay_anchor("label", "hiro", None).unwrap();
        assert!(scene.add_overlay_anchor("label", "nobody", None).is_err());
        let overlays = scene.overlay_receiver();

        scene.update_frame();
        let first = overlays.try_recv().unwrap();
        assert_eq!(first.name, "label");
        assert_eq!(first.position, Some(Point2::new(320.0, 240.0)));

        scene.update_frame();
        assert!(overlays.try_recv().is_err());

        scene.update_frame();
        assert_eq!(overlays.try_recv().unwrap().position, None);
        assert_eq!(scene.frame_count(), 3);
    }

    #[test]
    fn explicit_gizmo_without_models_is_attached_once() {
        let config: SceneConfig =
            format!(r#"{{"marker": [{{"marker": "{HIRO}", "gizmo": true}}]}}"#)
                .parse()
                .unwrap();
        let scene = Scene::build(
            &config,
            tracker(Vec::new()),
            &ModelCache::new(),
            &SourceResolver::default(),
            &ExtensionRegistry::new(),
        )
        .unwrap();
        let hiro = &scene.entities()[0];
        assert_eq!(hiro.children().len(), 1);
        let gizmo = scene.graph().node(hiro.children()[0]).unwrap();
        assert!(gizmo.mesh.is_some());
        assert_eq!(gizmo.parent(), Some(hiro.root()));
    }

    fn moving_marker_scene(frame_count: usize) -> Scene {
        let frames = (0..frame_count)
            .map(|i| {
                let transform = Pose::from_translation(i as f32 * 0.1, 0.0, -300.0).to_matrix();
                ReplayFrame::from([(HIRO.to_owned(), transform)])
            })
            .collect();
        let mut projection = [0.0; 16];
        projection[0] = 1.0;
        projection[5] = 1.0;
        projection[11] = -1.0;
        projection[14] = -1.0;
        let mut scene = Scene::build(
            &config(),
            Box::new(ReplayTracker::from_frames(projection, frames)),
            &ModelCache::new(),
            &SourceResolver::default(),
            &ExtensionRegistry::new(),
        )
        .unwrap();
        scene.add_overlay_anchor("label", "hiro", None).unwrap();
        scene
    }

    #[test]
    fn overlay_queue_is_bounded_without_a_consumer() {
        let mut scene = moving_marker_scene(2000);
        let overlays = scene.overlay_receiver();
        for _ in 0..1000 {
            scene.update_frame();
        }
        assert_eq!(overlays.len(), OVERLAY_QUEUE_CAPACITY);

        // Once drained, the newest position comes through
        let queued: Vec<_> = overlays.try_iter().collect();
        assert_eq!(queued.len(), OVERLAY_QUEUE_CAPACITY);
        scene.update_frame();
        let latest = overlays.try_recv().unwrap().position.unwrap();
        let expected = scene
            .projector()
            .project_entity(scene.entity("hiro").unwrap())
            .unwrap();
        assert_eq!(latest, expected);
        assert!(latest.x > queued[OVERLAY_QUEUE_CAPACITY - 1].position.unwrap().x);
    }

    #[test]
    fn dropped_receiver_stops_overlay_updates() {
        let mut scene = moving_marker_scene(100);
        for _ in 0..10 {
            scene.update_frame();
        }
        assert!(scene.overlay_sender.is_none());

        drop(scene.overlay_receiver());
        scene.update_frame();
        assert!(scene.overlay_sender.is_none());

        let overlays = scene.overlay_receiver();
        for _ in 0..50 {
            scene.update_frame();
        }
        assert_eq!(overlays.len(), 50);
    }
}
