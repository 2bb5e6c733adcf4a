// Copyright (C) 2023, Alex Badics
// This file is part of ar-scene
// Licensed under the MIT license. See LICENSE file in the project root for details.
#![cfg(feature = "replay")]

use std::sync::{Arc, Mutex};

use approx::assert_relative_eq;
use nalgebra::{UnitQuaternion, Vector3};

use ar_scene::{
    cache::ModelCache,
    config::SceneConfig,
    entity::TrackedEntity,
    extension::{ExtensionRegistry, MarkerContext, SceneExtension},
    replay::{MarkerOptionValue, ReplayFrame, ReplayTracker},
    scene::Scene,
    scene_graph::SceneGraph,
    smoother::{PoseSmoother, SmoothingState},
    source::SourceResolver,
    MarkerTracker, Pose,
};

const HIRO: &str = "single;Data/hiro.patt;80";

/// Rotation about x whose quaternion vector part has `x == jitter`
fn jitter_rotation(jitter: f32) -> UnitQuaternion<f32> {
    UnitQuaternion::from_euler_angles(2.0 * jitter.asin(), 0.0, 0.0)
}

fn pose(x: f32, orientation: UnitQuaternion<f32>) -> Pose {
    Pose::new(Vector3::new(x, 0.0, -400.0), orientation)
}

fn entity(lerping: bool) -> TrackedEntity {
    let mut graph = SceneGraph::new();
    TrackedEntity::new(HIRO, 0, graph.add_node(), lerping)
}

fn gl_projection() -> [f32; 16] {
    let mut projection = [0.0; 16];
    projection[0] = 1.0;
    projection[5] = 1.0;
    projection[10] = -1.0;
    projection[11] = -1.0;
    projection[14] = -20.0;
    projection
}

#[test]
fn hidden_then_visible_is_raw() {
    let mut entity = entity(true);
    for _ in 0..5 {
        assert!(!entity.update(false, None).visible);
    }
    let raw = pose(3.0, jitter_rotation(0.3));
    let update = entity.update(true, Some(&raw.to_matrix()));
    assert!(update.visible);
    assert!(update.visibility_changed);
    assert_relative_eq!(update.pose.position, raw.position, epsilon = 1e-4);
    assert_relative_eq!(
        update.pose.orientation.angle_to(&raw.orientation),
        0.0,
        epsilon = 1e-3
    );
    assert_eq!(entity.smoothing_state(), SmoothingState::VisibleStable);
}

#[test]
fn large_jitter_blends_ten_percent() {
    let mut smoother = PoseSmoother::new(true);
    let p0 = pose(0.0, UnitQuaternion::identity());
    let p1 = pose(5.0, jitter_rotation(0.10));
    smoother.resolve(true, &p0);
    let resolved = smoother.resolve(true, &p1).unwrap();
    assert_eq!(resolved.position, p1.position);
    assert_relative_eq!(
        resolved.orientation,
        p0.orientation.slerp(&p1.orientation, 0.1),
        epsilon = 1e-5
    );
    assert_eq!(smoother.smoothing_steps(), 1);
}

#[test]
fn small_jitter_is_passed_through() {
    let mut smoother = PoseSmoother::new(true);
    let p0 = pose(0.0, UnitQuaternion::identity());
    smoother.resolve(true, &p0);
    smoother.resolve(true, &pose(0.0, jitter_rotation(0.3)));
    assert_eq!(smoother.smoothing_steps(), 1);

    let anchor = smoother.resolve(true, &pose(0.0, jitter_rotation(0.3))).unwrap();
    let step = anchor.compose(&Pose::new(Vector3::zeros(), jitter_rotation(0.02)));
    assert_eq!(smoother.resolve(true, &step), Some(step));
    assert_eq!(smoother.smoothing_steps(), 0);
    assert_eq!(smoother.state(), SmoothingState::VisibleStable);
}

#[test]
fn short_gap_keeps_smoothing_count() {
    let mut smoother = PoseSmoother::new(true);
    smoother.resolve(true, &pose(0.0, UnitQuaternion::identity()));
    smoother.resolve(true, &pose(0.0, jitter_rotation(0.3)));
    assert_eq!(smoother.smoothing_steps(), 1);
    smoother.resolve(false, &Pose::identity());
    smoother.resolve(false, &Pose::identity());
    assert_eq!(smoother.smoothing_steps(), 1);
    smoother.resolve(true, &pose(0.0, jitter_rotation(0.6)));
    assert_eq!(smoother.smoothing_steps(), 2);
}

#[test]
fn lerping_off_is_verbatim() {
    let mut smoother = PoseSmoother::new(false);
    for i in 0..20 {
        let raw = pose(i as f32, jitter_rotation(if i % 2 == 0 { 0.0 } else { 0.7 }));
        assert_eq!(smoother.resolve(true, &raw), Some(raw));
    }
}

#[test]
fn sustained_jitter_is_capped_until_hidden() {
    let mut smoother = PoseSmoother::new(true);
    // Every frame rotates a further 0.4 radians about x
    let raw = |frame: u32| pose(0.0, UnitQuaternion::from_euler_angles(0.4 * frame as f32, 0.0, 0.0));
    smoother.resolve(true, &raw(0));

    let mut blended = 0;
    for frame in 1..=30 {
        let sample = raw(frame);
        let resolved = smoother.resolve(true, &sample).unwrap();
        if resolved == sample {
            assert!(frame > 10, "raw pose emitted during smoothing at {frame}");
        } else {
            blended += 1;
        }
    }
    assert_eq!(blended, 10);

    for _ in 0..4 {
        smoother.resolve(false, &Pose::identity());
    }
    assert_eq!(smoother.smoothing_steps(), 0);

    let back = raw(40);
    assert_eq!(smoother.resolve(true, &back), Some(back));
    let next = raw(41);
    assert_ne!(smoother.resolve(true, &next), Some(next));
    assert_eq!(smoother.state(), SmoothingState::VisibleSmoothing);
}

#[test]
fn reappearance_after_long_gap_is_raw() {
    let mut smoother = PoseSmoother::new(true);
    smoother.resolve(true, &pose(0.0, UnitQuaternion::identity()));
    for jitter in [0.3, 0.6, 0.9] {
        smoother.resolve(true, &pose(0.0, jitter_rotation(jitter)));
    }
    assert!(smoother.smoothing_steps() > 0);
    for _ in 0..4 {
        smoother.resolve(false, &Pose::identity());
    }
    let raw = pose(7.0, jitter_rotation(-0.5));
    assert_eq!(smoother.resolve(true, &raw), Some(raw));
}

struct Labeler;

impl SceneExtension for Labeler {
    fn on_marker(&self, ctx: &mut MarkerContext) {
        ctx.entity.set_tag("label", Pose::from_translation(0.0, 50.0, 0.0));
    }
}

#[test]
fn replayed_scene_end_to_end() {
    let config: SceneConfig = r#"{
        "MatrixCodeType": "AR_MATRIX_CODE_3x3",
        "marker": [{
            "marker": "single;Data/hiro.patt;80",
            "name": "hiro",
            "extensions": ["labeler"],
            "lights": [{"color": [1, 1, 1]}],
            "options": {"int_type": {"ARW_MARKER_OPTION_FILTERED": "1"}},
            "models": [{"model": "builtin:cube", "rz": 1.5}]
        }]
    }"#
    .parse()
    .unwrap();

    let rotation = UnitQuaternion::from_euler_angles(0.0, 0.0, 0.8);
    let seen = Pose::new(Vector3::new(20.0, 10.0, -300.0), rotation);
    let frame = ReplayFrame::from([(HIRO.to_owned(), seen.to_matrix())]);
    let frames = vec![frame.clone(), frame, ReplayFrame::new()];

    // Round trip through the recording format first
    let mut recording = Vec::new();
    ReplayTracker::from_frames(gl_projection(), frames)
        .write_to(&mut recording)
        .unwrap();
    let tracker = ReplayTracker::read_from(recording.as_slice()).unwrap();

    let mut extensions = ExtensionRegistry::new();
    extensions.register("labeler", Labeler);
    let mut scene = Scene::build(
        &config,
        Box::new(tracker),
        &ModelCache::new(),
        &SourceResolver::default(),
        &extensions,
    )
    .unwrap();

    let events = Arc::new(Mutex::new(Vec::new()));
    let recorded = events.clone();
    scene.set_visibility_observer(move |name: &str, visible: bool| {
        recorded.lock().unwrap().push((name.to_owned(), visible));
    });
    scene.add_overlay_anchor("label", "hiro", Some("label")).unwrap();
    let overlays = scene.overlay_receiver();

    scene.update_frame();
    let hiro = scene.entity("hiro").unwrap();
    assert!(hiro.is_visible());
    let root = scene.graph().node(hiro.root()).unwrap();
    assert!(root.visible);
    assert_relative_eq!(root.transform.translation.vector, seen.position, epsilon = 1e-3);

    // Lights follow the position only
    let light = scene.graph().light(hiro.lights()[0]).unwrap();
    assert!(light.visible);
    assert_relative_eq!(light.position, seen.position, epsilon = 1e-3);

    // Models keep their local rotation under the marker
    let cube = hiro.children()[0];
    let world = scene.graph().world_transform(cube);
    let expected = rotation * UnitQuaternion::from_euler_angles(0.0, 0.0, 1.5);
    assert_relative_eq!(world.rotation.angle_to(&expected), 0.0, epsilon = 1e-3);
    assert!(scene.graph().node(cube).unwrap().visible);

    let update = overlays.try_recv().unwrap();
    assert_eq!(update.name, "label");
    assert!(update.position.is_some());

    scene.update_frame();
    scene.update_frame();
    let hiro = scene.entity("hiro").unwrap();
    assert!(!hiro.is_visible());
    assert!(!scene.graph().node(hiro.children()[0]).unwrap().visible);
    assert!(!scene.graph().lights()[0].visible);
    assert_eq!(overlays.try_iter().last().unwrap().position, None);

    assert_eq!(
        *events.lock().unwrap(),
        vec![("hiro".to_owned(), true), ("hiro".to_owned(), false)]
    );
}

#[test]
fn tracker_settings_are_applied() {
    let config: SceneConfig = r#"{
        "PatternDetectionMode": "AR_MATRIX_CODE_DETECTION",
        "MatrixCodeType": "AR_MATRIX_CODE_4x4",
        "marker": [{
            "marker": "single;Data/hiro.patt;80",
            "options": {"float_type": {"ARW_MARKER_OPTION_SQUARE_CONFIDENCE_CUTOFF": 0.5}}
        }]
    }"#
    .parse()
    .unwrap();

    let mut tracker = ReplayTracker::from_frames(gl_projection(), Vec::new());
    let handle = tracker.add_marker("single;Data/kanji.patt;80").unwrap();
    let mut options = ar_scene::options::MarkerOptions::default();
    options.bool_type.push(("ARW_MARKER_OPTION_FILTERED".into(), true));
    options.apply(&mut tracker, handle);
    assert_eq!(
        tracker.marker_options(),
        &[(handle, 1, MarkerOptionValue::Bool(true))]
    );

    let scene = Scene::build(
        &config,
        Box::new(tracker),
        &ModelCache::new(),
        &SourceResolver::default(),
        &ExtensionRegistry::new(),
    )
    .unwrap();
    assert_eq!(scene.entities()[0].handle(), 1);
    assert_eq!(scene.entities()[0].name(), HIRO);
    assert!(scene.entities()[0].options().float_type.len() == 1);
}
