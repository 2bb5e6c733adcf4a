// Copyright (C) 2023, Alex Badics
// This file is part of ar-scene
// Licensed under the MIT license. See LICENSE file in the project root for details.

//! Runs a scene config against a recorded marker replay and prints what the
//! renderer and the overlay would get.

use std::{path::PathBuf, sync::Arc};

use ar_scene::{
    cache::ModelCache, extension::ExtensionRegistry, loader::ConfigLoader, replay::ReplayTracker,
    scene::Scene, source::SourceResolver,
};
use clap::Parser;

#[derive(Parser)]
#[command(name = "replay_scene")]
#[command(about = "Play back a marker recording through a scene config")]
struct Args {
    /// Scene config (JSON). The built-in default scene is used if it does not exist.
    #[arg(long, default_value = "arapp.json")]
    config: PathBuf,

    /// Marker recording to play back
    #[arg(long)]
    replay: PathBuf,

    /// Directory of bundled models
    #[arg(long, default_value = "assets")]
    assets: PathBuf,

    /// Number of frames to run. Defaults to the length of the recording.
    #[arg(long)]
    frames: Option<usize>,

    /// Restart the recording when it ends
    #[arg(long)]
    looping: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();

    let resolver = SourceResolver::new(&args.assets, ".");
    let cache = Arc::new(ModelCache::new());
    let loader = ConfigLoader::start(&args.config, resolver.clone(), cache.clone());

    let mut tracker = ReplayTracker::from_path(&args.replay)?;
    tracker.set_looping(args.looping);
    let frames = args.frames.unwrap_or(tracker.frames().len());

    let config = loader.wait()?;
    let mut scene = Scene::build(
        &config,
        Box::new(tracker),
        &cache,
        &resolver,
        &ExtensionRegistry::new(),
    )?;
    scene.set_visibility_observer(|name: &str, visible: bool| {
        println!("{name}: {}", if visible { "found" } else { "lost" });
    });
    let names: Vec<String> = scene.entities().iter().map(|e| e.name().to_owned()).collect();
    for name in &names {
        scene.add_overlay_anchor(name, name, None)?;
    }
    let overlays = scene.overlay_receiver();

    for _ in 0..frames {
        scene.update_frame();
        for entity in scene.entities().iter().filter(|e| e.is_visible()) {
            println!(
                "frame {:4} {:>12} {:?} {}",
                scene.frame_count(),
                entity.name(),
                entity.smoothing_state(),
                entity.pose()
            );
        }
        for update in overlays.try_iter() {
            match update.position {
                Some(p) => println!("  overlay {} -> ({:.1}, {:.1})", update.name, p.x, p.y),
                None => println!("  overlay {} hidden", update.name),
            }
        }
    }
    println!(
        "{} meshes visible, {} cached",
        scene.graph().visible_meshes().count(),
        cache.len()
    );
    Ok(())
}
