//! Scene Save/Load — round-trip a small hierarchy through a JSON file.
//!
//! Builds a ship with two turrets, saves it, tears the world down, loads it
//! back and prints what came back. `Scratch` is never registered for scenes,
//! so it does not survive the trip.
//!
//! Run with: `cargo run -p kjarni --example scene_save_load`

use std::time::Duration;

use kjarni::prelude::*;
use kjarni::scene::{load_scene_from_file, save_scene_to_file};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Label(String);

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Armor(u32);

#[derive(Debug, Clone)]
struct Scratch;

fn main() -> Result<(), SceneError> {
    env_logger::init();

    ComponentRegistry::register_serde::<Label>();
    ComponentRegistry::register_serde::<Armor>();

    let mut app = App::new();
    app.plugin(HierarchyPlugin);

    let world = app.world_mut();
    let ship = world.spawn(
        "ship",
        (Transform::from_xy(10.0, 0.0), Label("Dauntless".into()), Armor(40), Scratch),
    );
    for x in [-1.0, 1.0] {
        world.spawn_child(ship, "turret", (Transform::from_xy(x, 0.5), Armor(5)));
    }
    app.update_with_delta(Duration::ZERO);

    let path = std::env::temp_dir().join("kjarni_scene.json");
    save_scene_to_file(app.world(), &path)?;
    println!("saved to {}", path.display());

    app.world_mut().despawn_all();
    app.update_with_delta(Duration::ZERO);
    println!("entities after clear: {}", app.world().entity_count());

    let spawned = load_scene_from_file(app.world_mut(), &path)?;
    app.update_with_delta(Duration::ZERO);

    for id in spawned {
        let Some(entity) = app.world().get(id) else {
            continue;
        };
        let x = app
            .world()
            .component::<GlobalTransform>(id)
            .map_or(0.0, |g| g.matrix.col(3).x);
        println!(
            "{:>7} label={:?} armor={:?} scratch={} global_x={x}",
            entity.name(),
            entity.get::<Label>().map(|l| l.0.as_str()),
            entity.get::<Armor>().map(|a| a.0),
            entity.has::<Scratch>(),
        );
    }
    Ok(())
}

