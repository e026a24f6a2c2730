//! # Scene Management — Save, Load, and Switch Scenes
//!
//! Entities are written to JSON through the serde hooks of the
//! [`ComponentRegistry`]. Only components registered with
//! [`ComponentRegistry::register_serde`] are saved; everything else (including
//! [`GlobalTransform`](crate::ecs::GlobalTransform), which is recomputed every
//! frame) is left out.
//!
//! ## Quick Start
//!
//! ```ignore
//! use kjarni::prelude::*;
//!
//! ComponentRegistry::register_serde::<Transform>();
//! ComponentRegistry::register_serde::<Health>();
//!
//! let data = save_scene(&world);
//! save_scene_to_file(&world, "level.json")?;
//!
//! let spawned = load_scene(&mut world, &data);
//! let spawned = load_scene_from_file(&mut world, "level.json")?;
//! ```
//!
//! ## Format
//!
//! ```json
//! { "entities": [
//!     { "id": 4, "name": "ship", "active": true,
//!       "components": { "Transform": { ... }, "Health": 10 },
//!       "children": [5] },
//!     { "id": 5, "name": "turret", "components": { ... } }
//! ] }
//! ```
//!
//! Hierarchy is carried by `children`, not by components. Scene ids only link
//! parents to children inside one file: loading always assigns fresh ids.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ecs::component::ComponentRegistry;
use crate::ecs::hierarchy::{Children, Parent};
use crate::ecs::query::{EntityQuery, QueryPredicate};
use crate::ecs::{Entity, EntityId, World};
use crate::error::SceneError;

// ── Scene Data (JSON wire format) ────────────────────────────────────────

/// A serialized scene containing entities and their components.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneData {
    pub entities: Vec<SceneEntity>,
}

/// A single entity in a serialized scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneEntity {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default = "active_default")]
    pub active: bool,
    /// Scene name → payload, in the entity's component insertion order.
    #[serde(default)]
    pub components: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<u64>,
}

fn active_default() -> bool {
    true
}

impl SceneData {
    pub fn from_json_str(json: &str) -> Result<Self, SceneError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json_string(&self) -> Result<String, SceneError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

// ── Encode / decode one entity ───────────────────────────────────────────

/// Serialize the registered components of `entity`. `children` is filled in
/// from its [`Children`], restricted to ids `world` still stores.
pub fn encode_entity(world: &World, entity: &Entity) -> SceneEntity {
    let mut components = serde_json::Map::new();
    for (id, value) in entity.components().iter() {
        let Some(info) = ComponentRegistry::info(id) else {
            continue;
        };
        if !info.is_serializable() {
            continue;
        }
        match ComponentRegistry::serialize(id, value) {
            Some(json) => {
                components.insert(info.short_name().to_string(), json);
            }
            None => log::warn!(
                "entity {} `{}`: failed to serialize `{}`, skipped",
                entity.id(),
                entity.name(),
                info.type_name()
            ),
        }
    }

    let children = entity
        .get::<Children>()
        .map(|c| {
            c.0.iter()
                .filter(|&&child| world.contains(child) && !world.is_pending_removal(child))
                .map(|child| child.get())
                .collect()
        })
        .unwrap_or_default();

    SceneEntity {
        id: entity.id().get(),
        name: entity.name().to_string(),
        active: entity.is_active(),
        components,
        children,
    }
}

/// Build an unattached [`Entity`] with a fresh id from `scene`. Unknown
/// component names and payloads that fail to decode are skipped with a
/// warning. `children` is ignored here; [`load_scene`] links hierarchy.
pub fn decode_entity(scene: &SceneEntity) -> Entity {
    let mut entity = Entity::new(scene.name.clone());
    entity.set_active(scene.active);

    for (name, json) in &scene.components {
        let Some((id, deserialize)) = ComponentRegistry::deserializer(name) else {
            log::warn!("scene entity {}: unknown component `{name}`, skipped", scene.id);
            continue;
        };
        match deserialize(json.clone()) {
            Ok(component) => {
                entity.components_mut().set_boxed(id, component);
            }
            Err(err) => {
                log::warn!("scene entity {}: bad `{name}` payload ({err}), skipped", scene.id);
            }
        }
    }
    entity
}

// ── Save / Load functions ────────────────────────────────────────────────

/// Save every stored entity that is not pending removal.
///
/// Roots come first, then children, each group ordered by id, so a file
/// written twice from the same world is identical.
pub fn save_scene(world: &World) -> SceneData {
    let mut roots = Vec::new();
    let mut children = Vec::new();
    for entity in world.entities() {
        if world.is_pending_removal(entity.id()) {
            continue;
        }
        if entity.has::<Parent>() {
            children.push(entity);
        } else {
            roots.push(entity);
        }
    }
    roots.sort_by_key(|e| e.id());
    children.sort_by_key(|e| e.id());

    let entities = roots
        .into_iter()
        .chain(children)
        .map(|entity| encode_entity(world, entity))
        .collect();
    SceneData { entities }
}

/// Load entities from `data` into the world, in file order.
///
/// Returns the new ids, index-aligned with `data.entities`.
pub fn load_scene(world: &mut World, data: &SceneData) -> Vec<EntityId> {
    let mut id_map: HashMap<u64, EntityId> = HashMap::with_capacity(data.entities.len());
    let mut spawned = Vec::with_capacity(data.entities.len());

    for scene_entity in &data.entities {
        let id = world.add_entity(decode_entity(scene_entity));
        if id_map.insert(scene_entity.id, id).is_some() {
            log::warn!("scene id {} appears twice; children link to the last one", scene_entity.id);
        }
        spawned.push(id);
    }

    for scene_entity in &data.entities {
        let Some(&parent) = id_map.get(&scene_entity.id) else {
            continue;
        };
        for child in &scene_entity.children {
            match id_map.get(child) {
                Some(&child) => {
                    if !world.add_child(parent, child) {
                        log::warn!("scene entity {}: cannot adopt {child}, skipped", scene_entity.id);
                    }
                }
                None => log::warn!(
                    "scene entity {}: child {child} is not in the scene, skipped",
                    scene_entity.id
                ),
            }
        }
    }

    log::debug!("loaded {} scene entities", spawned.len());
    spawned
}

/// Save all entities to a pretty-printed JSON file.
pub fn save_scene_to_file(world: &World, path: impl AsRef<Path>) -> Result<(), SceneError> {
    let json = save_scene(world).to_json_string()?;
    std::fs::write(path.as_ref(), json)?;
    log::info!("saved scene to {}", path.as_ref().display());
    Ok(())
}

/// Load entities from a JSON file.
pub fn load_scene_from_file(world: &mut World, path: impl AsRef<Path>) -> Result<Vec<EntityId>, SceneError> {
    let json = std::fs::read_to_string(path.as_ref())?;
    let data = SceneData::from_json_str(&json)?;
    Ok(load_scene(world, &data))
}

// ── Scene switching ──────────────────────────────────────────────────────

/// Tags an entity as belonging to a named scene.
///
/// Used by [`load_scene_tagged`] and [`unload_scene`] for scene switching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneMarker(pub String);

/// Load entities from scene data and tag them all with a scene name.
pub fn load_scene_tagged(world: &mut World, data: &SceneData, scene_name: &str) -> Vec<EntityId> {
    let entities = load_scene(world, data);
    for &entity in &entities {
        world.insert(entity, SceneMarker(scene_name.to_string()));
    }
    entities
}

/// Mark every entity tagged `scene_name`, and its descendants, for removal at
/// the next tick boundary. Returns how many tagged entities were found.
pub fn unload_scene(world: &mut World, scene_name: &str) -> usize {
    let mut tagged = EntityQuery::new(QueryPredicate::has::<SceneMarker>());
    let doomed: Vec<EntityId> = world
        .query(&mut tagged)
        .iter()
        .filter(|e| e.get::<SceneMarker>().is_some_and(|m| m.0 == scene_name))
        .map(|e| e.id())
        .collect();

    for &entity in &doomed {
        world.remove_entity(entity, true);
    }
    log::debug!("unloading scene `{scene_name}`: {} entities", doomed.len());
    doomed.len()
}

/// Unload an old scene and load a new one.
///
/// Returns the entities spawned by the new scene. The old scene's entities
/// stay visible until the next tick boundary.
pub fn switch_scene(world: &mut World, old_name: &str, new_data: &SceneData, new_name: &str) -> Vec<EntityId> {
    unload_scene(world, old_name);
    load_scene_tagged(world, new_data, new_name)
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::ecs::GlobalTransform;
    use crate::math::Transform;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Hitpoints(u32);

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Faction {
        name: String,
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Scratch;

    fn register() {
        ComponentRegistry::register_serde::<Transform>();
        ComponentRegistry::register_serde::<Hitpoints>();
        ComponentRegistry::register_serde::<Faction>();
    }

    fn sample_world() -> (World, EntityId, EntityId) {
        register();
        let mut world = World::new();
        let ship = world.spawn(
            "ship",
            (
                Transform::from_xyz(1.0, 2.0, 3.0),
                Hitpoints(10),
                Faction { name: "red".into() },
                Scratch,
                GlobalTransform::default(),
            ),
        );
        let turret = world.spawn_child(ship, "turret", (Hitpoints(3),));
        (world, ship, turret)
    }

    #[test]
    fn save_skips_unregistered_components() {
        let (world, ship, turret) = sample_world();
        let data = save_scene(&world);

        assert_eq!(data.len(), 2);
        let root = &data.entities[0];
        assert_eq!(root.id, ship.get());
        assert_eq!(root.name, "ship");
        let keys: Vec<&str> = root.components.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["Transform", "Hitpoints", "Faction"]);
        assert_eq!(root.children, vec![turret.get()]);
        assert_eq!(data.entities[1].components["Hitpoints"], serde_json::json!(3));
    }

    #[test]
    fn load_assigns_fresh_ids_and_links_hierarchy() {
        let (world, ship, _) = sample_world();
        let data = save_scene(&world);

        let mut target = World::new();
        let spawned = load_scene(&mut target, &data);
        assert_eq!(spawned.len(), 2);
        assert!(!spawned.contains(&ship));

        let (new_ship, new_turret) = (spawned[0], spawned[1]);
        assert_eq!(target.component::<Hitpoints>(new_ship), Some(&Hitpoints(10)));
        assert_eq!(
            target.component::<Transform>(new_ship),
            Some(&Transform::from_xyz(1.0, 2.0, 3.0))
        );
        assert!(target.component::<Scratch>(new_ship).is_none());
        assert_eq!(target.component::<Parent>(new_turret), Some(&Parent(new_ship)));
        assert_eq!(target.component::<Children>(new_ship), Some(&Children(vec![new_turret])));
    }

    #[test]
    fn unknown_and_malformed_components_are_skipped() {
        register();
        let data = SceneData::from_json_str(
            r#"{ "entities": [ {
                "id": 1, "name": "odd",
                "components": { "Hitpoints": "lots", "NoSuchThing": {}, "Faction": { "name": "blue" } }
            } ] }"#,
        )
        .unwrap();

        let mut world = World::new();
        let spawned = load_scene(&mut world, &data);
        let entity = world.get(spawned[0]).unwrap();
        assert!(entity.is_active());
        assert!(!entity.has::<Hitpoints>());
        assert_eq!(entity.get::<Faction>(), Some(&Faction { name: "blue".into() }));
    }

    #[test]
    fn pending_removal_is_not_saved() {
        let (mut world, ship, _) = sample_world();
        let loner = world.spawn("loner", (Hitpoints(1),));
        world.remove_entity(ship, true);

        let data = save_scene(&world);
        assert_eq!(data.len(), 1);
        assert_eq!(data.entities[0].id, loner.get());
    }

    #[test]
    fn file_round_trip() {
        let (world, _, _) = sample_world();
        let path = std::env::temp_dir().join(format!("kjarni-scene-{}.json", std::process::id()));
        save_scene_to_file(&world, &path).unwrap();

        let mut target = World::new();
        let spawned = load_scene_from_file(&mut target, &path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(spawned.len(), 2);
        assert_eq!(target.entities_named("turret").count(), 1);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let mut world = World::new();
        let err = load_scene_from_file(&mut world, "/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, SceneError::Io(_)));
    }

    #[test]
    fn switch_scene_replaces_tagged_entities() {
        let (world, _, _) = sample_world();
        let level = save_scene(&world);

        let mut game = World::new();
        let hud = game.spawn("hud", (Hitpoints(0),));
        let first = load_scene_tagged(&mut game, &level, "level1");
        let second = switch_scene(&mut game, "level1", &level, "level2");

        assert!(first.iter().all(|&id| game.is_pending_removal(id)));
        assert!(second.iter().all(|&id| !game.is_pending_removal(id)));

        game.begin_tick();
        assert!(first.iter().all(|&id| !game.contains(id)));
        assert!(game.contains(hud));
        assert_eq!(game.entity_count(), 3);
        assert_eq!(unload_scene(&mut game, "level2"), 2);
    }
}
