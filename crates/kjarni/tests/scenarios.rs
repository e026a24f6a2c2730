//! End-to-end behavior across world, queries and scheduler.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use kjarni::ecs::{BitSet, ComponentId};
use kjarni::prelude::*;
use parking_lot::Mutex;

#[derive(Debug, Clone, PartialEq)]
struct Sprite(&'static str);

#[derive(Debug, Clone, PartialEq)]
struct A;
#[derive(Debug, Clone, PartialEq)]
struct B;
#[derive(Debug, Clone, PartialEq)]
struct C;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Velocity(Vec3);

#[derive(Debug, Clone, PartialEq)]
struct Doomed;

fn signature_of(ids: &[ComponentId]) -> BitSet {
    ids.iter().copied().collect()
}

fn assert_archetype_invariant(world: &World) {
    for entity in world.entities() {
        let archetype = world.archetype_of(entity.id()).expect("stored entity has an archetype");
        assert_eq!(archetype.signature(), &entity.components().signature());
        assert!(archetype.entities().contains(&entity.id()));
    }
}

#[test]
fn scenario_a_first_component_places_entity() {
    let mut world = World::new();
    let e = world.spawn_empty("e");

    world.entity_mut(e).unwrap().set(Transform::default());

    let archetype = world.archetype_of(e).unwrap();
    assert_eq!(archetype.signature(), &signature_of(&[ComponentId::of::<Transform>()]));

    let mut with_transform = EntityQuery::new(QueryPredicate::has::<Transform>());
    let mut with_sprite = EntityQuery::new(QueryPredicate::has::<Sprite>());
    assert_eq!(world.query(&mut with_transform).to_id_set(), HashSet::from([e]));
    assert!(world.query(&mut with_sprite).is_empty());
}

#[test]
fn scenario_b_removal_migrates_and_leaves_old_archetype() {
    let mut world = World::new();
    let e = world.spawn("e", (Transform::default(), Sprite("ship.png")));
    let a1 = world.archetype_of(e).unwrap().id();
    assert_eq!(world.archetype(a1).unwrap().entities(), &[e]);

    assert!(world.entity_mut(e).unwrap().remove::<Sprite>());

    let now = world.archetype_of(e).unwrap();
    assert_eq!(now.signature(), &signature_of(&[ComponentId::of::<Transform>()]));
    assert_ne!(now.id(), a1);
    assert!(world.archetype(a1).map_or(true, |a| !a.entities().contains(&e)));
    assert_archetype_invariant(&world);
}

#[test]
fn scenario_c_predicates_pick_archetypes() {
    let mut world = World::new();
    world.spawn("a", (A,));
    world.spawn("ab", (A, B));
    world.spawn("bc", (B, C));

    let signatures = |predicate: QueryPredicate, world: &World| -> HashSet<BitSet> {
        world
            .archetypes()
            .filter(|a| predicate.evaluate(a.signature()))
            .map(|a| *a.signature())
            .collect()
    };
    let (a, b, c) = (ComponentId::of::<A>(), ComponentId::of::<B>(), ComponentId::of::<C>());

    let both = QueryPredicate::has::<A>() & QueryPredicate::has::<B>();
    assert_eq!(signatures(both, &world), HashSet::from([signature_of(&[a, b])]));

    let either = QueryPredicate::has::<A>() | QueryPredicate::has::<C>();
    assert_eq!(
        signatures(either, &world),
        HashSet::from([signature_of(&[a]), signature_of(&[a, b]), signature_of(&[b, c])])
    );
}

struct Gravity;

impl System for Gravity {
    fn update(&mut self, ctx: &mut UpdateContext<'_, '_>) {
        ctx.world.resource_mut::<Vec<&'static str>>().push("gravity");
    }
}

struct Movement;

impl System for Movement {
    fn dependencies(&self) -> Vec<SystemDependency> {
        vec![SystemDependency::after::<Gravity>()]
    }

    fn update(&mut self, ctx: &mut UpdateContext<'_, '_>) {
        ctx.world.resource_mut::<Vec<&'static str>>().push("movement");
    }
}

#[test]
fn scenario_d_after_dependency_orders_systems() {
    for movement_first in [true, false] {
        let mut scheduler = Scheduler::new();
        if movement_first {
            scheduler.add_system(Movement);
            scheduler.add_system(Gravity);
        } else {
            scheduler.add_system(Gravity);
            scheduler.add_system(Movement);
        }

        let mut world = World::new();
        world.insert_resource(Vec::<&'static str>::new());
        scheduler.run_frame(&mut world, Duration::ZERO);
        assert_eq!(*world.resource::<Vec<&'static str>>(), vec!["gravity", "movement"]);
    }
}

#[test]
fn scenario_e_removal_is_visible_until_next_tick() {
    let seen: Arc<Mutex<Vec<usize>>> = Arc::default();
    let mut scheduler = Scheduler::new();

    scheduler.add_system(system_fn("reaper", |ctx| {
        let doomed: Vec<EntityId> = ctx
            .world
            .entities()
            .filter(|e| e.has::<Doomed>())
            .map(|e| e.id())
            .collect();
        for id in doomed {
            ctx.world.entity_mut(id).unwrap().remove_from_scene(false);
        }
    }));

    let observed = Arc::clone(&seen);
    let mut marked = EntityQuery::new(QueryPredicate::has::<Doomed>());
    scheduler.add_system(
        system_fn("observer", move |ctx| {
            observed.lock().push(ctx.world.query(&mut marked).count());
        })
        .after("reaper"),
    );

    let mut world = World::new();
    let victim = world.spawn("victim", (Doomed,));

    scheduler.run_frame(&mut world, Duration::ZERO);
    assert!(world.contains(victim));
    scheduler.run_frame(&mut world, Duration::ZERO);
    assert!(!world.contains(victim));

    assert_eq!(*seen.lock(), vec![1, 0]);
}

#[test]
fn archetype_invariant_survives_churn() {
    let mut world = World::new();
    let ids: Vec<EntityId> = (0..24).map(|i| world.spawn(format!("e{i}"), (A,))).collect();

    // Deterministic pseudo-random walk over insert/remove/despawn.
    let mut state = 0x2545_f491_u32;
    for step in 0..400 {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        let id = ids[state as usize % ids.len()];
        if !world.contains(id) {
            continue;
        }
        match (state >> 8) % 7 {
            0 => {
                world.insert(id, B);
            }
            1 => {
                world.remove::<B>(id);
            }
            2 => {
                world.insert(id, C);
            }
            3 => {
                world.remove::<A>(id);
            }
            4 => {
                world.insert(id, Velocity(Vec3::X));
            }
            5 => {
                world.entity_mut(id).unwrap().remove_all();
            }
            _ => {
                if step % 5 == 0 {
                    world.remove_entity(id, false);
                }
            }
        }
        assert_archetype_invariant(&world);
        if step % 50 == 0 {
            world.begin_tick();
            assert_archetype_invariant(&world);
        }
    }
}

#[test]
fn query_soundness() {
    let mut world = World::new();
    world.spawn("a", (A,));
    world.spawn("ab", (A, B));
    world.spawn("abc", (A, B, C));
    world.spawn("c", (C,));

    let mut query = EntityQuery::new(QueryPredicate::has::<A>() & !QueryPredicate::has::<C>());
    for entity in world.query(&mut query) {
        assert!(entity.has::<A>());
        assert!(!entity.has::<C>());
    }
    assert_eq!(world.query(&mut query).count(), 2);
}

#[test]
fn filters_partition_by_lifecycle() {
    let mut world = World::new();
    let old = world.spawn("old", (A,));
    let going = world.spawn("going", (A,));
    world.begin_tick();

    let fresh = world.spawn("fresh", (A,));
    world.remove_entity(going, false);

    let ids = |filter: QueryFilter, world: &World| -> HashSet<EntityId> {
        let mut query = EntityQuery::new(QueryPredicate::has::<A>()).with_filter(filter);
        world.query(&mut query).to_id_set()
    };

    assert_eq!(ids(QueryFilter::ADDED, &world), HashSet::from([fresh]));
    assert_eq!(ids(QueryFilter::REMOVED, &world), HashSet::from([going]));
    assert_eq!(ids(QueryFilter::STORED, &world), HashSet::from([old, going, fresh]));
    assert_eq!(ids(QueryFilter::ALL, &world), HashSet::from([old, going, fresh]));
    assert_eq!(ids(QueryFilter::ADDED | QueryFilter::REMOVED, &world), HashSet::from([fresh, going]));

    world.begin_tick();
    assert!(ids(QueryFilter::ADDED, &world).is_empty());
    assert!(ids(QueryFilter::REMOVED, &world).is_empty());
    assert_eq!(ids(QueryFilter::STORED, &world), HashSet::from([old, fresh]));
}

#[test]
fn scheduler_order_is_deterministic() {
    let build = || {
        let mut scheduler = Scheduler::new();
        for name in ["input", "ai", "physics", "animation", "audio", "camera"] {
            let system = system_fn(name, |_| {});
            let system = match name {
                "physics" => system.after("ai").after("input"),
                "camera" => system.after("physics"),
                "animation" => system.before("audio"),
                _ => system,
            };
            scheduler.add_system(system);
        }
        scheduler.initialize().unwrap();
        scheduler
            .execution_order(&StageLabel::UPDATE)
            .unwrap()
            .into_iter()
            .map(str::to_string)
            .collect::<Vec<_>>()
    };

    let first = build();
    assert_eq!(first, vec!["input", "ai", "physics", "animation", "audio", "camera"]);
    for _ in 0..10 {
        assert_eq!(build(), first);
    }
}

#[test]
fn recursive_removal_and_scene_reload() {
    ComponentRegistry::register_serde::<Transform>();

    let mut world = World::new();
    let root = world.spawn("root", (Transform::from_xyz(1.0, 0.0, 0.0),));
    let child = world.spawn_child(root, "child", (Transform::default(),));
    let grandchild = world.spawn_child(child, "grandchild", (Transform::default(),));
    let data = save_scene(&world);

    world.remove_entity(root, true);
    world.begin_tick();
    for id in [root, child, grandchild] {
        assert!(!world.contains(id));
    }
    assert_eq!(world.entity_count(), 0);

    let spawned = load_scene(&mut world, &data);
    assert_eq!(spawned.len(), 3);
    assert_eq!(world.descendants(spawned[0]).len(), 2);
    assert_archetype_invariant(&world);
}

#[derive(Debug, Clone, PartialEq)]
struct Landed(EntityId);

#[test]
fn events_reach_earlier_stages_next_frame_once() {
    let received: Arc<Mutex<Vec<(u64, usize)>>> = Arc::default();
    let mut scheduler = Scheduler::new();

    let log = Arc::clone(&received);
    let mut cursor = EventCursor::<Landed>::new();
    scheduler.add_system(
        system_fn("listener", move |ctx| {
            let frame = ctx.world.resource::<Time>().frame_count();
            let count = cursor.read(ctx.world.resource::<Events<Landed>>()).count();
            log.lock().push((frame, count));
        })
        .in_stage(StageLabel::PRE_UPDATE),
    );
    scheduler.add_system(
        system_fn("lander", |ctx| {
            if ctx.world.resource::<Time>().frame_count() == 1 {
                let ship = ctx.world.spawn_empty("ship");
                ctx.commands.send_event(Landed(ship));
            }
        })
        .in_stage(StageLabel::POST_UPDATE),
    );

    let mut world = World::new();
    world.add_event::<Landed>();
    for _ in 0..3 {
        scheduler.run_frame(&mut world, Duration::from_millis(16));
    }
    assert_eq!(*received.lock(), vec![(1, 0), (2, 1), (3, 0)]);
}

#[test]
fn changed_query_in_a_system_sees_other_systems_writes() {
    let moved: Arc<Mutex<Vec<usize>>> = Arc::default();
    let mut scheduler = Scheduler::new();

    scheduler.add_system(system_fn("mover", |ctx| {
        // Only odd frames move anything.
        if ctx.world.resource::<Time>().frame_count() % 2 == 1 {
            let ids: Vec<EntityId> = ctx.world.entities().map(|e| e.id()).collect();
            for id in ids {
                if let Some(v) = ctx.world.component_mut::<Velocity>(id) {
                    v.0.x += 1.0;
                }
            }
        }
    }));
    let log = Arc::clone(&moved);
    let mut changed = EntityQuery::new(QueryPredicate::Always).changed::<Velocity>();
    scheduler.add_system(
        system_fn("watcher", move |ctx| {
            log.lock().push(ctx.world.query(&mut changed).count());
        })
        .after("mover"),
    );

    let mut world = World::new();
    world.spawn("a", (Velocity(Vec3::ZERO),));
    world.spawn("b", (Velocity(Vec3::ZERO),));
    world.spawn("c", (A,));
    for _ in 0..4 {
        scheduler.run_frame(&mut world, Duration::ZERO);
    }
    assert_eq!(*moved.lock(), vec![2, 0, 2, 0]);
}
