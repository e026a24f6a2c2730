//! # Entity Hierarchies — Parent/Child Relationships
//!
//! Provides [`Parent`], [`Children`], and [`GlobalTransform`] components for
//! expressing entity hierarchies and propagating transforms from parent to child.
//!
//! The relationship components are maintained by the world: use
//! [`World::add_child`], [`World::spawn_child`] and [`World::remove_child`]
//! rather than inserting them by hand.
//!
//! ## Usage
//!
//! ```ignore
//! let parent = world.spawn("ship", (Transform::from_xy(100.0, 50.0),));
//! let child = world.spawn_child(parent, "turret", (Transform::from_xy(10.0, 0.0),));
//!
//! // After propagation, the child's GlobalTransform reflects the combined
//! // parent + child transform.
//! propagate_transforms(&mut world);
//! ```
//!
//! In an [`App`](crate::app::App), [`HierarchyPlugin`] runs the same
//! propagation as a `post_update` system every frame.

use std::collections::VecDeque;

use super::entity::EntityId;
use super::query::{EntityQuery, QueryPredicate};
use super::schedule::StageLabel;
use super::system::{System, UpdateContext};
use super::world::World;
use crate::app::{App, Plugin};
use crate::ecs::component::ComponentRegistry;
use crate::math::{Mat4, Transform};

/// Marks an entity as a child of another entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Parent(pub EntityId);

/// The children of an entity, in the order they were attached.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Children(pub Vec<EntityId>);

/// The world-space transform computed by [`propagate_transforms`].
///
/// For root entities (no [`Parent`]), this equals the local [`Transform`].
/// For children, this is `parent_global * child_local`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GlobalTransform {
    pub matrix: Mat4,
}

fn roots_query() -> EntityQuery {
    EntityQuery::new(QueryPredicate::has::<Transform>() & QueryPredicate::without::<Parent>())
}

/// Propagate local transforms down the entity hierarchy.
///
/// - Roots (entities with `Transform` but no `Parent`) get `GlobalTransform = Transform.matrix()`.
/// - Children get `GlobalTransform = parent_global * child_local.matrix()`;
///   a child without a `Transform` passes its parent's matrix through.
/// - Traversal is BFS to ensure parents are computed before children.
pub fn propagate_transforms(world: &mut World) {
    propagate(world, &mut roots_query());
}

fn propagate(world: &mut World, roots: &mut EntityQuery) {
    let roots: Vec<(EntityId, Mat4)> = world
        .query(roots)
        .iter()
        .filter_map(|e| e.get::<Transform>().map(|t| (e.id(), t.matrix())))
        .collect();

    let mut queue: VecDeque<(EntityId, Mat4)> = VecDeque::new();
    for (entity, matrix) in roots {
        world.insert(entity, GlobalTransform { matrix });
        enqueue_children(world, entity, matrix, &mut queue);
    }

    while let Some((entity, parent_matrix)) = queue.pop_front() {
        let local_matrix = world
            .component::<Transform>(entity)
            .map(|t| t.matrix())
            .unwrap_or(Mat4::IDENTITY);
        let global_matrix = parent_matrix * local_matrix;
        if !world.insert(entity, GlobalTransform { matrix: global_matrix }) {
            continue;
        }
        enqueue_children(world, entity, global_matrix, &mut queue);
    }
}

fn enqueue_children(world: &World, entity: EntityId, matrix: Mat4, queue: &mut VecDeque<(EntityId, Mat4)>) {
    if let Some(children) = world.component::<Children>(entity) {
        queue.extend(children.0.iter().map(|&child| (child, matrix)));
    }
}

/// [`propagate_transforms`] as a `post_update` system.
pub struct TransformPropagation {
    roots: EntityQuery,
}

impl Default for TransformPropagation {
    fn default() -> Self {
        Self { roots: roots_query() }
    }
}

impl System for TransformPropagation {
    fn stage(&self) -> StageLabel {
        StageLabel::POST_UPDATE
    }

    fn queries_mut(&mut self) -> Vec<&mut EntityQuery> {
        vec![&mut self.roots]
    }

    fn update(&mut self, ctx: &mut UpdateContext<'_, '_>) {
        propagate(ctx.world, &mut self.roots);
    }
}

/// Registers the hierarchy components ([`Transform`] with scene support) and
/// adds [`TransformPropagation`].
pub struct HierarchyPlugin;

impl Plugin for HierarchyPlugin {
    fn build(&self, app: &mut App) {
        ComponentRegistry::register_serde::<Transform>();
        ComponentRegistry::register::<Parent>();
        ComponentRegistry::register::<Children>();
        ComponentRegistry::register::<GlobalTransform>();
        app.add_system(TransformPropagation::default());
    }
}
