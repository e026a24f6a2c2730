//! # Archetype-Based ECS
//!
//! Entities own their components; the [`World`] groups stored entities into
//! archetypes by component signature so queries only look at the groups whose
//! signature can match.
//!
//! ## Module Overview
//!
//! - [`component`] — process-wide type → [`ComponentId`] registry
//! - [`bitset`] — fixed-capacity component signatures
//! - [`component_set`] — per-entity component storage
//! - [`entity`] — entity ids and the [`Entity`] value
//! - [`archetype`] — one signature and its members
//! - [`world`] — central container (entities, archetypes, resources)
//! - [`event`] — double-buffered typed events
//! - [`hierarchy`] — parent/child links and transform propagation
//! - [`query`] — predicates, lifecycle filters, cached plans
//! - [`commands`] — deferred world mutations
//! - [`system`] / [`schedule`] — systems, dependencies and stage execution

pub mod archetype;
pub mod bitset;
pub mod commands;
pub mod component;
pub mod component_set;
pub mod entity;
pub mod event;
pub mod hierarchy;
pub mod query;
pub mod schedule;
pub mod system;
pub mod world;

pub use archetype::{Archetype, ArchetypeId};
pub use bitset::{BitSet, MAX_COMPONENTS};
pub use commands::Commands;
pub use component::{Component, ComponentId, ComponentInfo, ComponentRegistry};
pub use component_set::{Bundle, ComponentEvent, ComponentSet, ComponentTuple};
pub use entity::{Entity, EntityId};
pub use event::{Event, EventCursor, Events};
pub use hierarchy::{
    Children, GlobalTransform, HierarchyPlugin, Parent, TransformPropagation, propagate_transforms,
};
pub use query::{EntityQuery, QueryFilter, QueryIter, QueryPredicate, QueryResult, QueryState};
#[cfg(feature = "diagnostics")]
pub use schedule::SystemTiming;
pub use schedule::{Scheduler, StageLabel};
pub use system::{FnSystem, System, SystemDependency, UpdateContext, system_fn};
#[cfg(feature = "diagnostics")]
pub use world::WorldStats;
pub use world::{EntityMut, World, WorldId};
