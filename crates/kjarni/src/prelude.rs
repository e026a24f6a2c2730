//! Convenience re-exports — `use kjarni::prelude::*` for the common items.

pub use crate::app::{App, Plugin};
pub use crate::config::RuntimeConfig;
pub use crate::ecs::{
    Children, Commands, Component, ComponentRegistry, Entity, EntityId, EntityMut, EntityQuery,
    EventCursor, Events, GlobalTransform, HierarchyPlugin, Parent, QueryFilter, QueryPredicate,
    Scheduler, StageLabel, System, SystemDependency, UpdateContext, World, system_fn,
};
pub use crate::error::{ConfigError, SceneError, ScheduleError};
pub use crate::math::{Mat4, Quat, Transform, Vec2, Vec3, Vec4};
pub use crate::scene::{SceneData, SceneMarker, load_scene, save_scene};
pub use crate::time::Time;
