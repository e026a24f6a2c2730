//! # System — per-frame behavior
//!
//! A system is a value that implements [`System`]: it has a name, belongs to a
//! stage, may declare ordering constraints against other systems, owns the
//! queries it iterates, and does its work in [`System::update`].
//!
//! ```ignore
//! struct Gravity {
//!     bodies: EntityQuery,
//! }
//!
//! impl System for Gravity {
//!     fn dependencies(&self) -> Vec<SystemDependency> {
//!         vec![SystemDependency::before::<Integrate>()]
//!     }
//!
//!     fn queries_mut(&mut self) -> Vec<&mut EntityQuery> {
//!         vec![&mut self.bodies]
//!     }
//!
//!     fn update(&mut self, ctx: &mut UpdateContext<'_, '_>) {
//!         let dt = ctx.delta_secs();
//!         ctx.world.for_each_mut(&mut self.bodies, |mut body| {
//!             body.get_mut::<Velocity>().unwrap().0.y -= 9.81 * dt;
//!         });
//!     }
//! }
//! ```
//!
//! For one-off behavior a closure works too, through [`system_fn`].
//!
//! ## Identity
//!
//! A system is identified by its [`name`](System::name), which defaults to its
//! full Rust type path. Registering a second system with the same name
//! replaces the first in place. [`SystemDependency::before`] and
//! [`SystemDependency::after`] resolve against that default name.
//!
//! ## Comparison
//!
//! - **bevy_ecs**: systems are functions whose parameters are injected;
//!   ordering via `.before()`/`.after()` labels.
//! - Here systems are ordinary structs and own their queries, so the scheduler
//!   can refresh each query's archetype plan before every update.

use std::borrow::Cow;
use std::fmt;

use super::commands::Commands;
use super::query::EntityQuery;
use super::schedule::StageLabel;
use super::world::World;
use crate::time::Time;

/// A unit of per-frame behavior.
pub trait System: Send + 'static {
    /// Identity used for ordering and replacement.
    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed(std::any::type_name::<Self>())
    }

    fn stage(&self) -> StageLabel {
        StageLabel::UPDATE
    }

    /// Ordering constraints against systems of the same stage.
    fn dependencies(&self) -> Vec<SystemDependency> {
        Vec::new()
    }

    /// Queries owned by the system. The scheduler re-plans each of them
    /// against the world right before [`update`](Self::update).
    fn queries_mut(&mut self) -> Vec<&mut EntityQuery> {
        Vec::new()
    }

    fn update(&mut self, ctx: &mut UpdateContext<'_, '_>);
}

/// An ordering constraint, from the point of view of the declaring system.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SystemDependency {
    /// The declaring system starts before the named one.
    Before(Cow<'static, str>),
    /// The declaring system starts after the named one.
    After(Cow<'static, str>),
}

impl SystemDependency {
    pub fn before<S: System>() -> Self {
        Self::Before(Cow::Borrowed(std::any::type_name::<S>()))
    }

    pub fn after<S: System>() -> Self {
        Self::After(Cow::Borrowed(std::any::type_name::<S>()))
    }

    pub fn before_named(name: impl Into<Cow<'static, str>>) -> Self {
        Self::Before(name.into())
    }

    pub fn after_named(name: impl Into<Cow<'static, str>>) -> Self {
        Self::After(name.into())
    }

    /// Name of the other system.
    pub fn target(&self) -> &str {
        match self {
            Self::Before(name) | Self::After(name) => name,
        }
    }
}

impl fmt::Display for SystemDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Before(name) => write!(f, "before {}", short_system_name(name)),
            Self::After(name) => write!(f, "after {}", short_system_name(name)),
        }
    }
}

// ── UpdateContext ────────────────────────────────────────────────────────

/// What a system gets to work with during [`System::update`].
///
/// `world` and `commands` are public fields so a system can iterate the world
/// and record commands at the same time.
pub struct UpdateContext<'a, 's> {
    pub world: &'a mut World,
    pub commands: &'a mut Commands,
    scope: &'a rayon::Scope<'s>,
    stage: &'a StageLabel,
}

impl<'a, 's> UpdateContext<'a, 's> {
    pub(crate) fn new(
        world: &'a mut World,
        commands: &'a mut Commands,
        scope: &'a rayon::Scope<'s>,
        stage: &'a StageLabel,
    ) -> Self {
        Self {
            world,
            commands,
            scope,
            stage,
        }
    }

    pub fn world(&self) -> &World {
        &*self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut *self.world
    }

    pub fn commands(&mut self) -> &mut Commands {
        &mut *self.commands
    }

    /// Stage currently running.
    pub fn stage(&self) -> &StageLabel {
        self.stage
    }

    /// Seconds since the previous frame, `0.0` when no [`Time`] resource exists.
    pub fn delta_secs(&self) -> f32 {
        self.world.get_resource::<Time>().map_or(0.0, Time::delta_secs)
    }

    /// Run `task` on the rayon pool. The current stage does not finish until
    /// the task does.
    pub fn spawn<F>(&self, task: F)
    where
        F: FnOnce() + Send + 's,
    {
        self.scope.spawn(move |_| task());
    }

    /// Run `task` on the rayon pool without waiting for it.
    pub fn spawn_detached<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        rayon::spawn(task);
    }
}

// ── Closure systems ──────────────────────────────────────────────────────

/// A closure with a name, a stage, and dependencies.
pub struct FnSystem<F> {
    name: Cow<'static, str>,
    stage: StageLabel,
    dependencies: Vec<SystemDependency>,
    func: F,
}

/// Wrap a closure as a [`System`] running in the `update` stage.
///
/// ```ignore
/// app.add_system(system_fn("tick_counter", |ctx| {
///     ctx.world.resource_mut::<Ticks>().0 += 1;
/// }));
/// ```
pub fn system_fn<F>(name: impl Into<Cow<'static, str>>, func: F) -> FnSystem<F>
where
    F: FnMut(&mut UpdateContext<'_, '_>) + Send + 'static,
{
    FnSystem {
        name: name.into(),
        stage: StageLabel::UPDATE,
        dependencies: Vec::new(),
        func,
    }
}

impl<F> FnSystem<F> {
    pub fn in_stage(mut self, stage: StageLabel) -> Self {
        self.stage = stage;
        self
    }

    /// Start before the system called `name`.
    pub fn before(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.dependencies.push(SystemDependency::Before(name.into()));
        self
    }

    /// Start after the system called `name`.
    pub fn after(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.dependencies.push(SystemDependency::After(name.into()));
        self
    }
}

impl<F> System for FnSystem<F>
where
    F: FnMut(&mut UpdateContext<'_, '_>) + Send + 'static,
{
    fn name(&self) -> Cow<'static, str> {
        self.name.clone()
    }

    fn stage(&self) -> StageLabel {
        self.stage.clone()
    }

    fn dependencies(&self) -> Vec<SystemDependency> {
        self.dependencies.clone()
    }

    fn update(&mut self, ctx: &mut UpdateContext<'_, '_>) {
        (self.func)(ctx);
    }
}

/// `my_game::physics::Gravity` → `Gravity`, closures → `<closure>`.
pub(crate) fn short_system_name(full: &str) -> String {
    if full.contains("{{closure}}") {
        "<closure>".to_string()
    } else {
        super::component::short_type_name(full)
    }
}
