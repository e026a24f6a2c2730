//! App builder and plugin system.
//!
//! The [`App`] owns a [`World`] and a [`Scheduler`] and drives them one frame
//! at a time. Plugins bundle resources and systems behind one call.
//!
//! ## Example
//!
//! ```ignore
//! use kjarni::prelude::*;
//!
//! let mut app = App::new();
//! app.plugin(HierarchyPlugin)
//!     .insert_resource(Gravity(9.81))
//!     .add_system(Integrate::default());
//!
//! app.initialize()?;
//! loop {
//!     app.update();
//! }
//! ```

use std::time::Duration;

use crate::config::RuntimeConfig;
use crate::ecs::component::ComponentRegistry;
use crate::ecs::{Event, Scheduler, StageLabel, System, World};
use crate::error::{ConfigError, ScheduleError};
use crate::time::Time;

/// A plugin can add resources, systems, and other configuration to the app.
pub trait Plugin {
    fn build(&self, app: &mut App);
}

/// The app builder and frame driver.
pub struct App {
    world: World,
    scheduler: Scheduler,
    config: RuntimeConfig,
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

impl App {
    /// Default stages, default config, empty world.
    pub fn new() -> Self {
        let config = RuntimeConfig::default();
        let scheduler = Scheduler::with_stages(config.stage_labels());
        Self::from_parts(config, scheduler)
    }

    /// Stages and limits from `config`.
    pub fn with_config(config: RuntimeConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let scheduler = Scheduler::with_stages(config.stage_labels());
        Ok(Self::from_parts(config, scheduler))
    }

    fn from_parts(config: RuntimeConfig, scheduler: Scheduler) -> Self {
        let mut world = World::new();
        world.insert_resource(Time::new());
        Self {
            world,
            scheduler,
            config,
        }
    }

    /// Insert a resource into the world.
    pub fn insert_resource<T: 'static + Send + Sync>(&mut self, value: T) -> &mut Self {
        self.world.insert_resource(value);
        self
    }

    /// Register event type `T`.
    pub fn add_event<T: Event>(&mut self) -> &mut Self {
        self.world.add_event::<T>();
        self
    }

    /// Add a system to the stage it names.
    pub fn add_system<S: System>(&mut self, system: S) -> &mut Self {
        self.scheduler.add_system(system);
        self
    }

    pub fn add_system_to_stage<S: System>(&mut self, stage: StageLabel, system: S) -> &mut Self {
        self.scheduler.add_system_to_stage(stage, system);
        self
    }

    /// Apply a plugin.
    pub fn plugin<P: Plugin>(&mut self, plugin: P) -> &mut Self {
        log::debug!("building plugin {}", std::any::type_name::<P>());
        plugin.build(self);
        self
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut Scheduler {
        &mut self.scheduler
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Order every stage, then freeze the component registry if configured.
    /// Call once all plugins and systems are in, to surface a bad schedule as
    /// an error instead of a panic on the first frame.
    pub fn initialize(&mut self) -> Result<(), ScheduleError> {
        self.scheduler.initialize()?;
        if self.config.freeze_registry && !ComponentRegistry::is_frozen() {
            ComponentRegistry::freeze();
            log::info!("component registry frozen with {} types", ComponentRegistry::len());
        }
        Ok(())
    }

    /// Run one frame with the wall-clock time since the previous one, capped
    /// at `max_delta_secs`.
    pub fn update(&mut self) {
        let delta = match self.world.get_resource_mut::<Time>() {
            Some(time) => time.measure(),
            None => Duration::ZERO,
        };
        self.update_with_delta(delta);
    }

    /// Run one frame that lasted `delta` (still capped at `max_delta_secs`).
    pub fn update_with_delta(&mut self, delta: Duration) {
        let delta = self.config.clamp_delta(delta);
        self.scheduler.run_frame(&mut self.world, delta);
    }
}
