//! # Commands — deferred world mutations
//!
//! A system that is iterating a query holds `&World` (or the ids collected
//! from it) and cannot restructure the world in the middle of the walk.
//! Instead it records what should happen into a [`Commands`] queue; the
//! scheduler applies the queue, in recording order, right after the system's
//! `update` returns.
//!
//! ```ignore
//! for entity in ctx.world().query(&mut self.expired) {
//!     ctx.commands.remove_entity(entity.id(), true);
//! }
//! ctx.commands.spawn(Entity::new("wave").with(Spawner::default()));
//! ```

use std::fmt;

use super::component::Component;
use super::entity::{Entity, EntityId};
use super::event::Event;
use super::world::World;

type Command = Box<dyn FnOnce(&mut World) + Send>;

/// Ordered queue of pending world mutations.
#[derive(Default)]
pub struct Commands {
    queue: Vec<Command>,
}

impl Commands {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an arbitrary mutation.
    pub fn push(&mut self, command: impl FnOnce(&mut World) + Send + 'static) {
        self.queue.push(Box::new(command));
    }

    /// Queue storing `entity`. Its id is returned immediately.
    pub fn spawn(&mut self, entity: Entity) -> EntityId {
        let id = entity.id();
        self.push(move |world| {
            world.add_entity(entity);
        });
        id
    }

    pub fn insert<T: Component>(&mut self, entity: EntityId, component: T) {
        self.push(move |world| {
            if !world.insert(entity, component) {
                log::debug!("insert skipped: entity {entity} is no longer stored");
            }
        });
    }

    pub fn remove<T: Component>(&mut self, entity: EntityId) {
        self.push(move |world| {
            world.remove::<T>(entity);
        });
    }

    pub fn remove_entity(&mut self, entity: EntityId, recursive: bool) {
        self.push(move |world| {
            world.remove_entity(entity, recursive);
        });
    }

    pub fn add_child(&mut self, parent: EntityId, child: EntityId) {
        self.push(move |world| {
            world.add_child(parent, child);
        });
    }

    pub fn send_event<T: Event>(&mut self, event: T) {
        self.push(move |world| world.send_event(event));
    }

    pub fn insert_resource<T: 'static + Send + Sync>(&mut self, value: T) {
        self.push(move |world| world.insert_resource(value));
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Run every queued command in order, leaving the queue empty.
    pub fn apply(&mut self, world: &mut World) {
        if self.queue.is_empty() {
            return;
        }
        log::trace!("applying {} deferred command(s)", self.queue.len());
        for command in self.queue.drain(..) {
            command(world);
        }
    }
}

impl fmt::Debug for Commands {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Commands").field("len", &self.queue.len()).finish()
    }
}
