use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use super::component::Component;
use super::component_set::{Bundle, ComponentSet};
use super::hierarchy::{Children, Parent};

/// Process-unique entity identifier.
///
/// Ids come from a monotonic counter and are never handed out twice, so a
/// stale id can never alias a newer entity.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(u64);

static NEXT_ENTITY_ID: AtomicU64 = AtomicU64::new(1);

impl EntityId {
    pub(crate) fn allocate() -> Self {
        Self(NEXT_ENTITY_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A named bag of components.
///
/// An `Entity` is built unattached, filled with components, then handed to
/// [`World::add_entity`](super::World::add_entity). From then on the world owns
/// it and hands out `&Entity` or [`EntityMut`](super::EntityMut) views.
///
/// Two entities are equal when their ids are equal.
pub struct Entity {
    id: EntityId,
    name: String,
    active: bool,
    components: ComponentSet,
}

impl Entity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: EntityId::allocate(),
            name: name.into(),
            active: true,
            components: ComponentSet::new(),
        }
    }

    /// Builder-style insert.
    pub fn with<T: Component>(mut self, component: T) -> Self {
        self.components.set(component);
        self
    }

    pub fn with_bundle<B: Bundle>(mut self, bundle: B) -> Self {
        self.components.insert_bundle(bundle);
        self
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Inactive entities are skipped by every query.
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub fn components(&self) -> &ComponentSet {
        &self.components
    }

    /// Direct access to the set. Only reachable for entities not yet stored.
    pub fn components_mut(&mut self) -> &mut ComponentSet {
        &mut self.components
    }

    pub fn get<T: Component>(&self) -> Option<&T> {
        self.components.get::<T>()
    }

    pub fn has<T: Component>(&self) -> bool {
        self.components.has::<T>()
    }

    /// A detached duplicate with a fresh id.
    ///
    /// Hierarchy links are not copied: `Parent`/`Children` name the original's
    /// family and would corrupt it once the copy is stored.
    pub fn copy(&self) -> Entity {
        let mut components = self.components.clone();
        components.remove::<Parent>();
        components.remove::<Children>();
        Entity {
            id: EntityId::allocate(),
            name: self.name.clone(),
            active: self.active,
            components,
        }
    }
}

impl Default for Entity {
    fn default() -> Self {
        Entity::new("Entity")
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Entity {}

impl Hash for Entity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("active", &self.active)
            .field("components", &self.components)
            .finish()
    }
}
