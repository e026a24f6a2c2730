//! Per-entity component storage.
//!
//! A [`ComponentSet`] owns one value per component type, remembers the order
//! they were inserted in, and mirrors its keys into a [`BitSet`] signature.
//! Every mutation returns a [`ComponentEvent`]; when the set belongs to an
//! entity stored in a world, [`EntityMut`](super::EntityMut) forwards that
//! event so the world can move the entity to its new archetype.

use std::any::Any;
use std::fmt;

use indexmap::IndexMap;

use super::bitset::BitSet;
use super::component::{Component, ComponentId, ComponentRegistry, ErasedComponent};

/// What a single [`ComponentSet`] mutation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentEvent {
    /// A component that was absent is now present.
    Added(ComponentId),
    /// A present component was overwritten.
    Updated(ComponentId),
    /// A present component was deleted.
    Removed(ComponentId),
}

impl ComponentEvent {
    pub fn id(self) -> ComponentId {
        match self {
            Self::Added(id) | Self::Updated(id) | Self::Removed(id) => id,
        }
    }

    /// `true` when the owning entity's signature changed.
    pub fn changes_signature(self) -> bool {
        !matches!(self, Self::Updated(_))
    }
}

#[derive(Default)]
pub struct ComponentSet {
    components: IndexMap<ComponentId, Box<dyn ErasedComponent>>,
    signature: BitSet,
}

impl ComponentSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the `T` component.
    pub fn set<T: Component>(&mut self, component: T) -> ComponentEvent {
        self.set_boxed(ComponentId::of::<T>(), Box::new(component))
    }

    pub(crate) fn set_boxed(
        &mut self,
        id: ComponentId,
        component: Box<dyn ErasedComponent>,
    ) -> ComponentEvent {
        match self.components.get_mut(&id) {
            Some(slot) => {
                *slot = component;
                ComponentEvent::Updated(id)
            }
            None => {
                self.components.insert(id, component);
                self.signature.insert(id);
                ComponentEvent::Added(id)
            }
        }
    }

    /// Delete the `T` component. `None` if it was not there.
    pub fn remove<T: Component>(&mut self) -> Option<ComponentEvent> {
        self.remove_by_id(ComponentRegistry::lookup::<T>()?)
    }

    pub fn remove_by_id(&mut self, id: ComponentId) -> Option<ComponentEvent> {
        self.components.shift_remove(&id)?;
        self.signature.remove(id);
        Some(ComponentEvent::Removed(id))
    }

    /// Delete everything, reporting one event per component in insertion order.
    pub fn remove_all(&mut self) -> Vec<ComponentEvent> {
        let events = self.components.keys().map(|&id| ComponentEvent::Removed(id)).collect();
        self.components.clear();
        self.signature.clear();
        events
    }

    pub fn get<T: Component>(&self) -> Option<&T> {
        let component = self.components.get(&ComponentRegistry::lookup::<T>()?)?;
        (**component).as_any().downcast_ref::<T>()
    }

    pub fn get_mut<T: Component>(&mut self) -> Option<&mut T> {
        let component = self.components.get_mut(&ComponentRegistry::lookup::<T>()?)?;
        (**component).as_any_mut().downcast_mut::<T>()
    }

    pub fn get_by_id(&self, id: ComponentId) -> Option<&dyn Any> {
        self.components.get(&id).map(|c| (**c).as_any())
    }

    #[inline]
    pub fn has<T: Component>(&self) -> bool {
        ComponentRegistry::lookup::<T>().is_some_and(|id| self.signature.contains(id))
    }

    #[inline]
    pub fn contains(&self, id: ComponentId) -> bool {
        self.signature.contains(id)
    }

    /// Borrow several components at once.
    ///
    /// ```ignore
    /// let (position, velocity) = set.fetch::<(Position, Velocity)>();
    /// ```
    ///
    /// # Panics
    ///
    /// If any requested component is missing.
    pub fn fetch<Q: ComponentTuple>(&self) -> Q::Refs<'_> {
        Q::fetch(self)
    }

    /// Insert every component of `bundle`, in tuple order.
    pub fn insert_bundle<B: Bundle>(&mut self, bundle: B) -> Vec<ComponentEvent> {
        let mut events = Vec::new();
        bundle.insert_into(self, &mut events);
        events
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn signature(&self) -> BitSet {
        self.signature
    }

    /// Component ids in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.components.keys().copied()
    }

    /// `(id, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (ComponentId, &dyn Any)> + '_ {
        self.components.iter().map(|(&id, c)| (id, (**c).as_any()))
    }
}

impl Clone for ComponentSet {
    fn clone(&self) -> Self {
        Self {
            components: self
                .components
                .iter()
                .map(|(&id, c)| (id, (**c).clone_boxed()))
                .collect(),
            signature: self.signature,
        }
    }
}

impl fmt::Debug for ComponentSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.components.values().map(|c| (**c).type_name()))
            .finish()
    }
}

// ── Tuples ───────────────────────────────────────────────────────────────

/// A tuple of component types that can be fetched together.
pub trait ComponentTuple {
    type Refs<'a>;

    fn component_ids() -> Vec<ComponentId>;

    fn fetch(set: &ComponentSet) -> Self::Refs<'_>;
}

/// A tuple of component values that can be inserted together.
pub trait Bundle: Send + 'static {
    fn insert_into(self, set: &mut ComponentSet, events: &mut Vec<ComponentEvent>);
}

fn missing<T>() -> ! {
    panic!(
        "component `{}` is not present on this entity",
        std::any::type_name::<T>()
    )
}

macro_rules! impl_component_tuple {
    ($($T:ident),+) => {
        impl<$($T: Component),+> ComponentTuple for ($($T,)+) {
            type Refs<'a> = ($(&'a $T,)+);

            fn component_ids() -> Vec<ComponentId> {
                vec![$(ComponentId::of::<$T>()),+]
            }

            fn fetch(set: &ComponentSet) -> Self::Refs<'_> {
                ($(set.get::<$T>().unwrap_or_else(|| missing::<$T>()),)+)
            }
        }

        impl<$($T: Component),+> Bundle for ($($T,)+) {
            #[allow(non_snake_case)]
            fn insert_into(self, set: &mut ComponentSet, events: &mut Vec<ComponentEvent>) {
                let ($($T,)+) = self;
                $(events.push(set.set($T));)+
            }
        }
    };
}

impl Bundle for () {
    fn insert_into(self, _set: &mut ComponentSet, _events: &mut Vec<ComponentEvent>) {}
}

impl_component_tuple!(A);
impl_component_tuple!(A, B);
impl_component_tuple!(A, B, C);
impl_component_tuple!(A, B, C, D);
impl_component_tuple!(A, B, C, D, E);
impl_component_tuple!(A, B, C, D, E, F);
impl_component_tuple!(A, B, C, D, E, F, G);
impl_component_tuple!(A, B, C, D, E, F, G, H);
