//! # World — the central container
//!
//! The [`World`] owns every stored entity, the archetype index over them, the
//! per-tick change sets, and type-keyed resources.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ World                                                    │
//! │                                                          │
//! │  records: HashMap<EntityId, EntityRecord>                │
//! │    entity (owned) + location (archetype id, row)         │
//! │                                                          │
//! │  archetypes: Vec<Archetype>                              │
//! │    slot i = one signature + ordered member ids           │
//! │  archetype_index: HashMap<BitSet, ArchetypeId>           │
//! │  free_archetypes: reclaimed slots awaiting reuse         │
//! │                                                          │
//! │  added / removed: ids touched during the current tick    │
//! │  pending_removal: detached at the next tick boundary     │
//! │                                                          │
//! │  resources: HashMap<TypeId, Box<dyn Any + Send + Sync>>  │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Mutation
//!
//! The world never hands out `&mut Entity`. Structural changes go through
//! [`EntityMut`], which first mutates the entity's component set and then lets
//! the world react to the resulting [`ComponentEvent`]: adds and removes move
//! the entity to the archetype of its new signature, updates do nothing.
//!
//! ## Ticks
//!
//! [`World::begin_tick`] runs once at the start of every frame. It detaches the
//! entities whose removal was requested during the previous frame, clears the
//! added/removed sets, reclaims empty archetypes and advances the tick counter.

use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use super::archetype::{Archetype, ArchetypeId};
use super::bitset::BitSet;
use super::component::{Component, ComponentId, ComponentRegistry};
use super::component_set::{Bundle, ComponentEvent, ComponentTuple};
use super::entity::{Entity, EntityId};
use super::event::{Event, Events, update_events};
use super::hierarchy::{Children, Parent};
use super::query::{EntityQuery, QueryResult};

/// Where a stored entity lives in archetype storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct EntityLocation {
    pub(crate) archetype: ArchetypeId,
    pub(crate) row: usize,
}

struct EntityRecord {
    entity: Entity,
    location: EntityLocation,
    /// Change tick of the last write to each component.
    changes: HashMap<ComponentId, u64>,
}

impl EntityRecord {
    fn note(&mut self, event: ComponentEvent, tick: u64) {
        match event {
            ComponentEvent::Added(id) | ComponentEvent::Updated(id) => {
                self.changes.insert(id, tick);
            }
            ComponentEvent::Removed(id) => {
                self.changes.remove(&id);
            }
        }
    }

    fn component_mut<T: Component>(&mut self, tick: u64) -> Option<&mut T> {
        let id = ComponentRegistry::lookup::<T>()?;
        let component = self.entity.components_mut().get_mut::<T>()?;
        self.changes.insert(id, tick);
        Some(component)
    }
}

/// Snapshot of world bookkeeping, for overlays and logs.
#[cfg(feature = "diagnostics")]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorldStats {
    pub entities: usize,
    pub archetypes: usize,
    pub free_archetypes: usize,
    pub pending_removal: usize,
    pub stored_this_tick: u32,
    pub detached_this_tick: u32,
}

/// Process-unique identity of a [`World`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorldId(u64);

static NEXT_WORLD_ID: AtomicU64 = AtomicU64::new(0);

impl WorldId {
    fn allocate() -> Self {
        Self(NEXT_WORLD_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// The central container for all game state.
pub struct World {
    id: WorldId,
    records: HashMap<EntityId, EntityRecord>,
    archetypes: Vec<Archetype>,
    archetype_index: HashMap<BitSet, ArchetypeId>,
    free_archetypes: Vec<ArchetypeId>,
    /// Bumped whenever an archetype is created or reclaimed.
    layout_generation: u64,
    added: HashSet<EntityId>,
    removed: HashSet<EntityId>,
    pending_removal: Vec<EntityId>,
    resources: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
    /// Buffer swaps for every registered event type, run by `begin_tick`.
    event_updaters: Vec<(TypeId, fn(&mut World))>,
    tick: u64,
    /// Stamped on component writes; advanced by change-filtered reads.
    change_tick: AtomicU64,
    #[cfg(feature = "diagnostics")]
    stored_this_tick: u32,
    #[cfg(feature = "diagnostics")]
    detached_this_tick: u32,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    pub fn new() -> Self {
        Self {
            id: WorldId::allocate(),
            records: HashMap::new(),
            archetypes: Vec::new(),
            archetype_index: HashMap::new(),
            free_archetypes: Vec::new(),
            layout_generation: 0,
            added: HashSet::new(),
            removed: HashSet::new(),
            pending_removal: Vec::new(),
            resources: HashMap::new(),
            event_updaters: Vec::new(),
            tick: 0,
            change_tick: AtomicU64::new(1),
            #[cfg(feature = "diagnostics")]
            stored_this_tick: 0,
            #[cfg(feature = "diagnostics")]
            detached_this_tick: 0,
        }
    }

    pub fn id(&self) -> WorldId {
        self.id
    }

    // ── Resources ────────────────────────────────────────────────────

    /// Insert a resource (singleton value), replacing any previous value of
    /// the same type.
    pub fn insert_resource<T: 'static + Send + Sync>(&mut self, value: T) {
        self.resources.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// # Panics
    ///
    /// Panics if the resource hasn't been inserted.
    pub fn resource<T: 'static + Send + Sync>(&self) -> &T {
        self.get_resource::<T>().unwrap_or_else(|| missing_resource::<T>())
    }

    /// # Panics
    ///
    /// Panics if the resource hasn't been inserted.
    pub fn resource_mut<T: 'static + Send + Sync>(&mut self) -> &mut T {
        self.get_resource_mut::<T>().unwrap_or_else(|| missing_resource::<T>())
    }

    pub fn get_resource<T: 'static + Send + Sync>(&self) -> Option<&T> {
        self.resources
            .get(&TypeId::of::<T>())
            .and_then(|r| r.downcast_ref::<T>())
    }

    pub fn get_resource_mut<T: 'static + Send + Sync>(&mut self) -> Option<&mut T> {
        self.resources
            .get_mut(&TypeId::of::<T>())
            .and_then(|r| r.downcast_mut::<T>())
    }

    pub fn has_resource<T: 'static + Send + Sync>(&self) -> bool {
        self.resources.contains_key(&TypeId::of::<T>())
    }

    /// Remove a resource, taking ownership.
    ///
    /// Handy for the take/reinsert pattern when a system needs the resource
    /// and `&mut World` at the same time.
    pub fn remove_resource<T: 'static + Send + Sync>(&mut self) -> Option<T> {
        self.resources
            .remove(&TypeId::of::<T>())
            .and_then(|r| r.downcast::<T>().ok())
            .map(|b| *b)
    }

    // ── Events ───────────────────────────────────────────────────────

    /// Register event type `T`: insert an empty [`Events<T>`] and swap its
    /// buffers at every [`begin_tick`](Self::begin_tick). Idempotent.
    pub fn add_event<T: Event>(&mut self) {
        if !self.has_resource::<Events<T>>() {
            self.insert_resource(Events::<T>::new());
        }
        let type_id = TypeId::of::<T>();
        if !self.event_updaters.iter().any(|(id, _)| *id == type_id) {
            self.event_updaters.push((type_id, update_events::<T> as fn(&mut World)));
            log::debug!("registered event `{}`", std::any::type_name::<T>());
        }
    }

    /// Send `event`, registering `T` first if needed.
    pub fn send_event<T: Event>(&mut self, event: T) {
        self.add_event::<T>();
        self.resource_mut::<Events<T>>().send(event);
    }

    /// Both buffers of `T`, `None` if `T` was never registered.
    pub fn events<T: Event>(&self) -> Option<&Events<T>> {
        self.get_resource::<Events<T>>()
    }

    // ── Storing entities ─────────────────────────────────────────────

    /// Store an unattached entity in the archetype matching its signature.
    pub fn add_entity(&mut self, entity: Entity) -> EntityId {
        let id = entity.id();
        debug_assert!(!self.records.contains_key(&id), "entity {id} stored twice");

        let archetype = self.archetype_for(entity.components().signature());
        let row = self.archetypes[archetype.index()].push(id);
        let tick = self.change_tick();
        let changes = entity.components().ids().map(|c| (c, tick)).collect();
        self.records.insert(
            id,
            EntityRecord {
                entity,
                location: EntityLocation { archetype, row },
                changes,
            },
        );
        self.added.insert(id);
        #[cfg(feature = "diagnostics")]
        {
            self.stored_this_tick += 1;
        }
        log::trace!("stored entity {id} in {archetype:?}");
        id
    }

    /// Build and store an entity from a component tuple.
    pub fn spawn<B: Bundle>(&mut self, name: impl Into<String>, bundle: B) -> EntityId {
        self.add_entity(Entity::new(name).with_bundle(bundle))
    }

    pub fn spawn_empty(&mut self, name: impl Into<String>) -> EntityId {
        self.add_entity(Entity::new(name))
    }

    /// Spawn an entity and attach it under `parent`.
    ///
    /// # Panics
    ///
    /// Panics if `parent` is not stored in this world.
    pub fn spawn_child<B: Bundle>(
        &mut self,
        parent: EntityId,
        name: impl Into<String>,
        bundle: B,
    ) -> EntityId {
        assert!(
            self.contains(parent),
            "cannot spawn a child under {parent}: it is not stored in this world"
        );
        let child = self.spawn(name, bundle);
        self.add_child(parent, child);
        child
    }

    // ── Lookup ───────────────────────────────────────────────────────

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.records.get(&id).map(|r| &r.entity)
    }

    /// Mutable view of a stored entity.
    pub fn entity_mut(&mut self, id: EntityId) -> Option<EntityMut<'_>> {
        if self.records.contains_key(&id) {
            Some(EntityMut { world: self, id })
        } else {
            None
        }
    }

    /// `true` while the entity is stored, including while its removal is pending.
    pub fn contains(&self, id: EntityId) -> bool {
        self.records.contains_key(&id)
    }

    pub fn entity_count(&self) -> usize {
        self.records.len()
    }

    /// Stored entities, archetype by archetype.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> + '_ {
        self.archetypes()
            .flat_map(|a| a.entities().iter())
            .filter_map(move |id| self.get(*id))
    }

    /// Every stored entity with the given name. Names are not unique.
    pub fn entities_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Entity> + 'a {
        self.entities().filter(move |e| e.name() == name)
    }

    pub fn component<T: Component>(&self, id: EntityId) -> Option<&T> {
        self.get(id)?.get::<T>()
    }

    /// Mutable access to one component. Counts as a change of that component.
    pub fn component_mut<T: Component>(&mut self, id: EntityId) -> Option<&mut T> {
        let tick = self.change_tick();
        self.records.get_mut(&id)?.component_mut::<T>(tick)
    }

    /// Change tick of the last write to component `component` of `id`.
    pub fn component_change_tick(&self, id: EntityId, component: ComponentId) -> Option<u64> {
        self.records.get(&id)?.changes.get(&component).copied()
    }

    /// Tick stamped on component writes made now.
    pub fn change_tick(&self) -> u64 {
        self.change_tick.load(Ordering::Acquire)
    }

    /// Close the current change window: returns the tick writes were stamped
    /// with so far, and stamps later writes with the next one.
    pub(crate) fn advance_change_tick(&self) -> u64 {
        self.change_tick.fetch_add(1, Ordering::AcqRel)
    }

    /// Insert or overwrite a component. Returns `false` if the entity is not stored.
    pub fn insert<T: Component>(&mut self, id: EntityId, component: T) -> bool {
        match self.entity_mut(id) {
            Some(mut entity) => {
                entity.set(component);
                true
            }
            None => false,
        }
    }

    /// Remove a component. Returns `true` if it was present.
    pub fn remove<T: Component>(&mut self, id: EntityId) -> bool {
        self.entity_mut(id).is_some_and(|mut entity| entity.remove::<T>())
    }

    // ── Archetypes ───────────────────────────────────────────────────

    /// Archetypes currently in use, in slot order.
    pub fn archetypes(&self) -> impl Iterator<Item = &Archetype> + '_ {
        self.archetypes.iter().filter(|a| a.is_in_use())
    }

    pub fn archetype_count(&self) -> usize {
        self.archetypes.len() - self.free_archetypes.len()
    }

    pub fn archetype(&self, id: ArchetypeId) -> Option<&Archetype> {
        self.archetypes.get(id.index()).filter(|a| a.is_in_use())
    }

    pub fn archetype_of(&self, entity: EntityId) -> Option<&Archetype> {
        let location = self.records.get(&entity)?.location;
        self.archetypes.get(location.archetype.index())
    }

    /// Every slot, including reclaimed ones.
    pub(crate) fn archetype_slots(&self) -> &[Archetype] {
        &self.archetypes
    }

    /// Changes whenever the set of archetypes changes. Query plans compare
    /// it, together with [`id`](Self::id), to decide whether they need
    /// re-planning.
    pub fn layout_generation(&self) -> u64 {
        self.layout_generation
    }

    fn archetype_for(&mut self, signature: BitSet) -> ArchetypeId {
        if let Some(&id) = self.archetype_index.get(&signature) {
            return id;
        }
        let id = match self.free_archetypes.pop() {
            Some(id) => {
                self.archetypes[id.index()].reuse(signature);
                id
            }
            None => {
                let id = ArchetypeId::from_index(self.archetypes.len());
                self.archetypes.push(Archetype::new(id, signature));
                id
            }
        };
        self.archetype_index.insert(signature, id);
        self.layout_generation += 1;
        log::debug!("created {id:?} for signature {signature:?}");
        id
    }

    /// Swap-remove the member at `location`, fixing the row of whichever
    /// entity took its place.
    fn unlink(&mut self, location: EntityLocation) {
        let moved = self.archetypes[location.archetype.index()].swap_remove(location.row);
        if let Some(moved) = moved {
            if let Some(record) = self.records.get_mut(&moved) {
                record.location.row = location.row;
            }
        }
    }

    /// Move `id` to the archetype matching its current signature.
    fn migrate(&mut self, id: EntityId) {
        let Some(record) = self.records.get(&id) else {
            return;
        };
        let signature = record.entity.components().signature();
        let from = record.location;
        if *self.archetypes[from.archetype.index()].signature() == signature {
            return;
        }

        let to = self.archetype_for(signature);
        self.unlink(from);
        let row = self.archetypes[to.index()].push(id);
        if let Some(record) = self.records.get_mut(&id) {
            record.location = EntityLocation { archetype: to, row };
        }
        log::trace!("entity {id} moved {:?} -> {to:?}", from.archetype);
    }

    /// Stamp the changes and move the entity once if its signature changed.
    pub(crate) fn apply_component_events(&mut self, id: EntityId, events: &[ComponentEvent]) {
        let tick = self.change_tick();
        let Some(record) = self.records.get_mut(&id) else {
            return;
        };
        for &event in events {
            record.note(event, tick);
        }
        if events.iter().any(|e| e.changes_signature()) {
            self.migrate(id);
        }
    }

    fn reclaim_empty_archetypes(&mut self) {
        let mut reclaimed = 0;
        for archetype in &mut self.archetypes {
            if archetype.is_in_use() && archetype.is_empty() {
                self.archetype_index.remove(archetype.signature());
                archetype.retire();
                self.free_archetypes.push(archetype.id());
                reclaimed += 1;
            }
        }
        if reclaimed > 0 {
            self.layout_generation += 1;
            log::debug!("reclaimed {reclaimed} empty archetype(s)");
        }
    }

    // ── Hierarchy ────────────────────────────────────────────────────

    /// Attach `child` under `parent`, detaching it from any previous parent.
    ///
    /// Returns `false` if either entity is not stored, if they are the same
    /// entity, or if `parent` is a descendant of `child`.
    pub fn add_child(&mut self, parent: EntityId, child: EntityId) -> bool {
        if parent == child || !self.contains(parent) || !self.contains(child) {
            return false;
        }
        if self.descendants(child).contains(&parent) {
            log::warn!("refusing to parent {child} under its own descendant {parent}");
            return false;
        }

        let previous = self.component::<Parent>(child).map(|p| p.0);
        if previous == Some(parent) {
            return true;
        }
        if let Some(previous) = previous {
            self.forget_child(previous, child);
        }

        self.insert(child, Parent(parent));
        if let Some(children) = self.component_mut::<Children>(parent) {
            children.0.push(child);
        } else {
            self.insert(parent, Children(vec![child]));
        }
        true
    }

    /// Detach `child` from `parent`. Returns `false` if it was not a child of `parent`.
    pub fn remove_child(&mut self, parent: EntityId, child: EntityId) -> bool {
        if self.component::<Parent>(child).map(|p| p.0) != Some(parent) {
            return false;
        }
        self.remove::<Parent>(child);
        self.forget_child(parent, child);
        true
    }

    fn forget_child(&mut self, parent: EntityId, child: EntityId) {
        if let Some(children) = self.component_mut::<Children>(parent) {
            children.0.retain(|&c| c != child);
        }
    }

    /// All stored descendants of `id`, breadth-first, excluding `id` itself.
    pub fn descendants(&self, id: EntityId) -> Vec<EntityId> {
        let mut out = Vec::new();
        let mut seen = HashSet::from([id]);
        let mut queue = VecDeque::from([id]);
        while let Some(current) = queue.pop_front() {
            let Some(children) = self.component::<Children>(current) else {
                continue;
            };
            for &child in &children.0 {
                if self.contains(child) && seen.insert(child) {
                    out.push(child);
                    queue.push_back(child);
                }
            }
        }
        out
    }

    // ── Removal ──────────────────────────────────────────────────────

    /// Mark an entity (and with `recursive`, all of its descendants) for
    /// removal. The entity stays stored and visible to `REMOVED` queries until
    /// the next [`begin_tick`](Self::begin_tick).
    ///
    /// Returns `false` if the entity is not stored. Marking twice is the same
    /// as marking once.
    pub fn remove_entity(&mut self, id: EntityId, recursive: bool) -> bool {
        if !self.contains(id) {
            return false;
        }
        let mut targets = vec![id];
        if recursive {
            targets.extend(self.descendants(id));
        }
        for target in targets {
            if self.removed.insert(target) {
                self.pending_removal.push(target);
            }
        }
        true
    }

    /// Mark every stored entity for removal.
    pub fn despawn_all(&mut self) {
        let ids: Vec<EntityId> = self.records.keys().copied().collect();
        for id in ids {
            if self.removed.insert(id) {
                self.pending_removal.push(id);
            }
        }
    }

    pub fn is_pending_removal(&self, id: EntityId) -> bool {
        self.removed.contains(&id)
    }

    /// Unlink a stored entity immediately and return it.
    fn detach(&mut self, id: EntityId) -> Option<Entity> {
        let record = self.records.remove(&id)?;
        self.unlink(record.location);

        if let Some(parent) = record.entity.get::<Parent>().map(|p| p.0) {
            self.forget_child(parent, id);
        }
        if let Some(children) = record.entity.get::<Children>() {
            for &child in &children.0 {
                if self.component::<Parent>(child).map(|p| p.0) == Some(id) {
                    self.remove::<Parent>(child);
                }
            }
        }

        #[cfg(feature = "diagnostics")]
        {
            self.detached_this_tick += 1;
        }
        log::debug!("detached entity {id} `{}`", record.entity.name());
        Some(record.entity)
    }

    // ── Ticks ────────────────────────────────────────────────────────

    /// Start a new tick: detach pending removals, swap event buffers, clear
    /// change sets, reclaim empty archetypes, advance the counter.
    pub fn begin_tick(&mut self) {
        #[cfg(feature = "diagnostics")]
        {
            self.stored_this_tick = 0;
            self.detached_this_tick = 0;
        }

        for id in std::mem::take(&mut self.pending_removal) {
            self.detach(id);
        }
        for i in 0..self.event_updaters.len() {
            let update = self.event_updaters[i].1;
            update(self);
        }
        self.added.clear();
        self.removed.clear();
        self.reclaim_empty_archetypes();
        self.tick += 1;
    }

    /// Number of tick boundaries crossed so far.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Ids stored since the current tick began.
    pub fn added_entities(&self) -> &HashSet<EntityId> {
        &self.added
    }

    /// Ids marked for removal since the current tick began.
    pub fn removed_entities(&self) -> &HashSet<EntityId> {
        &self.removed
    }

    #[cfg(feature = "diagnostics")]
    pub fn stats(&self) -> WorldStats {
        WorldStats {
            entities: self.records.len(),
            archetypes: self.archetype_count(),
            free_archetypes: self.free_archetypes.len(),
            pending_removal: self.pending_removal.len(),
            stored_this_tick: self.stored_this_tick,
            detached_this_tick: self.detached_this_tick,
        }
    }

    // ── Query ────────────────────────────────────────────────────────

    /// Re-plan `query` if the archetype layout changed, then iterate it.
    ///
    /// ```ignore
    /// let mut movers = EntityQuery::new(QueryPredicate::has::<Position>() & QueryPredicate::has::<Velocity>());
    /// for entity in world.query(&mut movers) {
    ///     let (pos, vel) = entity.components().fetch::<(Position, Velocity)>();
    /// }
    /// ```
    pub fn query<'w>(&'w self, query: &'w mut EntityQuery) -> QueryResult<'w> {
        query.update_archetypes(self);
        query.open_change_window(self);
        query.iter(self)
    }

    /// Run `f` with mutable access to every entity matching `query`.
    ///
    /// Matching ids are collected before the first call, so component
    /// changes made by `f` cannot disturb the walk.
    ///
    /// Writes made by `f` are not reported back to the same query's change
    /// filter on its next run.
    pub fn for_each_mut(&mut self, query: &mut EntityQuery, mut f: impl FnMut(EntityMut<'_>)) {
        query.update_archetypes(self);
        query.open_change_window(self);
        let ids: Vec<EntityId> = query.iter(self).ids().collect();
        for id in ids {
            if let Some(entity) = self.entity_mut(id) {
                f(entity);
            }
        }
        query.skip_changes_until_now(self);
    }
}

fn missing_resource<T>() -> ! {
    panic!(
        "Resource `{}` not found. Did you forget to insert it?",
        std::any::type_name::<T>()
    )
}

// ── EntityMut ────────────────────────────────────────────────────────────

/// Mutable access to one stored entity.
///
/// Component changes made here are reported to the world straight away, so
/// archetype membership always matches the entity's signature.
pub struct EntityMut<'w> {
    world: &'w mut World,
    id: EntityId,
}

impl<'w> EntityMut<'w> {
    fn record(&self) -> &EntityRecord {
        self.world
            .records
            .get(&self.id)
            .unwrap_or_else(|| panic!("entity {} is no longer stored", self.id))
    }

    fn record_mut(&mut self) -> &mut EntityRecord {
        let id = self.id;
        self.world
            .records
            .get_mut(&id)
            .unwrap_or_else(|| panic!("entity {id} is no longer stored"))
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn entity(&self) -> &Entity {
        &self.record().entity
    }

    pub fn world(&self) -> &World {
        &*self.world
    }

    pub fn name(&self) -> &str {
        self.entity().name()
    }

    pub fn set_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.record_mut().entity.set_name(name);
        self
    }

    pub fn is_active(&self) -> bool {
        self.entity().is_active()
    }

    pub fn set_active(&mut self, active: bool) -> &mut Self {
        self.record_mut().entity.set_active(active);
        self
    }

    pub fn get<T: Component>(&self) -> Option<&T> {
        self.entity().get::<T>()
    }

    /// Counts as a change of `T`.
    pub fn get_mut<T: Component>(&mut self) -> Option<&mut T> {
        let tick = self.world.change_tick();
        self.record_mut().component_mut::<T>(tick)
    }

    pub fn has<T: Component>(&self) -> bool {
        self.entity().has::<T>()
    }

    /// # Panics
    ///
    /// If any requested component is missing.
    pub fn fetch<Q: ComponentTuple>(&self) -> Q::Refs<'_> {
        self.entity().components().fetch::<Q>()
    }

    /// Insert or overwrite a component, moving the entity if its signature changed.
    pub fn set<T: Component>(&mut self, component: T) -> &mut Self {
        let event = self.record_mut().entity.components_mut().set(component);
        self.world.apply_component_events(self.id, &[event]);
        self
    }

    pub fn insert_bundle<B: Bundle>(&mut self, bundle: B) -> &mut Self {
        let events = self.record_mut().entity.components_mut().insert_bundle(bundle);
        self.world.apply_component_events(self.id, &events);
        self
    }

    /// Returns `true` if the component was present.
    pub fn remove<T: Component>(&mut self) -> bool {
        match self.record_mut().entity.components_mut().remove::<T>() {
            Some(event) => {
                self.world.apply_component_events(self.id, &[event]);
                true
            }
            None => false,
        }
    }

    pub fn remove_all(&mut self) -> &mut Self {
        let events = self.record_mut().entity.components_mut().remove_all();
        self.world.apply_component_events(self.id, &events);
        self
    }

    pub fn add_child(&mut self, child: EntityId) -> bool {
        self.world.add_child(self.id, child)
    }

    /// See [`World::remove_entity`].
    pub fn remove_from_scene(&mut self, recursive: bool) {
        self.world.remove_entity(self.id, recursive);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Velocity {
        dx: f32,
        dy: f32,
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Health(u32);

    #[derive(Debug, Clone)]
    struct Frozen;

    /// Every stored entity sits in exactly one archetype whose signature
    /// equals its own, at the row its location records.
    fn assert_consistent(world: &World) {
        for (id, record) in &world.records {
            let archetype = &world.archetypes[record.location.archetype.index()];
            assert!(archetype.is_in_use());
            assert_eq!(archetype.entities()[record.location.row], *id);
            assert_eq!(*archetype.signature(), record.entity.components().signature());
        }
        let members: usize = world.archetypes().map(|a| a.len()).sum();
        assert_eq!(members, world.entity_count());
        for archetype in world.archetypes() {
            assert_eq!(world.archetype_index.get(archetype.signature()), Some(&archetype.id()));
        }
    }

    #[test]
    fn add_entity_groups_by_signature() {
        let mut world = World::new();
        let a = world.spawn("a", (Position { x: 0.0, y: 0.0 },));
        let b = world.spawn("b", (Position { x: 1.0, y: 0.0 },));
        let c = world.spawn("c", (Position { x: 1.0, y: 0.0 }, Velocity { dx: 0.0, dy: 0.0 }));

        assert_eq!(world.entity_count(), 3);
        assert_eq!(world.archetype_count(), 2);
        assert_eq!(world.archetype_of(a).map(|x| x.id()), world.archetype_of(b).map(|x| x.id()));
        assert_ne!(world.archetype_of(a).map(|x| x.id()), world.archetype_of(c).map(|x| x.id()));
        assert!(world.added_entities().contains(&a));
        assert_consistent(&world);
    }

    #[test]
    fn set_migrates_and_update_does_not() {
        let mut world = World::new();
        let e = world.spawn("e", (Position { x: 0.0, y: 0.0 },));
        let before = world.archetype_of(e).map(|a| a.id());
        let generation = world.layout_generation();

        world.entity_mut(e).unwrap().set(Position { x: 5.0, y: 5.0 });
        assert_eq!(world.archetype_of(e).map(|a| a.id()), before);
        assert_eq!(world.layout_generation(), generation);

        world.entity_mut(e).unwrap().set(Velocity { dx: 1.0, dy: 1.0 });
        assert_ne!(world.archetype_of(e).map(|a| a.id()), before);
        assert!(world.layout_generation() > generation);
        assert_consistent(&world);

        assert!(world.entity_mut(e).unwrap().remove::<Velocity>());
        assert_eq!(world.archetype_of(e).map(|a| a.id()), before);
        assert!(!world.entity_mut(e).unwrap().remove::<Velocity>());
        assert_consistent(&world);
    }

    #[test]
    fn migration_fixes_swapped_rows() {
        let mut world = World::new();
        let ids: Vec<EntityId> = (0..4)
            .map(|i| world.spawn(format!("e{i}"), (Health(i),)))
            .collect();

        // Moving the first member out pulls the last one into row 0.
        world.insert(ids[0], Frozen);
        assert_consistent(&world);
        world.insert(ids[2], Frozen);
        assert_consistent(&world);

        assert_eq!(world.component::<Health>(ids[3]), Some(&Health(3)));
        assert_eq!(world.archetype_of(ids[0]).unwrap().len(), 2);
    }

    #[test]
    fn removal_is_deferred_to_tick_boundary() {
        let mut world = World::new();
        let e = world.spawn("doomed", (Health(1),));
        world.begin_tick();

        assert!(world.remove_entity(e, false));
        assert!(world.contains(e));
        assert!(world.is_pending_removal(e));
        assert!(world.removed_entities().contains(&e));

        world.begin_tick();
        assert!(!world.contains(e));
        assert!(world.removed_entities().is_empty());
        assert!(!world.remove_entity(e, false));
        assert_consistent(&world);
    }

    #[test]
    fn removing_twice_is_removing_once() {
        let mut world = World::new();
        let e = world.spawn("e", (Health(1),));
        let keep = world.spawn("keep", (Health(2),));

        world.remove_entity(e, false);
        world.remove_entity(e, false);
        assert_eq!(world.pending_removal.len(), 1);

        world.begin_tick();
        assert_eq!(world.entity_count(), 1);
        assert!(world.contains(keep));
        assert_consistent(&world);
    }

    #[test]
    fn recursive_removal_takes_descendants() {
        let mut world = World::new();
        let root = world.spawn_empty("root");
        let child = world.spawn_child(root, "child", (Health(1),));
        let grandchild = world.spawn_child(child, "grandchild", (Health(2),));
        let other = world.spawn_child(root, "other", (Health(3),));

        assert_eq!(world.descendants(root), vec![child, other, grandchild]);

        world.remove_entity(child, true);
        assert!(world.is_pending_removal(grandchild));
        assert!(!world.is_pending_removal(other));

        world.begin_tick();
        assert!(!world.contains(child));
        assert!(!world.contains(grandchild));
        assert_eq!(world.component::<Children>(root).map(|c| c.0.clone()), Some(vec![other]));
        assert_consistent(&world);
    }

    #[test]
    fn non_recursive_removal_orphans_children() {
        let mut world = World::new();
        let root = world.spawn_empty("root");
        let child = world.spawn_child(root, "child", (Health(1),));

        world.remove_entity(root, false);
        world.begin_tick();

        assert!(world.contains(child));
        assert!(world.component::<Parent>(child).is_none());
        assert_consistent(&world);
    }

    #[test]
    fn reparenting_moves_child() {
        let mut world = World::new();
        let a = world.spawn_empty("a");
        let b = world.spawn_empty("b");
        let c = world.spawn_empty("c");

        assert!(world.add_child(a, c));
        assert!(world.add_child(b, c));
        assert_eq!(world.component::<Parent>(c).map(|p| p.0), Some(b));
        assert_eq!(world.component::<Children>(a).map(|x| x.0.len()), Some(0));
        assert_eq!(world.component::<Children>(b).map(|x| x.0.clone()), Some(vec![c]));

        // No cycles, no self-parenting.
        assert!(!world.add_child(c, b));
        assert!(!world.add_child(c, c));

        assert!(world.remove_child(b, c));
        assert!(!world.remove_child(b, c));
        assert!(world.component::<Parent>(c).is_none());
        assert_consistent(&world);
    }

    #[test]
    fn empty_archetypes_are_reclaimed_and_reused() {
        let mut world = World::new();
        let e = world.spawn("e", (Health(1),));
        world.insert(e, Frozen);

        // The {Health} archetype is empty but survives until the boundary.
        assert_eq!(world.archetype_count(), 2);
        world.begin_tick();
        assert_eq!(world.archetype_count(), 1);
        assert_eq!(world.free_archetypes.len(), 1);

        let slots = world.archetype_slots().len();
        world.spawn("f", (Velocity { dx: 0.0, dy: 0.0 },));
        assert_eq!(world.archetype_slots().len(), slots);
        assert!(world.free_archetypes.is_empty());
        assert_consistent(&world);
    }

    #[test]
    fn change_sets_cleared_at_tick_start() {
        let mut world = World::new();
        let e = world.spawn("e", (Health(1),));
        assert!(world.added_entities().contains(&e));
        assert_eq!(world.tick(), 0);

        world.begin_tick();
        assert!(world.added_entities().is_empty());
        assert_eq!(world.tick(), 1);
    }

    #[test]
    fn despawn_all_marks_everything() {
        let mut world = World::new();
        for i in 0..5 {
            world.spawn(format!("e{i}"), (Health(i),));
        }
        world.despawn_all();
        assert_eq!(world.removed_entities().len(), 5);
        world.begin_tick();
        assert_eq!(world.entity_count(), 0);
        assert_eq!(world.archetype_count(), 0);
    }

    #[test]
    fn names_are_not_unique() {
        let mut world = World::new();
        world.spawn_empty("goblin");
        world.spawn_empty("goblin");
        world.spawn_empty("orc");
        assert_eq!(world.entities_named("goblin").count(), 2);
        assert_eq!(world.entities().count(), 3);
    }

    #[test]
    fn entity_mut_chaining() {
        let mut world = World::new();
        let e = world.spawn_empty("e");
        world
            .entity_mut(e)
            .unwrap()
            .set(Health(9))
            .set(Position { x: 1.0, y: 2.0 })
            .set_active(false);

        let view = world.get(e).unwrap();
        assert!(!view.is_active());
        assert_eq!(view.get::<Health>(), Some(&Health(9)));
        assert_consistent(&world);

        world.entity_mut(e).unwrap().remove_all();
        assert!(world.get(e).unwrap().components().is_empty());
        assert_consistent(&world);
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Ping(u32);

    #[test]
    fn events_swap_at_tick_boundary() {
        let mut world = World::new();
        assert!(world.events::<Ping>().is_none());

        world.send_event(Ping(1));
        world.begin_tick();
        world.send_event(Ping(2));
        let seen: Vec<Ping> = world.events::<Ping>().unwrap().iter().cloned().collect();
        assert_eq!(seen, vec![Ping(1), Ping(2)]);

        world.begin_tick();
        let seen: Vec<Ping> = world.events::<Ping>().unwrap().iter().cloned().collect();
        assert_eq!(seen, vec![Ping(2)]);

        world.begin_tick();
        assert!(world.events::<Ping>().unwrap().is_empty());

        world.add_event::<Ping>();
        assert_eq!(world.event_updaters.len(), 1);
    }

    #[test]
    fn writes_are_stamped_with_the_change_tick() {
        let mut world = World::new();
        let e = world.spawn("e", (Health(1),));
        let health = ComponentId::of::<Health>();
        let stored_at = world.component_change_tick(e, health).unwrap();

        world.advance_change_tick();
        world.component_mut::<Health>(e).unwrap().0 = 2;
        assert!(world.component_change_tick(e, health).unwrap() > stored_at);

        world.remove::<Health>(e);
        assert_eq!(world.component_change_tick(e, health), None);
    }

    #[test]
    fn resources() {
        let mut world = World::new();
        world.insert_resource(42u32);
        world.insert_resource(String::from("hello"));

        assert_eq!(*world.resource::<u32>(), 42);
        assert_eq!(world.resource::<String>(), "hello");

        *world.resource_mut::<u32>() = 99;
        assert_eq!(*world.resource::<u32>(), 99);
    }

    #[test]
    fn remove_resource_and_reinsert() {
        let mut world = World::new();
        world.insert_resource(String::from("hello"));

        let taken = world.remove_resource::<String>();
        assert_eq!(taken, Some(String::from("hello")));
        assert!(!world.has_resource::<String>());

        world.insert_resource(taken.unwrap());
        assert_eq!(world.resource::<String>(), "hello");
        assert_eq!(world.remove_resource::<u64>(), None);
    }

    #[test]
    #[should_panic(expected = "Did you forget to insert it?")]
    fn missing_resource_panics() {
        let world = World::new();
        let _ = world.resource::<u8>();
    }

    #[cfg(feature = "diagnostics")]
    #[test]
    fn stats_track_tick_activity() {
        let mut world = World::new();
        let e = world.spawn_empty("e");
        world.spawn_empty("f");
        assert_eq!(world.stats().stored_this_tick, 2);

        world.remove_entity(e, false);
        assert_eq!(world.stats().pending_removal, 1);
        world.begin_tick();

        let stats = world.stats();
        assert_eq!(stats.entities, 1);
        assert_eq!(stats.stored_this_tick, 0);
        assert_eq!(stats.detached_this_tick, 1);
    }
}
