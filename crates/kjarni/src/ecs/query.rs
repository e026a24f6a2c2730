//! # Queries — predicates, filters, and cached archetype plans
//!
//! A query is two independent parts:
//!
//! - a [`QueryPredicate`], a boolean expression over component *types* that is
//!   evaluated once per archetype signature, and
//! - a [`QueryFilter`], which looks at each entity's lifecycle during the
//!   current tick (stored, just added, marked for removal).
//!
//! ```ignore
//! use kjarni::prelude::*;
//!
//! let mut movers = EntityQuery::new(
//!     QueryPredicate::has::<Position>() & QueryPredicate::has::<Velocity>() & !QueryPredicate::has::<Frozen>(),
//! );
//!
//! for entity in world.query(&mut movers) {
//!     let (pos, vel) = entity.components().fetch::<(Position, Velocity)>();
//! }
//! ```
//!
//! [`EntityQuery`] caches the list of archetypes its predicate matched
//! together with the world id and layout generation at planning time.
//! Re-planning is skipped while both are unchanged, so a steady-state frame
//! costs one comparison per query instead of a pass over every archetype.
//!
//! ## Comparison
//!
//! - **bevy_ecs**: filters are types (`With<T>`, `Without<T>`, `Or<(..)>`)
//!   resolved at compile time.
//! - Here predicates are plain values, so they can be built at runtime,
//!   printed, and combined with `&`, `|` and `!`.

use std::collections::HashSet;
use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign, Not};

use rayon::prelude::*;

use super::archetype::{Archetype, ArchetypeId};
use super::bitset::BitSet;
use super::component::{Component, ComponentId};
use super::component_set::ComponentTuple;
use super::entity::{Entity, EntityId};
use super::world::{World, WorldId};

// ── Predicate ────────────────────────────────────────────────────────────

/// Boolean expression over an archetype signature.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum QueryPredicate {
    Has(ComponentId),
    Without(ComponentId),
    And(Box<QueryPredicate>, Box<QueryPredicate>),
    Or(Box<QueryPredicate>, Box<QueryPredicate>),
    Not(Box<QueryPredicate>),
    /// Matches every signature.
    Always,
    /// Matches no signature.
    Never,
}

impl QueryPredicate {
    /// Matches signatures containing `T`.
    ///
    /// # Panics
    ///
    /// If `T` is new and the component registry is frozen.
    pub fn has<T: Component>() -> Self {
        Self::Has(ComponentId::of::<T>())
    }

    pub fn without<T: Component>() -> Self {
        Self::Without(ComponentId::of::<T>())
    }

    /// Matches signatures containing every type of the tuple.
    pub fn has_all<Q: ComponentTuple>() -> Self {
        Self::all(Q::component_ids().into_iter().map(Self::Has))
    }

    /// Conjunction of `predicates`. An empty conjunction matches everything.
    pub fn all(predicates: impl IntoIterator<Item = QueryPredicate>) -> Self {
        predicates
            .into_iter()
            .reduce(|acc, p| acc.and(p))
            .unwrap_or(Self::Always)
    }

    /// Disjunction of `predicates`. An empty disjunction matches nothing.
    pub fn any(predicates: impl IntoIterator<Item = QueryPredicate>) -> Self {
        predicates
            .into_iter()
            .reduce(|acc, p| acc.or(p))
            .unwrap_or(Self::Never)
    }

    pub fn and(self, rhs: QueryPredicate) -> Self {
        Self::And(Box::new(self), Box::new(rhs))
    }

    pub fn or(self, rhs: QueryPredicate) -> Self {
        Self::Or(Box::new(self), Box::new(rhs))
    }

    /// Evaluate against a signature, short-circuiting like `&&` and `||`.
    pub fn evaluate(&self, signature: &BitSet) -> bool {
        match self {
            Self::Has(id) => signature.contains(*id),
            Self::Without(id) => !signature.contains(*id),
            Self::And(l, r) => l.evaluate(signature) && r.evaluate(signature),
            Self::Or(l, r) => l.evaluate(signature) || r.evaluate(signature),
            Self::Not(p) => !p.evaluate(signature),
            Self::Always => true,
            Self::Never => false,
        }
    }
}

impl BitAnd for QueryPredicate {
    type Output = QueryPredicate;

    fn bitand(self, rhs: QueryPredicate) -> QueryPredicate {
        self.and(rhs)
    }
}

impl BitOr for QueryPredicate {
    type Output = QueryPredicate;

    fn bitor(self, rhs: QueryPredicate) -> QueryPredicate {
        self.or(rhs)
    }
}

impl Not for QueryPredicate {
    type Output = QueryPredicate;

    fn not(self) -> QueryPredicate {
        Self::Not(Box::new(self))
    }
}

fn short_name(id: ComponentId) -> String {
    super::component::short_type_name(id.type_name())
}

impl fmt::Display for QueryPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Has(id) => write!(f, "has({})", short_name(*id)),
            Self::Without(id) => write!(f, "without({})", short_name(*id)),
            Self::And(l, r) => write!(f, "({l} & {r})"),
            Self::Or(l, r) => write!(f, "({l} | {r})"),
            Self::Not(p) => write!(f, "!{p}"),
            Self::Always => f.write_str("always"),
            Self::Never => f.write_str("never"),
        }
    }
}

impl fmt::Debug for QueryPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

// ── Filter ───────────────────────────────────────────────────────────────

/// Which lifecycle states an entity may be in to be yielded.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueryFilter(u8);

impl QueryFilter {
    /// Stored during the current tick.
    pub const ADDED: Self = Self(1 << 0);
    /// Stored in the world.
    pub const STORED: Self = Self(1 << 1);
    /// Marked for removal during the current tick.
    pub const REMOVED: Self = Self(1 << 2);
    pub const ALL: Self = Self(Self::ADDED.0 | Self::STORED.0 | Self::REMOVED.0);

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Lifecycle test for one stored entity.
    fn accepts(self, world: &World, id: EntityId) -> bool {
        if self.contains(Self::ALL) {
            true
        } else if self.contains(Self::ADDED) && world.added_entities().contains(&id) {
            true
        } else if self.contains(Self::REMOVED) && world.removed_entities().contains(&id) {
            true
        } else {
            self.contains(Self::STORED)
        }
    }
}

impl Default for QueryFilter {
    fn default() -> Self {
        Self::ALL
    }
}

impl BitOr for QueryFilter {
    type Output = QueryFilter;

    fn bitor(self, rhs: QueryFilter) -> QueryFilter {
        self.union(rhs)
    }
}

impl BitOrAssign for QueryFilter {
    fn bitor_assign(&mut self, rhs: QueryFilter) {
        *self = self.union(rhs);
    }
}

impl fmt::Debug for QueryFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Self::ADDED, "ADDED"),
            (Self::STORED, "STORED"),
            (Self::REMOVED, "REMOVED"),
        ];
        let set: Vec<&str> = names
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        if set.is_empty() {
            f.write_str("QueryFilter(empty)")
        } else {
            write!(f, "QueryFilter({})", set.join(" | "))
        }
    }
}

// ── EntityQuery ──────────────────────────────────────────────────────────

/// Archetypes matched in one world at a given layout generation.
#[derive(Debug, Clone, Default)]
pub struct QueryState {
    archetypes: Vec<ArchetypeId>,
    planned: Option<(WorldId, u64)>,
}

impl QueryState {
    pub fn archetypes(&self) -> &[ArchetypeId] {
        &self.archetypes
    }

    /// Layout generation the plan was built at, `None` before the first plan.
    pub fn generation(&self) -> Option<u64> {
        self.planned.map(|(_, generation)| generation)
    }

    /// World the plan was built against.
    pub fn world(&self) -> Option<WorldId> {
        self.planned.map(|(world, _)| world)
    }
}

/// A predicate, a lifecycle filter, and the cached archetype plan.
#[derive(Debug, Clone)]
pub struct EntityQuery {
    predicate: QueryPredicate,
    filter: QueryFilter,
    state: QueryState,
    /// Components that must have been written inside the change window.
    changed: Vec<ComponentId>,
    /// Writes stamped after this tick are inside the window.
    changed_after: u64,
    /// Last tick covered by a read; the next window starts after it.
    last_read: u64,
}

impl EntityQuery {
    pub fn new(predicate: QueryPredicate) -> Self {
        Self {
            predicate,
            filter: QueryFilter::ALL,
            state: QueryState::default(),
            changed: Vec::new(),
            changed_after: 0,
            last_read: 0,
        }
    }

    pub fn with_filter(mut self, filter: QueryFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Only yield entities whose `T` was added, overwritten or mutably
    /// borrowed since this query's previous read through [`World::query`] or
    /// [`World::for_each_mut`]. The first read sees every `T`. Implies
    /// `has::<T>()`; several calls must all hold.
    ///
    /// # Panics
    ///
    /// If `T` is new and the component registry is frozen.
    pub fn changed<T: Component>(mut self) -> Self {
        let id = ComponentId::of::<T>();
        let predicate = std::mem::replace(&mut self.predicate, QueryPredicate::Always);
        self.predicate = predicate.and(QueryPredicate::Has(id));
        self.changed.push(id);
        self.state = QueryState::default();
        self
    }

    /// Components named by [`changed`](Self::changed).
    pub fn changed_components(&self) -> &[ComponentId] {
        &self.changed
    }

    /// Start the next change window. No-op without change filters.
    pub(crate) fn open_change_window(&mut self, world: &World) {
        if self.changed.is_empty() {
            return;
        }
        self.changed_after = self.last_read;
        self.last_read = world.advance_change_tick();
    }

    /// Leave everything written so far out of the next window.
    pub(crate) fn skip_changes_until_now(&mut self, world: &World) {
        if !self.changed.is_empty() {
            self.last_read = world.advance_change_tick();
        }
    }

    fn changed_in_window(&self, world: &World, id: EntityId) -> bool {
        self.changed.iter().all(|&component| {
            world
                .component_change_tick(id, component)
                .is_some_and(|tick| tick > self.changed_after)
        })
    }

    pub fn predicate(&self) -> &QueryPredicate {
        &self.predicate
    }

    pub fn filter(&self) -> QueryFilter {
        self.filter
    }

    pub fn state(&self) -> &QueryState {
        &self.state
    }

    /// Re-plan against `world` unless the last plan was made for this same
    /// world at its current layout. Returns `true` if a re-plan happened.
    pub fn update_archetypes(&mut self, world: &World) -> bool {
        let generation = world.layout_generation();
        let key = (world.id(), generation);
        if self.state.planned == Some(key) {
            return false;
        }
        self.state.archetypes = world
            .archetypes()
            .filter(|a| self.predicate.evaluate(a.signature()))
            .map(|a| a.id())
            .collect();
        self.state.planned = Some(key);
        log::trace!(
            "planned `{}`: {} archetype(s) at generation {generation}",
            self.predicate,
            self.state.archetypes.len()
        );
        true
    }

    /// Iterate using the current plan. Call
    /// [`update_archetypes`](Self::update_archetypes) first, or use
    /// [`World::query`], to pick up archetypes created since.
    pub fn iter<'w>(&'w self, world: &'w World) -> QueryResult<'w> {
        QueryResult { world, query: self }
    }

    /// A planned slot that was reclaimed (and possibly reused for another
    /// signature) since the plan was made no longer counts.
    fn still_matches(&self, archetype: &Archetype) -> bool {
        archetype.is_in_use() && self.predicate.evaluate(archetype.signature())
    }
}

// ── QueryResult ──────────────────────────────────────────────────────────

/// Lazy view over the entities a query matches in one world.
///
/// Nothing is cached: [`count`](Self::count) walks the matches every call.
#[derive(Clone, Copy)]
pub struct QueryResult<'w> {
    world: &'w World,
    query: &'w EntityQuery,
}

impl<'w> QueryResult<'w> {
    pub fn iter(&self) -> QueryIter<'w> {
        QueryIter {
            world: self.world,
            query: self.query,
            archetype: 0,
            row: 0,
            current: None,
        }
    }

    /// O(n) in the number of matches.
    pub fn count(&self) -> usize {
        self.iter().count()
    }

    pub fn first(&self) -> Option<&'w Entity> {
        self.iter().next()
    }

    /// Stops at the first match.
    pub fn is_empty(&self) -> bool {
        self.first().is_none()
    }

    pub fn ids(&self) -> impl Iterator<Item = EntityId> + use<'w> {
        self.iter().map(|e| e.id())
    }

    pub fn to_id_set(&self) -> HashSet<EntityId> {
        self.ids().collect()
    }

    /// Visit matches on the rayon pool. Archetypes are processed in
    /// parallel, and so are the members within each.
    pub fn par_for_each(&self, f: impl Fn(&'w Entity) + Send + Sync) {
        let world = self.world;
        let query = self.query;
        query.state.archetypes.par_iter().for_each(|&archetype_id| {
            let Some(archetype) = world.archetype_slots().get(archetype_id.index()) else {
                return;
            };
            if !query.still_matches(archetype) {
                return;
            }
            archetype.entities().par_iter().for_each(|id| {
                if let Some(entity) = accept(world, query, *id) {
                    f(entity);
                }
            });
        });
    }
}

fn accept<'w>(world: &'w World, query: &EntityQuery, id: EntityId) -> Option<&'w Entity> {
    let entity = world.get(id)?;
    if entity.is_active() && query.filter.accepts(world, id) && query.changed_in_window(world, id) {
        Some(entity)
    } else {
        None
    }
}

impl<'w> IntoIterator for QueryResult<'w> {
    type Item = &'w Entity;
    type IntoIter = QueryIter<'w>;

    fn into_iter(self) -> QueryIter<'w> {
        self.iter()
    }
}

impl<'w> IntoIterator for &QueryResult<'w> {
    type Item = &'w Entity;
    type IntoIter = QueryIter<'w>;

    fn into_iter(self) -> QueryIter<'w> {
        self.iter()
    }
}

/// Walks planned archetypes in slot order, members in row order.
pub struct QueryIter<'w> {
    world: &'w World,
    query: &'w EntityQuery,
    archetype: usize,
    row: usize,
    current: Option<&'w Archetype>,
}

impl<'w> Iterator for QueryIter<'w> {
    type Item = &'w Entity;

    fn next(&mut self) -> Option<&'w Entity> {
        loop {
            let archetype = match self.current {
                Some(archetype) => archetype,
                None => {
                    let id = *self.query.state.archetypes.get(self.archetype)?;
                    self.archetype += 1;
                    self.row = 0;
                    match self.world.archetype_slots().get(id.index()) {
                        Some(a) if self.query.still_matches(a) => {
                            self.current = Some(a);
                            a
                        }
                        _ => continue,
                    }
                }
            };

            let Some(&id) = archetype.entities().get(self.row) else {
                self.current = None;
                continue;
            };
            self.row += 1;
            if let Some(entity) = accept(self.world, self.query, id) {
                return Some(entity);
            }
        }
    }
}
