//! # Archetype — grouping entities by component signature
//!
//! An archetype is one distinct [`BitSet`] signature plus the ordered list of
//! entities that currently carry exactly that signature. Component values live
//! in each entity's own [`ComponentSet`](super::ComponentSet); the archetype is
//! the index a query walks so it never has to look at entities that cannot
//! match.
//!
//! ```text
//! Archetype #2 { signature: {Position, Velocity} }
//!   entities: [e7, e3, e12]      ← row i belongs to entities[i]
//! ```
//!
//! When an entity gains or loses a component it is swap-removed from its old
//! list (the last member takes its row) and pushed onto the new one.
//!
//! Archetypes that become empty are kept until the world's next tick
//! boundary, then reclaimed and their slot reused for the next new signature.

use super::bitset::BitSet;
use super::component::ComponentId;
use super::entity::EntityId;

/// Index of an archetype slot in its world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArchetypeId(u32);

impl ArchetypeId {
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    pub(crate) const fn from_index(index: usize) -> Self {
        Self(index as u32)
    }
}

#[derive(Debug)]
pub struct Archetype {
    id: ArchetypeId,
    signature: BitSet,
    entities: Vec<EntityId>,
    in_use: bool,
}

impl Archetype {
    pub(crate) fn new(id: ArchetypeId, signature: BitSet) -> Self {
        Self {
            id,
            signature,
            entities: Vec::new(),
            in_use: true,
        }
    }

    pub fn id(&self) -> ArchetypeId {
        self.id
    }

    pub fn signature(&self) -> &BitSet {
        &self.signature
    }

    pub fn has(&self, component: ComponentId) -> bool {
        self.signature.contains(component)
    }

    /// Members in storage order.
    pub fn entities(&self) -> &[EntityId] {
        &self.entities
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// `false` once the slot has been reclaimed and not yet reused.
    pub fn is_in_use(&self) -> bool {
        self.in_use
    }

    /// Append a member, returning its row.
    pub(crate) fn push(&mut self, entity: EntityId) -> usize {
        self.entities.push(entity);
        self.entities.len() - 1
    }

    /// Swap-remove the member at `row`. Returns the entity that was moved into
    /// `row`, if any, so the caller can fix its recorded location.
    pub(crate) fn swap_remove(&mut self, row: usize) -> Option<EntityId> {
        self.entities.swap_remove(row);
        self.entities.get(row).copied()
    }

    pub(crate) fn retire(&mut self) {
        debug_assert!(self.entities.is_empty());
        self.in_use = false;
        self.signature.clear();
    }

    pub(crate) fn reuse(&mut self, signature: BitSet) {
        debug_assert!(!self.in_use && self.entities.is_empty());
        self.in_use = true;
        self.signature = signature;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swap_remove_reports_moved_member() {
        let mut archetype = Archetype::new(ArchetypeId::from_index(0), BitSet::new());
        let ids: Vec<EntityId> = (0..3).map(|_| EntityId::allocate()).collect();
        for &id in &ids {
            archetype.push(id);
        }

        // Removing the first row moves the last member into it.
        assert_eq!(archetype.swap_remove(0), Some(ids[2]));
        assert_eq!(archetype.entities(), &[ids[2], ids[1]]);

        // Removing the last row moves nothing.
        assert_eq!(archetype.swap_remove(1), None);
        assert_eq!(archetype.entities(), &[ids[2]]);
    }

    #[test]
    fn retire_and_reuse() {
        let sig = BitSet::new().with(ComponentId::from_index(4));
        let mut archetype = Archetype::new(ArchetypeId::from_index(1), sig);
        assert!(archetype.has(ComponentId::from_index(4)));

        archetype.retire();
        assert!(!archetype.is_in_use());
        assert!(archetype.signature().is_empty());

        let next = BitSet::new().with(ComponentId::from_index(9));
        archetype.reuse(next);
        assert!(archetype.is_in_use());
        assert_eq!(archetype.signature(), &next);
        assert_eq!(archetype.id(), ArchetypeId::from_index(1));
    }
}
