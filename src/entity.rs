//! Entity identity
//!
//! Identifiers and category tags shared by every simulation table.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable handle for a simulated entity.
///
/// Ids are handed out in increasing order and never reused within one
/// simulation, so iterating a table sorted by id gives spawn order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub u32);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Hands out increasing [`EntityId`]s, starting at 1.
#[derive(Debug, Clone, Default)]
pub struct IdAllocator {
    last: u32,
}

impl IdAllocator {
    pub fn next_id(&mut self) -> EntityId {
        self.last += 1;
        EntityId(self.last)
    }
}

/// Broad category of a simulated entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    /// Attacks friendly units and obstacles
    Hostile,
    /// Defends against hostiles
    Friendly,
    /// Static destructible blocker (bricks, barricades)
    Obstacle,
    /// Short-lived attack payload in flight
    Projectile,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Hostile,
        EntityKind::Friendly,
        EntityKind::Obstacle,
        EntityKind::Projectile,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            EntityKind::Hostile => "Hostile",
            EntityKind::Friendly => "Friendly",
            EntityKind::Obstacle => "Obstacle",
            EntityKind::Projectile => "Projectile",
        }
    }

    /// Bit used by [`KindMask`].
    const fn bit(self) -> u8 {
        match self {
            EntityKind::Hostile => 1 << 0,
            EntityKind::Friendly => 1 << 1,
            EntityKind::Obstacle => 1 << 2,
            EntityKind::Projectile => 1 << 3,
        }
    }
}

/// Set of entity kinds, used by targeting policies.
///
/// Serialized as a plain list of kinds, e.g. `[Friendly, Obstacle]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Vec<EntityKind>", into = "Vec<EntityKind>")]
pub struct KindMask(u8);

impl KindMask {
    pub const NONE: KindMask = KindMask(0);

    pub fn of(kinds: &[EntityKind]) -> Self {
        KindMask(kinds.iter().fold(0, |acc, kind| acc | kind.bit()))
    }

    pub fn contains(&self, kind: EntityKind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub fn with(self, kind: EntityKind) -> Self {
        KindMask(self.0 | kind.bit())
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn kinds(&self) -> impl Iterator<Item = EntityKind> + '_ {
        EntityKind::ALL.into_iter().filter(|kind| self.contains(*kind))
    }
}

impl From<&[EntityKind]> for KindMask {
    fn from(kinds: &[EntityKind]) -> Self {
        KindMask::of(kinds)
    }
}

impl From<Vec<EntityKind>> for KindMask {
    fn from(kinds: Vec<EntityKind>) -> Self {
        KindMask::of(&kinds)
    }
}

impl From<KindMask> for Vec<EntityKind> {
    fn from(mask: KindMask) -> Self {
        mask.kinds().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mask_membership() {
        let mask = KindMask::of(&[EntityKind::Friendly, EntityKind::Obstacle]);
        assert!(mask.contains(EntityKind::Friendly));
        assert!(mask.contains(EntityKind::Obstacle));
        assert!(!mask.contains(EntityKind::Hostile));
        assert!(!mask.contains(EntityKind::Projectile));
    }

    #[test]
    fn test_empty_mask() {
        assert!(KindMask::NONE.is_empty());
        assert!(!KindMask::NONE.with(EntityKind::Hostile).is_empty());
    }

    #[test]
    fn test_kind_mask_ron_list() {
        let mask: KindMask = ron::from_str("[Friendly, Obstacle]").unwrap();
        assert_eq!(mask, KindMask::of(&[EntityKind::Friendly, EntityKind::Obstacle]));
        assert_eq!(mask.kinds().count(), 2);
    }

    #[test]
    fn test_ids_increase() {
        let mut ids = IdAllocator::default();
        let a = ids.next_id();
        let b = ids.next_id();
        assert_eq!(a, EntityId(1));
        assert!(b > a);
    }

    #[test]
    fn test_entity_id_display() {
        assert_eq!(EntityId(7).to_string(), "#7");
    }
}
