//! Identifier and small value types shared by every module.
//!
//! Components are pure data with no behavior.

use serde::{Deserialize, Serialize};

/// Unique identifier for structures (houses).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StructureId(pub u32);

/// Unique identifier for production pipelines (color factories).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FactoryId(pub u32);

/// Unique identifier for hazard instances (fires).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HazardId(pub u32);

/// Stable identity of a collectible item.
///
/// Zone membership is keyed by this id, never by position, so it survives
/// reparenting of the item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(pub u64);

/// Identifier of a connected participant (authority or observer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParticipantId(pub u64);

/// Item category ("color") index.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct Category(pub u8);

/// Palette selector for a structure's decoration.
///
/// A factory only credits items whose [`Category`] matches its decoration
/// index.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct DecorationIndex(pub u8);

impl DecorationIndex {
    /// The item category this decoration consumes.
    #[must_use]
    pub const fn category(self) -> Category {
        Category(self.0)
    }
}

macro_rules! impl_id_display {
    ($($ty:ident => $prefix:literal),* $(,)?) => {
        $(
            impl std::fmt::Display for $ty {
                fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                    write!(f, concat!($prefix, "#{}"), self.0)
                }
            }
        )*
    };
}

impl_id_display! {
    StructureId => "structure",
    FactoryId => "factory",
    HazardId => "hazard",
    ItemId => "item",
    ParticipantId => "participant",
}

/// Which side of the replication boundary a participant is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// The single process allowed to mutate shared state.
    Authority,
    /// A read-only participant rendering replicated state.
    Observer,
}

impl Role {
    /// Whether writes from this role are accepted.
    #[must_use]
    pub const fn is_authority(self) -> bool {
        matches!(self, Role::Authority)
    }
}

/// Where a request came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Origin {
    /// Raised by the authority itself (physics, local input, timers).
    Authority,
    /// Sent by a remote observer; validated before it is applied.
    Observer(ParticipantId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_display() {
        assert_eq!(StructureId(3).to_string(), "structure#3");
        assert_eq!(ItemId(42).to_string(), "item#42");
    }

    #[test]
    fn test_decoration_category() {
        assert_eq!(DecorationIndex(2).category(), Category(2));
    }
}
