use serde::{Deserialize, Serialize};

/// Process-unique identity of a live entity. Assigned once, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct EntityId(pub u64);

impl EntityId {
    /// The identity of an entity that has not been assigned one yet.
    pub const INVALID: EntityId = EntityId(0);

    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }

    pub fn to_u64(self) -> u64 {
        self.0
    }

    pub fn from_u64(val: u64) -> Self {
        Self(val)
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Handle of a live network connection, assigned by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "C{}", self.0)
    }
}

/// Secondary collection an entity is filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub enum Category {
    Area,
    Item,
    Creature,
    Quest,
    /// Players live in the active/inactive views instead of a category index.
    Player,
}

impl Category {
    /// Categories backed by a plain id index.
    pub const INDEXED: [Category; 4] = [
        Category::Area,
        Category::Item,
        Category::Creature,
        Category::Quest,
    ];

    pub(crate) fn slot(self) -> Option<usize> {
        match self {
            Category::Area => Some(0),
            Category::Item => Some(1),
            Category::Creature => Some(2),
            Category::Quest => Some(3),
            Category::Player => None,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Category::Area => "area",
            Category::Item => "item",
            Category::Creature => "creature",
            Category::Quest => "quest",
            Category::Player => "player",
        };
        f.write_str(name)
    }
}
