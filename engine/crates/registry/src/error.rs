use crate::types::{Category, ConnectionId, EntityId};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("entity has no assigned identity")]
    InvalidId,

    #[error("entity {0} is already registered")]
    AlreadyRegistered(EntityId),

    #[error("entity {0} is not registered")]
    NotRegistered(EntityId),

    #[error("player entity {0} has no username")]
    MissingUsername(EntityId),

    #[error("username '{0}' already has a hibernating player")]
    UsernameTaken(String),

    #[error("no hibernating player for username '{0}'")]
    UnknownUsername(String),

    #[error("connection {0} is already bound to a player")]
    ConnectionInUse(ConnectionId),

    #[error("connection {0} is not bound to a player")]
    UnknownConnection(ConnectionId),

    #[error("registry inconsistency for {entity} ({category}): {detail}")]
    Inconsistent {
        entity: EntityId,
        category: Category,
        detail: String,
    },
}

impl RegistryError {
    /// True when the failure points at a bookkeeping bug rather than a
    /// caller asking for something that does not exist.
    pub fn is_structural(&self) -> bool {
        matches!(self, RegistryError::Inconsistent { .. })
    }
}
