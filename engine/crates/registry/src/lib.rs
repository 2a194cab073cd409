pub mod allocator;
pub mod error;
pub mod registry;
pub mod types;

pub use allocator::IdAllocator;
pub use error::RegistryError;
pub use registry::{username_key, ObjectRegistry, Registered};
pub use types::{Category, ConnectionId, EntityId};
