//! Session-scoped key/value storage for the agent's identity.

pub mod error;
pub mod memory;
pub mod sqlite;

pub use error::StoreError;
pub use memory::MemoryIdentityStore;
pub use sqlite::SqliteIdentityStore;

/// Key/value surface whose lifetime is one browsing session: it outlives a
/// single agent instance (a reload) but not the session scope itself.
///
/// Several agents of the same scope may share one store. Writers do not
/// coordinate; the last write wins.
pub trait IdentityStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}
