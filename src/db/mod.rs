pub mod models;
pub mod repositories;

pub use models::{EncryptedPattern, ProfileRecord, StoredProfile};
pub use repositories::{InMemoryProfileStore, ProfileStore, StoreError};
