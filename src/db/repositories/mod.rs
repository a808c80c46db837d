pub mod profile_repository;

pub use profile_repository::{InMemoryProfileStore, ProfileStore, StoreError};
