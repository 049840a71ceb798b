pub mod match_repository;
pub mod memory_repository;
pub mod pg_match_repository;

pub use match_repository::{MatchRepository, RepositoryError};
pub use memory_repository::InMemoryMatchRepository;
pub use pg_match_repository::PgMatchRepository;
