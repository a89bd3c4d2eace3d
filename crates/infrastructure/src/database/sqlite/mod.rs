pub mod sqlite_definition_repository;
pub mod sqlite_result_store;

pub use sqlite_definition_repository::{SqliteScheduleRepository, SqliteTaskDefinitionRepository};
pub use sqlite_result_store::SqliteResultStore;
