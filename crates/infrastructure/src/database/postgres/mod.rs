pub mod postgres_definition_repository;
pub mod postgres_result_store;

pub use postgres_definition_repository::{
    PostgresScheduleRepository, PostgresTaskDefinitionRepository,
};
pub use postgres_result_store::PostgresResultStore;
