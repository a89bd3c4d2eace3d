pub mod manager;
pub mod mapping;
pub mod postgres;
pub mod sqlite;

pub use manager::{DatabaseManager, DatabasePool, DatabaseType};
pub use mapping::{MappingHelpers, PartitionTables};
pub use postgres::{PostgresResultStore, PostgresScheduleRepository, PostgresTaskDefinitionRepository};
pub use sqlite::{SqliteResultStore, SqliteScheduleRepository, SqliteTaskDefinitionRepository};
