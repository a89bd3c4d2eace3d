pub mod auth;
pub mod coordination;
pub mod repository;
pub mod scheduler;
pub mod worker_client;

pub use auth::{AuthService, Identity, Permission};
pub use coordination::{AcquireOutcome, DistributedLock, DiscoveryEntry, TokenStore, WorkerDiscovery};
pub use repository::{ResultStore, ScheduleRepository, TaskDefinitionRepository};
pub use scheduler::TaskCaller;
pub use worker_client::WorkerClient;
