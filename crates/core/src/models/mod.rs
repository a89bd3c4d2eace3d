pub mod definition;
pub mod lease;
pub mod paging;
pub mod partition;
pub mod result;
pub mod rpc;
pub mod task_unique_id;
pub mod worker;

pub use definition::{ScheduleDefinition, ScheduleFilter, TaskDefinition, TaskDefinitionFilter};
pub use lease::SchedulerLeaseRecord;
pub use paging::{PageRequest, Paged};
pub use partition::{Partition, PartitionGranularity};
pub use result::{NewTaskResult, ResultFilter, ResultStatus, TaskLog, TaskResult};
pub use rpc::{
    WorkerAck, WorkerCallTaskRequest, WorkerKillTaskRequest, NEXT_SRV_TOKEN_HEADER,
    SRV_TOKEN_HEADER,
};
pub use task_unique_id::TaskUniqueId;
pub use worker::WorkerInfo;
