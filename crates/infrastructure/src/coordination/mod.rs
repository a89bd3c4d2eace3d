//! 基于Redis的协调后端：Worker服务发现、调度器领导者租约、回调令牌存储

pub mod connection;
pub mod discovery;
pub mod lock;
pub mod token_store;

pub use connection::RedisConnection;
pub use discovery::RedisWorkerDiscovery;
pub use lock::RedisDistributedLock;
pub use token_store::RedisTokenStore;
