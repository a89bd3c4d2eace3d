use async_trait::async_trait;
use taskmesh_core::{
    traits::{DiscoveryEntry, WorkerDiscovery},
    Result,
};
use tracing::debug;

use super::connection::{escape_glob, RedisConnection};

/// 基于Redis键前缀的Worker服务发现
///
/// 每个Worker自行维护一个键 `<prefix><worker_id>`，值为 `WorkerInfo` 的JSON，
/// 带PX过期时间。Worker停止续约后键自然过期，记录随之消失。本端只读。
pub struct RedisWorkerDiscovery {
    conn: RedisConnection,
    prefix: String,
    scan_count: usize,
}

impl RedisWorkerDiscovery {
    pub fn new(conn: RedisConnection, prefix: impl Into<String>, scan_count: usize) -> Self {
        Self {
            conn,
            prefix: prefix.into(),
            scan_count: scan_count.max(1),
        }
    }

    pub fn worker_key(&self, worker_id: &str) -> String {
        format!("{}{}", self.prefix, worker_id)
    }

    async fn scan_keys(&self) -> Result<Vec<String>> {
        let pattern = format!("{}*", escape_glob(&self.prefix));
        let mut conn = self.conn.manager();
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(self.scan_count)
                .query_async(&mut conn)
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        // SCAN可能返回重复的键
        keys.sort();
        keys.dedup();
        Ok(keys)
    }
}

#[async_trait]
impl WorkerDiscovery for RedisWorkerDiscovery {
    async fn list_entries(&self) -> Result<Vec<DiscoveryEntry>> {
        let keys = self.scan_keys().await?;
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.conn.manager();
        let values: Vec<Option<Vec<u8>>> = redis::cmd("MGET")
            .arg(&keys)
            .query_async(&mut conn)
            .await?;

        // 在SCAN和MGET之间过期的键返回nil，直接跳过
        let entries: Vec<DiscoveryEntry> = keys
            .into_iter()
            .zip(values)
            .filter_map(|(key, value)| value.map(|value| DiscoveryEntry { key, value }))
            .collect();
        debug!(count = entries.len(), prefix = %self.prefix, "读取Worker发现记录");
        Ok(entries)
    }
}
