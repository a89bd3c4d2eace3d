use serde::{Deserialize, Serialize};

/// Worker节点信息
///
/// 只在Worker自身维持发现租约期间存在，本平台只读不写。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerInfo {
    pub worker_id: String,
    pub modular: String,
    pub address: String,
}

impl WorkerInfo {
    pub fn new(
        worker_id: impl Into<String>,
        modular: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        Self {
            worker_id: worker_id.into(),
            modular: modular.into(),
            address: address.into(),
        }
    }

    pub fn serves(&self, modular: &str) -> bool {
        self.modular == modular
    }
}
