use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// 单次窗口操作的耗时记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRecord {
    /// 开始时间 (Unix 时间戳，毫秒)
    pub start_time: u64,
    /// 结束时间 (Unix 时间戳，毫秒)
    pub end_time: u64,
    /// 操作名，如 "rebin"、"punch"、"reset_axis"
    pub operation: String,
    pub succeeded: bool,
    /// 附加信息（参数摘要或错误）
    pub msg: String,
}

/// 操作记录存储，按 dataset_id 分组
pub struct OperationLog {
    records: RwLock<HashMap<String, Vec<OperationRecord>>>,
}

impl OperationLog {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    pub fn add_record(&self, dataset_id: &str, record: OperationRecord) {
        self.records
            .write()
            .entry(dataset_id.to_string())
            .or_default()
            .push(record);
    }

    /// 获取指定数据集的所有记录
    pub fn get_records(&self, dataset_id: &str) -> Option<Vec<OperationRecord>> {
        self.records.read().get(dataset_id).cloned()
    }

    /// 数据集关闭时一并删除
    pub fn remove(&self, dataset_id: &str) {
        self.records.write().remove(dataset_id);
    }
}

impl Default for OperationLog {
    fn default() -> Self {
        Self::new()
    }
}

/// 获取 Unix 时间戳（毫秒）
pub fn get_unix_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}
