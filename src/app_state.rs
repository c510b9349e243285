use std::sync::Arc;

use crate::config::AppConfig;
use crate::dataset::DatasetStore;
use crate::export::ExportStore;
use crate::operations::OperationLog;

/// 全局应用状态，在各个 handler 之间共享打开的数据集、导出任务与操作记录
pub struct AppState {
    pub datasets: Arc<DatasetStore>,
    pub exports: Arc<ExportStore>,
    pub operations: Arc<OperationLog>,
}

impl AppState {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            datasets: Arc::new(DatasetStore::new()),
            exports: Arc::new(ExportStore::with_ttl(config.export_ttl)),
            operations: Arc::new(OperationLog::new()),
        }
    }
}
