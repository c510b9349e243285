use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

use crate::window::VolumeWindow;

/// 一个打开的数据集
/// 窗口的所有操作都要读取完整的轴状态再写入，不能交错执行，
/// 所以每个数据集只用一把互斥锁
pub struct Dataset {
    pub window: Mutex<VolumeWindow>,
}

impl Dataset {
    pub fn new(window: VolumeWindow) -> Self {
        Self {
            window: Mutex::new(window),
        }
    }
}

/// 所有打开的数据集，key 为 dataset_id
pub struct DatasetStore {
    datasets: RwLock<HashMap<String, Arc<Dataset>>>,
}

impl DatasetStore {
    pub fn new() -> Self {
        Self {
            datasets: RwLock::new(HashMap::new()),
        }
    }

    pub fn insert(&self, window: VolumeWindow) -> String {
        let dataset_id = Uuid::new_v4().to_string();
        self.datasets
            .write()
            .insert(dataset_id.clone(), Arc::new(Dataset::new(window)));
        dataset_id
    }

    pub fn get(&self, dataset_id: &str) -> Option<Arc<Dataset>> {
        self.datasets.read().get(dataset_id).cloned()
    }

    /// 关闭数据集，原始快照随之释放
    pub fn remove(&self, dataset_id: &str) -> Option<Arc<Dataset>> {
        self.datasets.write().remove(dataset_id)
    }

    pub fn dataset_count(&self) -> usize {
        self.datasets.read().len()
    }
}

impl Default for DatasetStore {
    fn default() -> Self {
        Self::new()
    }
}
