use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::Serialize;
use uuid::Uuid;

use crate::volume::Quantity;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkDescriptor {
    pub index: usize,
    /// 开始位置（包含），单位：浮点元素索引
    pub start: usize,
    /// 结束位置（不包含），单位：浮点元素索引
    pub end: usize,
}

/// 把 data_length 个元素按 chunk_size 划分
pub fn plan_chunks(data_length: usize, chunk_size: usize) -> Vec<ChunkDescriptor> {
    let chunk_size = chunk_size.max(1);
    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut index = 0usize;
    while start < data_length {
        let end = (start + chunk_size).min(data_length);
        chunks.push(ChunkDescriptor { index, start, end });
        start = end;
        index += 1;
    }
    chunks
}

/// 导出任务，存储某一时刻当前体数据的分块快照
/// 使用 HashMap 独立存储每个 chunk，允许单独释放
pub struct ExportTask {
    pub dataset_id: String,
    pub quantity: Quantity,
    /// 网格维度 [nh, nk, nl]
    pub shape: [usize; 3],
    /// 分块描述列表
    pub chunks: Vec<ChunkDescriptor>,
    /// 每个 chunk 的数据，key 是 chunk_index
    /// None 表示 chunk 正在分割中，Some(Vec) 表示已就绪
    /// 当 chunk 被请求后，对应的数据会被移除以释放内存
    chunk_data: RwLock<HashMap<usize, Option<Vec<f64>>>>,
    /// 任务创建时间，用于 TTL 过期检查
    pub created_at: Instant,
}

impl ExportTask {
    /// 创建新的导出任务（chunk 尚未分割）
    pub fn new(
        dataset_id: String,
        quantity: Quantity,
        shape: [usize; 3],
        chunks: Vec<ChunkDescriptor>,
    ) -> Self {
        let chunk_data = chunks
            .iter()
            .map(|descriptor| (descriptor.index, None))
            .collect();

        Self {
            dataset_id,
            quantity,
            shape,
            chunks,
            chunk_data: RwLock::new(chunk_data),
            created_at: Instant::now(),
        }
    }

    /// 设置指定 chunk 的数据（后台分割完成后调用）
    pub fn set_chunk(&self, chunk_index: usize, data: Vec<f64>) {
        self.chunk_data.write().insert(chunk_index, Some(data));
    }

    /// 获取并移除指定 chunk 的数据
    /// 返回 None 如果：
    /// - chunk 不存在
    /// - chunk 还未就绪
    /// - chunk 已被请求
    pub fn take_chunk(&self, chunk_index: usize) -> Option<Vec<f64>> {
        let mut chunk_data = self.chunk_data.write();
        match chunk_data.remove(&chunk_index) {
            Some(Some(data)) => Some(data),
            Some(None) => {
                // 尚未就绪，放回去
                chunk_data.insert(chunk_index, None);
                None
            }
            None => None,
        }
    }

    /// 检查指定 chunk 是否已就绪
    pub fn is_chunk_ready(&self, chunk_index: usize) -> bool {
        self.chunk_data
            .read()
            .get(&chunk_index)
            .is_some_and(|slot| slot.is_some())
    }

    /// chunk 已登记但后台还没写入
    pub fn is_chunk_pending(&self, chunk_index: usize) -> bool {
        self.chunk_data
            .read()
            .get(&chunk_index)
            .is_some_and(|slot| slot.is_none())
    }

    /// 剩余未被请求的 chunk 数量
    pub fn remaining_chunk_count(&self) -> usize {
        self.chunk_data.read().len()
    }
}

pub struct ExportStore {
    tasks: RwLock<HashMap<String, Arc<ExportTask>>>,
    /// TTL（Time-To-Live）过期时间
    default_ttl: Duration,
}

impl ExportStore {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
            default_ttl: ttl,
        }
    }

    pub fn insert(&self, task: ExportTask) -> (String, Arc<ExportTask>) {
        let task_id = Uuid::new_v4().to_string();
        let task = Arc::new(task);
        self.tasks.write().insert(task_id.clone(), task.clone());
        (task_id, task)
    }

    pub fn get(&self, task_id: &str) -> Option<Arc<ExportTask>> {
        self.tasks.read().get(task_id).cloned()
    }

    /// 清理过期的任务，以及所有 chunk 都已被请求的任务
    /// 返回清理的任务数量
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut tasks = self.tasks.write();
        let before_count = tasks.len();

        tasks.retain(|_, task| {
            now.duration_since(task.created_at) < self.default_ttl
                && task.remaining_chunk_count() > 0
        });

        before_count - tasks.len()
    }

    /// 删除某个数据集的所有导出任务（数据集关闭时调用）
    pub fn remove_dataset(&self, dataset_id: &str) -> usize {
        let mut tasks = self.tasks.write();
        let before_count = tasks.len();
        tasks.retain(|_, task| task.dataset_id != dataset_id);
        before_count - tasks.len()
    }

    /// 获取当前任务数量
    pub fn task_count(&self) -> usize {
        self.tasks.read().len()
    }

    /// 获取默认 TTL
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_chunks_covers_data() {
        let chunks = plan_chunks(10, 4);
        assert_eq!(
            chunks,
            vec![
                ChunkDescriptor { index: 0, start: 0, end: 4 },
                ChunkDescriptor { index: 1, start: 4, end: 8 },
                ChunkDescriptor { index: 2, start: 8, end: 10 },
            ]
        );
        assert_eq!(plan_chunks(3, 0).len(), 3);
        assert!(plan_chunks(0, 8).is_empty());
    }

    #[test]
    fn chunk_is_taken_once() {
        let task = ExportTask::new("ds".into(), Quantity::Signal, [2, 1, 1], plan_chunks(2, 1));
        assert!(!task.is_chunk_ready(0));
        assert!(task.is_chunk_pending(0));
        assert_eq!(task.take_chunk(0), None);
        assert_eq!(task.remaining_chunk_count(), 2);

        task.set_chunk(0, vec![1.0]);
        assert!(task.is_chunk_ready(0));
        assert_eq!(task.take_chunk(0), Some(vec![1.0]));
        assert_eq!(task.take_chunk(0), None);
        assert!(!task.is_chunk_pending(0));
        assert_eq!(task.remaining_chunk_count(), 1);
    }

    #[test]
    fn cleanup_drops_expired_and_drained_tasks() {
        let store = ExportStore::with_ttl(Duration::from_secs(60));
        let (_, drained) = store.insert(ExportTask::new(
            "a".into(),
            Quantity::Signal,
            [1, 1, 1],
            plan_chunks(1, 1),
        ));
        drained.set_chunk(0, vec![0.0]);
        drained.take_chunk(0);
        let (kept, _) = store.insert(ExportTask::new(
            "b".into(),
            Quantity::ErrorSq,
            [1, 1, 1],
            plan_chunks(1, 1),
        ));

        assert_eq!(store.cleanup_expired(), 1);
        assert!(store.get(&kept).is_some());

        let expired = ExportStore::with_ttl(Duration::ZERO);
        expired.insert(ExportTask::new("c".into(), Quantity::Signal, [1, 1, 1], plan_chunks(1, 1)));
        assert_eq!(expired.cleanup_expired(), 1);
        assert_eq!(expired.task_count(), 0);
    }

    #[test]
    fn remove_dataset_only_touches_its_tasks() {
        let store = ExportStore::with_ttl(Duration::from_secs(60));
        store.insert(ExportTask::new("a".into(), Quantity::Signal, [1, 1, 1], plan_chunks(1, 1)));
        store.insert(ExportTask::new("a".into(), Quantity::ErrorSq, [1, 1, 1], plan_chunks(1, 1)));
        store.insert(ExportTask::new("b".into(), Quantity::Signal, [1, 1, 1], plan_chunks(1, 1)));
        assert_eq!(store.remove_dataset("a"), 2);
        assert_eq!(store.task_count(), 1);
    }
}
