use std::time::Instant;

use actix_web::{HttpResponse, post, web};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::app_state::AppState;
use crate::error::ApiError;
use crate::export::{ChunkDescriptor, ExportTask, plan_chunks};
use crate::volume::Quantity;

/// 默认每个 chunk 64Ki 个浮点数（512 KiB）
const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

#[derive(Deserialize)]
pub struct ExportRequest {
    #[serde(default)]
    pub quantity: Quantity,
    pub chunk_size: Option<usize>,
}

#[derive(Serialize, Clone)]
pub struct ExportResponse {
    pub task_id: String,
    pub dataset_id: String,
    pub quantity: Quantity,
    pub shape: [usize; 3],
    pub data_length: usize,
    pub chunk_size: usize,
    pub chunks: Vec<ChunkDescriptor>,
}

#[post("/datasets/{dataset_id}/export")]
pub async fn export_dataset(
    data: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<ExportRequest>,
) -> Result<HttpResponse, ApiError> {
    let resp = run_export(
        data.get_ref(),
        &path,
        payload.quantity,
        payload.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE),
    )?;
    Ok(HttpResponse::Ok().json(resp))
}

/// 为当前体数据创建导出任务
///
/// ## 流程
/// 1. 在数据集锁内复制当前数组，之后的编辑不会影响本次导出
/// 2. 按 chunk_size 计算分块并登记任务
/// 3. 后台任务把快照切成 chunk，前端通过 /export/chunk 逐块拉取
///
/// 响应立即返回，chunk 未就绪时 chunk 接口返回 202
pub fn run_export(
    app_state: &AppState,
    dataset_id: &str,
    quantity: Quantity,
    chunk_size: usize,
) -> Result<ExportResponse, ApiError> {
    if chunk_size == 0 {
        return Err(ApiError::BadRequest {
            details: "chunk_size 必须大于 0".to_string(),
        });
    }

    let dataset = app_state
        .datasets
        .get(dataset_id)
        .ok_or_else(|| ApiError::DatasetNotFound {
            dataset_id: dataset_id.to_string(),
        })?;

    let (shape, values) = {
        let window = dataset.window.lock();
        let volume = window.volume();
        (volume.shape(), volume.values(quantity).to_vec())
    };

    let data_length = values.len();
    let chunks = plan_chunks(data_length, chunk_size);
    let (task_id, task) = app_state.exports.insert(ExportTask::new(
        dataset_id.to_string(),
        quantity,
        shape,
        chunks.clone(),
    ));
    info!(
        %task_id,
        dataset_id,
        ?quantity,
        data_length,
        chunk_count = chunks.len(),
        "导出任务已创建"
    );

    let split_chunks = chunks.clone();
    let split_task_id = task_id.clone();
    actix_web::rt::spawn(async move {
        let split_start = Instant::now();
        for descriptor in split_chunks {
            task.set_chunk(
                descriptor.index,
                values[descriptor.start..descriptor.end].to_vec(),
            );
        }
        debug!(
            task_id = %split_task_id,
            chunk_count = task.chunks.len(),
            elapsed_ms = split_start.elapsed().as_millis() as u64,
            "导出分块完成"
        );
    });

    Ok(ExportResponse {
        task_id,
        dataset_id: dataset_id.to_string(),
        quantity,
        shape,
        data_length,
        chunk_size,
        chunks,
    })
}
