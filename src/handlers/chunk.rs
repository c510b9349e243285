use actix_web::{
    HttpResponse, get,
    http::header::{self, ContentType},
    web,
};
use serde::Deserialize;

use crate::app_state::AppState;
use crate::error::ApiError;
use crate::handlers::binary::{encode_f64_le, gzip};

#[derive(Deserialize)]
pub struct ChunkQuery {
    pub task_id: String,
    pub chunk_index: usize,
    #[serde(default)]
    pub gzip: bool,
}

/// 拉取一个导出 chunk，每个 chunk 只能取一次，取走后立即释放
#[get("/export/chunk")]
pub async fn get_export_chunk(
    data: web::Data<AppState>,
    query: web::Query<ChunkQuery>,
) -> Result<HttpResponse, ApiError> {
    let task = data
        .exports
        .get(&query.task_id)
        .ok_or_else(|| ApiError::TaskNotFound {
            task_id: query.task_id.clone(),
        })?;

    let descriptor = task
        .chunks
        .get(query.chunk_index)
        .ok_or(ApiError::InvalidChunk {
            chunk_index: query.chunk_index,
        })?;

    // 后台分割还没写到这个 chunk
    if task.is_chunk_pending(query.chunk_index) {
        return Ok(HttpResponse::Accepted().json(serde_json::json!({
            "error": "chunk 正在生成，请稍后重试",
            "task_id": query.task_id,
            "chunk_index": query.chunk_index,
            "status": "processing",
        })));
    }

    let chunk_values = task
        .take_chunk(query.chunk_index)
        .ok_or_else(|| ApiError::ChunkConsumed {
            task_id: query.task_id.clone(),
            chunk_index: query.chunk_index,
        })?;

    let mut bytes = encode_f64_le(&chunk_values)?;
    let mut response = HttpResponse::Ok();
    response
        .content_type(ContentType::octet_stream())
        .append_header(("X-Chunk-Index", descriptor.index.to_string()))
        .append_header(("X-Chunk-Start", descriptor.start.to_string()))
        .append_header(("X-Chunk-End", descriptor.end.to_string()))
        .append_header((
            "X-Chunk-Length",
            (descriptor.end - descriptor.start).to_string(),
        ))
        .append_header(("X-Chunk-Task", query.task_id.clone()))
        .append_header(("X-Export-Quantity", task.quantity.as_str()))
        .append_header((
            "X-Export-Shape",
            format!("{},{},{}", task.shape[0], task.shape[1], task.shape[2]),
        ));
    if query.gzip {
        bytes = gzip(&bytes)?;
        response.append_header((header::CONTENT_ENCODING, "gzip"));
    }
    Ok(response.body(bytes))
}
