use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use thiserror::Error;

use crate::axis::Axis;

pub type Result<T> = std::result::Result<T, WindowError>;

/// 窗口化核心的错误
/// 这些都是调用方的前置条件问题，核心内部没有需要恢复的运行时故障
#[derive(Debug, Error, Clone, PartialEq)]
pub enum WindowError {
    #[error("数据量不匹配: shape {shape:?} 需要 {expected} 个元素，但提供了 {actual} 个")]
    ShapeMismatch {
        shape: [usize; 3],
        expected: usize,
        actual: usize,
    },
    #[error("shape {shape:?} 的元素数超出可寻址范围")]
    ShapeTooLarge { shape: [usize; 3] },
    #[error("信号与误差数组长度不一致: signal {signal}, error_sq {error_sq}")]
    ArrayMismatch { signal: usize, error_sq: usize },
    #[error("轴状态 {axes:?} 与体数据 shape {shape:?} 不一致")]
    AxisShapeMismatch { axes: [usize; 3], shape: [usize; 3] },
    #[error("无效的轴范围: min {min}, max {max}, count {count}")]
    InvalidRange { min: f64, max: f64, count: usize },
    #[error("{axis} 轴的分箱数 {count} 无效")]
    InvalidBinCount { axis: Axis, count: usize },
    #[error("{axis} 轴的切片 [{start}, {end}) 超出范围 0..{len}")]
    SliceOutOfBounds {
        axis: Axis,
        start: usize,
        end: usize,
        len: usize,
    },
    #[error("{axis} 轴在 [{lo}, {hi}] 内没有任何 bin")]
    EmptySelection { axis: Axis, lo: f64, hi: f64 },
    #[error("{axis} 轴的 punch 半径 {radius} 无效")]
    InvalidRadius { axis: Axis, radius: f64 },
    #[error("离群阈值 {0} 无效")]
    InvalidOutlier(f64),
}

/// HTTP 层的错误，统一转换为 JSON 响应
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("无效的 dataset_id")]
    DatasetNotFound { dataset_id: String },
    #[error("无效的 task_id")]
    TaskNotFound { task_id: String },
    #[error("无效的 chunk_index")]
    InvalidChunk { chunk_index: usize },
    #[error("chunk 已被请求或不存在")]
    ChunkConsumed { task_id: String, chunk_index: usize },
    #[error("请求参数无效")]
    BadRequest { details: String },
    #[error("窗口操作失败")]
    Window(#[from] WindowError),
    #[error("写入数据失败")]
    Io(#[from] std::io::Error),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::DatasetNotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::TaskNotFound { .. }
            | ApiError::InvalidChunk { .. }
            | ApiError::ChunkConsumed { .. }
            | ApiError::BadRequest { .. }
            | ApiError::Window(_) => StatusCode::BAD_REQUEST,
            ApiError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            ApiError::DatasetNotFound { dataset_id } => serde_json::json!({
                "error": self.to_string(),
                "dataset_id": dataset_id,
            }),
            ApiError::TaskNotFound { task_id } => serde_json::json!({
                "error": self.to_string(),
                "task_id": task_id,
            }),
            ApiError::InvalidChunk { chunk_index } => serde_json::json!({
                "error": self.to_string(),
                "chunk_index": chunk_index,
            }),
            ApiError::ChunkConsumed {
                task_id,
                chunk_index,
            } => serde_json::json!({
                "error": self.to_string(),
                "task_id": task_id,
                "chunk_index": chunk_index,
            }),
            ApiError::BadRequest { details } => serde_json::json!({
                "error": self.to_string(),
                "details": details,
            }),
            ApiError::Window(err) => serde_json::json!({
                "error": self.to_string(),
                "details": err.to_string(),
            }),
            ApiError::Io(err) => serde_json::json!({
                "error": self.to_string(),
                "details": err.to_string(),
            }),
        };
        HttpResponse::build(self.status_code()).json(body)
    }
}
