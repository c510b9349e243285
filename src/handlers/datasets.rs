use actix_web::{HttpResponse, delete, get, post, web};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::app_state::AppState;
use crate::axis::{AxisRange, AxisState};
use crate::error::ApiError;
use crate::volume::{Quantity, Volume};
use crate::window::VolumeWindow;

/// 单个轴的载入参数
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct AxisInput {
    pub min: f64,
    pub max: f64,
    pub count: usize,
}

/// 载入请求
/// JSON 无法表示 NaN，缺失覆盖的 cell 用 null 表示
#[derive(Debug, Deserialize)]
pub struct LoadRequest {
    pub signal: Vec<Option<f64>>,
    pub error_sq: Vec<Option<f64>>,
    pub h: AxisInput,
    pub k: AxisInput,
    pub l: AxisInput,
}

/// 数据集当前状态，所有命令都返回它用于刷新显示
#[derive(Debug, Clone, Serialize)]
pub struct DatasetState {
    pub dataset_id: String,
    pub shape: [usize; 3],
    pub axes: AxisState,
    pub raw_axes: AxisState,
    pub total_cells: usize,
    pub masked_cells: usize,
    /// 全部屏蔽时为 null
    pub signal_range: Option<(f64, f64)>,
    pub error_sq_range: Option<(f64, f64)>,
}

impl DatasetState {
    pub fn describe(dataset_id: &str, window: &VolumeWindow) -> Self {
        let volume = window.volume();
        Self {
            dataset_id: dataset_id.to_string(),
            shape: volume.shape(),
            axes: *window.axes(),
            raw_axes: window.raw().axes,
            total_cells: volume.len(),
            masked_cells: volume.masked_count(),
            signal_range: window.value_range(Quantity::Signal),
            error_sq_range: window.value_range(Quantity::ErrorSq),
        }
    }
}

#[post("/datasets")]
pub async fn load_dataset(
    data: web::Data<AppState>,
    payload: web::Json<LoadRequest>,
) -> Result<HttpResponse, ApiError> {
    let LoadRequest {
        signal,
        error_sq,
        h,
        k,
        l,
    } = payload.into_inner();

    let axes = AxisState::new(
        AxisRange::new(h.min, h.max, h.count)?,
        AxisRange::new(k.min, k.max, k.count)?,
        AxisRange::new(l.min, l.max, l.count)?,
    );
    let signal = signal.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect();
    let error_sq = error_sq.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect();
    let volume = Volume::new(axes.counts(), signal, error_sq)?;
    let window = VolumeWindow::load(volume, axes)?;

    let masked_cells = window.volume().masked_count();
    let dataset_id = data.datasets.insert(window);
    info!(
        %dataset_id,
        shape = ?axes.counts(),
        masked_cells,
        "数据集已载入"
    );

    let dataset = data
        .datasets
        .get(&dataset_id)
        .ok_or_else(|| ApiError::DatasetNotFound {
            dataset_id: dataset_id.clone(),
        })?;
    let state = DatasetState::describe(&dataset_id, &dataset.window.lock());
    Ok(HttpResponse::Ok().json(state))
}

#[get("/datasets/{dataset_id}")]
pub async fn get_dataset(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let dataset_id = path.into_inner();
    let dataset = data
        .datasets
        .get(&dataset_id)
        .ok_or_else(|| ApiError::DatasetNotFound {
            dataset_id: dataset_id.clone(),
        })?;
    let state = DatasetState::describe(&dataset_id, &dataset.window.lock());
    Ok(HttpResponse::Ok().json(state))
}

/// 关闭数据集，同时丢弃它的导出任务与操作记录
#[delete("/datasets/{dataset_id}")]
pub async fn close_dataset(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let dataset_id = path.into_inner();
    let Some(dataset) = data.datasets.remove(&dataset_id) else {
        return Err(ApiError::DatasetNotFound { dataset_id });
    };
    // 等正在执行的命令写完操作记录再清理
    drop(dataset.window.lock());
    let exports_dropped = data.exports.remove_dataset(&dataset_id);
    data.operations.remove(&dataset_id);
    info!(%dataset_id, exports_dropped, "数据集已关闭");

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "dataset_id": dataset_id,
        "closed": true,
        "exports_dropped": exports_dropped,
    })))
}
