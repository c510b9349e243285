use std::time::Instant;

use actix_web::{HttpResponse, post, web};
use serde::Deserialize;
use tracing::{info, warn};

use crate::app_state::AppState;
use crate::axis::Axis;
use crate::error::{ApiError, WindowError};
use crate::handlers::datasets::DatasetState;
use crate::operations::{OperationRecord, get_unix_timestamp_ms};
use crate::punch::PunchParams;
use crate::window::{EditField, VolumeWindow};

/// 在数据集的锁内执行一个命令，并记录耗时
///
/// ## 流程
/// 1. 查找数据集，不存在时返回 404
/// 2. 持有该数据集的互斥锁执行命令，保证同一数据集上的操作不会交错
/// 3. 无论成功与否都写入操作记录（数据集已关闭时跳过）
/// 4. 成功时返回命令结果以及最新的数据集状态
pub(crate) fn run_command<T>(
    app_state: &AppState,
    dataset_id: &str,
    operation: &'static str,
    command: impl FnOnce(&mut VolumeWindow) -> Result<T, WindowError>,
) -> Result<(T, DatasetState), ApiError> {
    let dataset = app_state
        .datasets
        .get(dataset_id)
        .ok_or_else(|| ApiError::DatasetNotFound {
            dataset_id: dataset_id.to_string(),
        })?;

    let start_time = get_unix_timestamp_ms();
    let started = Instant::now();
    let mut window = dataset.window.lock();
    let result = command(&mut *window);
    let elapsed_ms = started.elapsed().as_millis() as u64;

    let msg = match &result {
        Ok(_) => format!("shape {:?}", window.volume().shape()),
        Err(err) => err.to_string(),
    };
    // 锁内可能已经被关闭，此时不能再为它建立新的操作日志
    if app_state.datasets.get(dataset_id).is_some() {
        app_state.operations.add_record(
            dataset_id,
            OperationRecord {
                start_time,
                end_time: get_unix_timestamp_ms(),
                operation: operation.to_string(),
                succeeded: result.is_ok(),
                msg,
            },
        );
    }

    match result {
        Ok(value) => {
            info!(
                dataset_id,
                operation,
                elapsed_ms,
                shape = ?window.volume().shape(),
                masked_cells = window.volume().masked_count(),
                "操作完成"
            );
            Ok((value, DatasetState::describe(dataset_id, &window)))
        }
        Err(err) => {
            warn!(dataset_id, operation, %err, "操作失败");
            Err(err.into())
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RebinRequest {
    pub counts: [usize; 3],
}

#[post("/datasets/{dataset_id}/rebin")]
pub async fn rebin_dataset(
    data: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<RebinRequest>,
) -> Result<HttpResponse, ApiError> {
    let counts = payload.counts;
    let ((), state) = run_command(&data, &path, "rebin", |window| window.rebin(counts))?;
    Ok(HttpResponse::Ok().json(state))
}

/// 物理范围 [min, max]，缺省的轴保持不变
#[derive(Debug, Default, Deserialize)]
pub struct CropRequest {
    pub h: Option<[f64; 2]>,
    pub k: Option<[f64; 2]>,
    pub l: Option<[f64; 2]>,
}

#[post("/datasets/{dataset_id}/crop")]
pub async fn crop_dataset(
    data: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<CropRequest>,
) -> Result<HttpResponse, ApiError> {
    let ranges = [payload.h, payload.k, payload.l].map(|range| range.map(|[lo, hi]| (lo, hi)));
    let ((), state) = run_command(&data, &path, "crop", |window| window.crop_range(ranges))?;
    Ok(HttpResponse::Ok().json(state))
}

#[post("/datasets/{dataset_id}/punch")]
pub async fn punch_dataset(
    data: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<PunchParams>,
) -> Result<HttpResponse, ApiError> {
    let params = payload.into_inner();
    let (report, state) = run_command(&data, &path, "punch", |window| window.punch(&params))?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "report": report,
        "state": state,
    })))
}

/// 恢复范围：全部、单个轴、或只撤销 punch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResetScope {
    All,
    H,
    K,
    L,
    Punch,
}

#[derive(Debug, Deserialize)]
pub struct ResetRequest {
    pub scope: ResetScope,
}

#[post("/datasets/{dataset_id}/reset")]
pub async fn reset_dataset(
    data: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<ResetRequest>,
) -> Result<HttpResponse, ApiError> {
    let scope = payload.scope;
    let operation = match scope {
        ResetScope::All => "reset_data",
        ResetScope::H | ResetScope::K | ResetScope::L => "reset_axis",
        ResetScope::Punch => "reset_punch",
    };
    let ((), state) = run_command(&data, &path, operation, |window| match scope {
        ResetScope::All => {
            window.reset_data();
            Ok(())
        }
        ResetScope::H => window.reset_axis(Axis::H),
        ResetScope::K => window.reset_axis(Axis::K),
        ResetScope::L => window.reset_axis(Axis::L),
        ResetScope::Punch => window.reset_punch(),
    })?;
    Ok(HttpResponse::Ok().json(state))
}

/// 表格单元格编辑，text 是用户输入的原始文本
#[derive(Debug, Deserialize)]
pub struct EditRequest {
    pub axis: Axis,
    pub field: EditField,
    pub text: String,
}

/// 编辑被拒绝不是错误：返回 200，outcome 中带拒绝原因和需要恢复显示的轴状态
#[post("/datasets/{dataset_id}/edit")]
pub async fn edit_dataset(
    data: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<EditRequest>,
) -> Result<HttpResponse, ApiError> {
    let EditRequest { axis, field, text } = payload.into_inner();
    let (outcome, state) = run_command(&data, &path, "edit", |window| {
        Ok(window.apply_edit(axis, field, &text))
    })?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "outcome": outcome,
        "state": state,
    })))
}
