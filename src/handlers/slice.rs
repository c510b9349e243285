use actix_web::{HttpResponse, get, http::header::ContentType, web};
use serde::Deserialize;

use crate::app_state::AppState;
use crate::axis::Axis;
use crate::error::ApiError;
use crate::handlers::binary::encode_f64_le;
use crate::volume::Quantity;

#[derive(Deserialize)]
pub struct SliceQuery {
    pub axis: Axis,
    /// 切面坐标，缺省或超出范围时取中间的 bin
    pub value: Option<f64>,
    #[serde(default)]
    pub quantity: Quantity,
}

/// 二维切面，按小端 f64 返回，第一个维度变化最快
/// 切面的元信息放在 X-Slice-* 响应头里
#[get("/datasets/{dataset_id}/slice")]
pub async fn get_slice(
    data: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<SliceQuery>,
) -> Result<HttpResponse, ApiError> {
    let dataset_id = path.into_inner();
    let dataset = data
        .datasets
        .get(&dataset_id)
        .ok_or_else(|| ApiError::DatasetNotFound {
            dataset_id: dataset_id.clone(),
        })?;

    let plane = dataset
        .window
        .lock()
        .slice_plane(query.axis, query.value, query.quantity);
    let bytes = encode_f64_le(&plane.data)?;

    Ok(HttpResponse::Ok()
        .content_type(ContentType::octet_stream())
        .append_header(("X-Slice-Axis", plane.axis.label()))
        .append_header(("X-Slice-Index", plane.index.to_string()))
        .append_header(("X-Slice-Value", plane.value.to_string()))
        .append_header((
            "X-Slice-Shape",
            format!("{},{}", plane.shape[0], plane.shape[1]),
        ))
        .append_header(("X-Slice-Dataset", dataset_id))
        .body(bytes))
}

#[derive(Deserialize)]
pub struct RebinOptionsQuery {
    pub axis: Axis,
    #[serde(default)]
    pub centered: bool,
}

/// 重分箱下拉框的候选项
#[get("/datasets/{dataset_id}/rebin-options")]
pub async fn get_rebin_options(
    data: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<RebinOptionsQuery>,
) -> Result<HttpResponse, ApiError> {
    let dataset_id = path.into_inner();
    let dataset = data
        .datasets
        .get(&dataset_id)
        .ok_or_else(|| ApiError::DatasetNotFound {
            dataset_id: dataset_id.clone(),
        })?;

    let options = dataset
        .window
        .lock()
        .rebin_options(query.axis, query.centered);

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "dataset_id": dataset_id,
        "axis": query.axis,
        "centered": query.centered,
        "options": options,
    })))
}
