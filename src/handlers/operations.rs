use actix_web::{HttpResponse, get, web};

use crate::app_state::AppState;
use crate::error::ApiError;

/// 获取数据集的操作记录
/// 数据集存在但还没有执行过命令时返回空数组
#[get("/datasets/{dataset_id}/operations")]
pub async fn get_operations(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let dataset_id = path.into_inner();
    if data.datasets.get(&dataset_id).is_none() {
        return Err(ApiError::DatasetNotFound { dataset_id });
    }

    let records = data.operations.get_records(&dataset_id).unwrap_or_default();
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "dataset_id": dataset_id,
        "records": records,
    })))
}
