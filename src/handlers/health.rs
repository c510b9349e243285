use actix_web::{HttpResponse, Responder, get, web};

use crate::app_state::AppState;

/// 根路径健康检查/服务说明
#[get("/")]
pub async fn hello(data: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "message": "HKL 体数据窗口服务",
        "version": env!("CARGO_PKG_VERSION"),
        "open_datasets": data.datasets.dataset_count(),
        "export_tasks": data.exports.task_count(),
        "export_ttl_secs": data.exports.default_ttl().as_secs(),
    }))
}
