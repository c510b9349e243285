use actix_web::web;

use crate::handlers;

/// 统一注册 HTTP 路由，方便集中管理
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(handlers::hello)
        .service(handlers::load_dataset)
        .service(handlers::get_dataset)
        .service(handlers::close_dataset)
        .service(handlers::rebin_dataset)
        .service(handlers::crop_dataset)
        .service(handlers::punch_dataset)
        .service(handlers::reset_dataset)
        .service(handlers::edit_dataset)
        .service(handlers::get_rebin_options)
        .service(handlers::get_slice)
        .service(handlers::export_dataset)
        .service(handlers::get_export_chunk)
        .service(handlers::get_operations);
}
