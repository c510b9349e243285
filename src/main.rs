use std::sync::Arc;

use actix_web::{App, HttpServer, web};
use tracing::{error, info};

use hkl_window::app_state::AppState;
use hkl_window::config::AppConfig;
use hkl_window::export::ExportStore;
use hkl_window::{routes, telemetry};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    if let Err(err) = telemetry::init_tracing() {
        eprintln!("日志初始化失败: {err}");
    }

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(%err, "配置无效");
            return Err(std::io::Error::new(std::io::ErrorKind::InvalidInput, err));
        }
    };

    let state = AppState::new(&config);
    let exports = state.exports.clone();
    let app_state = web::Data::new(state);

    // 定期清理过期或已取完的导出任务
    spawn_cleanup(exports, config.cleanup_interval);

    info!(
        bind_addr = %config.bind_addr,
        export_ttl_secs = config.export_ttl.as_secs(),
        cleanup_interval_secs = config.cleanup_interval.as_secs(),
        max_json_bytes = config.max_json_bytes,
        "服务器启动"
    );

    let max_json_bytes = config.max_json_bytes;
    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .app_data(web::JsonConfig::default().limit(max_json_bytes))
            .configure(routes::configure)
    })
    .bind(config.bind_addr)?
    .run()
    .await
}

fn spawn_cleanup(exports: Arc<ExportStore>, every: std::time::Duration) {
    actix_web::rt::spawn(async move {
        let mut interval = actix_web::rt::time::interval(every);
        loop {
            interval.tick().await;
            let cleaned_count = exports.cleanup_expired();
            if cleaned_count > 0 {
                info!(
                    cleaned_count,
                    remaining = exports.task_count(),
                    "清理过期导出任务"
                );
            }
        }
    });
}
