use anyhow::Result;
use tokio::net::TcpListener;
use tokio::signal::ctrl_c;
#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

use catalog_admin::infrastructure::{self, logger::Logger};
use catalog_admin::{load_config, router, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config()?;
    let _guard = Logger::init(&config.logging)?;

    info!("启动目录管理后台，后端类型: {:?}", config.backend.kind);

    let backend = infrastructure::connect(&config.backend).await.map_err(|e| {
        error!("后端初始化失败: {}", e);
        e
    })?;

    let addr = format!("{}:{}", config.server.bind_address, config.server.port);
    let app = router(AppState::new(config, backend));

    let listener = TcpListener::bind(&addr).await?;
    info!("HTTP 服务监听 {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("服务已停止");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = ctrl_c().await {
            error!("无法监听 Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("收到 Ctrl+C，准备退出");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("收到终止信号，准备退出");
            }
            Err(e) => {
                error!("无法监听终止信号: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
