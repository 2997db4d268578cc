//! 日志基础设施

use anyhow::Result;
use std::io;
use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::LoggingConfig;

pub struct Logger;

impl Logger {
    /// 初始化日志系统
    ///
    /// 文件日志按日期分割，控制台输出可在配置中关闭。`RUST_LOG` 优先于配置中的级别。
    /// 返回的 guard 必须持有到进程退出，否则缓冲中的日志会丢失。
    pub fn init(config: &LoggingConfig) -> Result<WorkerGuard> {
        std::fs::create_dir_all(&config.log_path)?;

        let file_appender = rolling::daily(&config.log_path, &config.file_prefix);
        let (writer, guard) = non_blocking(file_appender);

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("{},tower_http=info", config.level)));

        let console = config
            .console_output
            .then(|| fmt::layer().with_writer(io::stdout).with_ansi(true).boxed());

        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_target(false)
                    .with_thread_names(true),
            )
            .with(console)
            .try_init()?;

        Ok(guard)
    }
}
