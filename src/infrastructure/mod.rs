//! 基础设施层

pub mod backend;
#[cfg(feature = "database")]
pub mod database;
pub mod logger;
pub mod memory;
pub mod supabase;

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use crate::config::{BackendConfig, BackendKind};
use backend::Backend;
use memory::MemoryBackend;
use supabase::SupabaseClient;

/// 按配置构造后端
pub async fn connect(config: &BackendConfig) -> Result<Backend> {
    match config.kind {
        BackendKind::Memory => {
            info!("使用内存后端");
            Ok(MemoryBackend::new(config.url.clone()).into_backend())
        }
        BackendKind::Supabase => {
            info!("使用托管服务后端: {}", config.url);
            let client = Arc::new(SupabaseClient::new(&config.url, config.api_key()));
            Ok(Backend::new(client.clone(), client.clone(), client))
        }
        BackendKind::Postgres => connect_postgres(config).await,
    }
}

#[cfg(feature = "database")]
async fn connect_postgres(config: &BackendConfig) -> Result<Backend> {
    let database_url = config
        .database_url
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("database_url 未配置"))?;

    let manager = database::DatabaseManager::new(database_url).await?;
    info!("已连接数据库，存储和认证使用 {}", config.url);

    let rows = Arc::new(database::PgRowStore::new(manager.get_pool().clone()));
    let client = Arc::new(SupabaseClient::new(&config.url, config.api_key()));
    Ok(Backend::new(rows, client.clone(), client))
}

#[cfg(not(feature = "database"))]
async fn connect_postgres(_config: &BackendConfig) -> Result<Backend> {
    anyhow::bail!("kind = postgres 需要启用 database 特性")
}
