//! # catalog-admin
//!
//! 化妆品目录管理后台：产品和成分的增删改查、图片上传、分类管理和会话访问控制。
//! 所有数据操作都直接转发给后端服务（托管 Postgres、认证和对象存储），
//! 服务本身不保存状态。

pub mod app;
pub mod config;
pub mod core;
pub mod infrastructure;

pub use app::{router, AppState};
pub use config::{load_config, Config};
pub use infrastructure::backend::Backend;
