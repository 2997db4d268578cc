//! 分类与产品类型

pub mod handler;
pub mod model;
pub mod service;

pub use service::CatalogService;
