//! 产品管理

pub mod form;
pub mod handler;
pub mod list;
pub mod model;
pub mod service;

pub use form::ProductForm;
pub use service::ProductService;
