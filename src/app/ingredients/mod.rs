//! 成分管理

pub mod form;
pub mod handler;
pub mod list;
pub mod model;
pub mod service;

pub use form::IngredientForm;
pub use service::IngredientService;
