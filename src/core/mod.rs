//! 核心模块：错误、响应、中间件和输入清理

pub mod error;
pub mod middleware;
pub mod response;
pub mod sanitize;

pub use error::CoreError;
pub use response::{ApiResponse, SubmitOutcome};
