//! 图片引用解析

pub mod handler;
pub mod resolver;

pub use resolver::{ImageResolver, ImageSource, ResolvedImage};
