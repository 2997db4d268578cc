//! 登录与退出

pub mod handler;
