//! 配置模块
//!
//! 环境变量解析与项目发布配置

pub mod env;
pub mod project;

pub use env::{EnvConfig, RuntimeConfig};
