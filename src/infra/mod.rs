//! 基础设施模块
//!
//! 封装外部依赖（命令执行、文件系统、项目存储）

pub mod command;
pub mod fs;
pub mod project_store;

pub use command::CommandRunner;
pub use project_store::{FsProjectStore, ProjectStore};
