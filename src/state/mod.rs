//! 运行时状态模块
//!
//! 管理应用状态、发布台账、日志通道和错误通道

pub mod app_state;
pub mod error_channel;
pub mod log_hub;
pub mod publish_ledger;

pub use app_state::AppState;
pub use error_channel::ErrorChannel;
pub use log_hub::{LogHub, LogSubscription};
pub use publish_ledger::PublishLedger;
