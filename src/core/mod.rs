// 核心数据结构和类型定义

pub mod types;
pub mod config;
pub mod error;

pub use types::*;
pub use config::*;
pub use error::*;
