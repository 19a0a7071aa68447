//! CLI 命令处理模块

pub mod config_cmd;
pub mod log;
pub mod run;
pub mod validate;
