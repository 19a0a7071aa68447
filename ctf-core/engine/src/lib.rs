//! CTF 编排引擎
//!
//! 测试组 → 迭代 → 测试 → 步骤的状态机执行核心：解析输入、按序取出
//! 迭代与步骤、按操作类型调度处理器、把每个步骤的结果写入持久化日志，
//! 直到所有迭代耗尽或者触发致命条件/全局超时。

pub mod definition;
pub mod dispatch;
pub mod finisher;
pub mod iteration;
pub mod logger;
pub mod parser;
pub mod runner;
pub mod step;
pub mod waiter;

pub use definition::{Iteration, StepDefinition, TestDefinition, TestGroupDefinition};
pub use dispatch::OperationDispatcher;
pub use finisher::{FatalPolicy, IterationsFinisher, TestFinisher};
pub use iteration::{IterationBatch, IterationLoader};
pub use logger::StepLogger;
pub use parser::{DirectoryTestSource, InMemoryTestSource, InputParser, TestSource};
pub use runner::{
    RunReport, RunnerConfig, TestGroupRunner, DEFAULT_MAX_CONCURRENCY, DEFAULT_RUN_TIMEOUT,
};
pub use step::{LoadedStep, StepLoader};
pub use waiter::{WaitScheduler, WaitToken};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("输入解析失败: {0}")]
    MalformedInput(String),

    #[error("致命条件触发，终止执行: {0}")]
    FatalCondition(String),

    #[error("执行超时")]
    Timeout,

    #[error("日志存储错误: {0}")]
    Storage(#[from] ctf_storage::StorageError),

    #[error("IO 错误: {0}")]
    IoError(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    SerdeError(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
