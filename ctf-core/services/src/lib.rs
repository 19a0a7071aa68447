//! CTF 操作处理器层
//!
//! 提供统一的操作处理器抽象接口和处理器注册表，并内置数据存储、
//! 对象存储、发布订阅和消息队列四组内存模拟器处理器。

pub mod datastore;
pub mod handler;
pub mod objectstore;
pub mod pubsub;
pub mod queue;
pub mod registry;

pub use handler::OperationHandler;
pub use registry::{HandlerRegistry, ServiceContext};

pub use datastore::DataStoreService;
pub use objectstore::ObjectStoreService;
pub use pubsub::TopicService;
pub use queue::QueueService;

use thiserror::Error;

/// 服务模拟器错误
///
/// 处理器会把这些错误捕获为 FAILED 结果，不会向引擎传播。
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("ResourceNotFoundException - {0}")]
    NotFound(String),

    #[error("ResourceAlreadyExistsException - {0}")]
    AlreadyExists(String),

    #[error("ValidationException - {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, ServiceError>;
