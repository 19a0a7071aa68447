//! 操作处理器注册表

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::datastore::{
    CreateEntryHandler, CreateTableHandler, DataStoreService, DeleteEntryHandler,
    DeleteTableHandler, DoesEntryExistHandler, DoesTableExistHandler, GetEntryHandler,
    UpdateEntryHandler,
};
use crate::objectstore::{
    CreateBucketHandler, CreateFileHandler, DeleteBucketHandler, DeleteFileHandler,
    DoesBucketExistHandler, DoesFileExistHandler, ObjectStoreService, ReadFileHandler,
};
use crate::pubsub::{
    CreateTopicHandler, DeleteTopicHandler, DoesTopicExistHandler, PublishMessageHandler,
    TopicService,
};
use crate::queue::{
    CreateQueueHandler, DeleteMessageHandler, DeleteQueueHandler, DoesQueueExistHandler,
    QueueService, ReadMessageHandler, SendMessageHandler,
};
use crate::OperationHandler;

/// 内置服务模拟器集合
///
/// 注册表持有它们以便测试直接检查服务状态。
#[derive(Clone)]
pub struct ServiceContext {
    pub datastore: Arc<DataStoreService>,
    pub objectstore: Arc<ObjectStoreService>,
    pub topics: Arc<TopicService>,
    pub queues: Arc<QueueService>,
}

impl ServiceContext {
    pub fn new() -> Self {
        Self {
            datastore: Arc::new(DataStoreService::new()),
            objectstore: Arc::new(ObjectStoreService::new()),
            topics: Arc::new(TopicService::new()),
            queues: Arc::new(QueueService::new()),
        }
    }
}

impl Default for ServiceContext {
    fn default() -> Self {
        Self::new()
    }
}

/// 操作处理器注册表
///
/// 管理所有已注册的操作处理器。调度器按步骤声明的操作类型查找；
/// 查不到的类型由引擎降级为失败结果，注册表本身不做回退。
pub struct HandlerRegistry {
    /// 操作类型 -> 处理器
    handlers: Arc<RwLock<HashMap<String, Arc<dyn OperationHandler>>>>,
}

impl HandlerRegistry {
    /// 创建空的注册表
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// 创建带全部内置处理器的注册表
    pub async fn with_builtin_handlers(services: &ServiceContext) -> Self {
        let registry = Self::new();

        let builtin: Vec<Arc<dyn OperationHandler>> = vec![
            // 数据存储操作
            Arc::new(CreateTableHandler::new(services.datastore.clone())),
            Arc::new(CreateEntryHandler::new(services.datastore.clone())),
            Arc::new(GetEntryHandler::new(services.datastore.clone())),
            Arc::new(UpdateEntryHandler::new(services.datastore.clone())),
            Arc::new(DeleteEntryHandler::new(services.datastore.clone())),
            Arc::new(DeleteTableHandler::new(services.datastore.clone())),
            Arc::new(DoesEntryExistHandler::new(services.datastore.clone())),
            Arc::new(DoesTableExistHandler::new(services.datastore.clone())),
            // 对象存储操作
            Arc::new(CreateBucketHandler::new(services.objectstore.clone())),
            Arc::new(CreateFileHandler::new(services.objectstore.clone())),
            Arc::new(ReadFileHandler::new(services.objectstore.clone())),
            Arc::new(DeleteFileHandler::new(services.objectstore.clone())),
            Arc::new(DeleteBucketHandler::new(services.objectstore.clone())),
            Arc::new(DoesBucketExistHandler::new(services.objectstore.clone())),
            Arc::new(DoesFileExistHandler::new(services.objectstore.clone())),
            // 发布订阅操作
            Arc::new(CreateTopicHandler::new(services.topics.clone())),
            Arc::new(DeleteTopicHandler::new(services.topics.clone())),
            Arc::new(DoesTopicExistHandler::new(services.topics.clone())),
            Arc::new(PublishMessageHandler::new(services.topics.clone())),
            // 消息队列操作
            Arc::new(CreateQueueHandler::new(services.queues.clone())),
            Arc::new(DeleteQueueHandler::new(services.queues.clone())),
            Arc::new(DoesQueueExistHandler::new(services.queues.clone())),
            Arc::new(SendMessageHandler::new(services.queues.clone())),
            Arc::new(ReadMessageHandler::new(services.queues.clone())),
            Arc::new(DeleteMessageHandler::new(services.queues.clone())),
        ];

        for handler in builtin {
            registry.register(handler).await;
        }

        registry
    }

    /// 注册处理器（同名操作覆盖旧处理器）
    pub async fn register(&self, handler: Arc<dyn OperationHandler>) {
        info!("注册操作处理器: {}", handler.operation());

        let mut handlers = self.handlers.write().await;
        handlers.insert(handler.operation().to_string(), handler);
    }

    /// 获取处理器实例
    pub async fn get(&self, operation: &str) -> Option<Arc<dyn OperationHandler>> {
        debug!("查找操作处理器: {}", operation);

        let handlers = self.handlers.read().await;
        handlers.get(operation).cloned()
    }

    /// 列出所有已注册的操作类型
    pub async fn list(&self) -> Vec<String> {
        let handlers = self.handlers.read().await;
        let mut operations: Vec<String> = handlers.keys().cloned().collect();
        operations.sort();
        operations
    }

    /// 检查操作类型是否已注册
    pub async fn is_registered(&self, operation: &str) -> bool {
        let handlers = self.handlers.read().await;
        handlers.contains_key(operation)
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_registry_creation() {
        let registry = HandlerRegistry::new();
        assert_eq!(registry.list().await.len(), 0);
    }

    #[tokio::test]
    async fn test_builtin_vocabulary() {
        let services = ServiceContext::new();
        let registry = HandlerRegistry::with_builtin_handlers(&services).await;

        for operation in [
            "CreateEntry",
            "CreateTable",
            "GetEntry",
            "UpdateEntry",
            "DeleteEntry",
            "DeleteTable",
            "DoesEntryExist",
            "DoesTableExist",
            "CreateBucket",
            "CreateFile",
            "DeleteFile",
            "DeleteBucket",
            "DoesBucketExist",
            "DoesFileExist",
            "ReadFile",
            "CreateTopic",
            "DeleteTopic",
            "DoesTopicExist",
            "PublishMessage",
            "SendMessage",
            "ReadMessage",
            "DeleteMessage",
            "DoesQueueExist",
            "CreateQueue",
            "DeleteQueue",
        ] {
            assert!(
                registry.is_registered(operation).await,
                "{} should be registered",
                operation
            );
        }

        // Wait 和 Completed 由引擎路由，不在注册表里
        assert!(!registry.is_registered("Wait").await);
        assert!(!registry.is_registered("Completed").await);
        assert_eq!(registry.list().await.len(), 25);
    }
}
