//! 消息队列模拟器与对应的操作处理器
//!
//! 模拟按名字寻址的消息队列。读消息返回回执句柄，删除消息必须
//! 携带读到的回执句柄；消息在被删除之前一直留在队列里。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use ctf_common::StepOutcome;

use crate::handler::{is_mock, opt_bool, opt_u64, require_str, OperationHandler};
use crate::{Result, ServiceError};

/// 队列中的消息
#[derive(Debug, Clone)]
pub struct QueueMessage {
    pub message_id: String,
    pub body: String,
    pub receipt_handle: String,
}

/// 消息队列模拟器
#[derive(Default)]
pub struct QueueService {
    // 队列名 -> 消息列表
    queues: RwLock<HashMap<String, Vec<QueueMessage>>>,
}

impl QueueService {
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建队列，返回队列 URL
    pub async fn create_queue(&self, name: &str, fifo: bool) -> Result<String> {
        let mut queue_name = name.to_string();
        if fifo {
            queue_name.push_str(".fifo");
        }

        let mut queues = self.queues.write().await;
        if queues.contains_key(&queue_name) {
            return Err(ServiceError::AlreadyExists(format!(
                "QueueAlreadyExists: {}",
                queue_name
            )));
        }

        debug!("创建队列: {}", queue_name);
        queues.insert(queue_name.clone(), Vec::new());

        Ok(Self::queue_url_for(&queue_name))
    }

    /// 删除队列
    pub async fn delete_queue(&self, name: &str) -> Result<()> {
        let mut queues = self.queues.write().await;

        queues
            .remove(name)
            .ok_or_else(|| ServiceError::NotFound(format!("QueueDoesNotExist: {}", name)))?;

        debug!("删除队列: {}", name);
        Ok(())
    }

    /// 获取队列 URL（队列不存在时报错）
    pub async fn queue_url(&self, name: &str) -> Result<String> {
        let queues = self.queues.read().await;

        if queues.contains_key(name) {
            Ok(Self::queue_url_for(name))
        } else {
            Err(ServiceError::NotFound(format!(
                "QueueDoesNotExist: {}",
                name
            )))
        }
    }

    /// 发送消息，返回消息 ID
    pub async fn send_message(&self, name: &str, body: &str) -> Result<String> {
        let mut queues = self.queues.write().await;
        let messages = queues
            .get_mut(name)
            .ok_or_else(|| ServiceError::NotFound(format!("QueueDoesNotExist: {}", name)))?;

        let message_id = Uuid::new_v4().to_string();
        messages.push(QueueMessage {
            message_id: message_id.clone(),
            body: body.to_string(),
            receipt_handle: Uuid::new_v4().to_string(),
        });

        Ok(message_id)
    }

    /// 读取最多 `max_messages` 条消息
    ///
    /// 队列为空且 `wait_time` 大于零时最多轮询等待这么久（长轮询语义）。
    /// 读取不移除消息，消息在 DeleteMessage 之前可被重复读到。
    pub async fn read_messages(
        &self,
        name: &str,
        max_messages: usize,
        wait_time: Duration,
    ) -> Result<Vec<QueueMessage>> {
        let deadline = tokio::time::Instant::now() + wait_time;

        loop {
            {
                let queues = self.queues.read().await;
                let messages = queues.get(name).ok_or_else(|| {
                    ServiceError::NotFound(format!("QueueDoesNotExist: {}", name))
                })?;

                if !messages.is_empty() || wait_time.is_zero() {
                    return Ok(messages.iter().take(max_messages).cloned().collect());
                }
            }

            if tokio::time::Instant::now() >= deadline {
                return Ok(Vec::new());
            }

            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// 按回执句柄删除消息
    pub async fn delete_message(&self, name: &str, receipt_handle: &str) -> Result<()> {
        let mut queues = self.queues.write().await;
        let messages = queues
            .get_mut(name)
            .ok_or_else(|| ServiceError::NotFound(format!("QueueDoesNotExist: {}", name)))?;

        let before = messages.len();
        messages.retain(|m| m.receipt_handle != receipt_handle);

        if messages.len() == before {
            return Err(ServiceError::InvalidInput(format!(
                "ReceiptHandleIsInvalid: {}",
                receipt_handle
            )));
        }

        Ok(())
    }

    /// 队列长度（测试用）
    pub async fn message_count(&self, name: &str) -> usize {
        self.queues
            .read()
            .await
            .get(name)
            .map(Vec::len)
            .unwrap_or(0)
    }

    fn queue_url_for(name: &str) -> String {
        format!("ctf://queue/{}", name)
    }
}

/// CreateQueue 操作处理器
pub struct CreateQueueHandler {
    service: Arc<QueueService>,
}

impl CreateQueueHandler {
    pub fn new(service: Arc<QueueService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl OperationHandler for CreateQueueHandler {
    fn operation(&self) -> &str {
        "CreateQueue"
    }

    async fn execute(&self, input: Value) -> StepOutcome {
        if is_mock(&input) {
            return StepOutcome::mocked();
        }

        let queue_name = match require_str(&input, "queue_name") {
            Ok(v) => v,
            Err(e) => return StepOutcome::failed(&e),
        };
        let fifo = opt_bool(&input, "fifo");

        match self.service.create_queue(&queue_name, fifo).await {
            Ok(url) => StepOutcome::succeeded(json!({ "QueueUrl": url })),
            Err(e) => StepOutcome::failed(&format!("Error: {}", e)),
        }
    }
}

/// DeleteQueue 操作处理器
pub struct DeleteQueueHandler {
    service: Arc<QueueService>,
}

impl DeleteQueueHandler {
    pub fn new(service: Arc<QueueService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl OperationHandler for DeleteQueueHandler {
    fn operation(&self) -> &str {
        "DeleteQueue"
    }

    async fn execute(&self, input: Value) -> StepOutcome {
        if is_mock(&input) {
            return StepOutcome::mocked();
        }

        let queue_name = match require_str(&input, "queue_name") {
            Ok(v) => v,
            Err(e) => return StepOutcome::failed(&e),
        };

        match self.service.delete_queue(&queue_name).await {
            Ok(()) => StepOutcome::succeeded_text("Queue Deleted"),
            Err(e) => StepOutcome::failed(&format!("Error: {}", e)),
        }
    }
}

/// DoesQueueExist 操作处理器
///
/// 与原始服务一致：队列存在时返回队列 URL，不存在时是失败结果。
pub struct DoesQueueExistHandler {
    service: Arc<QueueService>,
}

impl DoesQueueExistHandler {
    pub fn new(service: Arc<QueueService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl OperationHandler for DoesQueueExistHandler {
    fn operation(&self) -> &str {
        "DoesQueueExist"
    }

    async fn execute(&self, input: Value) -> StepOutcome {
        let queue_name = match require_str(&input, "queue_name") {
            Ok(v) => v,
            Err(e) => return StepOutcome::failed(&e),
        };

        match self.service.queue_url(&queue_name).await {
            Ok(url) => StepOutcome::succeeded_text(&url),
            Err(e) => StepOutcome::failed(&format!("Error: {}", e)),
        }
    }
}

/// SendMessage 操作处理器
pub struct SendMessageHandler {
    service: Arc<QueueService>,
}

impl SendMessageHandler {
    pub fn new(service: Arc<QueueService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl OperationHandler for SendMessageHandler {
    fn operation(&self) -> &str {
        "SendMessage"
    }

    async fn execute(&self, input: Value) -> StepOutcome {
        if is_mock(&input) {
            return StepOutcome::mocked();
        }

        let queue_name = match require_str(&input, "queue_name") {
            Ok(v) => v,
            Err(e) => return StepOutcome::failed(&e),
        };
        let message = match require_str(&input, "message") {
            Ok(v) => v,
            Err(e) => return StepOutcome::failed(&e),
        };

        match self.service.send_message(&queue_name, &message).await {
            Ok(message_id) => StepOutcome::succeeded(json!({ "MessageId": message_id })),
            Err(e) => StepOutcome::failed(&format!("Error: {}", e)),
        }
    }
}

/// ReadMessage 操作处理器
///
/// 结果是 `消息 ID -> [消息体, 回执句柄]` 的映射，空队列返回空映射。
pub struct ReadMessageHandler {
    service: Arc<QueueService>,
}

impl ReadMessageHandler {
    pub fn new(service: Arc<QueueService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl OperationHandler for ReadMessageHandler {
    fn operation(&self) -> &str {
        "ReadMessage"
    }

    async fn execute(&self, input: Value) -> StepOutcome {
        if is_mock(&input) {
            return StepOutcome::mocked();
        }

        let queue_name = match require_str(&input, "queue_name") {
            Ok(v) => v,
            Err(e) => return StepOutcome::failed(&e),
        };
        let max_messages = opt_u64(&input, "MaxNumberOfMessages").unwrap_or(1) as usize;
        let wait_time = Duration::from_secs(opt_u64(&input, "WaitTimeSeconds").unwrap_or(0));

        match self
            .service
            .read_messages(&queue_name, max_messages, wait_time)
            .await
        {
            Ok(messages) => {
                let mut response = Map::new();
                for m in messages {
                    response.insert(m.message_id, json!([m.body, m.receipt_handle]));
                }
                StepOutcome::succeeded(Value::Object(response))
            }
            Err(e) => StepOutcome::failed(&format!("Error: {}", e)),
        }
    }
}

/// DeleteMessage 操作处理器
pub struct DeleteMessageHandler {
    service: Arc<QueueService>,
}

impl DeleteMessageHandler {
    pub fn new(service: Arc<QueueService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl OperationHandler for DeleteMessageHandler {
    fn operation(&self) -> &str {
        "DeleteMessage"
    }

    async fn execute(&self, input: Value) -> StepOutcome {
        if is_mock(&input) {
            return StepOutcome::mocked();
        }

        let queue_name = match require_str(&input, "queue_name") {
            Ok(v) => v,
            Err(e) => return StepOutcome::failed(&e),
        };
        let receipt_handle = match require_str(&input, "receipt_handle") {
            Ok(v) => v,
            Err(e) => return StepOutcome::failed(&e),
        };

        match self.service.delete_message(&queue_name, &receipt_handle).await {
            Ok(()) => StepOutcome::succeeded_text("Deleted message from queue"),
            Err(e) => StepOutcome::failed(&format!("Error: {}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_send_read_delete_round_trip() {
        let service = Arc::new(QueueService::new());
        service.create_queue("jobs", false).await.unwrap();

        let outcome = SendMessageHandler::new(service.clone())
            .execute(json!({ "queue_name": "jobs", "message": "payload" }))
            .await;
        assert!(outcome.is_succeeded());

        let outcome = ReadMessageHandler::new(service.clone())
            .execute(json!({ "queue_name": "jobs" }))
            .await;
        assert!(outcome.is_succeeded());
        let response = outcome.response.unwrap();
        let (_, entry) = response.as_object().unwrap().iter().next().unwrap();
        assert_eq!(entry[0], "payload");
        let receipt = entry[1].as_str().unwrap().to_string();

        let outcome = DeleteMessageHandler::new(service.clone())
            .execute(json!({ "queue_name": "jobs", "receipt_handle": receipt }))
            .await;
        assert!(outcome.is_succeeded());
        assert_eq!(service.message_count("jobs").await, 0);
    }

    #[tokio::test]
    async fn test_fifo_queue_name_suffix() {
        let service = Arc::new(QueueService::new());
        let url = service.create_queue("orders", true).await.unwrap();
        assert!(url.ends_with("orders.fifo"));
        assert!(service.queue_url("orders.fifo").await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_queue_is_failure() {
        let service = Arc::new(QueueService::new());

        let outcome = DoesQueueExistHandler::new(service)
            .execute(json!({ "queue_name": "nope" }))
            .await;
        assert!(!outcome.is_succeeded());
        assert!(outcome.message.unwrap().contains("QueueDoesNotExist"));
    }

    #[tokio::test]
    async fn test_invalid_receipt_handle_fails() {
        let service = Arc::new(QueueService::new());
        service.create_queue("q", false).await.unwrap();
        service.send_message("q", "m").await.unwrap();

        let outcome = DeleteMessageHandler::new(service)
            .execute(json!({ "queue_name": "q", "receipt_handle": "bogus" }))
            .await;
        assert!(!outcome.is_succeeded());
        assert!(outcome.message.unwrap().contains("ReceiptHandleIsInvalid"));
    }

    #[tokio::test]
    async fn test_read_respects_max_messages() {
        let service = Arc::new(QueueService::new());
        service.create_queue("q", false).await.unwrap();
        for i in 0..5 {
            service.send_message("q", &format!("m{}", i)).await.unwrap();
        }

        let messages = service
            .read_messages("q", 3, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(messages.len(), 3);
    }
}
