//! 发布订阅模拟器与对应的操作处理器
//!
//! 模拟按主题发布消息的服务。FIFO 主题的名字带 `.fifo` 后缀，
//! 发布时要求 `message_group_id`；关闭基于内容去重后还要求
//! `message_deduplication_id`。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use ctf_common::StepOutcome;

use crate::handler::{is_mock, opt_bool, opt_str, require_str, OperationHandler};
use crate::{Result, ServiceError};

/// 已发布的消息
#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub message_id: String,
    pub message: String,
    pub subject: Option<String>,
    pub message_group_id: Option<String>,
}

#[derive(Debug)]
struct TopicData {
    fifo: bool,
    content_based_deduplication: bool,
    messages: Vec<PublishedMessage>,
}

/// 发布订阅模拟器
#[derive(Default)]
pub struct TopicService {
    // 主题 ARN -> 主题数据
    topics: RwLock<HashMap<String, TopicData>>,
}

impl TopicService {
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建主题，返回主题 ARN（重复创建幂等地返回同一 ARN）
    pub async fn create_topic(
        &self,
        name: &str,
        fifo: bool,
        content_based_deduplication: bool,
    ) -> Result<String> {
        let mut topic_name = name.to_string();
        if fifo {
            topic_name.push_str(".fifo");
        }
        let arn = format!("ctf:pubsub:topic/{}", topic_name);

        let mut topics = self.topics.write().await;
        topics.entry(arn.clone()).or_insert_with(|| {
            debug!("创建主题: {}", topic_name);
            TopicData {
                fifo,
                content_based_deduplication,
                messages: Vec::new(),
            }
        });

        Ok(arn)
    }

    /// 删除主题
    pub async fn delete_topic(&self, arn: &str) -> Result<()> {
        let mut topics = self.topics.write().await;

        topics
            .remove(arn)
            .ok_or_else(|| ServiceError::NotFound(format!("Topic does not exist: {}", arn)))?;

        debug!("删除主题: {}", arn);
        Ok(())
    }

    /// 主题是否存在
    pub async fn topic_exists(&self, arn: &str) -> bool {
        self.topics.read().await.contains_key(arn)
    }

    /// 发布消息，返回消息 ID
    pub async fn publish(
        &self,
        arn: &str,
        message: &str,
        subject: Option<String>,
        message_group_id: Option<String>,
        message_deduplication_id: Option<String>,
    ) -> Result<String> {
        let mut topics = self.topics.write().await;
        let topic = topics
            .get_mut(arn)
            .ok_or_else(|| ServiceError::NotFound(format!("Topic does not exist: {}", arn)))?;

        if topic.fifo {
            if message_group_id.is_none() {
                return Err(ServiceError::InvalidInput(
                    "message_group_id is required for fifo topics".to_string(),
                ));
            }
            if !topic.content_based_deduplication && message_deduplication_id.is_none() {
                return Err(ServiceError::InvalidInput(
                    "message_deduplication_id is required when content based deduplication is off"
                        .to_string(),
                ));
            }
        }

        let message_id = Uuid::new_v4().to_string();
        topic.messages.push(PublishedMessage {
            message_id: message_id.clone(),
            message: message.to_string(),
            subject,
            message_group_id,
        });

        Ok(message_id)
    }

    /// 主题上已发布的消息（测试用）
    pub async fn published_messages(&self, arn: &str) -> Vec<PublishedMessage> {
        self.topics
            .read()
            .await
            .get(arn)
            .map(|t| t.messages.clone())
            .unwrap_or_default()
    }
}

/// CreateTopic 操作处理器
pub struct CreateTopicHandler {
    service: Arc<TopicService>,
}

impl CreateTopicHandler {
    pub fn new(service: Arc<TopicService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl OperationHandler for CreateTopicHandler {
    fn operation(&self) -> &str {
        "CreateTopic"
    }

    async fn execute(&self, input: Value) -> StepOutcome {
        if is_mock(&input) {
            return StepOutcome::mocked();
        }

        let topic_name = match require_str(&input, "topic_name") {
            Ok(v) => v,
            Err(e) => return StepOutcome::failed(&e),
        };
        let fifo = opt_bool(&input, "fifo");
        // fifo 主题默认开启基于内容的去重
        let content_based_deduplication = input
            .get("content_based_deduplication")
            .and_then(Value::as_bool)
            .unwrap_or(true);

        match self
            .service
            .create_topic(&topic_name, fifo, content_based_deduplication)
            .await
        {
            Ok(arn) => StepOutcome::succeeded(json!({ "TopicArn": arn })),
            Err(e) => StepOutcome::failed(&format!("Error: {}", e)),
        }
    }
}

/// DeleteTopic 操作处理器
pub struct DeleteTopicHandler {
    service: Arc<TopicService>,
}

impl DeleteTopicHandler {
    pub fn new(service: Arc<TopicService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl OperationHandler for DeleteTopicHandler {
    fn operation(&self) -> &str {
        "DeleteTopic"
    }

    async fn execute(&self, input: Value) -> StepOutcome {
        if is_mock(&input) {
            return StepOutcome::mocked();
        }

        let topic_arn = match require_str(&input, "topic_arn") {
            Ok(v) => v,
            Err(e) => return StepOutcome::failed(&e),
        };

        match self.service.delete_topic(&topic_arn).await {
            Ok(()) => StepOutcome::succeeded_text("Topic Deleted"),
            Err(e) => StepOutcome::failed(&format!("Error: {}", e)),
        }
    }
}

/// DoesTopicExist 操作处理器
///
/// 主题缺失不是失败：结果状态仍是成功，`response` 为存在与否的布尔值。
pub struct DoesTopicExistHandler {
    service: Arc<TopicService>,
}

impl DoesTopicExistHandler {
    pub fn new(service: Arc<TopicService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl OperationHandler for DoesTopicExistHandler {
    fn operation(&self) -> &str {
        "DoesTopicExist"
    }

    async fn execute(&self, input: Value) -> StepOutcome {
        let topic_arn = match require_str(&input, "topic_arn") {
            Ok(v) => v,
            Err(e) => return StepOutcome::failed(&e),
        };

        let exists = self.service.topic_exists(&topic_arn).await;
        StepOutcome::succeeded(Value::Bool(exists))
    }
}

/// PublishMessage 操作处理器
pub struct PublishMessageHandler {
    service: Arc<TopicService>,
}

impl PublishMessageHandler {
    pub fn new(service: Arc<TopicService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl OperationHandler for PublishMessageHandler {
    fn operation(&self) -> &str {
        "PublishMessage"
    }

    async fn execute(&self, input: Value) -> StepOutcome {
        if is_mock(&input) {
            return StepOutcome::mocked();
        }

        // topic_arn 和 target_arn 至少要有一个
        let arn = match opt_str(&input, "target_arn").or_else(|| opt_str(&input, "topic_arn")) {
            Some(arn) => arn,
            None => return StepOutcome::failed("Error: KeyError - 'topic_arn'"),
        };
        let message = match require_str(&input, "message") {
            Ok(v) => v,
            Err(e) => return StepOutcome::failed(&e),
        };

        match self
            .service
            .publish(
                &arn,
                &message,
                opt_str(&input, "subject"),
                opt_str(&input, "message_group_id"),
                opt_str(&input, "message_deduplication_id"),
            )
            .await
        {
            Ok(message_id) => StepOutcome::succeeded(json!({ "MessageId": message_id })),
            Err(e) => StepOutcome::failed(&format!("Error: {}", e)),
        }
    }
}
