//! 对象存储模拟器与对应的操作处理器
//!
//! 模拟桶/文件两级的对象存储。文件内容以 JSON 序列化后的文本保存，
//! DoesFileExist 支持对内容做正则断言。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use ctf_common::StepOutcome;

use crate::handler::{is_mock, opt_str, require_str, OperationHandler};
use crate::{Result, ServiceError};

/// 对象存储模拟器
#[derive(Default)]
pub struct ObjectStoreService {
    // 桶名 -> (文件名 -> 内容)
    buckets: RwLock<HashMap<String, HashMap<String, String>>>,
}

impl ObjectStoreService {
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建桶
    pub async fn create_bucket(&self, name: &str) -> Result<()> {
        let mut buckets = self.buckets.write().await;

        if buckets.contains_key(name) {
            return Err(ServiceError::AlreadyExists(format!(
                "BucketAlreadyExists: {}",
                name
            )));
        }

        debug!("创建桶: {}", name);
        buckets.insert(name.to_string(), HashMap::new());

        Ok(())
    }

    /// 写入文件（内容为 JSON 值，序列化后保存）
    pub async fn put_file(&self, bucket: &str, file: &str, contents: &Value) -> Result<()> {
        let mut buckets = self.buckets.write().await;
        let files = buckets
            .get_mut(bucket)
            .ok_or_else(|| ServiceError::NotFound(format!("NoSuchBucket: {}", bucket)))?;

        let text = serde_json::to_string(contents)
            .map_err(|e| ServiceError::InvalidInput(e.to_string()))?;
        files.insert(file.to_string(), text);

        Ok(())
    }

    /// 读取文件内容
    pub async fn read_file(&self, bucket: &str, file: &str) -> Result<String> {
        let buckets = self.buckets.read().await;
        let files = buckets
            .get(bucket)
            .ok_or_else(|| ServiceError::NotFound(format!("NoSuchBucket: {}", bucket)))?;

        files
            .get(file)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(format!("NoSuchKey: {}", file)))
    }

    /// 删除文件（文件不存在时视为成功）
    pub async fn delete_file(&self, bucket: &str, file: &str) -> Result<()> {
        let mut buckets = self.buckets.write().await;
        let files = buckets
            .get_mut(bucket)
            .ok_or_else(|| ServiceError::NotFound(format!("NoSuchBucket: {}", bucket)))?;

        files.remove(file);

        Ok(())
    }

    /// 删除桶（仅允许删除空桶）
    pub async fn delete_bucket(&self, name: &str) -> Result<()> {
        let mut buckets = self.buckets.write().await;

        let files = buckets
            .get(name)
            .ok_or_else(|| ServiceError::NotFound(format!("NoSuchBucket: {}", name)))?;

        if !files.is_empty() {
            return Err(ServiceError::InvalidInput(format!(
                "BucketNotEmpty: {}",
                name
            )));
        }

        debug!("删除桶: {}", name);
        buckets.remove(name);

        Ok(())
    }

    /// 桶是否存在
    pub async fn bucket_exists(&self, name: &str) -> bool {
        self.buckets.read().await.contains_key(name)
    }
}

/// CreateBucket 操作处理器
pub struct CreateBucketHandler {
    store: Arc<ObjectStoreService>,
}

impl CreateBucketHandler {
    pub fn new(store: Arc<ObjectStoreService>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl OperationHandler for CreateBucketHandler {
    fn operation(&self) -> &str {
        "CreateBucket"
    }

    async fn execute(&self, input: Value) -> StepOutcome {
        if is_mock(&input) {
            return StepOutcome::mocked();
        }

        let bucket_name = match require_str(&input, "bucket_name") {
            Ok(v) => v,
            Err(e) => return StepOutcome::failed(&e),
        };

        match self.store.create_bucket(&bucket_name).await {
            Ok(()) => StepOutcome::succeeded_empty(),
            Err(e) => StepOutcome::failed(&format!("Error: {}", e)),
        }
    }
}

/// CreateFile 操作处理器
pub struct CreateFileHandler {
    store: Arc<ObjectStoreService>,
}

impl CreateFileHandler {
    pub fn new(store: Arc<ObjectStoreService>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl OperationHandler for CreateFileHandler {
    fn operation(&self) -> &str {
        "CreateFile"
    }

    async fn execute(&self, input: Value) -> StepOutcome {
        if is_mock(&input) {
            return StepOutcome::mocked();
        }

        let bucket_name = match require_str(&input, "bucket_name") {
            Ok(v) => v,
            Err(e) => return StepOutcome::failed(&e),
        };
        let file_name = match require_str(&input, "file_name") {
            Ok(v) => v,
            Err(e) => return StepOutcome::failed(&e),
        };
        let contents = match input.get("file_contents") {
            Some(v) => v,
            None => return StepOutcome::failed("Error: KeyError - 'file_contents'"),
        };

        match self.store.put_file(&bucket_name, &file_name, contents).await {
            Ok(()) => StepOutcome::succeeded_empty(),
            Err(e) => StepOutcome::failed(&format!("Error: {}", e)),
        }
    }
}

/// ReadFile 操作处理器
pub struct ReadFileHandler {
    store: Arc<ObjectStoreService>,
}

impl ReadFileHandler {
    pub fn new(store: Arc<ObjectStoreService>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl OperationHandler for ReadFileHandler {
    fn operation(&self) -> &str {
        "ReadFile"
    }

    async fn execute(&self, input: Value) -> StepOutcome {
        if is_mock(&input) {
            return StepOutcome::mocked();
        }

        let bucket_name = match require_str(&input, "bucket_name") {
            Ok(v) => v,
            Err(e) => return StepOutcome::failed(&e),
        };
        let file_name = match require_str(&input, "file_name") {
            Ok(v) => v,
            Err(e) => return StepOutcome::failed(&e),
        };

        match self.store.read_file(&bucket_name, &file_name).await {
            Ok(contents) => StepOutcome::succeeded_text(&contents),
            Err(e) => StepOutcome::failed(&format!("Error: {}", e)),
        }
    }
}

/// DeleteFile 操作处理器
pub struct DeleteFileHandler {
    store: Arc<ObjectStoreService>,
}

impl DeleteFileHandler {
    pub fn new(store: Arc<ObjectStoreService>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl OperationHandler for DeleteFileHandler {
    fn operation(&self) -> &str {
        "DeleteFile"
    }

    async fn execute(&self, input: Value) -> StepOutcome {
        if is_mock(&input) {
            return StepOutcome::mocked();
        }

        let bucket_name = match require_str(&input, "bucket_name") {
            Ok(v) => v,
            Err(e) => return StepOutcome::failed(&e),
        };
        let file_name = match require_str(&input, "file_name") {
            Ok(v) => v,
            Err(e) => return StepOutcome::failed(&e),
        };

        match self.store.delete_file(&bucket_name, &file_name).await {
            Ok(()) => StepOutcome::succeeded_text("File Deleted"),
            Err(e) => StepOutcome::failed(&format!("Error: {}", e)),
        }
    }
}

/// DeleteBucket 操作处理器
pub struct DeleteBucketHandler {
    store: Arc<ObjectStoreService>,
}

impl DeleteBucketHandler {
    pub fn new(store: Arc<ObjectStoreService>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl OperationHandler for DeleteBucketHandler {
    fn operation(&self) -> &str {
        "DeleteBucket"
    }

    async fn execute(&self, input: Value) -> StepOutcome {
        if is_mock(&input) {
            return StepOutcome::mocked();
        }

        let bucket_name = match require_str(&input, "bucket_name") {
            Ok(v) => v,
            Err(e) => return StepOutcome::failed(&e),
        };

        match self.store.delete_bucket(&bucket_name).await {
            Ok(()) => StepOutcome::succeeded_text("Bucket Deleted"),
            Err(e) => StepOutcome::failed(&format!("Error: {}", e)),
        }
    }
}

/// DoesBucketExist 操作处理器
pub struct DoesBucketExistHandler {
    store: Arc<ObjectStoreService>,
}

impl DoesBucketExistHandler {
    pub fn new(store: Arc<ObjectStoreService>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl OperationHandler for DoesBucketExistHandler {
    fn operation(&self) -> &str {
        "DoesBucketExist"
    }

    async fn execute(&self, input: Value) -> StepOutcome {
        let bucket_name = match require_str(&input, "bucket_name") {
            Ok(v) => v,
            Err(e) => return StepOutcome::failed(&e),
        };

        if self.store.bucket_exists(&bucket_name).await {
            StepOutcome::succeeded(Value::Bool(true))
        } else {
            StepOutcome::succeeded(Value::Bool(false))
        }
    }
}

/// DoesFileExist 操作处理器
///
/// 可选的 `contents` 字段是对文件内容的正则断言。
pub struct DoesFileExistHandler {
    store: Arc<ObjectStoreService>,
}

impl DoesFileExistHandler {
    pub fn new(store: Arc<ObjectStoreService>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl OperationHandler for DoesFileExistHandler {
    fn operation(&self) -> &str {
        "DoesFileExist"
    }

    async fn execute(&self, input: Value) -> StepOutcome {
        let bucket_name = match require_str(&input, "bucket_name") {
            Ok(v) => v,
            Err(e) => return StepOutcome::failed(&e),
        };
        let file_name = match require_str(&input, "file_name") {
            Ok(v) => v,
            Err(e) => return StepOutcome::failed(&e),
        };

        let contents = match self.store.read_file(&bucket_name, &file_name).await {
            Ok(contents) => contents,
            Err(_) => return StepOutcome::succeeded_text("File does not exist"),
        };

        match opt_str(&input, "contents") {
            Some(pattern) => match regex::Regex::new(&pattern) {
                Ok(re) if re.is_match(&contents) => {
                    StepOutcome::succeeded_text("File exists and contains the given contents")
                }
                Ok(_) => StepOutcome::succeeded_text("File does not exist"),
                Err(e) => StepOutcome::failed(&format!("Error: {}", e)),
            },
            None => StepOutcome::succeeded_text("File exists and contains the given contents"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_bucket_file_round_trip() {
        let store = Arc::new(ObjectStoreService::new());

        let outcome = CreateBucketHandler::new(store.clone())
            .execute(json!({ "bucket_name": "b1" }))
            .await;
        assert!(outcome.is_succeeded());

        let outcome = CreateFileHandler::new(store.clone())
            .execute(json!({
                "bucket_name": "b1",
                "file_name": "data.json",
                "file_contents": { "hello": "world" }
            }))
            .await;
        assert!(outcome.is_succeeded());

        let outcome = ReadFileHandler::new(store)
            .execute(json!({ "bucket_name": "b1", "file_name": "data.json" }))
            .await;
        assert!(outcome.is_succeeded());
        let text = outcome.response.unwrap();
        assert!(text.as_str().unwrap().contains("hello"));
    }

    #[tokio::test]
    async fn test_delete_non_empty_bucket_fails() {
        let store = Arc::new(ObjectStoreService::new());
        store.create_bucket("b1").await.unwrap();
        store.put_file("b1", "f", &json!(1)).await.unwrap();

        let outcome = DeleteBucketHandler::new(store.clone())
            .execute(json!({ "bucket_name": "b1" }))
            .await;
        assert!(!outcome.is_succeeded());
        assert!(outcome.message.unwrap().contains("BucketNotEmpty"));

        store.delete_file("b1", "f").await.unwrap();
        let outcome = DeleteBucketHandler::new(store)
            .execute(json!({ "bucket_name": "b1" }))
            .await;
        assert!(outcome.is_succeeded());
    }

    #[tokio::test]
    async fn test_does_file_exist_with_content_pattern() {
        let store = Arc::new(ObjectStoreService::new());
        store.create_bucket("b1").await.unwrap();
        store
            .put_file("b1", "f", &json!({ "status": "ready" }))
            .await
            .unwrap();

        let handler = DoesFileExistHandler::new(store);

        let outcome = handler
            .execute(json!({ "bucket_name": "b1", "file_name": "f", "contents": "ready" }))
            .await;
        assert_eq!(
            outcome.response.unwrap(),
            json!("File exists and contains the given contents")
        );

        let outcome = handler
            .execute(json!({ "bucket_name": "b1", "file_name": "f", "contents": "missing" }))
            .await;
        assert_eq!(outcome.response.unwrap(), json!("File does not exist"));
    }

    #[tokio::test]
    async fn test_read_missing_file_fails() {
        let store = Arc::new(ObjectStoreService::new());
        store.create_bucket("b1").await.unwrap();

        let outcome = ReadFileHandler::new(store)
            .execute(json!({ "bucket_name": "b1", "file_name": "missing" }))
            .await;
        assert!(!outcome.is_succeeded());
        assert!(outcome.message.unwrap().contains("NoSuchKey"));
    }
}
