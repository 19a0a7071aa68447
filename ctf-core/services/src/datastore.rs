//! 数据存储模拟器与对应的操作处理器
//!
//! 模拟一个按主键存取条目的表存储：表带有哈希键（可选排序键）的
//! 键模式，条目按键值组合唯一。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio::sync::RwLock;
use tracing::debug;

use ctf_common::StepOutcome;

use crate::handler::{is_mock, require_object, require_str, OperationHandler};
use crate::{Result, ServiceError};

/// 键属性定义
#[derive(Debug, Clone)]
pub struct KeyAttribute {
    /// 属性名
    pub name: String,

    /// 属性类型（如 S 表示字符串）
    pub attr_type: String,
}

/// 表键模式
#[derive(Debug, Clone)]
pub struct TableSchema {
    /// 哈希键
    pub hash_key: KeyAttribute,

    /// 排序键（可选）
    pub sort_key: Option<KeyAttribute>,
}

#[derive(Debug, Default)]
struct TableData {
    schema: Option<TableSchema>,
    entries: HashMap<String, Value>,
}

/// 数据存储模拟器
///
/// 所有表数据保存在内存中，按表名索引。
#[derive(Default)]
pub struct DataStoreService {
    tables: RwLock<HashMap<String, TableData>>,
}

impl DataStoreService {
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建表
    pub async fn create_table(&self, name: &str, schema: TableSchema) -> Result<()> {
        let mut tables = self.tables.write().await;

        if tables.contains_key(name) {
            return Err(ServiceError::AlreadyExists(format!(
                "Table already exists: {}",
                name
            )));
        }

        debug!("创建表: {}", name);
        tables.insert(
            name.to_string(),
            TableData {
                schema: Some(schema),
                entries: HashMap::new(),
            },
        );

        Ok(())
    }

    /// 写入条目（按键覆盖）
    pub async fn put_entry(&self, table: &str, item: Map<String, Value>) -> Result<()> {
        let mut tables = self.tables.write().await;
        let data = tables
            .get_mut(table)
            .ok_or_else(|| ServiceError::NotFound(format!("Table does not exist: {}", table)))?;

        let key = Self::entry_key(data.schema.as_ref(), &item)?;
        data.entries.insert(key, Value::Object(item));

        Ok(())
    }

    /// 读取条目
    pub async fn get_entry(&self, table: &str, key: &Map<String, Value>) -> Result<Option<Value>> {
        let tables = self.tables.read().await;
        let data = tables
            .get(table)
            .ok_or_else(|| ServiceError::NotFound(format!("Table does not exist: {}", table)))?;

        let key = Self::entry_key(data.schema.as_ref(), key)?;
        Ok(data.entries.get(&key).cloned())
    }

    /// 更新条目（按属性合并）
    pub async fn update_entry(&self, table: &str, item: Map<String, Value>) -> Result<Value> {
        let mut tables = self.tables.write().await;
        let data = tables
            .get_mut(table)
            .ok_or_else(|| ServiceError::NotFound(format!("Table does not exist: {}", table)))?;

        let key = Self::entry_key(data.schema.as_ref(), &item)?;
        let entry = data.entries.get_mut(&key).ok_or_else(|| {
            ServiceError::NotFound(format!("Entry does not exist in table {}", table))
        })?;

        if let Some(existing) = entry.as_object_mut() {
            for (attr, value) in item {
                existing.insert(attr, value);
            }
        }

        Ok(entry.clone())
    }

    /// 删除条目（条目不存在时视为成功）
    pub async fn delete_entry(&self, table: &str, key: &Map<String, Value>) -> Result<()> {
        let mut tables = self.tables.write().await;
        let data = tables
            .get_mut(table)
            .ok_or_else(|| ServiceError::NotFound(format!("Table does not exist: {}", table)))?;

        let key = Self::entry_key(data.schema.as_ref(), key)?;
        data.entries.remove(&key);

        Ok(())
    }

    /// 删除表
    pub async fn delete_table(&self, name: &str) -> Result<()> {
        let mut tables = self.tables.write().await;

        tables
            .remove(name)
            .ok_or_else(|| ServiceError::NotFound(format!("Table does not exist: {}", name)))?;

        debug!("删除表: {}", name);
        Ok(())
    }

    /// 条目是否存在
    pub async fn entry_exists(&self, table: &str, key: &Map<String, Value>) -> Result<bool> {
        Ok(self.get_entry(table, key).await?.is_some())
    }

    /// 表是否存在
    pub async fn table_exists(&self, name: &str) -> bool {
        self.tables.read().await.contains_key(name)
    }

    /// 由键模式从条目属性推导条目键
    ///
    /// 无键模式的表（例如由日志初始化创建）以哈希键名之外的约定回退：
    /// 取条目的全部属性值拼接。
    fn entry_key(schema: Option<&TableSchema>, item: &Map<String, Value>) -> Result<String> {
        match schema {
            Some(schema) => {
                let hash = item.get(&schema.hash_key.name).ok_or_else(|| {
                    ServiceError::InvalidInput(format!(
                        "Missing hash key attribute: {}",
                        schema.hash_key.name
                    ))
                })?;
                let mut key = hash.to_string();
                if let Some(sort_key) = &schema.sort_key {
                    if let Some(sort) = item.get(&sort_key.name) {
                        key.push('|');
                        key.push_str(&sort.to_string());
                    }
                }
                Ok(key)
            }
            None => {
                let mut parts: Vec<String> = item.values().map(Value::to_string).collect();
                parts.sort();
                Ok(parts.join("|"))
            }
        }
    }
}

fn parse_key_attribute(value: &Value) -> Result<KeyAttribute> {
    let name = value
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| ServiceError::InvalidInput("Missing key attribute name".to_string()))?;
    let attr_type = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| ServiceError::InvalidInput("Missing key attribute type".to_string()))?;

    Ok(KeyAttribute {
        name: name.to_string(),
        attr_type: attr_type.to_string(),
    })
}

/// CreateTable 操作处理器
pub struct CreateTableHandler {
    store: Arc<DataStoreService>,
}

impl CreateTableHandler {
    pub fn new(store: Arc<DataStoreService>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl OperationHandler for CreateTableHandler {
    fn operation(&self) -> &str {
        "CreateTable"
    }

    async fn execute(&self, input: Value) -> StepOutcome {
        if is_mock(&input) {
            return StepOutcome::mocked();
        }

        let table_name = match require_str(&input, "table_name") {
            Ok(v) => v,
            Err(e) => return StepOutcome::failed(&e),
        };
        let key = match input.get("key") {
            Some(key) => key,
            None => return StepOutcome::failed("Error: KeyError - 'key'"),
        };

        // 解析主键定义
        let hash_key = match key.get("hash_key").map(parse_key_attribute) {
            Some(Ok(attr)) => attr,
            Some(Err(e)) => return StepOutcome::failed(&format!("Error: {}", e)),
            None => return StepOutcome::failed("Error: KeyError - 'hash_key'"),
        };
        let sort_key = match key.get("sort_key").map(parse_key_attribute) {
            Some(Ok(attr)) => Some(attr),
            Some(Err(e)) => return StepOutcome::failed(&format!("Error: {}", e)),
            None => None,
        };

        match self
            .store
            .create_table(&table_name, TableSchema { hash_key, sort_key })
            .await
        {
            Ok(()) => StepOutcome::succeeded_empty(),
            Err(e) => StepOutcome::failed(&format!("Error: {}", e)),
        }
    }
}

/// CreateEntry 操作处理器
pub struct CreateEntryHandler {
    store: Arc<DataStoreService>,
}

impl CreateEntryHandler {
    pub fn new(store: Arc<DataStoreService>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl OperationHandler for CreateEntryHandler {
    fn operation(&self) -> &str {
        "CreateEntry"
    }

    async fn execute(&self, input: Value) -> StepOutcome {
        if is_mock(&input) {
            return StepOutcome::mocked();
        }

        let table_name = match require_str(&input, "table_name") {
            Ok(v) => v,
            Err(e) => return StepOutcome::failed(&e),
        };
        let item = match require_object(&input, "item") {
            Ok(v) => v,
            Err(e) => return StepOutcome::failed(&e),
        };

        match self.store.put_entry(&table_name, item).await {
            Ok(()) => StepOutcome::succeeded_empty(),
            Err(e) => StepOutcome::failed(&format!("Error: {}", e)),
        }
    }
}

/// GetEntry 操作处理器
pub struct GetEntryHandler {
    store: Arc<DataStoreService>,
}

impl GetEntryHandler {
    pub fn new(store: Arc<DataStoreService>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl OperationHandler for GetEntryHandler {
    fn operation(&self) -> &str {
        "GetEntry"
    }

    async fn execute(&self, input: Value) -> StepOutcome {
        if is_mock(&input) {
            return StepOutcome::mocked();
        }

        let table_name = match require_str(&input, "table_name") {
            Ok(v) => v,
            Err(e) => return StepOutcome::failed(&e),
        };
        let key = match require_object(&input, "key") {
            Ok(v) => v,
            Err(e) => return StepOutcome::failed(&e),
        };

        match self.store.get_entry(&table_name, &key).await {
            Ok(Some(item)) => StepOutcome::succeeded(json!({ "Item": item })),
            Ok(None) => StepOutcome::succeeded(json!({})),
            Err(e) => StepOutcome::failed(&format!("Error: {}", e)),
        }
    }
}

/// UpdateEntry 操作处理器
pub struct UpdateEntryHandler {
    store: Arc<DataStoreService>,
}

impl UpdateEntryHandler {
    pub fn new(store: Arc<DataStoreService>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl OperationHandler for UpdateEntryHandler {
    fn operation(&self) -> &str {
        "UpdateEntry"
    }

    async fn execute(&self, input: Value) -> StepOutcome {
        if is_mock(&input) {
            return StepOutcome::mocked();
        }

        let table_name = match require_str(&input, "table_name") {
            Ok(v) => v,
            Err(e) => return StepOutcome::failed(&e),
        };
        let item = match require_object(&input, "item") {
            Ok(v) => v,
            Err(e) => return StepOutcome::failed(&e),
        };

        match self.store.update_entry(&table_name, item).await {
            Ok(updated) => StepOutcome::succeeded(updated),
            Err(e) => StepOutcome::failed(&format!("Error: {}", e)),
        }
    }
}

/// DeleteEntry 操作处理器
pub struct DeleteEntryHandler {
    store: Arc<DataStoreService>,
}

impl DeleteEntryHandler {
    pub fn new(store: Arc<DataStoreService>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl OperationHandler for DeleteEntryHandler {
    fn operation(&self) -> &str {
        "DeleteEntry"
    }

    async fn execute(&self, input: Value) -> StepOutcome {
        if is_mock(&input) {
            return StepOutcome::mocked();
        }

        let table_name = match require_str(&input, "table_name") {
            Ok(v) => v,
            Err(e) => return StepOutcome::failed(&e),
        };
        let key = match require_object(&input, "key") {
            Ok(v) => v,
            Err(e) => return StepOutcome::failed(&e),
        };

        match self.store.delete_entry(&table_name, &key).await {
            Ok(()) => StepOutcome::succeeded_empty(),
            Err(e) => StepOutcome::failed(&format!("Error: {}", e)),
        }
    }
}

/// DeleteTable 操作处理器
pub struct DeleteTableHandler {
    store: Arc<DataStoreService>,
}

impl DeleteTableHandler {
    pub fn new(store: Arc<DataStoreService>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl OperationHandler for DeleteTableHandler {
    fn operation(&self) -> &str {
        "DeleteTable"
    }

    async fn execute(&self, input: Value) -> StepOutcome {
        if is_mock(&input) {
            return StepOutcome::mocked();
        }

        let table_name = match require_str(&input, "table_name") {
            Ok(v) => v,
            Err(e) => return StepOutcome::failed(&e),
        };

        match self.store.delete_table(&table_name).await {
            Ok(()) => StepOutcome::succeeded_empty(),
            Err(e) => StepOutcome::failed(&format!("Error: {}", e)),
        }
    }
}

/// DoesEntryExist 操作处理器
pub struct DoesEntryExistHandler {
    store: Arc<DataStoreService>,
}

impl DoesEntryExistHandler {
    pub fn new(store: Arc<DataStoreService>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl OperationHandler for DoesEntryExistHandler {
    fn operation(&self) -> &str {
        "DoesEntryExist"
    }

    async fn execute(&self, input: Value) -> StepOutcome {
        let table_name = match require_str(&input, "table_name") {
            Ok(v) => v,
            Err(e) => return StepOutcome::failed(&e),
        };
        let item = match require_object(&input, "item") {
            Ok(v) => v,
            Err(e) => return StepOutcome::failed(&e),
        };

        match self.store.get_entry(&table_name, &item).await {
            Ok(Some(entry)) => StepOutcome::succeeded(entry),
            Ok(None) => StepOutcome::succeeded_text("Entry does not exist"),
            Err(e) => StepOutcome::failed(&format!("Error: {}", e)),
        }
    }
}

/// DoesTableExist 操作处理器
pub struct DoesTableExistHandler {
    store: Arc<DataStoreService>,
}

impl DoesTableExistHandler {
    pub fn new(store: Arc<DataStoreService>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl OperationHandler for DoesTableExistHandler {
    fn operation(&self) -> &str {
        "DoesTableExist"
    }

    async fn execute(&self, input: Value) -> StepOutcome {
        let table_name = match require_str(&input, "table_name") {
            Ok(v) => v,
            Err(e) => return StepOutcome::failed(&e),
        };

        if self.store.table_exists(&table_name).await {
            StepOutcome::succeeded(json!({ "Table": { "TableName": table_name } }))
        } else {
            StepOutcome::succeeded_text("Table does not exist")
        }
    }
}
