//! 测试组定义
//!
//! 测试组文档列出组 ID、日志库引用和"测试文档名 -> 依赖列表"的映射；
//! 每个测试文档是一份带有序步骤列表的 JSON/YAML 文件。解析之后所有
//! 定义都是只读的，执行进度由引擎的游标单独维护。

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::{EngineError, Result};

/// 测试组定义
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestGroupDefinition {
    /// 测试组 ID
    pub test_group_id: String,

    /// 日志库引用（持久化日志的标识）
    pub log_ref: String,

    /// 测试文档名 -> 依赖的测试文档名列表
    ///
    /// 依赖 `"*"` 表示该测试放在最后一个迭代执行。
    pub test_group: HashMap<String, Vec<String>>,
}

impl TestGroupDefinition {
    /// 从 YAML 字符串加载定义
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| EngineError::MalformedInput(e.to_string()))
    }

    /// 从 JSON 字符串加载定义
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| EngineError::MalformedInput(e.to_string()))
    }

    /// 从文件加载定义（按扩展名区分 JSON/YAML）
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml(&content),
            _ => Self::from_json(&content),
        }
    }
}

/// 单个测试：有序的步骤序列
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestDefinition {
    /// 测试 ID（通常是测试文档名）
    pub test_id: String,

    /// 有序步骤列表
    pub steps: Vec<StepDefinition>,
}

/// 单个步骤：操作类型 + 操作输入
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDefinition {
    /// 操作类型（固定词汇表之外的类型在调度时降级为失败结果）
    pub operation: String,

    /// 操作输入，结构由各处理器自行解释
    #[serde(default)]
    pub input: serde_json::Value,
}

/// 一个迭代：同批并发执行的测试集合
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Iteration {
    /// 本迭代要执行的测试
    pub tests: Vec<TestDefinition>,
}
