//! 输入解析器
//!
//! 把测试组定义里的"测试 -> 依赖"映射划分成迭代列表：每个迭代是一批
//! 互相无依赖、可以并发执行的测试；被依赖的测试总是出现在依赖它的
//! 测试之前的迭代里；依赖 `"*"` 的测试收尾到最后一个迭代。随后从
//! 测试源取回每个测试文档，组装出完整的迭代/测试/步骤树。

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use crate::definition::{Iteration, StepDefinition, TestDefinition, TestGroupDefinition};
use crate::{EngineError, Result};

/// 测试文档源
///
/// 解析器只按名字索取测试文档，文档存放在哪里由实现决定。
#[async_trait]
pub trait TestSource: Send + Sync {
    /// 取回一个测试文档
    async fn fetch(&self, name: &str) -> Result<TestDefinition>;
}

/// 测试文档的磁盘格式：一份带步骤列表的 JSON/YAML 文件
#[derive(Debug, Deserialize)]
struct TestDocument {
    steps: Vec<StepDefinition>,
}

/// 目录测试源 - 按文件名从目录加载测试文档
pub struct DirectoryTestSource {
    root: PathBuf,
}

impl DirectoryTestSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl TestSource for DirectoryTestSource {
    async fn fetch(&self, name: &str) -> Result<TestDefinition> {
        let path = self.root.join(name);
        let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
            EngineError::MalformedInput(format!("读取测试文档失败: {}: {}", path.display(), e))
        })?;

        let document: TestDocument = match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)
                .map_err(|e| EngineError::MalformedInput(format!("{}: {}", name, e)))?,
            _ => serde_json::from_str(&content)
                .map_err(|e| EngineError::MalformedInput(format!("{}: {}", name, e)))?,
        };

        Ok(TestDefinition {
            test_id: name.to_string(),
            steps: document.steps,
        })
    }
}

/// 内存测试源（测试用）
#[derive(Default)]
pub struct InMemoryTestSource {
    tests: HashMap<String, Vec<StepDefinition>>,
}

impl InMemoryTestSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(mut self, name: &str, steps: Vec<StepDefinition>) -> Self {
        self.tests.insert(name.to_string(), steps);
        self
    }
}

#[async_trait]
impl TestSource for InMemoryTestSource {
    async fn fetch(&self, name: &str) -> Result<TestDefinition> {
        let steps = self
            .tests
            .get(name)
            .ok_or_else(|| EngineError::MalformedInput(format!("测试文档不存在: {}", name)))?
            .clone();

        Ok(TestDefinition {
            test_id: name.to_string(),
            steps,
        })
    }
}

/// 输入解析器
pub struct InputParser;

impl InputParser {
    /// 解析测试组定义，返回完整的迭代列表
    ///
    /// 解析只产出内存结构，不接触持久化日志。
    pub async fn parse(
        definition: &TestGroupDefinition,
        source: &dyn TestSource,
    ) -> Result<Vec<Iteration>> {
        let batches = Self::resolve_iterations(&definition.test_group)?;

        info!(
            "测试组 {} 解析完成, 共 {} 个迭代",
            definition.test_group_id,
            batches.len()
        );

        let mut iterations = Vec::with_capacity(batches.len());
        for batch in &batches {
            let mut tests = Vec::with_capacity(batch.len());
            for name in batch {
                tests.push(source.fetch(name).await?);
            }
            iterations.push(Iteration { tests });
        }

        Ok(iterations)
    }

    /// 把"测试 -> 依赖"映射划分成迭代批次
    ///
    /// 规则：
    /// - 无依赖的测试进入当前批次；每轮移除已调度的依赖后重算。
    /// - 依赖 `"*"` 的测试统一放进最后一个批次。
    /// - 依赖了映射之外的文档名时，该文档作为叶子测试排进第一个批次。
    /// - 某一轮既没有测试就绪也没有依赖被满足，说明依赖成环，解析失败。
    pub fn resolve_iterations(
        test_group: &HashMap<String, Vec<String>>,
    ) -> Result<Vec<Vec<String>>> {
        // 排序保证批次内顺序确定
        let mut remaining: Vec<(String, Vec<String>)> = test_group
            .iter()
            .map(|(file, deps)| (file.clone(), deps.clone()))
            .collect();
        remaining.sort_by(|a, b| a.0.cmp(&b.0));

        let mut batches: Vec<Vec<String>> = Vec::new();
        let mut current: Vec<String> = Vec::new();
        let mut end: Vec<String> = Vec::new();

        // 摘出收尾测试
        remaining.retain(|(file, deps)| {
            if deps.iter().any(|d| d == "*") {
                end.push(file.clone());
                false
            } else {
                true
            }
        });

        // 指向未知文档的依赖作为叶子测试排进第一个批次
        let known: HashSet<String> = remaining.iter().map(|(f, _)| f.clone()).collect();
        let ends: HashSet<String> = end.iter().cloned().collect();
        let mut promoted: HashSet<String> = HashSet::new();
        for (_, deps) in &remaining {
            for dep in deps {
                if !known.contains(dep) && !ends.contains(dep) && promoted.insert(dep.clone()) {
                    debug!("依赖 {} 不在测试组里, 作为叶子测试调度", dep);
                    current.push(dep.clone());
                }
            }
        }

        // 逐轮剥离依赖已全部满足的测试
        while !remaining.is_empty() {
            let ready: Vec<String> = remaining
                .iter()
                .filter(|(_, deps)| deps.is_empty())
                .map(|(file, _)| file.clone())
                .collect();

            let ready_set: HashSet<&str> = ready.iter().map(String::as_str).collect();
            remaining.retain(|(file, _)| !ready_set.contains(file.as_str()));
            current.extend(ready.iter().cloned());

            // 移除已经不在待调度集合里的依赖（已调度、未知或收尾）
            let alive: HashSet<String> = remaining.iter().map(|(f, _)| f.clone()).collect();
            let mut satisfied_any = false;
            for (_, deps) in remaining.iter_mut() {
                let before = deps.len();
                deps.retain(|d| alive.contains(d));
                satisfied_any |= deps.len() != before;
            }

            if ready.is_empty() && !satisfied_any && !remaining.is_empty() {
                let stuck: Vec<&str> = remaining.iter().map(|(f, _)| f.as_str()).collect();
                return Err(EngineError::MalformedInput(format!(
                    "测试依赖存在环, 无法调度: {}",
                    stuck.join(", ")
                )));
            }

            batches.push(std::mem::take(&mut current));
        }

        if !current.is_empty() {
            batches.push(current);
        }
        batches.retain(|batch| !batch.is_empty());
        if !end.is_empty() {
            batches.push(end);
        }

        Ok(batches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn group(entries: &[(&str, &[&str])]) -> HashMap<String, Vec<String>> {
        entries
            .iter()
            .map(|(file, deps)| {
                (
                    file.to_string(),
                    deps.iter().map(|d| d.to_string()).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn test_independent_tests_share_one_iteration() {
        let batches =
            InputParser::resolve_iterations(&group(&[("a.json", &[]), ("b.json", &[])])).unwrap();
        assert_eq!(batches, vec![vec!["a.json".to_string(), "b.json".to_string()]]);
    }

    #[test]
    fn test_dependency_chain_orders_iterations() {
        let batches = InputParser::resolve_iterations(&group(&[
            ("a.json", &[]),
            ("b.json", &["a.json"]),
            ("c.json", &["b.json"]),
        ]))
        .unwrap();

        assert_eq!(
            batches,
            vec![
                vec!["a.json".to_string()],
                vec!["b.json".to_string()],
                vec!["c.json".to_string()],
            ]
        );
    }

    #[test]
    fn test_star_dependency_runs_last() {
        let batches = InputParser::resolve_iterations(&group(&[
            ("cleanup.json", &["*"]),
            ("a.json", &[]),
            ("b.json", &["a.json"]),
        ]))
        .unwrap();

        assert_eq!(batches.last().unwrap(), &vec!["cleanup.json".to_string()]);
        assert_eq!(batches.len(), 3);
    }

    #[test]
    fn test_unknown_dependency_becomes_leaf_test() {
        let batches = InputParser::resolve_iterations(&group(&[(
            "a.json",
            &["external.json"] as &[&str],
        )]))
        .unwrap();

        assert_eq!(
            batches,
            vec![vec!["external.json".to_string()], vec!["a.json".to_string()]]
        );
    }

    #[test]
    fn test_dependency_cycle_is_rejected() {
        let err = InputParser::resolve_iterations(&group(&[
            ("a.json", &["b.json"]),
            ("b.json", &["a.json"]),
        ]))
        .unwrap_err();

        assert!(matches!(err, EngineError::MalformedInput(_)));
        assert!(err.to_string().contains("a.json"));
    }

    #[test]
    fn test_empty_group_has_no_iterations() {
        let batches = InputParser::resolve_iterations(&HashMap::new()).unwrap();
        assert!(batches.is_empty());
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let input = group(&[("a.json", &[]), ("b.json", &["a.json"])]);
        let first = InputParser::resolve_iterations(&input).unwrap();
        let second = InputParser::resolve_iterations(&input).unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_parse_assembles_full_tree() {
        let definition = TestGroupDefinition {
            test_group_id: "g".to_string(),
            log_ref: "g-log".to_string(),
            test_group: group(&[("a.json", &[]), ("b.json", &["a.json"])]),
        };
        let source = InMemoryTestSource::new()
            .insert(
                "a.json",
                vec![StepDefinition {
                    operation: "CreateBucket".to_string(),
                    input: json!({ "bucket_name": "b" }),
                }],
            )
            .insert(
                "b.json",
                vec![StepDefinition {
                    operation: "DeleteBucket".to_string(),
                    input: json!({ "bucket_name": "b" }),
                }],
            );

        let iterations = InputParser::parse(&definition, &source).await.unwrap();
        assert_eq!(iterations.len(), 2);
        assert_eq!(iterations[0].tests[0].test_id, "a.json");
        assert_eq!(iterations[1].tests[0].steps[0].operation, "DeleteBucket");
    }

    #[tokio::test]
    async fn test_parse_fails_on_missing_document() {
        let definition = TestGroupDefinition {
            test_group_id: "g".to_string(),
            log_ref: "g-log".to_string(),
            test_group: group(&[("a.json", &[])]),
        };
        let source = InMemoryTestSource::new();

        let err = InputParser::parse(&definition, &source).await.unwrap_err();
        assert!(matches!(err, EngineError::MalformedInput(_)));
    }
}
