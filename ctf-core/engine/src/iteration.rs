//! 迭代加载器
//!
//! 从剩余迭代列表中取出下一个迭代。纯函数：除了"弹出队首"之外没有
//! 任何副作用，同样的输入重复调用得到同样的输出，at-least-once 的
//! 重试是安全的。

use crate::definition::{Iteration, TestDefinition};

/// 一次迭代加载的结果
#[derive(Debug, Clone)]
pub struct IterationBatch {
    /// 迭代是否已经全部耗尽
    pub completed: bool,

    /// 本迭代要并发执行的测试（耗尽时为 None）
    pub tests: Option<Vec<TestDefinition>>,

    /// 剩余的迭代列表
    pub remaining: Vec<Iteration>,
}

/// 迭代加载器
pub struct IterationLoader;

impl IterationLoader {
    /// 取出下一个迭代
    ///
    /// 列表为空时返回 `completed = true` 且没有测试；否则弹出队首迭代，
    /// 返回它的测试列表和去掉队首后的剩余列表。
    pub fn load_next(iterations: &[Iteration]) -> IterationBatch {
        match iterations.split_first() {
            None => IterationBatch {
                completed: true,
                tests: None,
                remaining: Vec::new(),
            },
            Some((head, tail)) => IterationBatch {
                completed: false,
                tests: Some(head.tests.clone()),
                remaining: tail.to_vec(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iteration(test_ids: &[&str]) -> Iteration {
        Iteration {
            tests: test_ids
                .iter()
                .map(|id| TestDefinition {
                    test_id: id.to_string(),
                    steps: Vec::new(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_empty_list_reports_completed() {
        let batch = IterationLoader::load_next(&[]);
        assert!(batch.completed);
        assert!(batch.tests.is_none());
        assert!(batch.remaining.is_empty());
    }

    #[test]
    fn test_pops_head_iteration() {
        let iterations = vec![iteration(&["a"]), iteration(&["b", "c"])];

        let batch = IterationLoader::load_next(&iterations);
        assert!(!batch.completed);
        assert_eq!(batch.tests.as_ref().unwrap()[0].test_id, "a");
        assert_eq!(batch.remaining.len(), 1);
        assert_eq!(batch.remaining[0].tests.len(), 2);
    }

    #[test]
    fn test_load_next_is_idempotent() {
        let iterations = vec![iteration(&["a"]), iteration(&["b"])];

        let first = IterationLoader::load_next(&iterations);
        let second = IterationLoader::load_next(&iterations);

        assert_eq!(first.completed, second.completed);
        assert_eq!(
            first.tests.as_ref().unwrap()[0].test_id,
            second.tests.as_ref().unwrap()[0].test_id
        );
        assert_eq!(first.remaining.len(), second.remaining.len());
    }

    #[test]
    fn test_draining_reports_completed_exactly_once() {
        let mut iterations = vec![iteration(&["a"]), iteration(&["b"])];
        let mut completions = 0;

        loop {
            let batch = IterationLoader::load_next(&iterations);
            if batch.completed {
                completions += 1;
                break;
            }
            iterations = batch.remaining;
        }

        assert_eq!(completions, 1);
    }
}
