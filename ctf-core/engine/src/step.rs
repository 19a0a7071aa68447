//! 步骤加载器
//!
//! 按游标取出测试的下一个步骤。纯函数：只做寻址，不写日志、不改状态。
//! 游标从 -1 开始，加一后越过步骤列表末尾时返回 `Completed` 哨兵，
//! 由它结束测试的步骤循环并触发测试完成器。

use serde_json::Value;

use crate::definition::StepDefinition;
use ctf_common::{scenario_id, COMPLETED_OPERATION};

/// 已加载的步骤
#[derive(Debug, Clone)]
pub struct LoadedStep {
    /// 场景 ID（`T<测试>:S<操作>`，哨兵为 `T<测试>:S<Completed>`）
    pub test_scenario_id: String,

    /// 步骤游标（本步骤在测试里的下标）
    pub step_id: i64,

    /// 操作类型
    pub operation: String,

    /// 操作输入（哨兵没有输入）
    pub input: Option<Value>,
}

impl LoadedStep {
    /// 是否为结束测试的哨兵
    pub fn is_completed(&self) -> bool {
        self.operation == COMPLETED_OPERATION
    }
}

/// 步骤加载器
pub struct StepLoader;

impl StepLoader {
    /// 取出下一个步骤
    ///
    /// `step_id` 是上一个已执行步骤的下标（尚未开始时为 -1）。
    pub fn load_next(test_id: &str, steps: &[StepDefinition], step_id: i64) -> LoadedStep {
        let next_id = step_id + 1;

        if next_id as usize >= steps.len() {
            return LoadedStep {
                test_scenario_id: scenario_id(test_id, COMPLETED_OPERATION),
                step_id: next_id,
                operation: COMPLETED_OPERATION.to_string(),
                input: None,
            };
        }

        let step = &steps[next_id as usize];
        LoadedStep {
            test_scenario_id: scenario_id(test_id, &step.operation),
            step_id: next_id,
            operation: step.operation.clone(),
            input: Some(step.input.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn steps(operations: &[&str]) -> Vec<StepDefinition> {
        operations
            .iter()
            .map(|op| StepDefinition {
                operation: op.to_string(),
                input: json!({ "op": op }),
            })
            .collect()
    }

    #[test]
    fn test_advances_in_index_order() {
        let steps = steps(&["CreateBucket", "DeleteBucket"]);

        let first = StepLoader::load_next("t1", &steps, -1);
        assert_eq!(first.step_id, 0);
        assert_eq!(first.operation, "CreateBucket");
        assert_eq!(first.test_scenario_id, "T<t1>:S<CreateBucket>");
        assert_eq!(first.input.as_ref().unwrap()["op"], "CreateBucket");

        let second = StepLoader::load_next("t1", &steps, first.step_id);
        assert_eq!(second.step_id, 1);
        assert_eq!(second.operation, "DeleteBucket");
    }

    #[test]
    fn test_exhausted_steps_yield_completed_sentinel() {
        let steps = steps(&["Wait"]);

        let sentinel = StepLoader::load_next("t1", &steps, 0);
        assert!(sentinel.is_completed());
        assert_eq!(sentinel.step_id, 1);
        assert_eq!(sentinel.test_scenario_id, "T<t1>:S<Completed>");
        assert!(sentinel.input.is_none());
    }

    #[test]
    fn test_empty_test_completes_immediately() {
        let sentinel = StepLoader::load_next("t1", &[], -1);
        assert!(sentinel.is_completed());
        assert_eq!(sentinel.step_id, 0);
    }

    #[test]
    fn test_n_steps_take_n_plus_one_loads() {
        let steps = steps(&["A", "B", "C"]);
        let mut step_id = -1;
        let mut loads = 0;

        loop {
            let loaded = StepLoader::load_next("t1", &steps, step_id);
            loads += 1;
            if loaded.is_completed() {
                break;
            }
            step_id = loaded.step_id;
        }

        assert_eq!(loads, steps.len() + 1);
    }

    #[test]
    fn test_load_next_is_idempotent() {
        let steps = steps(&["A", "B"]);

        let first = StepLoader::load_next("t1", &steps, 0);
        let second = StepLoader::load_next("t1", &steps, 0);

        assert_eq!(first.step_id, second.step_id);
        assert_eq!(first.operation, second.operation);
        assert_eq!(first.test_scenario_id, second.test_scenario_id);
    }
}
