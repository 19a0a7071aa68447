//! 测试完成器与迭代完成器
//!
//! 测试完成器在步骤加载器给出 `Completed` 哨兵后收尾单个测试；
//! 迭代完成器在迭代耗尽后收尾整个测试组。两者都把完成行写入日志；
//! 迭代完成器还会依据致命条件策略决定是否异常终止整个运行。

use tracing::{info, warn};

use ctf_common::{scenario_id, StepStatus, COMPLETED_OPERATION, GROUP_FINISH_SCENARIO_ID};

use crate::logger::StepLogger;
use crate::{EngineError, Result};

/// 致命条件策略
///
/// 默认全部宽松：步骤失败只进日志，不会终止运行。
#[derive(Debug, Clone, Default)]
pub struct FatalPolicy {
    /// 整组累计失败步骤数达到该值时视为致命条件
    pub failed_step_threshold: Option<usize>,

    /// 任何一个测试出现失败步骤即请求提前终止
    pub halt_on_test_failure: bool,
}

impl FatalPolicy {
    /// 宽松策略（与默认相同，语义上更显式）
    pub fn permissive() -> Self {
        Self::default()
    }
}

/// 单个测试执行完的汇总
#[derive(Debug, Clone)]
pub struct TestSummary {
    /// 测试 ID
    pub test_id: String,

    /// 执行的步骤数
    pub steps_executed: usize,

    /// 失败的步骤数
    pub failed_steps: usize,

    /// 是否请求提前终止剩余迭代
    pub halt_requested: bool,
}

/// 测试完成器
pub struct TestFinisher;

impl TestFinisher {
    /// 收尾单个测试：写完成行，按策略决定是否请求提前终止
    pub async fn finish(
        logger: &StepLogger,
        policy: &FatalPolicy,
        test_id: &str,
        steps_executed: usize,
        failed_steps: usize,
    ) -> Result<TestSummary> {
        logger
            .log_bookkeeping(
                &scenario_id(test_id, COMPLETED_OPERATION),
                StepStatus::Finish,
                "Test Completed Successfully",
            )
            .await?;

        let halt_requested = policy.halt_on_test_failure && failed_steps > 0;
        if halt_requested {
            warn!(
                "测试 {} 有 {} 个失败步骤, 按策略请求提前终止",
                test_id, failed_steps
            );
        } else {
            info!("测试 {} 完成, {} 个步骤", test_id, steps_executed);
        }

        Ok(TestSummary {
            test_id: test_id.to_string(),
            steps_executed,
            failed_steps,
            halt_requested,
        })
    }
}

/// 迭代完成器
pub struct IterationsFinisher;

impl IterationsFinisher {
    /// 收尾整个测试组
    ///
    /// 写测试组完成行；累计失败步骤数达到致命阈值时返回
    /// [`EngineError::FatalCondition`] 而不是正常返回。
    pub async fn finish(logger: &StepLogger, policy: &FatalPolicy) -> Result<()> {
        let failed = logger
            .repository()
            .count_failed(logger.test_group_id())
            .await? as usize;

        if let Some(threshold) = policy.failed_step_threshold {
            if failed >= threshold {
                warn!(
                    "测试组 {} 累计 {} 个失败步骤, 达到致命阈值 {}",
                    logger.test_group_id(),
                    failed,
                    threshold
                );
                return Err(EngineError::FatalCondition(format!(
                    "测试组 {} 累计失败步骤 {} >= 阈值 {}",
                    logger.test_group_id(),
                    failed,
                    threshold
                )));
            }
        }

        logger
            .log_bookkeeping(
                GROUP_FINISH_SCENARIO_ID,
                StepStatus::Finish,
                "Test Group Completed Successfully",
            )
            .await?;

        info!("测试组 {} 执行完成", logger.test_group_id());

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::LoadedStep;
    use ctf_common::StepOutcome;
    use ctf_storage::{LogRepository, StorageManager};
    use std::sync::Arc;

    async fn logger() -> StepLogger {
        let storage = StorageManager::new_in_memory().await.unwrap();
        StepLogger::new(Arc::new(LogRepository::new(storage.pool().clone())), "g1")
    }

    #[tokio::test]
    async fn test_finisher_writes_finish_row() {
        let logger = logger().await;

        let summary = TestFinisher::finish(&logger, &FatalPolicy::default(), "t1", 2, 0)
            .await
            .unwrap();
        assert!(!summary.halt_requested);

        let rows = logger.repository().list_for_group("g1").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].test_scenario_id, "T<t1>:S<Completed>");
        assert_eq!(rows[0].status, "FINISH");
    }

    #[tokio::test]
    async fn test_halt_on_test_failure_requests_halt() {
        let logger = logger().await;
        let policy = FatalPolicy {
            halt_on_test_failure: true,
            ..Default::default()
        };

        let summary = TestFinisher::finish(&logger, &policy, "t1", 2, 1)
            .await
            .unwrap();
        assert!(summary.halt_requested);
    }

    #[tokio::test]
    async fn test_iterations_finisher_raises_fatal_on_threshold() {
        let logger = logger().await;

        // 先记一个失败步骤
        let step = LoadedStep {
            test_scenario_id: "T<t1>:S<Bogus>".to_string(),
            step_id: 0,
            operation: "Bogus".to_string(),
            input: None,
        };
        logger
            .log_step("t1", &step, &StepOutcome::failed("boom"))
            .await
            .unwrap();

        let policy = FatalPolicy {
            failed_step_threshold: Some(1),
            ..Default::default()
        };
        let err = IterationsFinisher::finish(&logger, &policy).await.unwrap_err();
        assert!(matches!(err, EngineError::FatalCondition(_)));

        // 致命终止时不写测试组完成行
        let rows = logger.repository().list_for_group("g1").await.unwrap();
        assert!(rows
            .iter()
            .all(|r| r.test_scenario_id != GROUP_FINISH_SCENARIO_ID));
    }

    #[tokio::test]
    async fn test_iterations_finisher_writes_group_finish_row() {
        let logger = logger().await;

        IterationsFinisher::finish(&logger, &FatalPolicy::default())
            .await
            .unwrap();

        let rows = logger.repository().list_for_group("g1").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].test_scenario_id, GROUP_FINISH_SCENARIO_ID);
    }
}
