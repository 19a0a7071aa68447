//! 步骤日志器
//!
//! 每个执行过的步骤写一条持久化结果行；行键是 (测试组, 测试, 步骤)，
//! 重试时幂等覆盖。日志器不改变运行游标，写完即把控制交回步骤循环。

use std::sync::Arc;

use tracing::debug;

use ctf_common::{StepOutcome, StepStatus};
use ctf_storage::{LogRepository, StepLogRecord};

use crate::step::LoadedStep;
use crate::Result;

/// 步骤日志器
pub struct StepLogger {
    repo: Arc<LogRepository>,
    test_group_id: String,
}

impl StepLogger {
    pub fn new(repo: Arc<LogRepository>, test_group_id: &str) -> Self {
        Self {
            repo,
            test_group_id: test_group_id.to_string(),
        }
    }

    /// 记录一个步骤的执行结果
    pub async fn log_step(
        &self,
        test_id: &str,
        step: &LoadedStep,
        outcome: &StepOutcome,
    ) -> Result<()> {
        let input = step
            .input
            .as_ref()
            .map(|v| serde_json::to_string(v))
            .transpose()
            .map_err(|e| crate::EngineError::SerdeError(e.to_string()))?;

        // 成功记 response, 失败记 message
        let output = match (&outcome.response, &outcome.message) {
            (Some(response), _) => Some(
                serde_json::to_string(response)
                    .map_err(|e| crate::EngineError::SerdeError(e.to_string()))?,
            ),
            (None, Some(message)) => Some(
                serde_json::to_string(message)
                    .map_err(|e| crate::EngineError::SerdeError(e.to_string()))?,
            ),
            (None, None) => None,
        };

        let record = StepLogRecord::result_row(
            &self.test_group_id,
            &step.test_scenario_id,
            test_id,
            step.step_id,
            outcome.status.as_str(),
            input,
            output,
        );

        self.repo.append(&record).await?;
        debug!(
            "记录步骤结果: {} {} -> {}",
            self.test_group_id,
            step.test_scenario_id,
            outcome.status.as_str()
        );

        Ok(())
    }

    /// 记录一条记账行（测试/测试组完成等）
    pub async fn log_bookkeeping(
        &self,
        test_scenario_id: &str,
        status: StepStatus,
        output: &str,
    ) -> Result<()> {
        let record = StepLogRecord::bookkeeping_row(
            &self.test_group_id,
            test_scenario_id,
            status.as_str(),
            None,
            Some(
                serde_json::to_string(output)
                    .map_err(|e| crate::EngineError::SerdeError(e.to_string()))?,
            ),
        );

        self.repo.append(&record).await?;

        Ok(())
    }

    /// 日志仓储
    pub fn repository(&self) -> &Arc<LogRepository> {
        &self.repo
    }

    /// 所属测试组
    pub fn test_group_id(&self) -> &str {
        &self.test_group_id
    }
}
