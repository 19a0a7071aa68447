//! 操作调度器
//!
//! 把已加载步骤的操作类型映射到具体的执行路径：注册表里的处理器、
//! 引擎内置的 Wait 路径，或者未知操作的兜底。调度是全函数，任何
//! 操作类型都会得到一个格式完整的步骤结果，绝不向上抛错——失败
//! 通过日志暴露，而不是打断循环。

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use ctf_common::{StepOutcome, WAIT_OPERATION};
use ctf_services::HandlerRegistry;

use crate::step::LoadedStep;
use crate::waiter::WaitScheduler;

/// 操作调度器
pub struct OperationDispatcher {
    /// 操作处理器注册表
    registry: Arc<HandlerRegistry>,

    /// 等待调度器
    waiter: Arc<WaitScheduler>,
}

impl OperationDispatcher {
    pub fn new(registry: Arc<HandlerRegistry>, waiter: Arc<WaitScheduler>) -> Self {
        Self { registry, waiter }
    }

    /// 调度并执行一个步骤
    ///
    /// `Completed` 哨兵由运行器在调度之前路由到测试完成器，不会走到这里。
    pub async fn dispatch(&self, step: &LoadedStep) -> StepOutcome {
        debug!("调度步骤: {} ({})", step.test_scenario_id, step.operation);

        if step.operation == WAIT_OPERATION {
            return self.dispatch_wait(step).await;
        }

        match self.registry.get(&step.operation).await {
            Some(handler) => {
                let input = step.input.clone().unwrap_or(Value::Null);
                handler.execute(input).await
            }
            None => {
                warn!("未知操作: {}", step.operation);
                StepOutcome::failed(&format!(
                    "Unknown Operation Requested: {}",
                    step.operation
                ))
            }
        }
    }

    /// Wait 操作：挂起当前测试指定秒数
    async fn dispatch_wait(&self, step: &LoadedStep) -> StepOutcome {
        let wait_time = match step.input.as_ref().and_then(parse_wait_time) {
            Some(secs) => secs,
            None => return StepOutcome::failed("Error: KeyError - 'wait_time'"),
        };

        self.waiter.wait(wait_time).await
    }
}

/// 从 Wait 输入里解析等待秒数（接受数字或数字字符串）
fn parse_wait_time(input: &Value) -> Option<f64> {
    match input.get("wait_time")? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctf_services::ServiceContext;
    use serde_json::json;

    fn loaded(operation: &str, input: Value) -> LoadedStep {
        LoadedStep {
            test_scenario_id: format!("T<t1>:S<{}>", operation),
            step_id: 0,
            operation: operation.to_string(),
            input: Some(input),
        }
    }

    async fn dispatcher() -> OperationDispatcher {
        let services = ServiceContext::new();
        let registry = Arc::new(HandlerRegistry::with_builtin_handlers(&services).await);
        OperationDispatcher::new(registry, Arc::new(WaitScheduler::new()))
    }

    #[tokio::test]
    async fn test_registered_operation_is_executed() {
        let dispatcher = dispatcher().await;

        let outcome = dispatcher
            .dispatch(&loaded("CreateBucket", json!({ "bucket_name": "b1" })))
            .await;
        assert!(outcome.is_succeeded());
    }

    #[tokio::test]
    async fn test_unknown_operation_degrades_to_failed_outcome() {
        let dispatcher = dispatcher().await;

        let outcome = dispatcher.dispatch(&loaded("Bogus", json!({}))).await;
        assert!(!outcome.is_succeeded());
        assert_eq!(
            outcome.message.unwrap(),
            "Unknown Operation Requested: Bogus"
        );
    }

    #[tokio::test]
    async fn test_wait_operation_accepts_string_duration() {
        let dispatcher = dispatcher().await;

        let outcome = dispatcher
            .dispatch(&loaded("Wait", json!({ "wait_time": "0.05" })))
            .await;
        assert!(outcome.is_succeeded());
    }

    #[tokio::test]
    async fn test_wait_without_duration_fails() {
        let dispatcher = dispatcher().await;

        let outcome = dispatcher.dispatch(&loaded("Wait", json!({}))).await;
        assert!(!outcome.is_succeeded());
    }

    #[test]
    fn test_parse_wait_time_variants() {
        assert_eq!(parse_wait_time(&json!({ "wait_time": 5 })), Some(5.0));
        assert_eq!(parse_wait_time(&json!({ "wait_time": "2.5" })), Some(2.5));
        assert_eq!(parse_wait_time(&json!({ "wait_time": true })), None);
        assert_eq!(parse_wait_time(&json!({})), None);
    }
}
