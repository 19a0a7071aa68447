//! CTF 通用类型定义
//!
//! 此 crate 包含引擎、操作处理器和日志存储之间共享的类型：
//! 步骤状态、处理器执行结果契约以及场景 ID 格式。

use serde::{Deserialize, Serialize};

/// 步骤状态
///
/// `Start` 和 `Finish` 仅用于日志中的记账行（迭代开始、测试完成等），
/// 处理器执行结果只会是 `Succeeded` 或 `Failed`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    /// 开始（记账行）
    Start,

    /// 成功
    Succeeded,

    /// 失败
    Failed,

    /// 完成（记账行）
    Finish,
}

impl StepStatus {
    /// 状态的日志字符串表示
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Start => "START",
            StepStatus::Succeeded => "SUCCEEDED",
            StepStatus::Failed => "FAILED",
            StepStatus::Finish => "FINISH",
        }
    }
}

impl std::str::FromStr for StepStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "START" => Ok(StepStatus::Start),
            "SUCCEEDED" => Ok(StepStatus::Succeeded),
            "FAILED" => Ok(StepStatus::Failed),
            "FINISH" => Ok(StepStatus::Finish),
            other => Err(format!("未知的步骤状态: {}", other)),
        }
    }
}

/// 操作处理器执行结果
///
/// 所有处理器统一返回此结构：成功时携带 `response`，失败时携带 `message`。
/// 处理器内部错误必须被捕获并转换为 `Failed` 结果，不允许向上抛出。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutcome {
    /// 执行状态
    pub status: StepStatus,

    /// 成功时的输出
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<serde_json::Value>,

    /// 失败时的错误信息
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StepOutcome {
    /// 创建成功结果
    pub fn succeeded(response: serde_json::Value) -> Self {
        Self {
            status: StepStatus::Succeeded,
            response: Some(response),
            message: None,
        }
    }

    /// 创建带文本输出的成功结果
    pub fn succeeded_text(text: &str) -> Self {
        Self::succeeded(serde_json::Value::String(text.to_string()))
    }

    /// 创建无输出的成功结果
    pub fn succeeded_empty() -> Self {
        Self {
            status: StepStatus::Succeeded,
            response: None,
            message: None,
        }
    }

    /// 创建失败结果
    pub fn failed(message: &str) -> Self {
        Self {
            status: StepStatus::Failed,
            response: None,
            message: Some(message.to_string()),
        }
    }

    /// 创建 mock 短路结果
    pub fn mocked() -> Self {
        Self::succeeded_text("mocked")
    }

    /// 是否为成功结果
    pub fn is_succeeded(&self) -> bool {
        self.status == StepStatus::Succeeded
    }
}

/// 场景 ID 格式化
///
/// 日志中每一行以 `T<测试>:S<标记>` 形式的场景 ID 定位，
/// 标记可以是操作类型、剩余计数或 `Completed` 等哨兵值。
pub fn scenario_id(test: &str, marker: &str) -> String {
    format!("T<{}>:S<{}>", test, marker)
}

/// 解析开始行的场景 ID（`T<Null>:S<Null>`）
pub const PARSE_SCENARIO_ID: &str = "T<Null>:S<Null>";

/// 测试组完成行的场景 ID（`T<Completed>:S<Completed>`）
pub const GROUP_FINISH_SCENARIO_ID: &str = "T<Completed>:S<Completed>";

/// 测试完成哨兵的操作类型
pub const COMPLETED_OPERATION: &str = "Completed";

/// 等待操作的操作类型
pub const WAIT_OPERATION: &str = "Wait";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_status_round_trip() {
        for status in [
            StepStatus::Start,
            StepStatus::Succeeded,
            StepStatus::Failed,
            StepStatus::Finish,
        ] {
            let parsed: StepStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn test_outcome_serialization_skips_empty_fields() {
        let outcome = StepOutcome::failed("boom");
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "FAILED");
        assert_eq!(json["message"], "boom");
        assert!(json.get("response").is_none());
    }

    #[test]
    fn test_scenario_id_format() {
        assert_eq!(scenario_id("t1.json", "CreateBucket"), "T<t1.json>:S<CreateBucket>");
        assert_eq!(scenario_id("Completed", "Completed"), GROUP_FINISH_SCENARIO_ID);
    }
}
