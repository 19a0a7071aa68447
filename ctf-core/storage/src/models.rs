use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// 步骤日志数据库模型
///
/// 结果行携带 `test_id` 和 `step_id`；解析/迭代/完成的记账行两者为空。
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StepLogRecord {
    pub id: i64,
    pub test_group_id: String,
    pub test_scenario_id: String,
    pub test_id: Option<String>,
    pub step_id: Option<i64>,
    pub status: String, // 'START', 'SUCCEEDED', 'FAILED', 'FINISH'
    pub input: Option<String>,  // JSON
    pub output: Option<String>, // JSON
    pub timestamp: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl StepLogRecord {
    /// 构造一条待写入的结果行（id 由数据库分配）
    pub fn result_row(
        test_group_id: &str,
        test_scenario_id: &str,
        test_id: &str,
        step_id: i64,
        status: &str,
        input: Option<String>,
        output: Option<String>,
    ) -> Self {
        Self {
            id: 0,
            test_group_id: test_group_id.to_string(),
            test_scenario_id: test_scenario_id.to_string(),
            test_id: Some(test_id.to_string()),
            step_id: Some(step_id),
            status: status.to_string(),
            input,
            output,
            timestamp: Utc::now(),
            created_at: Utc::now(),
        }
    }

    /// 构造一条记账行（无步骤键，仅追加）
    pub fn bookkeeping_row(
        test_group_id: &str,
        test_scenario_id: &str,
        status: &str,
        input: Option<String>,
        output: Option<String>,
    ) -> Self {
        Self {
            id: 0,
            test_group_id: test_group_id.to_string(),
            test_scenario_id: test_scenario_id.to_string(),
            test_id: None,
            step_id: None,
            status: status.to_string(),
            input,
            output,
            timestamp: Utc::now(),
            created_at: Utc::now(),
        }
    }
}

/// 测试组日志摘要
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GroupLogSummary {
    pub test_group_id: String,
    pub total_rows: i64,
    pub succeeded_count: i64,
    pub failed_count: i64,
}

/// 日志查询过滤条件
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    pub test_id: Option<String>,
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}
