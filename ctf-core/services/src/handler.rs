//! 操作处理器抽象接口

use async_trait::async_trait;
use serde_json::Value;

use ctf_common::StepOutcome;

/// 操作处理器 trait
///
/// 所有操作处理器必须实现此 trait。`execute` 在类型层面不可失败：
/// 处理器内部的任何错误都必须被捕获并转换为 `Failed` 的 `StepOutcome`，
/// 这样日志器收到的永远是格式完整的步骤结果。
#[async_trait]
pub trait OperationHandler: Send + Sync {
    /// 处理器对应的操作类型名
    fn operation(&self) -> &str;

    /// 以步骤输入执行操作
    async fn execute(&self, input: Value) -> StepOutcome;
}

/// 检查步骤输入中的 mock 短路标记
pub(crate) fn is_mock(input: &Value) -> bool {
    input.get("mock").and_then(Value::as_bool).unwrap_or(false)
}

/// 提取必填的字符串字段
pub(crate) fn require_str(input: &Value, field: &str) -> Result<String, String> {
    input
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| format!("Error: KeyError - '{}'", field))
}

/// 提取必填的对象字段
pub(crate) fn require_object(
    input: &Value,
    field: &str,
) -> Result<serde_json::Map<String, Value>, String> {
    input
        .get(field)
        .and_then(Value::as_object)
        .cloned()
        .ok_or_else(|| format!("Error: KeyError - '{}'", field))
}

/// 提取可选的布尔字段（缺省 false）
pub(crate) fn opt_bool(input: &Value, field: &str) -> bool {
    input.get(field).and_then(Value::as_bool).unwrap_or(false)
}

/// 提取可选的字符串字段
pub(crate) fn opt_str(input: &Value, field: &str) -> Option<String> {
    input.get(field).and_then(Value::as_str).map(str::to_string)
}

/// 提取可选的整数字段
pub(crate) fn opt_u64(input: &Value, field: &str) -> Option<u64> {
    input.get(field).and_then(Value::as_u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_is_mock() {
        assert!(is_mock(&json!({"mock": true})));
        assert!(!is_mock(&json!({"mock": false})));
        assert!(!is_mock(&json!({})));
    }

    #[test]
    fn test_require_str_missing_field() {
        let err = require_str(&json!({}), "table_name").unwrap_err();
        assert_eq!(err, "Error: KeyError - 'table_name'");
    }
}
