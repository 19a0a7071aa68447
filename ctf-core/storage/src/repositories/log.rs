use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{Result, StorageError};
use crate::models::{GroupLogSummary, LogFilter, StepLogRecord};

/// 步骤日志仓储
///
/// 结果行按 (test_group_id, test_id, step_id) 唯一，重复写入幂等覆盖，
/// 因此 at-least-once 的重试不会破坏顺序保证。
pub struct LogRepository {
    pool: SqlitePool,
}

impl LogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 追加一条日志行
    ///
    /// 结果行命中 (test_group_id, test_id, step_id) 唯一索引时覆盖旧行；
    /// 记账行（无步骤键）永远追加。
    pub async fn append(&self, record: &StepLogRecord) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT OR REPLACE INTO step_log
            (test_group_id, test_scenario_id, test_id, step_id, status, input, output, timestamp, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.test_group_id)
        .bind(&record.test_scenario_id)
        .bind(&record.test_id)
        .bind(record.step_id)
        .bind(&record.status)
        .bind(&record.input)
        .bind(&record.output)
        .bind(record.timestamp)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        let row_id = result.last_insert_rowid();
        debug!(
            "Appended log row {} for {} / {}",
            row_id, record.test_group_id, record.test_scenario_id
        );

        Ok(row_id)
    }

    /// 获取某个测试组的全部日志行（按写入顺序）
    pub async fn list_for_group(&self, test_group_id: &str) -> Result<Vec<StepLogRecord>> {
        let rows = sqlx::query_as::<_, StepLogRecord>(
            r#"
            SELECT id, test_group_id, test_scenario_id, test_id, step_id,
                   status, input, output, timestamp, created_at
            FROM step_log
            WHERE test_group_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(test_group_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// 获取某个测试的结果行（按步骤顺序）
    pub async fn list_for_test(
        &self,
        test_group_id: &str,
        test_id: &str,
    ) -> Result<Vec<StepLogRecord>> {
        let rows = sqlx::query_as::<_, StepLogRecord>(
            r#"
            SELECT id, test_group_id, test_scenario_id, test_id, step_id,
                   status, input, output, timestamp, created_at
            FROM step_log
            WHERE test_group_id = ? AND test_id = ?
            ORDER BY step_id ASC
            "#,
        )
        .bind(test_group_id)
        .bind(test_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// 按过滤条件查询日志行
    pub async fn list(&self, test_group_id: &str, filter: &LogFilter) -> Result<Vec<StepLogRecord>> {
        let mut query = String::from(
            r#"
            SELECT id, test_group_id, test_scenario_id, test_id, step_id,
                   status, input, output, timestamp, created_at
            FROM step_log
            WHERE test_group_id = ?
            "#,
        );

        let mut bindings = Vec::new();

        // 构建查询条件
        if let Some(test_id) = &filter.test_id {
            query.push_str(" AND test_id = ?");
            bindings.push(test_id.clone());
        }

        if let Some(status) = &filter.status {
            query.push_str(" AND status = ?");
            bindings.push(status.clone());
        }

        query.push_str(" ORDER BY id ASC");

        if let Some(limit) = filter.limit {
            query.push_str(&format!(" LIMIT {}", limit));
        }

        if let Some(offset) = filter.offset {
            query.push_str(&format!(" OFFSET {}", offset));
        }

        let mut sql_query = sqlx::query_as::<_, StepLogRecord>(&query).bind(test_group_id);

        for binding in &bindings {
            sql_query = sql_query.bind(binding);
        }

        let rows = sql_query.fetch_all(&self.pool).await?;

        Ok(rows)
    }

    /// 获取单个步骤的结果行
    pub async fn get_step(
        &self,
        test_group_id: &str,
        test_id: &str,
        step_id: i64,
    ) -> Result<Option<StepLogRecord>> {
        let row = sqlx::query_as::<_, StepLogRecord>(
            r#"
            SELECT id, test_group_id, test_scenario_id, test_id, step_id,
                   status, input, output, timestamp, created_at
            FROM step_log
            WHERE test_group_id = ? AND test_id = ? AND step_id = ?
            "#,
        )
        .bind(test_group_id)
        .bind(test_id)
        .bind(step_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// 统计结果行数量（仅带步骤键的行）
    pub async fn count_results(&self, test_group_id: &str) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM step_log WHERE test_group_id = ? AND step_id IS NOT NULL",
        )
        .bind(test_group_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// 统计失败的结果行数量
    pub async fn count_failed(&self, test_group_id: &str) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM step_log
            WHERE test_group_id = ? AND step_id IS NOT NULL AND status = 'FAILED'
            "#,
        )
        .bind(test_group_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// 获取测试组日志摘要
    pub async fn summary(&self, test_group_id: &str) -> Result<GroupLogSummary> {
        let summary = sqlx::query_as::<_, GroupLogSummary>(
            r#"
            SELECT test_group_id,
                   COUNT(*) AS total_rows,
                   SUM(CASE WHEN status = 'SUCCEEDED' THEN 1 ELSE 0 END) AS succeeded_count,
                   SUM(CASE WHEN status = 'FAILED' THEN 1 ELSE 0 END) AS failed_count
            FROM step_log
            WHERE test_group_id = ?
            GROUP BY test_group_id
            "#,
        )
        .bind(test_group_id)
        .fetch_optional(&self.pool)
        .await?;

        summary.ok_or_else(|| {
            StorageError::NotFound(format!("No log rows for test group {}", test_group_id))
        })
    }

    /// 列出日志中出现过的测试组
    pub async fn list_groups(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT DISTINCT test_group_id FROM step_log ORDER BY test_group_id")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// 删除某个测试组的全部日志
    pub async fn delete_group(&self, test_group_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM step_log WHERE test_group_id = ?")
            .bind(test_group_id)
            .execute(&self.pool)
            .await?;

        debug!(
            "Deleted {} log rows for group {}",
            result.rows_affected(),
            test_group_id
        );

        Ok(result.rows_affected())
    }
}
