//! 执行日志管理命令

use anyhow::Result;
use chrono::Local;
use colored::Colorize;

use ctf_storage::{LogFilter, LogRepository, StorageManager};

use crate::config::CliConfig;
use crate::LogAction;

pub async fn handle(action: LogAction) -> Result<()> {
    match action {
        LogAction::Groups { db } => list_groups(db).await,
        LogAction::Show {
            group_id,
            db,
            test,
            status,
            limit,
        } => show_log(&group_id, db, test, status, limit).await,
        LogAction::Summary { group_id, db } => show_summary(&group_id, db).await,
        LogAction::Delete { group_id, db } => delete_log(&group_id, db).await,
    }
}

async fn repository(db: Option<String>) -> Result<LogRepository> {
    let cli_config = CliConfig::load()?;
    let storage = StorageManager::new(&cli_config.resolve_db(db)).await?;
    Ok(LogRepository::new(storage.pool().clone()))
}

async fn list_groups(db: Option<String>) -> Result<()> {
    let repo = repository(db).await?;
    let groups = repo.list_groups().await?;

    if groups.is_empty() {
        println!("{} 日志中没有测试组", "ℹ".yellow());
        return Ok(());
    }

    println!("{} 找到 {} 个测试组:\n", "✓".green(), groups.len());
    for group in groups {
        println!("  {}", group);
    }

    Ok(())
}

async fn show_log(
    group_id: &str,
    db: Option<String>,
    test: Option<String>,
    status: Option<String>,
    limit: i64,
) -> Result<()> {
    let repo = repository(db).await?;

    let filter = LogFilter {
        test_id: test,
        status,
        limit: Some(limit),
        offset: None,
    };
    let rows = repo.list(group_id, &filter).await?;

    if rows.is_empty() {
        println!("{} 没有匹配的日志行", "ℹ".yellow());
        return Ok(());
    }

    println!("{} {} 条日志行:\n", "✓".green(), rows.len());

    // 表头
    println!(
        "{:<6} {:<34} {:<6} {:<10} {:<20}",
        "ID".bold(),
        "场景".bold(),
        "步骤".bold(),
        "状态".bold(),
        "时间".bold()
    );
    println!("{}", "-".repeat(84));

    for row in rows {
        let status_str = match row.status.as_str() {
            "SUCCEEDED" => row.status.green(),
            "FAILED" => row.status.red(),
            _ => row.status.normal(),
        };

        let step_str = row
            .step_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());

        let local_time = row.timestamp.with_timezone(&Local);

        println!(
            "{:<6} {:<34} {:<6} {:<10} {:<20}",
            row.id,
            row.test_scenario_id,
            step_str,
            status_str,
            local_time.format("%Y-%m-%d %H:%M:%S")
        );

        if row.status == "FAILED" {
            if let Some(output) = &row.output {
                println!("       {}", output.red());
            }
        }
    }

    Ok(())
}

async fn show_summary(group_id: &str, db: Option<String>) -> Result<()> {
    let repo = repository(db).await?;
    let summary = repo.summary(group_id).await?;

    println!("{} 测试组 {} 摘要:", "✓".green(), group_id.bold());
    println!("  总行数: {}", summary.total_rows);
    println!("  成功步骤: {}", summary.succeeded_count.to_string().green());
    println!("  失败步骤: {}", summary.failed_count.to_string().red());

    Ok(())
}

async fn delete_log(group_id: &str, db: Option<String>) -> Result<()> {
    let repo = repository(db).await?;
    let deleted = repo.delete_group(group_id).await?;

    println!("{} 已删除测试组 {} 的 {} 条日志", "✓".green(), group_id, deleted);

    Ok(())
}
