//! 测试组执行命令

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use colored::Colorize;

use ctf_engine::{
    DirectoryTestSource, EngineError, FatalPolicy, RunnerConfig, TestGroupDefinition,
    TestGroupRunner, DEFAULT_MAX_CONCURRENCY, DEFAULT_RUN_TIMEOUT,
};
use ctf_services::{HandlerRegistry, ServiceContext};
use ctf_storage::{LogRepository, StorageManager};

use crate::config::CliConfig;

#[allow(clippy::too_many_arguments)]
pub async fn handle(
    group: PathBuf,
    tests_dir: Option<PathBuf>,
    db: Option<String>,
    concurrency: Option<usize>,
    timeout: Option<u64>,
    fail_threshold: Option<usize>,
    halt_on_test_failure: bool,
) -> Result<()> {
    let cli_config = CliConfig::load()?;

    let definition = TestGroupDefinition::from_file(&group)
        .with_context(|| format!("加载测试组定义失败: {:?}", group))?;

    let tests_dir = tests_dir
        .or_else(|| cli_config.tests_dir.clone().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."));
    let source = DirectoryTestSource::new(tests_dir);

    println!(
        "{} 执行测试组: {} ({} 个测试)",
        "⏳".cyan(),
        definition.test_group_id.bold(),
        definition.test_group.len()
    );

    // 日志存储: --db 优先, 其次配置文件, 否则由定义里的日志库引用决定
    let db_path = db
        .or_else(|| cli_config.default_db.clone())
        .unwrap_or_else(|| format!("~/.config/ctf/{}.db", definition.log_ref));
    let storage = StorageManager::new(&db_path).await?;
    let repo = Arc::new(LogRepository::new(storage.pool().clone()));

    // 内置操作处理器
    let services = ServiceContext::new();
    let registry = Arc::new(HandlerRegistry::with_builtin_handlers(&services).await);

    let config = RunnerConfig {
        max_concurrency: concurrency.unwrap_or(DEFAULT_MAX_CONCURRENCY),
        run_timeout: timeout.map(Duration::from_secs).unwrap_or(DEFAULT_RUN_TIMEOUT),
        fatal_policy: FatalPolicy {
            failed_step_threshold: fail_threshold,
            halt_on_test_failure,
        },
    };

    let runner = TestGroupRunner::new(registry, repo.clone()).with_config(config);

    match runner.run(&definition, &source).await {
        Ok(report) => {
            let result_str = if report.failed_steps == 0 {
                "通过".green()
            } else {
                "有失败步骤".yellow()
            };

            println!("\n{} 测试组执行完成: {}", "✓".green(), result_str);
            println!(
                "  迭代: {}  测试: {}  步骤: {} ({} 失败)  耗时: {:.2}s",
                report.iterations_run,
                report.tests_run,
                report.steps_executed,
                report.failed_steps,
                report.duration_ms as f64 / 1000.0
            );
            println!("  日志: {} (测试组 {})", db_path, report.test_group_id);

            Ok(())
        }
        Err(EngineError::FatalCondition(reason)) => {
            println!("\n{} 运行因致命条件提前终止: {}", "✗".red(), reason);
            std::process::exit(1);
        }
        Err(EngineError::Timeout) => {
            println!("\n{} 运行超过墙钟超时, 已中止", "✗".red());
            std::process::exit(1);
        }
        Err(e) => Err(e.into()),
    }
}
