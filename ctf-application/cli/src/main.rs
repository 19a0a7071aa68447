//! CTF CLI 应用

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, Level};

mod commands;
mod config;

#[derive(Parser)]
#[command(name = "ctf")]
#[command(about = "CTF - 云服务自动化测试编排框架", long_about = None)]
#[command(version)]
struct Cli {
    /// 日志级别
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 执行测试组
    Run {
        /// 测试组定义文件 (JSON/YAML)
        group: PathBuf,

        /// 测试文档目录
        #[arg(long)]
        tests_dir: Option<PathBuf>,

        /// 日志数据库路径
        #[arg(long)]
        db: Option<String>,

        /// 迭代内并发测试数上限
        #[arg(long)]
        concurrency: Option<usize>,

        /// 运行超时（秒）
        #[arg(long)]
        timeout: Option<u64>,

        /// 累计失败步骤数达到该值时终止运行
        #[arg(long)]
        fail_threshold: Option<usize>,

        /// 任何测试出现失败步骤即终止运行
        #[arg(long)]
        halt_on_test_failure: bool,
    },

    /// 校验测试组定义（只解析，不执行）
    Validate {
        /// 测试组定义文件 (JSON/YAML)
        group: PathBuf,

        /// 测试文档目录
        #[arg(long)]
        tests_dir: Option<PathBuf>,
    },

    /// 执行日志管理
    Log {
        #[command(subcommand)]
        action: LogAction,
    },

    /// 配置管理
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum LogAction {
    /// 列出日志中出现过的测试组
    Groups {
        /// 日志数据库路径
        #[arg(long)]
        db: Option<String>,
    },
    /// 显示测试组的日志行
    Show {
        /// 测试组 ID
        group_id: String,
        /// 日志数据库路径
        #[arg(long)]
        db: Option<String>,
        /// 只看指定测试
        #[arg(long)]
        test: Option<String>,
        /// 只看指定状态 (START|SUCCEEDED|FAILED|FINISH)
        #[arg(long)]
        status: Option<String>,
        /// 最多显示多少行
        #[arg(long, default_value = "50")]
        limit: i64,
    },
    /// 测试组执行摘要
    Summary {
        /// 测试组 ID
        group_id: String,
        /// 日志数据库路径
        #[arg(long)]
        db: Option<String>,
    },
    /// 删除测试组的全部日志
    Delete {
        /// 测试组 ID
        group_id: String,
        /// 日志数据库路径
        #[arg(long)]
        db: Option<String>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// 显示当前配置
    Show,
    /// 设置默认日志数据库路径
    SetDb {
        /// 数据库路径
        path: String,
    },
    /// 设置默认测试文档目录
    SetTestsDir {
        /// 目录路径
        path: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 初始化日志
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    tracing_subscriber::fmt().with_max_level(log_level).init();

    info!("CTF CLI 启动");

    // 处理命令
    match cli.command {
        Commands::Run {
            group,
            tests_dir,
            db,
            concurrency,
            timeout,
            fail_threshold,
            halt_on_test_failure,
        } => {
            commands::run::handle(
                group,
                tests_dir,
                db,
                concurrency,
                timeout,
                fail_threshold,
                halt_on_test_failure,
            )
            .await?
        }
        Commands::Validate { group, tests_dir } => {
            commands::validate::handle(group, tests_dir).await?
        }
        Commands::Log { action } => commands::log::handle(action).await?,
        Commands::Config { action } => commands::config_cmd::handle(action).await?,
    }

    Ok(())
}
