//! 配置管理命令

use anyhow::Result;
use colored::Colorize;

use crate::config::{CliConfig, DEFAULT_DB_PATH};
use crate::ConfigAction;

pub async fn handle(action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => show(),
        ConfigAction::SetDb { path } => set_db(&path),
        ConfigAction::SetTestsDir { path } => set_tests_dir(&path),
    }
}

fn show() -> Result<()> {
    let config = CliConfig::load()?;

    println!("{} 当前配置 ({:?}):", "✓".green(), CliConfig::config_path()?);
    println!(
        "  日志数据库: {}",
        config
            .default_db
            .as_deref()
            .unwrap_or(DEFAULT_DB_PATH)
    );
    println!(
        "  测试文档目录: {}",
        config.tests_dir.as_deref().unwrap_or(".")
    );

    Ok(())
}

fn set_db(path: &str) -> Result<()> {
    let mut config = CliConfig::load()?;
    config.default_db = Some(path.to_string());
    config.save()?;

    println!("{} 默认日志数据库已设置为 {}", "✓".green(), path);

    Ok(())
}

fn set_tests_dir(path: &str) -> Result<()> {
    let mut config = CliConfig::load()?;
    config.tests_dir = Some(path.to_string());
    config.save()?;

    println!("{} 默认测试文档目录已设置为 {}", "✓".green(), path);

    Ok(())
}
