//! 测试组定义校验命令

use std::path::PathBuf;

use anyhow::{Context, Result};
use colored::Colorize;

use ctf_engine::{DirectoryTestSource, InputParser, TestGroupDefinition};

use crate::config::CliConfig;

pub async fn handle(group: PathBuf, tests_dir: Option<PathBuf>) -> Result<()> {
    let cli_config = CliConfig::load()?;

    let definition = TestGroupDefinition::from_file(&group)
        .with_context(|| format!("加载测试组定义失败: {:?}", group))?;

    let tests_dir = tests_dir
        .or_else(|| cli_config.tests_dir.clone().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."));
    let source = DirectoryTestSource::new(tests_dir);

    match InputParser::parse(&definition, &source).await {
        Ok(iterations) => {
            println!(
                "{} 测试组 {} 校验通过, {} 个迭代:",
                "✓".green(),
                definition.test_group_id.bold(),
                iterations.len()
            );

            for (index, iteration) in iterations.iter().enumerate() {
                let tests: Vec<&str> = iteration
                    .tests
                    .iter()
                    .map(|t| t.test_id.as_str())
                    .collect();
                println!(
                    "  迭代 {}: {} 个测试 [{}]",
                    index,
                    iteration.tests.len(),
                    tests.join(", ")
                );
            }

            Ok(())
        }
        Err(e) => {
            println!("{} 校验失败: {}", "✗".red(), e);
            std::process::exit(1);
        }
    }
}
