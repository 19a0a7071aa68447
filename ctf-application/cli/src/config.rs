//! CLI 配置管理
//!
//! **数据存储方式**: TOML 文件 (~/.config/ctf/config.toml)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// 默认日志数据库路径
pub const DEFAULT_DB_PATH: &str = "~/.config/ctf/log.db";

/// CLI 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    /// 默认日志数据库路径
    pub default_db: Option<String>,

    /// 默认测试文档目录
    pub tests_dir: Option<String>,

    /// 配置版本
    #[serde(default = "default_version")]
    pub version: String,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            default_db: None,
            tests_dir: Some("./tests".to_string()),
            version: default_version(),
        }
    }
}

impl CliConfig {
    /// 获取配置文件路径
    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("无法获取用户主目录")?;
        Ok(home.join(".config").join("ctf").join("config.toml"))
    }

    /// 加载配置
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("读取配置文件失败: {:?}", path))?;

        toml::from_str(&content).with_context(|| format!("解析配置文件失败: {:?}", path))
    }

    /// 保存配置
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;

        // 确保目录存在
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("创建配置目录失败: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("序列化配置失败")?;

        fs::write(&path, content).with_context(|| format!("写入配置文件失败: {:?}", path))?;

        Ok(())
    }

    /// 解析日志数据库路径：命令行参数优先，其次配置文件，最后默认值
    pub fn resolve_db(&self, cli_db: Option<String>) -> String {
        cli_db
            .or_else(|| self.default_db.clone())
            .unwrap_or_else(|| DEFAULT_DB_PATH.to_string())
    }
}
