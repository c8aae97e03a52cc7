//! 集成配置加载
//!
//! TOML 配置文件为基础，环境变量覆盖敏感字段：
//! - `MESSENGER_ACCESS_TOKEN` 覆盖 `access_token`
//! - `MESSENGER_APP_SECRET` 覆盖 `app_secret`

use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// 平台集成配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessengerConfig {
    /// 平台访问令牌
    #[serde(default)]
    pub access_token: String,
    /// 应用密钥（webhook 签名校验用，出站核心只透传）
    #[serde(default)]
    pub app_secret: String,
    /// webhook 校验令牌
    #[serde(default = "default_verify_token")]
    pub verify_token: String,
    /// 平台发送 API 基地址
    #[serde(default = "default_graph_api_base")]
    pub graph_api_base: String,
    /// 对外主机名（webhook 注册用）
    #[serde(default)]
    pub hostname: String,
    /// 收到消息后是否自动标记已读
    #[serde(default = "default_true")]
    pub automatically_mark_as_read: bool,
    /// 待确认表清扫配置
    #[serde(default)]
    pub pending_sweep: SweepConfig,
}

/// 待确认表清扫配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    /// 是否启动清扫任务
    #[serde(default)]
    pub enabled: bool,
    /// 条目最大存活时长（秒）
    #[serde(default = "default_sweep_max_age_secs")]
    pub max_age_secs: u64,
    /// 清扫检查间隔（秒）
    #[serde(default = "default_sweep_interval_secs")]
    pub check_interval_secs: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_age_secs: default_sweep_max_age_secs(),
            check_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl Default for MessengerConfig {
    fn default() -> Self {
        Self {
            access_token: String::new(),
            app_secret: String::new(),
            verify_token: default_verify_token(),
            graph_api_base: default_graph_api_base(),
            hostname: String::new(),
            automatically_mark_as_read: true,
            pending_sweep: SweepConfig::default(),
        }
    }
}

fn default_verify_token() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn default_graph_api_base() -> String {
    "https://graph.facebook.com/v2.7".to_string()
}

fn default_true() -> bool {
    true
}

fn default_sweep_max_age_secs() -> u64 {
    3600
}

fn default_sweep_interval_secs() -> u64 {
    60
}

/// 从 TOML 文件加载配置并应用环境变量覆盖
pub fn load_config(path: impl AsRef<Path>) -> Result<MessengerConfig> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let mut config: MessengerConfig = toml::from_str(&raw)
        .with_context(|| format!("failed to parse config file {}", path.display()))?;

    apply_env_overrides(&mut config);
    Ok(config)
}

fn apply_env_overrides(config: &mut MessengerConfig) {
    if let Ok(token) = env::var("MESSENGER_ACCESS_TOKEN") {
        if !token.is_empty() {
            config.access_token = token;
        }
    }
    if let Ok(secret) = env::var("MESSENGER_APP_SECRET") {
        if !secret.is_empty() {
            config.app_secret = secret;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let config: MessengerConfig = toml::from_str("access_token = \"t1\"").unwrap();

        assert_eq!(config.access_token, "t1");
        assert!(config.automatically_mark_as_read);
        assert!(!config.verify_token.is_empty());
        assert!(config.graph_api_base.starts_with("https://"));
        assert!(!config.pending_sweep.enabled);
        assert_eq!(config.pending_sweep.max_age_secs, 3600);
    }

    #[test]
    fn sweep_section_parses() {
        let config: MessengerConfig = toml::from_str(
            r#"
            access_token = "t1"

            [pending_sweep]
            enabled = true
            max_age_secs = 120
            check_interval_secs = 5
            "#,
        )
        .unwrap();

        assert!(config.pending_sweep.enabled);
        assert_eq!(config.pending_sweep.max_age_secs, 120);
        assert_eq!(config.pending_sweep.check_interval_secs, 5);
    }

    #[test]
    fn fresh_verify_tokens_differ() {
        let first = MessengerConfig::default();
        let second = MessengerConfig::default();
        assert_ne!(first.verify_token, second.verify_token);
    }
}
