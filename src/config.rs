use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::core::editor::DEFAULT_ENVIRONMENT;
use crate::error::{ConsoleError, Result};

pub const DEFAULT_CONFIG_FILE: &str = "rtc-console.yaml";

/// 控制台配置。YAML 文件提供，缺省字段用默认值，字符串中的 ${VAR} 用环境变量替换。
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub base_url: String,
    pub token_path: PathBuf,
    pub log_file: PathBuf,
    pub request_timeout_ms: u64,
    pub search_debounce_ms: u64,
    pub default_environment: String,
    pub audit_limit: Option<u32>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            token_path: PathBuf::from(".rtc-console/token.json"),
            log_file: PathBuf::from("rtc-console.log"),
            request_timeout_ms: 10_000,
            search_debounce_ms: 400,
            default_environment: DEFAULT_ENVIRONMENT.to_string(),
            audit_limit: None,
        }
    }
}

impl Settings {
    /// 从 YAML 文件加载。文件不存在用默认值；文件损坏用默认值，并把解析错误一并返回，
    /// 由调用方在日志初始化之后记录。之后依次叠加 RTC_BASE_URL / RTC_TOKEN_PATH 环境变量。
    pub fn load(path: &Path) -> Result<(Self, Option<ConsoleError>)> {
        let (mut settings, invalid) = match std::fs::read_to_string(path) {
            Ok(content) => match Self::parse(&content) {
                Ok(settings) => (settings, None),
                Err(e) => (Self::default(), Some(e)),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => (Self::default(), None),
            Err(e) => return Err(e.into()),
        };
        settings.apply_overrides(|name| std::env::var(name).ok());
        Ok((settings, invalid))
    }

    pub fn parse(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let raw: serde_yaml::Value = serde_yaml::from_str(content)?;
        if raw.is_null() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_value(resolve_env_vars(raw))?)
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("RTC_BASE_URL").filter(|v| !v.is_empty()) {
            self.base_url = url;
        }
        if let Some(path) = lookup("RTC_TOKEN_PATH").filter(|v| !v.is_empty()) {
            self.token_path = PathBuf::from(path);
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms.max(1))
    }

    pub fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms)
    }
}

/// 递归替换 YAML 字符串中的 ${VAR}
fn resolve_env_vars(value: serde_yaml::Value) -> serde_yaml::Value {
    match value {
        serde_yaml::Value::String(s) => serde_yaml::Value::String(substitute_env_in_string(&s)),
        serde_yaml::Value::Sequence(seq) => {
            serde_yaml::Value::Sequence(seq.into_iter().map(resolve_env_vars).collect())
        }
        serde_yaml::Value::Mapping(map) => serde_yaml::Value::Mapping(
            map.into_iter()
                .map(|(k, v)| (k, resolve_env_vars(v)))
                .collect(),
        ),
        other => other,
    }
}

/// ${VAR} 替换为环境变量值；变量不存在时保留原样
fn substitute_env_in_string(s: &str) -> String {
    let mut result = s.to_string();
    let mut search_from = 0;
    while let Some(rel_start) = result[search_from..].find("${") {
        let start = search_from + rel_start;
        let Some(rel_end) = result[start..].find('}') else {
            break;
        };
        let end = start + rel_end;
        match std::env::var(&result[start + 2..end]) {
            Ok(val) => {
                result = format!("{}{}{}", &result[..start], val, &result[end + 1..]);
                search_from = start + val.len();
            }
            Err(_) => search_from = end + 1,
        }
    }
    result
}
