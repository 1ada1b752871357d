use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 所有成功响应的外层包装：`{"data": ...}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope<T> {
    pub data: T,
}

/// 错误响应：`{"error": "..."}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    pub error: String,
}

/// 配置值类型，决定编辑控件。未知类型原样保留在 Unsupported 中。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ValueType {
    String,
    Bool,
    Int,
    Int64,
    Uint,
    Uint64,
    Float,
    Float64,
    Unsupported(String),
}

impl ValueType {
    pub fn as_str(&self) -> &str {
        match self {
            ValueType::String => "string",
            ValueType::Bool => "bool",
            ValueType::Int => "int",
            ValueType::Int64 => "int64",
            ValueType::Uint => "uint",
            ValueType::Uint64 => "uint64",
            ValueType::Float => "float",
            ValueType::Float64 => "float64",
            ValueType::Unsupported(name) => name,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ValueType::Int
                | ValueType::Int64
                | ValueType::Uint
                | ValueType::Uint64
                | ValueType::Float
                | ValueType::Float64
        )
    }
}

impl From<String> for ValueType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "string" => ValueType::String,
            "bool" => ValueType::Bool,
            "int" => ValueType::Int,
            "int64" => ValueType::Int64,
            "uint" => ValueType::Uint,
            "uint64" => ValueType::Uint64,
            "float" => ValueType::Float,
            "float64" => ValueType::Float64,
            _ => ValueType::Unsupported(s),
        }
    }
}

impl From<ValueType> for String {
    fn from(v: ValueType) -> Self {
        v.as_str().to_string()
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 某个 release 下的一个配置项
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConfigEntry {
    pub key: String,
    #[serde(default)]
    pub value: String,
    pub value_type: ValueType,
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub usage: String,
    #[serde(default)]
    pub writable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConfigList {
    #[serde(default)]
    pub configs: Vec<ConfigEntry>,
}

/// 环境（dev / stage / prod ...）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Environment {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnvironmentList {
    #[serde(default)]
    pub environments: Vec<Environment>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Release {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReleaseList {
    #[serde(default)]
    pub releases: Vec<Release>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectList {
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub total: u64,
}

/// 审计记录，payload 为 base64 编码的 JSON
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditRecord {
    pub action: String,
    #[serde(default)]
    pub actor: String,
    #[serde(default)]
    pub payload: Option<String>,
    #[serde(default)]
    pub ts: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditList {
    #[serde(default)]
    pub audits: Vec<AuditRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
}
