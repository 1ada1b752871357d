//! 审计 payload 解码与按 action 的展示结构。
//!
//! payload 是 base64 编码的 JSON。解码失败一律降级为 [`AuditView::Invalid`]，
//! 不会让外层列表渲染失败。

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::Value;

use crate::models::AuditRecord;

pub const CONFIG_UPDATED: &str = "config_updated";

/// base64 → JSON。空 payload、非法 base64、非法 JSON 都返回 None
pub fn decode_payload(payload: &str) -> Option<Value> {
    if payload.is_empty() {
        return None;
    }
    let bytes = match STANDARD.decode(payload.trim()) {
        Ok(b) => b,
        Err(e) => {
            tracing::debug!("audit payload is not base64: {}", e);
            return None;
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::debug!("audit payload is not json: {}", e);
            None
        }
    }
}

/// config_updated 中的一行差异
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffLine {
    pub key: String,
    pub old_value: String,
    pub new_value: String,
}

impl DiffLine {
    pub fn changed(&self) -> bool {
        self.old_value != self.new_value
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AuditView {
    /// 无法解码
    Invalid,
    ConfigUpdated {
        environment: String,
        project: String,
        release: String,
        items: Vec<DiffLine>,
    },
    /// 其它 action：字段平铺，对象值格式化输出
    Fields(Vec<(String, String)>),
}

impl AuditView {
    pub fn from_record(record: &AuditRecord) -> Self {
        let decoded = record.payload.as_deref().and_then(decode_payload);
        Self::build(&record.action, decoded)
    }

    pub fn build(action: &str, decoded: Option<Value>) -> Self {
        let decoded = match decoded {
            Some(v) if !is_falsy(&v) => v,
            _ => return AuditView::Invalid,
        };
        match action {
            CONFIG_UPDATED => config_updated_view(&decoded),
            _ => AuditView::Fields(field_dump(&decoded)),
        }
    }
}

/// null / false / 0 / "" 视为无内容
fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}

fn config_updated_view(decoded: &Value) -> AuditView {
    let label = |name: &str| match decoded.get(name) {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Null) | None => "-".to_string(),
        Some(Value::String(_)) => "-".to_string(),
        Some(other) => other.to_string(),
    };

    let items: Vec<DiffLine> = decoded
        .get("items")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|it| DiffLine {
                    key: it.get("key").map(value_text).unwrap_or_default(),
                    old_value: it.get("old_value").map(value_text).unwrap_or_default(),
                    new_value: it.get("new_value").map(value_text).unwrap_or_default(),
                })
                .collect()
        })
        .unwrap_or_default();

    AuditView::ConfigUpdated {
        environment: label("environment"),
        project: label("project"),
        release: label("release"),
        items,
    }
}

/// 平铺对象字段，忽略 version。非对象 payload 作为单个 "value" 字段展示。
fn field_dump(decoded: &Value) -> Vec<(String, String)> {
    match decoded {
        Value::Object(map) => map
            .iter()
            .filter(|(k, _)| k.as_str() != "version")
            .map(|(k, v)| (k.clone(), field_text(v)))
            .collect(),
        other => vec![("value".to_string(), field_text(other))],
    }
}

fn field_text(value: &Value) -> String {
    match value {
        Value::Object(_) | Value::Array(_) => {
            serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
        }
        other => value_text(other),
    }
}

/// 标量转文本：字符串不带引号，null 为空串
fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
