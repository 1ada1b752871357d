use crate::models::{ConfigEntry, ValueType};

/// 来自编辑控件的原始值：文本框给文本，开关给布尔，数字框给数字（清空时为 Null）
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Text(String),
    Bool(bool),
    Number(f64),
    Null,
}

impl RawValue {
    /// 统一转换为文本表示，Null 转为空串
    pub fn into_text(self) -> String {
        match self {
            RawValue::Text(s) => s,
            RawValue::Bool(b) => b.to_string(),
            RawValue::Number(n) => format_number(n),
            RawValue::Null => String::new(),
        }
    }
}

impl From<&str> for RawValue {
    fn from(s: &str) -> Self {
        RawValue::Text(s.to_string())
    }
}

impl From<String> for RawValue {
    fn from(s: String) -> Self {
        RawValue::Text(s)
    }
}

impl From<bool> for RawValue {
    fn from(b: bool) -> Self {
        RawValue::Bool(b)
    }
}

impl From<f64> for RawValue {
    fn from(n: f64) -> Self {
        RawValue::Number(n)
    }
}

impl From<Option<f64>> for RawValue {
    fn from(n: Option<f64>) -> Self {
        n.map_or(RawValue::Null, RawValue::Number)
    }
}

/// 数字转文本：整数不带小数部分，-0 归一为 0
pub fn format_number(n: f64) -> String {
    if n == 0.0 {
        return "0".to_string();
    }
    n.to_string()
}

/// 文本解析为数字，空串表示无值
pub fn parse_number(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok()
}

/// 校验数字输入，通过时原样返回去掉首尾空白的文本，空串表示清空。
/// 整数类型按 i64 / u64 解析，不经过 f64，保证大整数不丢精度。
pub fn number_input(value_type: &ValueType, text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Some(String::new());
    }
    let valid = match value_type {
        ValueType::Int | ValueType::Int64 => trimmed.parse::<i64>().is_ok(),
        ValueType::Uint | ValueType::Uint64 => trimmed.parse::<u64>().is_ok(),
        ValueType::Float | ValueType::Float64 => parse_number(trimmed).is_some_and(f64::is_finite),
        _ => false,
    };
    valid.then(|| trimmed.to_string())
}

/// 根据 value_type 选出的编辑控件
#[derive(Debug, Clone, PartialEq)]
pub enum ControlKind {
    Text(String),
    Toggle(bool),
    /// 存储的数字文本，按原样展示
    Number(String),
    Unsupported(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Control {
    pub kind: ControlKind,
    /// writable = false 时禁用，优先于类型本身的可编辑性
    pub disabled: bool,
}

impl Control {
    pub fn for_entry(entry: &ConfigEntry) -> Self {
        let kind = match &entry.value_type {
            ValueType::String => ControlKind::Text(entry.value.clone()),
            ValueType::Bool => ControlKind::Toggle(entry.value == "true"),
            t if t.is_numeric() => ControlKind::Number(entry.value.trim().to_string()),
            other => ControlKind::Unsupported(other.to_string()),
        };
        Self {
            kind,
            disabled: !entry.writable,
        }
    }

    /// 控件能否接收编辑
    pub fn is_editable(&self) -> bool {
        !self.disabled && !matches!(self.kind, ControlKind::Unsupported(_))
    }

    /// 列表中展示的文本
    pub fn display(&self) -> String {
        match &self.kind {
            ControlKind::Text(s) => s.clone(),
            ControlKind::Toggle(true) => "[x] on".to_string(),
            ControlKind::Toggle(false) => "[ ] off".to_string(),
            ControlKind::Number(text) => text.clone(),
            ControlKind::Unsupported(name) => format!("Unsupported type: {}", name),
        }
    }

    /// 开关翻转后要提交的值
    pub fn toggled(&self) -> Option<RawValue> {
        match self.kind {
            ControlKind::Toggle(on) if !self.disabled => {
                Some(RawValue::Text(if on { "false" } else { "true" }.to_string()))
            }
            _ => None,
        }
    }
}
