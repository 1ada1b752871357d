use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use super::control::RawValue;
use crate::models::ConfigEntry;

/// 单个 key 的修改记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Modification {
    pub old_value: String,
    pub new_value: String,
}

/// 编辑会话：只存在于内存中，跟踪相对于上次拉取结果的修改。
///
/// 不变式：key 在 `modified` 中当且仅当该配置项当前文本与 `original` 不同。
#[derive(Debug, Clone, Default)]
pub struct EditSession {
    configs: Vec<ConfigEntry>,
    original: HashMap<String, String>,
    modified: BTreeMap<String, Modification>,
}

impl EditSession {
    pub fn new(configs: Vec<ConfigEntry>) -> Self {
        let mut session = Self::default();
        session.reset(configs);
        session
    }

    /// 用新拉取的集合整体替换：原始值和修改集一起重置
    pub fn reset(&mut self, configs: Vec<ConfigEntry>) {
        self.original = configs
            .iter()
            .map(|c| (c.key.clone(), c.value.clone()))
            .collect();
        self.modified.clear();
        self.configs = configs;
    }

    pub fn configs(&self) -> &[ConfigEntry] {
        &self.configs
    }

    pub fn get(&self, key: &str) -> Option<&ConfigEntry> {
        self.configs.iter().find(|c| c.key == key)
    }

    pub fn original_value(&self, key: &str) -> Option<&str> {
        self.original.get(key).map(|s| s.as_str())
    }

    pub fn modifications(&self) -> &BTreeMap<String, Modification> {
        &self.modified
    }

    pub fn is_modified(&self, key: &str) -> bool {
        self.modified.contains_key(key)
    }

    /// 即 "Save (N)" 中的 N
    pub fn dirty_count(&self) -> usize {
        self.modified.len()
    }

    pub fn is_dirty(&self) -> bool {
        !self.modified.is_empty()
    }

    /// 记录一次编辑。未知 key 直接忽略，返回是否生效。
    pub fn record_edit(&mut self, key: &str, raw: impl Into<RawValue>) -> bool {
        let new_value = raw.into().into_text();

        let entry = match self.configs.iter_mut().find(|c| c.key == key) {
            Some(entry) => entry,
            None => {
                tracing::debug!(key, "edit for unknown key ignored");
                return false;
            }
        };
        entry.value = new_value.clone();

        let original = self.original.get(key).cloned().unwrap_or_default();
        if new_value == original {
            self.modified.remove(key);
        } else {
            self.modified.insert(
                key.to_string(),
                Modification {
                    old_value: original,
                    new_value,
                },
            );
        }
        true
    }

    /// 提交内容：每个脏 key 只带最新值
    pub fn changes(&self) -> BTreeMap<String, String> {
        self.modified
            .iter()
            .map(|(k, m)| (k.clone(), m.new_value.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ValueType;
    use proptest::prelude::*;

    fn cfg(key: &str, value: &str, value_type: ValueType) -> ConfigEntry {
        ConfigEntry {
            key: key.to_string(),
            value: value.to_string(),
            value_type,
            group: String::new(),
            usage: String::new(),
            writable: true,
            created_at: None,
            updated_at: None,
        }
    }

    fn sample() -> EditSession {
        EditSession::new(vec![
            cfg("host", "localhost", ValueType::String),
            cfg("port", "8080", ValueType::Int),
            cfg("debug", "false", ValueType::Bool),
        ])
    }

    #[test]
    fn test_new_session_is_clean() {
        let s = sample();
        assert_eq!(s.dirty_count(), 0);
        assert!(!s.is_dirty());
        assert_eq!(s.original_value("port"), Some("8080"));
    }

    #[test]
    fn test_edit_marks_dirty_and_updates_value() {
        let mut s = sample();
        assert!(s.record_edit("host", "db.internal"));
        assert!(s.is_modified("host"));
        assert_eq!(s.get("host").unwrap().value, "db.internal");
        assert_eq!(
            s.modifications()["host"],
            Modification {
                old_value: "localhost".to_string(),
                new_value: "db.internal".to_string(),
            }
        );
        assert_eq!(s.dirty_count(), 1);
    }

    #[test]
    fn test_revert_removes_from_dirty_set() {
        let mut s = sample();
        s.record_edit("host", "other");
        s.record_edit("host", "localhost");
        assert!(!s.is_modified("host"));
        assert_eq!(s.dirty_count(), 0);
    }

    #[test]
    fn test_intermediate_edits_keep_original_baseline() {
        let mut s = sample();
        s.record_edit("port", 81.0);
        s.record_edit("port", 82.0);
        assert_eq!(s.modifications()["port"].old_value, "8080");
        assert_eq!(s.modifications()["port"].new_value, "82");
    }

    #[test]
    fn test_null_edit_becomes_empty_text() {
        let mut s = sample();
        s.record_edit("port", RawValue::Null);
        assert_eq!(s.get("port").unwrap().value, "");
        assert_eq!(s.modifications()["port"].new_value, "");
    }

    #[test]
    fn test_unknown_key_is_noop() {
        let mut s = sample();
        assert!(!s.record_edit("missing", "x"));
        assert_eq!(s.dirty_count(), 0);
        assert_eq!(s.configs().len(), 3);
    }

    #[test]
    fn test_changes_contain_only_new_values_of_dirty_keys() {
        let mut s = sample();
        s.record_edit("host", "a");
        s.record_edit("host", "b");
        s.record_edit("debug", true);
        let changes = s.changes();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes["host"], "b");
        assert_eq!(changes["debug"], "true");
        assert!(!changes.contains_key("port"));
    }

    #[test]
    fn test_reset_clears_modifications() {
        let mut s = sample();
        s.record_edit("host", "new");
        s.reset(vec![cfg("host", "new", ValueType::String)]);
        assert_eq!(s.dirty_count(), 0);
        assert_eq!(s.original_value("host"), Some("new"));
        assert_eq!(s.original_value("port"), None);
    }

    proptest! {
        #[test]
        fn prop_dirty_iff_differs_from_original(
            edits in proptest::collection::vec((0usize..3, "[a-c]{0,2}"), 0..40)
        ) {
            let keys = ["a", "b", "c"];
            let mut s = EditSession::new(
                keys.iter().map(|k| cfg(k, "a", ValueType::String)).collect(),
            );
            for (idx, value) in edits {
                s.record_edit(keys[idx], value.as_str());
                for key in keys {
                    let current = &s.get(key).unwrap().value;
                    let differs = current != s.original_value(key).unwrap();
                    prop_assert_eq!(s.is_modified(key), differs);
                    if differs {
                        prop_assert_eq!(&s.modifications()[key].new_value, current);
                    }
                }
            }
        }
    }
}
