use crate::models::ConfigEntry;

pub const UNSPECIFIED_GROUP: &str = "UNSPECIFIED";

/// 一个展示分组：组名（大写）及其下的配置项
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigGroup<'a> {
    pub name: String,
    pub entries: Vec<&'a ConfigEntry>,
}

/// 组名归一化：大写，空组名落入 UNSPECIFIED
pub fn group_label(group: &str) -> String {
    if group.is_empty() {
        UNSPECIFIED_GROUP.to_string()
    } else {
        group.to_uppercase()
    }
}

/// 按 group 分组。组按首次出现顺序排列，组内保持原顺序。纯投影，不修改源数据。
pub fn group_entries(configs: &[ConfigEntry]) -> Vec<ConfigGroup<'_>> {
    let mut groups: Vec<ConfigGroup<'_>> = Vec::new();
    for cfg in configs {
        let label = group_label(&cfg.group);
        match groups.iter_mut().find(|g| g.name == label) {
            Some(g) => g.entries.push(cfg),
            None => groups.push(ConfigGroup {
                name: label,
                entries: vec![cfg],
            }),
        }
    }
    groups
}

/// key 或 usage 中包含过滤文本（不区分大小写）即命中
pub fn matches_filter(cfg: &ConfigEntry, filter: &str) -> bool {
    if filter.is_empty() {
        return true;
    }
    let needle = filter.to_lowercase();
    cfg.key.to_lowercase().contains(&needle) || cfg.usage.to_lowercase().contains(&needle)
}

/// 过滤每个分组，没有命中项的分组整体去掉
pub fn filter_groups<'a>(groups: Vec<ConfigGroup<'a>>, filter: &str) -> Vec<ConfigGroup<'a>> {
    if filter.is_empty() {
        return groups;
    }
    groups
        .into_iter()
        .filter_map(|g| {
            let entries: Vec<_> = g
                .entries
                .into_iter()
                .filter(|cfg| matches_filter(cfg, filter))
                .collect();
            if entries.is_empty() {
                None
            } else {
                Some(ConfigGroup {
                    name: g.name,
                    entries,
                })
            }
        })
        .collect()
}

/// 高亮片段
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub text: String,
    pub matched: bool,
}

/// 把 text 切成片段，不区分大小写地标出 query 的每次出现
pub fn highlight(text: &str, query: &str) -> Vec<Segment> {
    if query.is_empty() || text.is_empty() {
        return vec![Segment {
            text: text.to_string(),
            matched: false,
        }];
    }

    let text_chars: Vec<char> = text.chars().collect();
    let lower: Vec<char> = text_chars.iter().map(|c| fold(*c)).collect();
    let needle: Vec<char> = query.chars().map(fold).collect();

    let mut segments = Vec::new();
    let mut plain = String::new();
    let mut i = 0;
    while i < text_chars.len() {
        if i + needle.len() <= lower.len() && lower[i..i + needle.len()] == needle[..] {
            if !plain.is_empty() {
                segments.push(Segment {
                    text: std::mem::take(&mut plain),
                    matched: false,
                });
            }
            segments.push(Segment {
                text: text_chars[i..i + needle.len()].iter().collect(),
                matched: true,
            });
            i += needle.len();
        } else {
            plain.push(text_chars[i]);
            i += 1;
        }
    }
    if !plain.is_empty() {
        segments.push(Segment {
            text: plain,
            matched: false,
        });
    }
    segments
}

// 逐字符折叠大小写，保证下标与原文一一对应
fn fold(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}
