//! 配置编辑器状态机。
//!
//! 网络请求由调用方异步执行，这里只负责发放带序号的 ticket 并在结果返回时
//! 决定是否采纳：只有最新发出的拉取结果会被应用，过期结果直接丢弃；
//! 保存同一时刻最多一个在途。

use std::collections::BTreeMap;

use super::grouping::{filter_groups, group_entries, ConfigGroup};
use super::session::EditSession;
use super::control::RawValue;
use crate::error::{ConsoleError, Result};
use crate::models::ConfigEntry;

/// 未指定环境时的默认环境
pub const DEFAULT_ENVIRONMENT: &str = "prod";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseTarget {
    pub project: String,
    pub environment: String,
    pub release: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub seq: u64,
    pub target: ReleaseTarget,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveTicket {
    pub seq: u64,
    pub target: ReleaseTarget,
    pub changes: BTreeMap<String, String>,
}

#[derive(Debug)]
pub enum FetchOutcome {
    Applied { count: usize },
    /// 已被更新的请求取代
    Stale,
    Failed(ConsoleError),
}

#[derive(Debug)]
pub enum SaveOutcome {
    /// 保存成功，需要执行返回的刷新 ticket
    Saved { count: usize, refetch: FetchTicket },
    Failed(ConsoleError),
    Stale,
}

pub struct ConfigEditor {
    project: String,
    environment: String,
    release: String,
    session: EditSession,
    filter: String,
    next_seq: u64,
    latest_fetch: Option<u64>,
    save_in_flight: Option<u64>,
    loaded: bool,
    environments: Vec<String>,
    releases: Vec<String>,
}

impl ConfigEditor {
    pub fn new(project: &str, environment: Option<&str>, release: &str) -> Self {
        Self {
            project: project.to_string(),
            environment: environment.unwrap_or(DEFAULT_ENVIRONMENT).to_string(),
            release: release.to_string(),
            session: EditSession::default(),
            filter: String::new(),
            next_seq: 0,
            latest_fetch: None,
            save_in_flight: None,
            loaded: false,
            environments: Vec::new(),
            releases: Vec::new(),
        }
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn release(&self) -> &str {
        &self.release
    }

    pub fn target(&self) -> ReleaseTarget {
        ReleaseTarget {
            project: self.project.clone(),
            environment: self.environment.clone(),
            release: self.release.clone(),
        }
    }

    pub fn session(&self) -> &EditSession {
        &self.session
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn is_loading(&self) -> bool {
        self.latest_fetch.is_some()
    }

    pub fn is_saving(&self) -> bool {
        self.save_in_flight.is_some()
    }

    fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn issue_fetch(&mut self, target: ReleaseTarget) -> FetchTicket {
        let seq = self.next_seq();
        self.latest_fetch = Some(seq);
        tracing::debug!(seq, env = %target.environment, release = %target.release, "fetch configs");
        FetchTicket { seq, target }
    }

    /// 重新拉取当前目标（初次加载 / 手动刷新）
    pub fn begin_fetch(&mut self) -> FetchTicket {
        let target = self.target();
        self.issue_fetch(target)
    }

    /// 切换环境。已加载且环境未变时跳过。
    pub fn switch_environment(&mut self, environment: &str) -> Option<FetchTicket> {
        if self.loaded && environment == self.environment {
            return None;
        }
        let mut target = self.target();
        target.environment = environment.to_string();
        Some(self.issue_fetch(target))
    }

    /// 切换 release，规则同 switch_environment
    pub fn switch_release(&mut self, release: &str) -> Option<FetchTicket> {
        if self.loaded && release == self.release {
            return None;
        }
        let mut target = self.target();
        target.release = release.to_string();
        Some(self.issue_fetch(target))
    }

    /// 处理拉取结果。只采纳最新 ticket；成功时原子地重置编辑会话并切换到 ticket 的目标。
    pub fn complete_fetch(
        &mut self,
        ticket: &FetchTicket,
        result: Result<Vec<ConfigEntry>>,
    ) -> FetchOutcome {
        if self.latest_fetch != Some(ticket.seq) {
            tracing::debug!(seq = ticket.seq, "stale config response dropped");
            return FetchOutcome::Stale;
        }
        self.latest_fetch = None;

        match result {
            Ok(configs) => {
                let count = configs.len();
                self.session.reset(configs);
                self.environment = ticket.target.environment.clone();
                self.release = ticket.target.release.clone();
                self.loaded = true;
                FetchOutcome::Applied { count }
            }
            Err(e) => {
                tracing::warn!("failed to load configs: {}", e);
                FetchOutcome::Failed(e)
            }
        }
    }

    pub fn record_edit(&mut self, key: &str, raw: impl Into<RawValue>) -> bool {
        self.session.record_edit(key, raw)
    }

    /// 开始保存。没有修改或已有保存在途时返回 None（不发请求）。
    pub fn begin_save(&mut self) -> Option<SaveTicket> {
        if !self.session.is_dirty() || self.save_in_flight.is_some() {
            return None;
        }
        let seq = self.next_seq();
        self.save_in_flight = Some(seq);
        Some(SaveTicket {
            seq,
            target: self.target(),
            changes: self.session.changes(),
        })
    }

    /// 处理保存结果。失败时保留本地修改；成功时不清空修改集，而是发起刷新。
    pub fn complete_save(&mut self, ticket: &SaveTicket, result: Result<()>) -> SaveOutcome {
        if self.save_in_flight != Some(ticket.seq) {
            return SaveOutcome::Stale;
        }
        self.save_in_flight = None;

        match result {
            Ok(()) => {
                tracing::info!(
                    count = ticket.changes.len(),
                    env = %ticket.target.environment,
                    "configs saved"
                );
                SaveOutcome::Saved {
                    count: ticket.changes.len(),
                    refetch: self.begin_fetch(),
                }
            }
            Err(e) => {
                tracing::warn!("failed to save configs: {}", e);
                SaveOutcome::Failed(e)
            }
        }
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    pub fn set_filter(&mut self, filter: impl Into<String>) {
        self.filter = filter.into();
    }

    /// 全部分组（用于分组索引）
    pub fn all_groups(&self) -> Vec<ConfigGroup<'_>> {
        group_entries(self.session.configs())
    }

    /// 过滤后的分组（用于列表展示）
    pub fn visible_groups(&self) -> Vec<ConfigGroup<'_>> {
        filter_groups(group_entries(self.session.configs()), &self.filter)
    }

    pub fn environments(&self) -> &[String] {
        &self.environments
    }

    pub fn set_environments(&mut self, environments: Vec<String>) {
        self.environments = environments;
    }

    pub fn releases(&self) -> &[String] {
        &self.releases
    }

    pub fn set_releases(&mut self, releases: Vec<String>) {
        self.releases = releases;
    }

    /// 列表中当前环境的下一个（循环）
    pub fn next_environment(&self) -> Option<String> {
        cycle(&self.environments, &self.environment)
    }

    pub fn next_release(&self) -> Option<String> {
        cycle(&self.releases, &self.release)
    }
}

fn cycle(items: &[String], current: &str) -> Option<String> {
    if items.is_empty() {
        return None;
    }
    let next = match items.iter().position(|i| i == current) {
        Some(idx) => (idx + 1) % items.len(),
        None => 0,
    };
    Some(items[next].clone())
}
