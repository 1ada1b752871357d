use std::time::Instant;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, SecondsFormat, TimeZone};

use super::debounce::Debouncer;
use crate::error::{ConsoleError, Result};
use crate::models::AuditRecord;

/// 审计查询条件
#[derive(Debug, Clone, PartialEq)]
pub struct AuditQuery {
    /// 空串表示全部 action
    pub action: String,
    pub actor: String,
    pub q: String,
    pub limit: Option<u32>,
    pub from: DateTime<FixedOffset>,
    pub to: DateTime<FixedOffset>,
}

impl AuditQuery {
    /// 默认时间窗口：昨天 00:00:00 到今天 23:59:59（按 now 所在时区）
    pub fn new(now: DateTime<FixedOffset>) -> Self {
        let (from, to) = default_window(now);
        Self {
            action: String::new(),
            actor: String::new(),
            q: String::new(),
            limit: None,
            from,
            to,
        }
    }

    /// 按日期设置时间窗口，边界扩展到整天
    pub fn set_dates(&mut self, from: NaiveDate, to: NaiveDate) -> Result<()> {
        let offset = *self.from.offset();
        let (from, to) = date_window(from, to, offset)?;
        self.from = from;
        self.to = to;
        Ok(())
    }

    pub fn dates(&self) -> (NaiveDate, NaiveDate) {
        (self.from.date_naive(), self.to.date_naive())
    }

    /// 转换为 URL 查询参数，空条件不下发
    pub fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if !self.action.is_empty() {
            params.push(("action", self.action.clone()));
        }
        if !self.actor.is_empty() {
            params.push(("actor", self.actor.clone()));
        }
        params.push(("from", self.from.to_rfc3339_opts(SecondsFormat::Secs, false)));
        params.push(("to", self.to.to_rfc3339_opts(SecondsFormat::Secs, false)));
        if !self.q.is_empty() {
            params.push(("q", self.q.clone()));
        }
        if let Some(limit) = self.limit {
            params.push(("limit", limit.to_string()));
        }
        params
    }
}

pub fn default_window(now: DateTime<FixedOffset>) -> (DateTime<FixedOffset>, DateTime<FixedOffset>) {
    let offset = *now.offset();
    let today = now.date_naive();
    let yesterday = today - Duration::days(1);
    let from = day_start(yesterday, offset).unwrap_or(now);
    let to = day_end(today, offset).unwrap_or(now);
    (from, to)
}

/// from 日 00:00:00 到 to 日 23:59:59，from 不能晚于 to
pub fn date_window(
    from: NaiveDate,
    to: NaiveDate,
    offset: FixedOffset,
) -> Result<(DateTime<FixedOffset>, DateTime<FixedOffset>)> {
    if from > to {
        return Err(ConsoleError::Config(format!(
            "audit window start {} is after end {}",
            from, to
        )));
    }
    match (day_start(from, offset), day_end(to, offset)) {
        (Some(start), Some(end)) => Ok((start, end)),
        _ => Err(ConsoleError::Config(format!("invalid audit window {} .. {}", from, to))),
    }
}

fn day_start(date: NaiveDate, offset: FixedOffset) -> Option<DateTime<FixedOffset>> {
    date.and_hms_opt(0, 0, 0)
        .and_then(|t| offset.from_local_datetime(&t).single())
}

fn day_end(date: NaiveDate, offset: FixedOffset) -> Option<DateTime<FixedOffset>> {
    date.and_hms_opt(23, 59, 59)
        .and_then(|t| offset.from_local_datetime(&t).single())
}

fn add_days(date: NaiveDate, days: i64) -> Result<NaiveDate> {
    date.checked_add_signed(Duration::days(days))
        .ok_or_else(|| ConsoleError::Config(format!("date out of range: {} + {} days", date, days)))
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuditTicket {
    pub seq: u64,
    pub query: AuditQuery,
}

#[derive(Debug)]
pub enum AuditOutcome {
    Applied { count: usize },
    Stale,
    Failed(ConsoleError),
}

/// 审计日志视图状态：查询条件、actor 输入去抖、最新请求序号
pub struct AuditLog {
    query: AuditQuery,
    debouncer: Debouncer,
    records: Vec<AuditRecord>,
    actions: Vec<String>,
    next_seq: u64,
    latest_fetch: Option<u64>,
}

impl AuditLog {
    pub fn new(query: AuditQuery, debouncer: Debouncer) -> Self {
        Self {
            query,
            debouncer,
            records: Vec::new(),
            actions: Vec::new(),
            next_seq: 0,
            latest_fetch: None,
        }
    }

    pub fn query(&self) -> &AuditQuery {
        &self.query
    }

    pub fn records(&self) -> &[AuditRecord] {
        &self.records
    }

    pub fn actions(&self) -> &[String] {
        &self.actions
    }

    pub fn set_actions(&mut self, actions: Vec<String>) {
        self.actions = actions;
    }

    pub fn is_loading(&self) -> bool {
        self.latest_fetch.is_some()
    }

    pub fn begin_fetch(&mut self) -> AuditTicket {
        self.next_seq += 1;
        self.latest_fetch = Some(self.next_seq);
        // 立即拉取会吞掉挂起的去抖
        self.debouncer.cancel();
        AuditTicket {
            seq: self.next_seq,
            query: self.query.clone(),
        }
    }

    /// actor 输入变化：只重置去抖计时，不立即请求
    pub fn set_actor(&mut self, actor: impl Into<String>, now: Instant) {
        let actor = actor.into();
        if actor == self.query.actor {
            return;
        }
        self.query.actor = actor;
        self.debouncer.touch(now);
    }

    /// 事件循环每个 tick 调用，去抖到期时发起请求
    pub fn poll(&mut self, now: Instant) -> Option<AuditTicket> {
        if self.debouncer.fire(now) {
            Some(self.begin_fetch())
        } else {
            None
        }
    }

    /// action 变化立即请求，未变化时跳过
    pub fn set_action(&mut self, action: impl Into<String>) -> Option<AuditTicket> {
        let action = action.into();
        if action == self.query.action {
            return None;
        }
        self.query.action = action;
        Some(self.begin_fetch())
    }

    /// 时间窗口整体平移 days 天（负数向过去），立即请求
    pub fn shift_window(&mut self, days: i64) -> Result<AuditTicket> {
        let (from, to) = self.query.dates();
        self.query.set_dates(add_days(from, days)?, add_days(to, days)?)?;
        Ok(self.begin_fetch())
    }

    /// 起始日期提前 days 天（负数收窄），立即请求；窗口至少保留一天
    pub fn widen_window(&mut self, days: i64) -> Result<AuditTicket> {
        let (from, to) = self.query.dates();
        self.query.set_dates(add_days(from, -days)?, to)?;
        Ok(self.begin_fetch())
    }

    /// "" → actions[0] → ... → ""
    pub fn next_action(&self) -> String {
        if self.query.action.is_empty() {
            return self.actions.first().cloned().unwrap_or_default();
        }
        match self.actions.iter().position(|a| *a == self.query.action) {
            Some(idx) if idx + 1 < self.actions.len() => self.actions[idx + 1].clone(),
            _ => String::new(),
        }
    }

    pub fn complete_fetch(
        &mut self,
        ticket: &AuditTicket,
        result: Result<Vec<AuditRecord>>,
    ) -> AuditOutcome {
        if self.latest_fetch != Some(ticket.seq) {
            return AuditOutcome::Stale;
        }
        self.latest_fetch = None;
        match result {
            Ok(records) => {
                let count = records.len();
                self.records = records;
                AuditOutcome::Applied { count }
            }
            Err(e) => {
                tracing::warn!("failed to load audits: {}", e);
                AuditOutcome::Failed(e)
            }
        }
    }
}
