use std::time::{Duration, Instant};

pub const DEFAULT_SEARCH_DEBOUNCE: Duration = Duration::from_millis(400);

/// 固定延迟去抖：连续的输入只在静默 `delay` 之后触发一次
#[derive(Debug, Clone)]
pub struct Debouncer {
    delay: Duration,
    last_input: Option<Instant>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            last_input: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// 记录一次输入，重新开始计时
    pub fn touch(&mut self, now: Instant) {
        self.last_input = Some(now);
    }

    pub fn is_pending(&self) -> bool {
        self.last_input.is_some()
    }

    /// 静默期已过则返回 true 并清除挂起状态
    pub fn fire(&mut self, now: Instant) -> bool {
        match self.last_input {
            Some(at) if now.saturating_duration_since(at) >= self.delay => {
                self.last_input = None;
                true
            }
            _ => false,
        }
    }

    pub fn cancel(&mut self) {
        self.last_input = None;
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(DEFAULT_SEARCH_DEBOUNCE)
    }
}
