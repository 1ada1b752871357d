use std::time::Instant;

use crossterm::event::KeyCode;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};

use crate::api::invalidate_on_unauthorized;
use crate::core::audit::{AuditView, DiffLine};
use crate::core::control::{number_input, Control, ControlKind, RawValue};
use crate::core::grouping::highlight;
use crate::core::{AuditLog, AuditOutcome, AuditTicket, ConfigEditor, FetchOutcome, FetchTicket, SaveOutcome, SaveTicket};
use crate::error::{ConsoleError, Result};
use crate::models::{AuditRecord, ConfigEntry, Environment, Release};
use crate::storage::{TokenState, TokenStore};

/// 菜单面板
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuPanel {
    Configs,
    Audits,
}

impl MenuPanel {
    const ALL: [MenuPanel; 2] = [MenuPanel::Configs, MenuPanel::Audits];

    fn label(self) -> &'static str {
        match self {
            MenuPanel::Configs => "Configs",
            MenuPanel::Audits => "Audit Log",
        }
    }
}

/// 焦点区域：菜单 or 内容
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Menu,
    Content,
}

/// 内容区域的输入模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    /// 浏览列表
    Normal,
    /// 编辑选中配置项的值
    Editing,
    /// 输入过滤文本
    Filtering,
    /// 输入审计 actor（去抖后请求）
    ActorSearch,
    /// 登录表单
    Login,
}

/// 需要异步执行的网络请求，由事件循环取出派发
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Login { username: String, password: String },
    FetchEnvironments { project: String },
    FetchReleases { project: String, environment: String },
    FetchConfigs(FetchTicket),
    SaveConfigs(SaveTicket),
    FetchAudits(AuditTicket),
    FetchAuditActions,
}

/// 请求结果，回送给 App
#[derive(Debug)]
pub enum Response {
    LoggedIn(Result<String>),
    Environments(Result<Vec<Environment>>),
    Releases { environment: String, result: Result<Vec<Release>> },
    Configs(FetchTicket, Result<Vec<ConfigEntry>>),
    Saved(SaveTicket, Result<()>),
    Audits(AuditTicket, Result<Vec<AuditRecord>>),
    AuditActions(Result<Vec<String>>),
}

/// TUI 应用状态
pub struct App {
    editor: ConfigEditor,
    audit_log: AuditLog,
    token: TokenStore,
    selected_menu: usize,
    focus: Focus,
    status_message: String,
    running: bool,
    input_mode: InputMode,
    /// 单行输入缓冲（编辑 / 过滤 / actor）
    input_buffer: String,
    /// 正在编辑的 key
    editing_key: Option<String>,
    /// 登录表单：(标签, 值)
    input_fields: Vec<(String, String)>,
    input_field: usize,
    config_selected: usize,
    audit_selected: usize,
    /// 已加载 release 列表对应的环境
    releases_env: Option<String>,
    outbox: Vec<Request>,
}

impl App {
    pub fn new(editor: ConfigEditor, audit_log: AuditLog, token: TokenStore) -> Self {
        Self {
            editor,
            audit_log,
            token,
            selected_menu: 0,
            focus: Focus::Content,
            status_message: "Ready".to_string(),
            running: true,
            input_mode: InputMode::Normal,
            input_buffer: String::new(),
            editing_key: None,
            input_fields: Vec::new(),
            input_field: 0,
            config_selected: 0,
            audit_selected: 0,
            releases_env: None,
            outbox: Vec::new(),
        }
    }

    /// 启动：已登录则发起初始加载，否则进入登录表单
    pub fn start(&mut self) {
        if self.token.token().is_some() {
            self.load_all();
        } else {
            self.show_login("Please log in");
        }
    }

    fn load_all(&mut self) {
        let project = self.editor.project().to_string();
        self.outbox.push(Request::FetchEnvironments {
            project: project.clone(),
        });
        self.outbox.push(Request::FetchReleases {
            project,
            environment: self.editor.environment().to_string(),
        });
        // 重新登录后保留未保存的编辑，不重新拉取配置
        if !(self.editor.is_loaded() && self.editor.session().is_dirty()) {
            let ticket = self.editor.begin_fetch();
            self.outbox.push(Request::FetchConfigs(ticket));
        }
        self.outbox.push(Request::FetchAuditActions);
        let ticket = self.audit_log.begin_fetch();
        self.outbox.push(Request::FetchAudits(ticket));
        self.set_status("Loading...");
    }

    pub fn editor(&self) -> &ConfigEditor {
        &self.editor
    }

    pub fn audit_log(&self) -> &AuditLog {
        &self.audit_log
    }

    pub fn token(&self) -> Option<&str> {
        self.token.token()
    }

    pub fn selected_panel(&self) -> MenuPanel {
        MenuPanel::ALL[self.selected_menu]
    }

    pub fn focus(&self) -> Focus {
        self.focus
    }

    pub fn status_message(&self) -> &str {
        &self.status_message
    }

    pub fn set_status(&mut self, msg: impl Into<String>) {
        self.status_message = msg.into();
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn input_mode(&self) -> InputMode {
        self.input_mode
    }

    pub fn input_buffer(&self) -> &str {
        &self.input_buffer
    }

    pub fn config_selected(&self) -> usize {
        self.config_selected
    }

    /// 取出待派发的请求
    pub fn drain_requests(&mut self) -> Vec<Request> {
        std::mem::take(&mut self.outbox)
    }

    /// 过滤后可见配置项的 key，按展示顺序
    pub fn visible_keys(&self) -> Vec<String> {
        self.editor
            .visible_groups()
            .iter()
            .flat_map(|g| g.entries.iter().map(|e| e.key.clone()))
            .collect()
    }

    pub fn selected_key(&self) -> Option<String> {
        self.visible_keys().into_iter().nth(self.config_selected)
    }

    fn clamp_selection(&mut self) {
        let len = self.visible_keys().len();
        if len == 0 {
            self.config_selected = 0;
        } else if self.config_selected >= len {
            self.config_selected = len - 1;
        }
        let audits = self.audit_log.records().len();
        if audits == 0 {
            self.audit_selected = 0;
        } else if self.audit_selected >= audits {
            self.audit_selected = audits - 1;
        }
    }

    fn show_login(&mut self, msg: &str) {
        let username = self
            .token
            .username()
            .map(str::to_string)
            .unwrap_or_default();
        self.input_fields = vec![
            ("Username".to_string(), username),
            ("Password".to_string(), String::new()),
        ];
        self.input_field = 0;
        self.input_mode = InputMode::Login;
        self.set_status(msg);
    }

    /// 401 时清除令牌并回到登录表单。返回是否已处理。
    fn handle_auth_error(&mut self, err: &ConsoleError) -> bool {
        if !err.is_unauthorized() {
            return false;
        }
        let username = self.token.username().map(str::to_string);
        if let Err(e) = invalidate_on_unauthorized(err, &mut self.token) {
            tracing::warn!("failed to clear token: {}", e);
        }
        self.show_login("Session expired, please log in again");
        if let (Some(name), Some(field)) = (username, self.input_fields.first_mut()) {
            field.1 = name;
        }
        true
    }

    fn report_error(&mut self, context: &str, err: ConsoleError) {
        if !self.handle_auth_error(&err) {
            self.set_status(format!("{}: {}", context, err));
        }
    }

    /// 每个事件循环 tick 调用，驱动去抖
    pub fn tick(&mut self, now: Instant) {
        if let Some(ticket) = self.audit_log.poll(now) {
            self.outbox.push(Request::FetchAudits(ticket));
        }
    }

    /// 处理请求结果
    pub fn handle_response(&mut self, response: Response) {
        match response {
            Response::LoggedIn(Ok(token)) => {
                let state = TokenState::from_jwt(&token);
                let username = state.username.clone();
                if let Err(e) = self.token.save(state) {
                    self.set_status(format!("Error: cannot persist token: {}", e));
                    return;
                }
                self.input_mode = InputMode::Normal;
                self.input_fields.clear();
                self.load_all();
                if username.is_empty() {
                    self.set_status("Logged in");
                } else {
                    self.set_status(format!("Logged in as {}", username));
                }
            }
            Response::LoggedIn(Err(e)) => {
                self.set_status(format!("Login failed: {}", e));
            }
            Response::Environments(Ok(envs)) => {
                self.editor
                    .set_environments(envs.into_iter().map(|e| e.name).collect());
            }
            Response::Environments(Err(e)) => self.report_error("Error loading environments", e),
            Response::Releases { environment, result } => match result {
                Ok(releases) => {
                    if environment == self.editor.environment() {
                        self.editor
                            .set_releases(releases.into_iter().map(|r| r.name).collect());
                        self.releases_env = Some(environment);
                    }
                }
                Err(e) => self.report_error("Error loading releases", e),
            },
            Response::Configs(ticket, result) => match self.editor.complete_fetch(&ticket, result) {
                FetchOutcome::Applied { count } => {
                    self.clamp_selection();
                    let env = self.editor.environment().to_string();
                    if self.releases_env.as_deref() != Some(env.as_str()) {
                        self.outbox.push(Request::FetchReleases {
                            project: self.editor.project().to_string(),
                            environment: env.clone(),
                        });
                    }
                    self.set_status(format!(
                        "Loaded {} configs [{}/{}]",
                        count,
                        env,
                        self.editor.release()
                    ));
                }
                FetchOutcome::Stale => {}
                FetchOutcome::Failed(e) => self.report_error("Error loading configs", e),
            },
            Response::Saved(ticket, result) => match self.editor.complete_save(&ticket, result) {
                SaveOutcome::Saved { count, refetch } => {
                    self.outbox.push(Request::FetchConfigs(refetch));
                    self.set_status(format!("Saved {} change(s)", count));
                }
                SaveOutcome::Failed(e) => self.report_error("Save failed", e),
                SaveOutcome::Stale => {}
            },
            Response::Audits(ticket, result) => match self.audit_log.complete_fetch(&ticket, result) {
                AuditOutcome::Applied { count } => {
                    self.clamp_selection();
                    if self.selected_panel() == MenuPanel::Audits {
                        self.set_status(format!("Loaded {} audit records", count));
                    }
                }
                AuditOutcome::Stale => {}
                AuditOutcome::Failed(e) => self.report_error("Error loading audits", e),
            },
            Response::AuditActions(Ok(actions)) => self.audit_log.set_actions(actions),
            Response::AuditActions(Err(e)) => self.report_error("Error loading audit actions", e),
        }
    }

    /// 处理键盘输入
    pub fn handle_key(&mut self, code: KeyCode) {
        // 输入模式下优先处理
        match self.input_mode {
            InputMode::Login => {
                self.handle_login_key(code);
                return;
            }
            InputMode::Editing => {
                self.handle_edit_key(code);
                return;
            }
            InputMode::Filtering => {
                self.handle_filter_key(code);
                return;
            }
            InputMode::ActorSearch => {
                self.handle_actor_key(code);
                return;
            }
            InputMode::Normal => {}
        }

        match code {
            KeyCode::Char('q') => self.running = false,
            KeyCode::Tab => {
                self.focus = match self.focus {
                    Focus::Menu => Focus::Content,
                    Focus::Content => Focus::Menu,
                };
            }
            _ if self.focus == Focus::Menu => self.handle_menu_key(code),
            _ if self.focus == Focus::Content => match self.selected_panel() {
                MenuPanel::Configs => self.handle_configs_key(code),
                MenuPanel::Audits => self.handle_audits_key(code),
            },
            _ => {}
        }
    }

    /// 菜单区域按键处理
    fn handle_menu_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Up => {
                if self.selected_menu > 0 {
                    self.selected_menu -= 1;
                }
            }
            KeyCode::Down => {
                if self.selected_menu < MenuPanel::ALL.len() - 1 {
                    self.selected_menu += 1;
                }
            }
            KeyCode::Enter => {
                self.focus = Focus::Content;
                let panel = self.selected_panel();
                self.set_status(format!("Selected: {}", panel.label()));
            }
            _ => {}
        }
    }

    fn handle_configs_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Up => {
                if self.config_selected > 0 {
                    self.config_selected -= 1;
                }
            }
            KeyCode::Down => {
                let len = self.visible_keys().len();
                if len > 0 && self.config_selected < len - 1 {
                    self.config_selected += 1;
                }
            }
            KeyCode::Char('g') => self.jump_to_next_group(),
            KeyCode::Enter | KeyCode::Char('e') => self.start_editing(),
            KeyCode::Char(' ') => self.toggle_selected(),
            KeyCode::Char('s') => self.save(),
            KeyCode::Char('/') => {
                self.input_buffer = self.editor.filter().to_string();
                self.input_mode = InputMode::Filtering;
                self.set_status("Filter by key or usage... Enter=keep, Esc=clear");
            }
            KeyCode::Char('v') => self.cycle_env(),
            KeyCode::Char('r') => self.cycle_release(),
            KeyCode::Char('R') => {
                let ticket = self.editor.begin_fetch();
                self.outbox.push(Request::FetchConfigs(ticket));
                self.set_status("Reloading...");
            }
            _ => {}
        }
    }

    fn handle_audits_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Up => {
                if self.audit_selected > 0 {
                    self.audit_selected -= 1;
                }
            }
            KeyCode::Down => {
                let len = self.audit_log.records().len();
                if len > 0 && self.audit_selected < len - 1 {
                    self.audit_selected += 1;
                }
            }
            KeyCode::Char('a') => {
                let next = self.audit_log.next_action();
                if let Some(ticket) = self.audit_log.set_action(next) {
                    let label = action_label(&ticket.query.action).to_string();
                    self.outbox.push(Request::FetchAudits(ticket));
                    self.set_status(format!("Action: {}", label));
                }
            }
            KeyCode::Char('f') => {
                self.input_buffer = self.audit_log.query().actor.clone();
                self.input_mode = InputMode::ActorSearch;
                self.set_status("Search actor... Enter/Esc=done");
            }
            KeyCode::Char('[') => self.change_audit_window(|log| log.shift_window(-1)),
            KeyCode::Char(']') => self.change_audit_window(|log| log.shift_window(1)),
            KeyCode::Char('+') => self.change_audit_window(|log| log.widen_window(1)),
            KeyCode::Char('-') => self.change_audit_window(|log| log.widen_window(-1)),
            KeyCode::Char('R') => {
                let ticket = self.audit_log.begin_fetch();
                self.outbox.push(Request::FetchAudits(ticket));
                self.set_status("Reloading...");
            }
            _ => {}
        }
    }

    fn change_audit_window(&mut self, change: impl FnOnce(&mut AuditLog) -> Result<AuditTicket>) {
        match change(&mut self.audit_log) {
            Ok(ticket) => {
                let (from, to) = ticket.query.dates();
                self.outbox.push(Request::FetchAudits(ticket));
                self.set_status(format!("Window: {} .. {}", from, to));
            }
            Err(e) => self.set_status(format!("Error: {}", e)),
        }
    }

    /// 跳到下一个分组的第一项（循环）
    fn jump_to_next_group(&mut self) {
        let starts: Vec<(usize, String)> = {
            let mut offset = 0;
            self.editor
                .visible_groups()
                .iter()
                .map(|g| {
                    let start = offset;
                    offset += g.entries.len();
                    (start, g.name.clone())
                })
                .collect()
        };
        if starts.is_empty() {
            return;
        }
        let next = starts
            .iter()
            .find(|(start, _)| *start > self.config_selected)
            .unwrap_or(&starts[0]);
        self.config_selected = next.0;
        self.set_status(format!("Group: {}", next.1.to_lowercase()));
    }

    fn selected_control(&self) -> Option<(String, Control)> {
        let key = self.selected_key()?;
        let entry = self.editor.session().get(&key)?;
        Some((key, Control::for_entry(entry)))
    }

    fn start_editing(&mut self) {
        let Some((key, control)) = self.selected_control() else {
            return;
        };
        if control.disabled {
            self.set_status(format!("'{}' is read-only", key));
            return;
        }
        match &control.kind {
            ControlKind::Toggle(_) => self.toggle_selected(),
            ControlKind::Unsupported(_) => self.set_status(control.display()),
            ControlKind::Text(_) | ControlKind::Number(_) => {
                self.input_buffer = control.display();
                self.editing_key = Some(key);
                self.input_mode = InputMode::Editing;
                self.set_status("Editing... Enter=confirm, Esc=cancel");
            }
        }
    }

    fn toggle_selected(&mut self) {
        let Some((key, control)) = self.selected_control() else {
            return;
        };
        match control.toggled() {
            Some(raw) => {
                self.editor.record_edit(&key, raw);
                self.report_dirty();
            }
            None if control.disabled => self.set_status(format!("'{}' is read-only", key)),
            None => {}
        }
    }

    fn report_dirty(&mut self) {
        let count = self.editor.session().dirty_count();
        self.set_status(format!("{} unsaved change(s)", count));
    }

    fn save(&mut self) {
        match self.editor.begin_save() {
            Some(ticket) => {
                let count = ticket.changes.len();
                self.outbox.push(Request::SaveConfigs(ticket));
                self.set_status(format!("Saving {} change(s)...", count));
            }
            None if self.editor.is_saving() => self.set_status("Save already in progress"),
            None => self.set_status("Nothing to save"),
        }
    }

    /// 切换到下一个环境
    fn cycle_env(&mut self) {
        let Some(env) = self.editor.next_environment() else {
            self.set_status("No environments loaded");
            return;
        };
        let discarded = self.editor.session().dirty_count();
        if let Some(ticket) = self.editor.switch_environment(&env) {
            self.outbox.push(Request::FetchConfigs(ticket));
            self.set_status(switch_message("env", &env, discarded));
        }
    }

    fn cycle_release(&mut self) {
        let Some(release) = self.editor.next_release() else {
            self.set_status("No releases loaded");
            return;
        };
        let discarded = self.editor.session().dirty_count();
        if let Some(ticket) = self.editor.switch_release(&release) {
            self.outbox.push(Request::FetchConfigs(ticket));
            self.set_status(switch_message("release", &release, discarded));
        }
    }

    fn handle_edit_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Esc => {
                self.input_mode = InputMode::Normal;
                self.editing_key = None;
                self.input_buffer.clear();
                self.set_status("Cancelled");
            }
            KeyCode::Enter => self.confirm_edit(),
            KeyCode::Backspace => {
                self.input_buffer.pop();
            }
            KeyCode::Char(c) => self.input_buffer.push(c),
            _ => {}
        }
    }

    /// 提交编辑：数字控件先解析，空文本视为无值
    fn confirm_edit(&mut self) {
        let Some(key) = self.editing_key.clone() else {
            self.input_mode = InputMode::Normal;
            return;
        };
        let Some(entry) = self.editor.session().get(&key) else {
            self.input_mode = InputMode::Normal;
            self.editing_key = None;
            return;
        };
        let value_type = entry.value_type.clone();

        let raw = match Control::for_entry(entry).kind {
            ControlKind::Number(_) => match number_input(&value_type, &self.input_buffer) {
                Some(text) => RawValue::Text(text),
                None => {
                    let text = self.input_buffer.trim().to_string();
                    self.set_status(format!("Error: '{}' is not a valid {}", text, value_type));
                    return;
                }
            },
            _ => RawValue::Text(self.input_buffer.clone()),
        };

        self.editor.record_edit(&key, raw);
        self.input_mode = InputMode::Normal;
        self.editing_key = None;
        self.input_buffer.clear();
        self.report_dirty();
    }

    fn handle_filter_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Esc => {
                self.input_buffer.clear();
                self.editor.set_filter("");
                self.input_mode = InputMode::Normal;
                self.set_status("Filter cleared");
            }
            KeyCode::Enter => {
                self.input_mode = InputMode::Normal;
                let shown = self.visible_keys().len();
                self.set_status(format!("{} matching config(s)", shown));
            }
            KeyCode::Backspace => {
                self.input_buffer.pop();
                self.editor.set_filter(self.input_buffer.clone());
            }
            KeyCode::Char(c) => {
                self.input_buffer.push(c);
                self.editor.set_filter(self.input_buffer.clone());
            }
            _ => {}
        }
        self.clamp_selection();
    }

    fn handle_actor_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Esc | KeyCode::Enter => {
                self.input_mode = InputMode::Normal;
                self.set_status(format!("Actor: {}", action_label(&self.input_buffer)));
                return;
            }
            KeyCode::Backspace => {
                self.input_buffer.pop();
            }
            KeyCode::Char(c) => self.input_buffer.push(c),
            _ => return,
        }
        self.audit_log.set_actor(self.input_buffer.clone(), Instant::now());
    }

    fn handle_login_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Esc => self.running = false,
            KeyCode::Tab | KeyCode::Down => {
                self.input_field = (self.input_field + 1) % self.input_fields.len().max(1);
            }
            KeyCode::BackTab | KeyCode::Up => {
                if self.input_field > 0 {
                    self.input_field -= 1;
                }
            }
            KeyCode::Enter => self.submit_login(),
            KeyCode::Backspace => {
                if let Some((_label, value)) = self.input_fields.get_mut(self.input_field) {
                    value.pop();
                }
            }
            KeyCode::Char(c) => {
                if let Some((_label, value)) = self.input_fields.get_mut(self.input_field) {
                    value.push(c);
                }
            }
            _ => {}
        }
    }

    fn field_value(&self, idx: usize) -> String {
        self.input_fields
            .get(idx)
            .map(|(_, v)| v.trim().to_string())
            .unwrap_or_default()
    }

    fn submit_login(&mut self) {
        let username = self.field_value(0);
        let password = self.field_value(1);
        if username.is_empty() || password.is_empty() {
            self.set_status("Error: username and password are required");
            return;
        }
        self.outbox.push(Request::Login { username, password });
        self.set_status("Logging in...");
    }

    /// 渲染整个界面
    pub fn render(&self, frame: &mut ratatui::Frame) {
        let area = frame.area();

        let outer = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(1),
                Constraint::Length(3),
            ])
            .split(area);

        self.render_title(frame, outer[0]);
        if self.input_mode == InputMode::Login {
            self.render_login(frame, outer[1]);
        } else {
            self.render_body(frame, outer[1]);
        }
        self.render_status(frame, outer[2]);
    }

    fn render_title(&self, frame: &mut ratatui::Frame, area: Rect) {
        let user = match self.token.username() {
            Some(name) if !name.is_empty() => format!("  [{}]", name),
            _ => String::new(),
        };
        let title = Paragraph::new(format!("RTC Console - Configuration Admin{}", user))
            .style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))
            .block(Block::default().borders(Borders::ALL));
        frame.render_widget(title, area);
    }

    fn render_body(&self, frame: &mut ratatui::Frame, area: Rect) {
        let cols = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(20), Constraint::Min(1)])
            .split(area);

        self.render_menu(frame, cols[0]);

        // 输入模式下在内容区底部显示输入框
        let content = if matches!(
            self.input_mode,
            InputMode::Editing | InputMode::Filtering | InputMode::ActorSearch
        ) {
            let rows = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Min(1), Constraint::Length(3)])
                .split(cols[1]);
            self.render_input(frame, rows[1]);
            rows[0]
        } else {
            cols[1]
        };

        match self.selected_panel() {
            MenuPanel::Configs => self.render_configs(frame, content),
            MenuPanel::Audits => self.render_audits(frame, content),
        }
    }

    fn render_menu(&self, frame: &mut ratatui::Frame, area: Rect) {
        let items: Vec<ListItem> = MenuPanel::ALL
            .iter()
            .enumerate()
            .map(|(i, panel)| {
                let style = if i == self.selected_menu {
                    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
                } else {
                    Style::default()
                };
                let prefix = if i == self.selected_menu { "> " } else { "  " };
                ListItem::new(format!("{}{}", prefix, panel.label())).style(style)
            })
            .collect();

        let menu = List::new(items).block(
            Block::default()
                .title(" Menu ")
                .borders(Borders::ALL)
                .border_style(self.border_style(Focus::Menu)),
        );
        frame.render_widget(menu, area);
    }

    fn border_style(&self, focus: Focus) -> Style {
        if self.focus == focus {
            Style::default().fg(Color::Cyan)
        } else {
            Style::default().fg(Color::DarkGray)
        }
    }

    fn configs_title(&self) -> String {
        let mut title = format!(
            " {} [env: {}] [release: {}] ",
            self.editor.project(),
            self.editor.environment(),
            self.editor.release()
        );
        if !self.editor.filter().is_empty() {
            title.push_str(&format!("[filter: {}] ", self.editor.filter()));
        }
        if self.editor.is_loading() {
            title.push_str("(loading) ");
        }
        title
    }

    fn render_configs(&self, frame: &mut ratatui::Frame, area: Rect) {
        let cols = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(18), Constraint::Min(1)])
            .split(area);

        let groups = self.editor.visible_groups();
        let selected_group = {
            let mut offset = 0;
            groups.iter().find_map(|g| {
                let hit = (offset..offset + g.entries.len()).contains(&self.config_selected);
                offset += g.entries.len();
                hit.then(|| g.name.clone())
            })
        };

        // 分组索引
        let index: Vec<ListItem> = self
            .editor
            .all_groups()
            .iter()
            .map(|g| {
                let style = if selected_group.as_deref() == Some(g.name.as_str()) {
                    Style::default().fg(Color::Yellow)
                } else if groups.iter().any(|v| v.name == g.name) {
                    Style::default()
                } else {
                    Style::default().fg(Color::DarkGray)
                };
                ListItem::new(g.name.to_lowercase()).style(style)
            })
            .collect();
        frame.render_widget(
            List::new(index).block(Block::default().title(" Groups (g) ").borders(Borders::ALL)),
            cols[0],
        );

        let block = Block::default()
            .title(self.configs_title())
            .title_bottom(Line::from(self.save_label()).right_aligned())
            .borders(Borders::ALL)
            .border_style(self.border_style(Focus::Content));

        if groups.is_empty() {
            let hint = if !self.editor.is_loaded() {
                "Loading configs..."
            } else if self.editor.filter().is_empty() {
                "No configs in this release."
            } else {
                "No configs match the filter."
            };
            frame.render_widget(Paragraph::new(hint).block(block), cols[1]);
            return;
        }

        let mut items: Vec<ListItem> = Vec::new();
        let mut selected_row = None;
        let mut idx = 0;
        for group in &groups {
            items.push(ListItem::new(Line::from(Span::styled(
                group.name.clone(),
                Style::default().fg(Color::Magenta).add_modifier(Modifier::BOLD),
            ))));
            for entry in &group.entries {
                let is_selected = idx == self.config_selected;
                if is_selected {
                    selected_row = Some(items.len());
                }
                items.push(self.config_item(entry, is_selected));
                idx += 1;
            }
        }

        let mut state = ListState::default().with_selected(selected_row);
        frame.render_stateful_widget(List::new(items).block(block), cols[1], &mut state);
    }

    fn save_label(&self) -> String {
        if self.editor.is_saving() {
            " Saving... ".to_string()
        } else {
            format!(" Save ({}) ", self.editor.session().dirty_count())
        }
    }

    fn config_item(&self, entry: &ConfigEntry, is_selected: bool) -> ListItem<'static> {
        let control = Control::for_entry(entry);
        let modified = self.editor.session().is_modified(&entry.key);

        let mut spans = vec![Span::raw(if is_selected { "> " } else { "  " })];
        spans.push(if modified {
            Span::styled("* ", Style::default().fg(Color::Yellow))
        } else {
            Span::raw("  ")
        });
        if control.disabled {
            spans.push(Span::styled("🔒 ", Style::default().fg(Color::DarkGray)));
        }

        let key_style = if is_selected {
            Style::default().add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };
        for seg in highlight(&entry.key, self.editor.filter()) {
            let style = if seg.matched {
                key_style.bg(Color::Yellow).fg(Color::Black)
            } else {
                key_style
            };
            spans.push(Span::styled(seg.text, style));
        }

        spans.push(Span::styled(" = ", Style::default().fg(Color::DarkGray)));
        let value_style = match control.kind {
            ControlKind::Unsupported(_) => Style::default().fg(Color::Red),
            ControlKind::Toggle(_) => Style::default().fg(Color::Cyan),
            _ if control.disabled => Style::default().fg(Color::DarkGray),
            _ => Style::default().fg(Color::White),
        };
        spans.push(Span::styled(control.display(), value_style));

        if modified {
            if let Some(original) = self.editor.session().original_value(&entry.key) {
                spans.push(Span::styled(
                    format!("  (was: {})", original),
                    Style::default().fg(Color::DarkGray),
                ));
            }
        }
        if !entry.usage.is_empty() {
            spans.push(Span::styled(
                format!("  # {}", entry.usage),
                Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
            ));
        }
        ListItem::new(Line::from(spans))
    }

    fn render_audits(&self, frame: &mut ratatui::Frame, area: Rect) {
        let query = self.audit_log.query();
        let (from, to) = query.dates();
        let mut title = format!(
            " Audit Log [{} .. {}] [action: {}] [actor: {}] ",
            from,
            to,
            action_label(&query.action),
            action_label(&query.actor)
        );
        if self.audit_log.is_loading() {
            title.push_str("(loading) ");
        }
        let block = Block::default()
            .title(title)
            .borders(Borders::ALL)
            .border_style(self.border_style(Focus::Content));

        let records = self.audit_log.records();
        if records.is_empty() {
            frame.render_widget(Paragraph::new("No audit records.").block(block), area);
            return;
        }

        let items: Vec<ListItem> = records
            .iter()
            .enumerate()
            .map(|(i, rec)| audit_card(rec, i == self.audit_selected))
            .collect();
        let mut state = ListState::default().with_selected(Some(self.audit_selected));
        frame.render_stateful_widget(List::new(items).block(block), area, &mut state);
    }

    fn render_input(&self, frame: &mut ratatui::Frame, area: Rect) {
        let label = match self.input_mode {
            InputMode::Editing => format!(" Edit {} ", self.editing_key.as_deref().unwrap_or("")),
            InputMode::Filtering => " Filter ".to_string(),
            _ => " Actor ".to_string(),
        };
        let line = Line::from(vec![
            Span::styled(self.input_buffer.as_str(), Style::default().fg(Color::White)),
            Span::styled("█", Style::default().fg(Color::Cyan)),
        ]);
        let input = Paragraph::new(line).block(
            Block::default()
                .title(label)
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan)),
        );
        frame.render_widget(input, area);
    }

    fn render_login(&self, frame: &mut ratatui::Frame, area: Rect) {
        let mut lines: Vec<Line> = Vec::new();
        lines.push(Line::from(Span::styled(
            "Log in:",
            Style::default().add_modifier(Modifier::BOLD),
        )));
        lines.push(Line::from(""));

        for (i, (label, value)) in self.input_fields.iter().enumerate() {
            let is_active = i == self.input_field;
            let indicator = if is_active { "▶ " } else { "  " };
            let label_style = if is_active {
                Style::default().fg(Color::Cyan)
            } else {
                Style::default().fg(Color::DarkGray)
            };
            // 密码字段打码
            let shown = if label == "Password" {
                "*".repeat(value.chars().count())
            } else {
                value.clone()
            };
            lines.push(Line::from(vec![
                Span::raw(indicator),
                Span::styled(format!("{}: ", label), label_style),
                Span::styled(shown, Style::default().fg(Color::White)),
                if is_active {
                    Span::styled("█", Style::default().fg(Color::Cyan))
                } else {
                    Span::raw("")
                },
            ]));
        }

        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            "Tab=next field  Enter=login  Esc=quit",
            Style::default().fg(Color::DarkGray),
        )));

        let form = Paragraph::new(lines).block(
            Block::default()
                .title(" Login ")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan)),
        );
        frame.render_widget(form, area);
    }

    fn render_status(&self, frame: &mut ratatui::Frame, area: Rect) {
        let hints = match (self.input_mode, self.selected_panel()) {
            (InputMode::Login, _) => "Tab:Field  Enter:Login  Esc:Quit",
            (InputMode::Normal, MenuPanel::Configs) => {
                "q:Quit  Tab:Focus  ↑↓:Move  e:Edit  Space:Toggle  s:Save  /:Filter  g:Group  v:Env  r:Release  R:Reload"
            }
            (InputMode::Normal, MenuPanel::Audits) => {
                "q:Quit  Tab:Focus  ↑↓:Move  a:Action  f:Actor  [/]:Shift days  +/-:Widen  R:Reload"
            }
            _ => "Enter:Confirm  Esc:Cancel",
        };
        let status = Line::from(vec![
            Span::styled("Status: ", Style::default().fg(Color::DarkGray)),
            Span::styled(&self.status_message, Style::default().fg(Color::Green)),
            Span::raw(" | "),
            Span::styled(hints, Style::default().fg(Color::DarkGray)),
        ]);
        let bar = Paragraph::new(status).block(Block::default().borders(Borders::ALL));
        frame.render_widget(bar, area);
    }
}

fn action_label(value: &str) -> &str {
    if value.is_empty() {
        "all"
    } else {
        value
    }
}

fn switch_message(what: &str, name: &str, discarded: usize) -> String {
    if discarded > 0 {
        format!("Switching {} to {} ({} unsaved change(s) discarded)", what, name, discarded)
    } else {
        format!("Switching {} to {}", what, name)
    }
}

/// 一条审计记录的卡片：头部 + 按 action 解码后的内容
fn audit_card(record: &AuditRecord, is_selected: bool) -> ListItem<'static> {
    let ts = record
        .ts
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string());
    let header_style = if is_selected {
        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
    } else {
        Style::default().add_modifier(Modifier::BOLD)
    };
    let mut lines = vec![Line::from(vec![
        Span::raw(if is_selected { "> " } else { "  " }),
        Span::styled(format!("{}  {}  {}", ts, record.actor, record.action), header_style),
    ])];

    match AuditView::from_record(record) {
        AuditView::Invalid => lines.push(Line::from(Span::styled(
            "    Invalid payload",
            Style::default().fg(Color::Red),
        ))),
        AuditView::ConfigUpdated {
            environment,
            project,
            release,
            items,
        } => {
            let tag = Style::default().fg(Color::Cyan);
            lines.push(Line::from(vec![
                Span::raw("    "),
                Span::styled(format!("env: {}", environment), tag),
                Span::raw("  "),
                Span::styled(format!("project: {}", project), tag),
                Span::raw("  "),
                Span::styled(format!("release: {}", release), tag),
            ]));
            lines.extend(items.into_iter().map(diff_line));
        }
        AuditView::Fields(fields) => {
            for (name, value) in fields {
                let mut value_lines = value.lines();
                let first = value_lines.next().unwrap_or_default().to_string();
                lines.push(Line::from(vec![
                    Span::raw("    "),
                    Span::styled(format!("{}: ", name), Style::default().fg(Color::Cyan)),
                    Span::raw(first),
                ]));
                for rest in value_lines {
                    lines.push(Line::from(format!("      {}", rest)));
                }
            }
        }
    }
    lines.push(Line::from(""));
    ListItem::new(lines)
}

/// 只有值确实变化时才划掉旧值、加粗新值
fn diff_line(item: DiffLine) -> Line<'static> {
    let (key_style, old_style, new_style) = if item.changed() {
        (
            Style::default().fg(Color::Yellow),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::CROSSED_OUT),
            Style::default().add_modifier(Modifier::BOLD),
        )
    } else {
        (Style::default().fg(Color::DarkGray), Style::default(), Style::default())
    };
    Line::from(vec![
        Span::raw("    "),
        Span::styled(format!("{}: ", item.key), key_style),
        Span::styled(item.old_value, old_style),
        Span::raw(" → "),
        Span::styled(item.new_value, new_style),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{AuditQuery, Debouncer};
    use crate::models::ValueType;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use chrono::DateTime;
    use ratatui::backend::TestBackend;
    use ratatui::Terminal;
    use std::time::Duration;
    use tempfile::TempDir;

    fn entry(key: &str, value: &str, value_type: ValueType, group: &str, writable: bool) -> ConfigEntry {
        ConfigEntry {
            key: key.to_string(),
            value: value.to_string(),
            value_type,
            group: group.to_string(),
            usage: String::new(),
            writable,
            created_at: None,
            updated_at: None,
        }
    }

    fn sample_configs() -> Vec<ConfigEntry> {
        vec![
            entry("host", "localhost", ValueType::String, "net", true),
            entry("port", "80", ValueType::Int, "net", true),
            entry("debug", "false", ValueType::Bool, "", true),
            entry("secret", "xxx", ValueType::String, "auth", false),
            entry("timeout", "5s", ValueType::Unsupported("duration".into()), "auth", true),
        ]
    }

    fn new_app(tmp: &TempDir, logged_in: bool) -> App {
        let mut token = TokenStore::load(&tmp.path().join("token.json")).unwrap();
        if logged_in {
            token.save(TokenState::from_jwt("token")).unwrap();
        }
        let now = DateTime::parse_from_rfc3339("2025-03-10T12:00:00+00:00").unwrap();
        let mut app = App::new(
            ConfigEditor::new("billing", None, "v1"),
            AuditLog::new(AuditQuery::new(now), Debouncer::new(Duration::from_millis(400))),
            token,
        );
        app.start();
        app
    }

    /// 已登录并完成初次加载的 App
    fn loaded_app(tmp: &TempDir) -> App {
        app_with_configs(tmp, sample_configs())
    }

    fn app_with_configs(tmp: &TempDir, configs: Vec<ConfigEntry>) -> App {
        let mut app = new_app(tmp, true);
        for request in app.drain_requests() {
            if let Request::FetchConfigs(ticket) = request {
                app.handle_response(Response::Configs(ticket, Ok(configs.clone())));
            }
        }
        app.drain_requests();
        app
    }

    fn select(app: &mut App, key: &str) {
        let idx = app.visible_keys().iter().position(|k| k == key).unwrap();
        while app.config_selected() > idx {
            app.handle_key(KeyCode::Up);
        }
        while app.config_selected() < idx {
            app.handle_key(KeyCode::Down);
        }
    }

    fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            app.handle_key(KeyCode::Char(c));
        }
    }

    fn screen(app: &App) -> String {
        let mut terminal = Terminal::new(TestBackend::new(140, 30)).unwrap();
        terminal.draw(|frame| app.render(frame)).unwrap();
        let buffer = terminal.backend().buffer().clone();
        let mut text = String::new();
        for y in 0..buffer.area.height {
            for x in 0..buffer.area.width {
                text.push_str(buffer[(x, y)].symbol());
            }
            text.push('\n');
        }
        text
    }

    #[test]
    fn test_initial_requests() {
        let tmp = TempDir::new().unwrap();
        let mut app = new_app(&tmp, true);
        assert_eq!(app.selected_panel(), MenuPanel::Configs);
        assert_eq!(app.input_mode(), InputMode::Normal);
        let requests = app.drain_requests();
        assert_eq!(requests.len(), 5);
        assert!(matches!(&requests[0], Request::FetchEnvironments { project } if project == "billing"));
        assert!(matches!(&requests[2], Request::FetchConfigs(t) if t.target.environment == "prod"));
        assert!(app.drain_requests().is_empty());
    }

    #[test]
    fn test_login_flow() {
        let tmp = TempDir::new().unwrap();
        let mut app = new_app(&tmp, false);
        assert_eq!(app.input_mode(), InputMode::Login);
        assert!(app.drain_requests().is_empty());

        // 空密码不提交
        type_text(&mut app, "admin");
        app.handle_key(KeyCode::Enter);
        assert!(app.status_message().starts_with("Error"));
        assert!(app.drain_requests().is_empty());

        app.handle_key(KeyCode::Tab);
        type_text(&mut app, "secret");
        app.handle_key(KeyCode::Enter);
        assert_eq!(
            app.drain_requests(),
            vec![Request::Login { username: "admin".into(), password: "secret".into() }]
        );

        app.handle_response(Response::LoggedIn(Ok("new-token".to_string())));
        assert_eq!(app.input_mode(), InputMode::Normal);
        assert_eq!(app.token(), Some("new-token"));
        assert!(tmp.path().join("token.json").exists());
        assert_eq!(app.drain_requests().len(), 5);
    }

    #[test]
    fn test_login_failure_stays_on_form() {
        let tmp = TempDir::new().unwrap();
        let mut app = new_app(&tmp, false);
        app.handle_response(Response::LoggedIn(Err(ConsoleError::Unauthorized(
            "bad credentials".into(),
        ))));
        assert_eq!(app.input_mode(), InputMode::Login);
        assert!(app.status_message().contains("bad credentials"));
    }

    #[test]
    fn test_configs_loaded() {
        let tmp = TempDir::new().unwrap();
        let app = loaded_app(&tmp);
        assert!(app.editor().is_loaded());
        // 组按首次出现顺序：NET, UNSPECIFIED, AUTH
        assert_eq!(app.visible_keys(), vec!["host", "port", "debug", "secret", "timeout"]);
        assert!(app.status_message().starts_with("Loaded 5 configs"));
    }

    #[test]
    fn test_tab_switches_focus() {
        let tmp = TempDir::new().unwrap();
        let mut app = loaded_app(&tmp);
        assert_eq!(app.focus(), Focus::Content);
        app.handle_key(KeyCode::Tab);
        assert_eq!(app.focus(), Focus::Menu);
        app.handle_key(KeyCode::Down);
        assert_eq!(app.selected_panel(), MenuPanel::Audits);
        app.handle_key(KeyCode::Down);
        assert_eq!(app.selected_panel(), MenuPanel::Audits);
        app.handle_key(KeyCode::Enter);
        assert_eq!(app.focus(), Focus::Content);
        assert_eq!(app.status_message(), "Selected: Audit Log");
    }

    #[test]
    fn test_quit() {
        let tmp = TempDir::new().unwrap();
        let mut app = loaded_app(&tmp);
        assert!(app.is_running());
        app.handle_key(KeyCode::Char('q'));
        assert!(!app.is_running());
    }

    #[test]
    fn test_edit_string_value() {
        let tmp = TempDir::new().unwrap();
        let mut app = loaded_app(&tmp);
        select(&mut app, "host");
        app.handle_key(KeyCode::Char('e'));
        assert_eq!(app.input_mode(), InputMode::Editing);
        assert_eq!(app.input_buffer(), "localhost");

        for _ in 0.."localhost".len() {
            app.handle_key(KeyCode::Backspace);
        }
        type_text(&mut app, "db.internal");
        app.handle_key(KeyCode::Enter);

        assert_eq!(app.input_mode(), InputMode::Normal);
        let session = app.editor().session();
        assert_eq!(session.get("host").unwrap().value, "db.internal");
        assert_eq!(session.dirty_count(), 1);
        assert_eq!(app.status_message(), "1 unsaved change(s)");
    }

    #[test]
    fn test_edit_back_to_original_clears_dirty() {
        let tmp = TempDir::new().unwrap();
        let mut app = loaded_app(&tmp);
        select(&mut app, "host");
        app.handle_key(KeyCode::Enter);
        type_text(&mut app, "x");
        app.handle_key(KeyCode::Enter);
        assert_eq!(app.editor().session().dirty_count(), 1);

        app.handle_key(KeyCode::Enter);
        app.handle_key(KeyCode::Backspace);
        app.handle_key(KeyCode::Enter);
        assert_eq!(app.editor().session().dirty_count(), 0);
    }

    #[test]
    fn test_edit_cancel() {
        let tmp = TempDir::new().unwrap();
        let mut app = loaded_app(&tmp);
        app.handle_key(KeyCode::Char('e'));
        type_text(&mut app, "zzz");
        app.handle_key(KeyCode::Esc);
        assert_eq!(app.input_mode(), InputMode::Normal);
        assert!(!app.editor().session().is_dirty());
    }

    #[test]
    fn test_number_edit_records_trimmed_text() {
        let tmp = TempDir::new().unwrap();
        let mut app = loaded_app(&tmp);
        select(&mut app, "port");
        app.handle_key(KeyCode::Enter);
        app.handle_key(KeyCode::Backspace);
        app.handle_key(KeyCode::Backspace);
        type_text(&mut app, " 8080 ");
        app.handle_key(KeyCode::Enter);
        assert_eq!(app.editor().session().get("port").unwrap().value, "8080");
    }

    #[test]
    fn test_unchanged_number_confirm_stays_clean() {
        let tmp = TempDir::new().unwrap();
        let mut app = app_with_configs(
            &tmp,
            vec![
                entry("big", "9007199254740993", ValueType::Uint64, "", true),
                entry("padded", "042", ValueType::Int, "", true),
                entry("ratio", "1.0", ValueType::Float64, "", true),
            ],
        );
        for key in ["big", "padded", "ratio"] {
            select(&mut app, key);
            app.handle_key(KeyCode::Enter);
            assert_eq!(app.input_mode(), InputMode::Editing);
            app.handle_key(KeyCode::Enter);
            assert_eq!(app.input_mode(), InputMode::Normal);
        }
        assert_eq!(app.editor().session().dirty_count(), 0);
    }

    #[test]
    fn test_large_uint64_edit_keeps_precision() {
        let tmp = TempDir::new().unwrap();
        let mut app = app_with_configs(
            &tmp,
            vec![entry("big", "1", ValueType::Uint64, "", true)],
        );
        select(&mut app, "big");
        app.handle_key(KeyCode::Enter);
        app.handle_key(KeyCode::Backspace);
        type_text(&mut app, "18446744073709551615");
        app.handle_key(KeyCode::Enter);
        assert_eq!(
            app.editor().session().get("big").unwrap().value,
            "18446744073709551615"
        );
    }

    #[test]
    fn test_invalid_number_keeps_editing() {
        let tmp = TempDir::new().unwrap();
        let mut app = loaded_app(&tmp);
        select(&mut app, "port");
        app.handle_key(KeyCode::Enter);
        type_text(&mut app, "abc");
        app.handle_key(KeyCode::Enter);
        assert_eq!(app.input_mode(), InputMode::Editing);
        assert!(app.status_message().contains("not a valid int"));
        assert!(!app.editor().session().is_dirty());
    }

    #[test]
    fn test_cleared_number_becomes_empty() {
        let tmp = TempDir::new().unwrap();
        let mut app = loaded_app(&tmp);
        select(&mut app, "port");
        app.handle_key(KeyCode::Enter);
        app.handle_key(KeyCode::Backspace);
        app.handle_key(KeyCode::Backspace);
        app.handle_key(KeyCode::Enter);
        assert_eq!(app.editor().session().get("port").unwrap().value, "");
        assert!(app.editor().session().is_modified("port"));
    }

    #[test]
    fn test_toggle_bool() {
        let tmp = TempDir::new().unwrap();
        let mut app = loaded_app(&tmp);
        select(&mut app, "debug");
        app.handle_key(KeyCode::Char(' '));
        assert_eq!(app.editor().session().get("debug").unwrap().value, "true");
        assert!(app.editor().session().is_modified("debug"));
        // Enter 对开关同样是翻转
        app.handle_key(KeyCode::Enter);
        assert_eq!(app.editor().session().get("debug").unwrap().value, "false");
        assert!(!app.editor().session().is_dirty());
    }

    #[test]
    fn test_read_only_and_unsupported_not_editable() {
        let tmp = TempDir::new().unwrap();
        let mut app = loaded_app(&tmp);
        select(&mut app, "secret");
        app.handle_key(KeyCode::Enter);
        assert_eq!(app.input_mode(), InputMode::Normal);
        assert_eq!(app.status_message(), "'secret' is read-only");

        select(&mut app, "timeout");
        app.handle_key(KeyCode::Enter);
        assert_eq!(app.input_mode(), InputMode::Normal);
        assert_eq!(app.status_message(), "Unsupported type: duration");
        assert!(!app.editor().session().is_dirty());
    }

    #[test]
    fn test_save_nothing() {
        let tmp = TempDir::new().unwrap();
        let mut app = loaded_app(&tmp);
        app.handle_key(KeyCode::Char('s'));
        assert_eq!(app.status_message(), "Nothing to save");
        assert!(app.drain_requests().is_empty());
    }

    #[test]
    fn test_save_sends_diff_and_refetches() {
        let tmp = TempDir::new().unwrap();
        let mut app = loaded_app(&tmp);
        select(&mut app, "debug");
        app.handle_key(KeyCode::Char(' '));
        app.handle_key(KeyCode::Char('s'));

        let mut requests = app.drain_requests();
        assert_eq!(requests.len(), 1);
        let ticket = match requests.remove(0) {
            Request::SaveConfigs(ticket) => ticket,
            other => panic!("unexpected request: {:?}", other),
        };
        assert_eq!(ticket.changes.len(), 1);
        assert_eq!(ticket.changes["debug"], "true");

        // 保存在途时再次保存被拒绝
        app.handle_key(KeyCode::Char('s'));
        assert_eq!(app.status_message(), "Save already in progress");
        assert!(app.drain_requests().is_empty());

        app.handle_response(Response::Saved(ticket, Ok(())));
        assert_eq!(app.status_message(), "Saved 1 change(s)");
        let requests = app.drain_requests();
        assert!(matches!(requests.as_slice(), [Request::FetchConfigs(_)]));
        // 刷新返回前修改集仍在
        assert_eq!(app.editor().session().dirty_count(), 1);
    }

    #[test]
    fn test_failed_save_keeps_edits() {
        let tmp = TempDir::new().unwrap();
        let mut app = loaded_app(&tmp);
        select(&mut app, "debug");
        app.handle_key(KeyCode::Char(' '));
        app.handle_key(KeyCode::Char('s'));
        let ticket = match app.drain_requests().remove(0) {
            Request::SaveConfigs(ticket) => ticket,
            other => panic!("unexpected request: {:?}", other),
        };
        app.handle_response(Response::Saved(
            ticket,
            Err(ConsoleError::Status { status: 500, message: "db down".into() }),
        ));
        assert!(app.status_message().starts_with("Save failed"));
        assert!(app.status_message().contains("500"));
        assert_eq!(app.editor().session().dirty_count(), 1);
        assert!(app.drain_requests().is_empty());
    }

    #[test]
    fn test_unauthorized_clears_token_and_shows_login() {
        let tmp = TempDir::new().unwrap();
        let mut app = loaded_app(&tmp);
        app.handle_key(KeyCode::Char('R'));
        let ticket = match app.drain_requests().remove(0) {
            Request::FetchConfigs(ticket) => ticket,
            other => panic!("unexpected request: {:?}", other),
        };
        app.handle_response(Response::Configs(
            ticket,
            Err(ConsoleError::Unauthorized("token expired".into())),
        ));
        assert_eq!(app.input_mode(), InputMode::Login);
        assert!(app.token().is_none());
        assert!(!tmp.path().join("token.json").exists());
        // 原数据保留
        assert_eq!(app.visible_keys().len(), 5);
    }

    #[test]
    fn test_relogin_after_failed_save_keeps_edits() {
        let tmp = TempDir::new().unwrap();
        let mut app = loaded_app(&tmp);
        select(&mut app, "debug");
        app.handle_key(KeyCode::Char(' '));
        app.handle_key(KeyCode::Char('s'));
        let ticket = match app.drain_requests().remove(0) {
            Request::SaveConfigs(ticket) => ticket,
            other => panic!("unexpected request: {:?}", other),
        };
        app.handle_response(Response::Saved(
            ticket,
            Err(ConsoleError::Unauthorized("token expired".into())),
        ));
        assert_eq!(app.input_mode(), InputMode::Login);
        assert_eq!(app.editor().session().dirty_count(), 1);

        app.handle_response(Response::LoggedIn(Ok("new-token".to_string())));
        let requests = app.drain_requests();
        assert!(!requests.is_empty());
        assert!(!requests.iter().any(|r| matches!(r, Request::FetchConfigs(_))));
        assert_eq!(app.editor().session().dirty_count(), 1);

        app.handle_key(KeyCode::Char('s'));
        assert!(matches!(
            app.drain_requests().as_slice(),
            [Request::SaveConfigs(t)] if t.changes["debug"] == "true"
        ));
    }

    #[test]
    fn test_stale_configs_ignored() {
        let tmp = TempDir::new().unwrap();
        let mut app = loaded_app(&tmp);
        app.handle_response(Response::Environments(Ok(vec![
            Environment { name: "prod".into() },
            Environment { name: "dev".into() },
            Environment { name: "stage".into() },
        ])));

        app.handle_key(KeyCode::Char('v'));
        let first = match app.drain_requests().remove(0) {
            Request::FetchConfigs(ticket) => ticket,
            other => panic!("unexpected request: {:?}", other),
        };
        assert_eq!(first.target.environment, "dev");
        app.handle_key(KeyCode::Char('R'));
        let second = match app.drain_requests().remove(0) {
            Request::FetchConfigs(ticket) => ticket,
            other => panic!("unexpected request: {:?}", other),
        };
        assert_eq!(second.target.environment, "prod");

        app.handle_response(Response::Configs(second, Ok(sample_configs())));
        app.handle_response(Response::Configs(
            first,
            Ok(vec![entry("only", "dev", ValueType::String, "", true)]),
        ));
        assert_eq!(app.editor().environment(), "prod");
        assert_eq!(app.visible_keys().len(), 5);
    }

    #[test]
    fn test_env_switch_requests_releases() {
        let tmp = TempDir::new().unwrap();
        let mut app = loaded_app(&tmp);
        app.handle_key(KeyCode::Char('v'));
        assert_eq!(app.status_message(), "No environments loaded");

        app.handle_response(Response::Environments(Ok(vec![
            Environment { name: "prod".into() },
            Environment { name: "dev".into() },
        ])));
        app.handle_key(KeyCode::Char('v'));
        let ticket = match app.drain_requests().remove(0) {
            Request::FetchConfigs(ticket) => ticket,
            other => panic!("unexpected request: {:?}", other),
        };
        app.handle_response(Response::Configs(ticket, Ok(sample_configs())));
        assert_eq!(app.editor().environment(), "dev");
        assert_eq!(
            app.drain_requests(),
            vec![Request::FetchReleases { project: "billing".into(), environment: "dev".into() }]
        );
    }

    #[test]
    fn test_release_cycle() {
        let tmp = TempDir::new().unwrap();
        let mut app = loaded_app(&tmp);
        app.handle_response(Response::Releases {
            environment: "prod".into(),
            result: Ok(vec![
                Release { name: "v2".into(), created_at: None },
                Release { name: "v1".into(), created_at: None },
            ]),
        });
        // 当前 v1 是最后一个，循环到 v2
        app.handle_key(KeyCode::Char('r'));
        let requests = app.drain_requests();
        assert!(matches!(&requests[0], Request::FetchConfigs(t) if t.target.release == "v2"));
    }

    #[test]
    fn test_releases_for_other_env_ignored() {
        let tmp = TempDir::new().unwrap();
        let mut app = loaded_app(&tmp);
        app.handle_response(Response::Releases {
            environment: "dev".into(),
            result: Ok(vec![Release { name: "v9".into(), created_at: None }]),
        });
        assert!(app.editor().releases().is_empty());
    }

    #[test]
    fn test_filter_mode() {
        let tmp = TempDir::new().unwrap();
        let mut app = loaded_app(&tmp);
        select(&mut app, "timeout");
        app.handle_key(KeyCode::Char('/'));
        assert_eq!(app.input_mode(), InputMode::Filtering);
        type_text(&mut app, "PO");
        assert_eq!(app.visible_keys(), vec!["port"]);
        assert_eq!(app.config_selected(), 0);

        app.handle_key(KeyCode::Enter);
        assert_eq!(app.status_message(), "1 matching config(s)");
        assert_eq!(app.editor().filter(), "PO");

        app.handle_key(KeyCode::Char('/'));
        app.handle_key(KeyCode::Esc);
        assert_eq!(app.editor().filter(), "");
        assert_eq!(app.visible_keys().len(), 5);
    }

    #[test]
    fn test_group_jump() {
        let tmp = TempDir::new().unwrap();
        let mut app = loaded_app(&tmp);
        app.handle_key(KeyCode::Char('g'));
        assert_eq!(app.selected_key().as_deref(), Some("debug"));
        assert_eq!(app.status_message(), "Group: unspecified");
        app.handle_key(KeyCode::Char('g'));
        assert_eq!(app.selected_key().as_deref(), Some("secret"));
        app.handle_key(KeyCode::Char('g'));
        assert_eq!(app.selected_key().as_deref(), Some("host"));
    }

    fn audits_app(tmp: &TempDir) -> App {
        let mut app = loaded_app(tmp);
        app.handle_key(KeyCode::Tab);
        app.handle_key(KeyCode::Down);
        app.handle_key(KeyCode::Tab);
        app.handle_response(Response::AuditActions(Ok(vec![
            "config_updated".into(),
            "user_created".into(),
        ])));
        app
    }

    #[test]
    fn test_audit_action_cycle() {
        let tmp = TempDir::new().unwrap();
        let mut app = audits_app(&tmp);
        app.handle_key(KeyCode::Char('a'));
        let requests = app.drain_requests();
        assert!(matches!(&requests[0], Request::FetchAudits(t) if t.query.action == "config_updated"));
        assert_eq!(app.status_message(), "Action: config_updated");
        assert!(app.audit_log().is_loading());
    }

    #[test]
    fn test_audit_window_keys_refetch() {
        let tmp = TempDir::new().unwrap();
        let mut app = audits_app(&tmp);
        app.drain_requests();

        app.handle_key(KeyCode::Char('['));
        let requests = app.drain_requests();
        assert!(matches!(
            requests.as_slice(),
            [Request::FetchAudits(t)] if t.query.to.to_rfc3339() == "2025-03-09T23:59:59+00:00"
        ));
        assert_eq!(app.status_message(), "Window: 2025-03-08 .. 2025-03-09");

        app.handle_key(KeyCode::Char('+'));
        assert_eq!(app.drain_requests().len(), 1);
        assert_eq!(app.status_message(), "Window: 2025-03-07 .. 2025-03-09");

        app.handle_key(KeyCode::Char(']'));
        app.handle_key(KeyCode::Char('-'));
        assert_eq!(app.drain_requests().len(), 2);
        assert_eq!(app.status_message(), "Window: 2025-03-09 .. 2025-03-10");

        app.handle_key(KeyCode::Char('-'));
        assert_eq!(app.status_message(), "Window: 2025-03-10 .. 2025-03-10");
        app.drain_requests();
        app.handle_key(KeyCode::Char('-'));
        assert!(app.status_message().starts_with("Error"));
        assert!(app.drain_requests().is_empty());
    }

    #[test]
    fn test_actor_search_is_debounced() {
        let tmp = TempDir::new().unwrap();
        let mut app = audits_app(&tmp);
        app.handle_key(KeyCode::Char('f'));
        assert_eq!(app.input_mode(), InputMode::ActorSearch);
        type_text(&mut app, "bob");
        app.handle_key(KeyCode::Enter);

        app.tick(Instant::now());
        assert!(app.drain_requests().is_empty());

        app.tick(Instant::now() + Duration::from_secs(1));
        let requests = app.drain_requests();
        assert!(matches!(requests.as_slice(), [Request::FetchAudits(t)] if t.query.actor == "bob"));
    }

    #[test]
    fn test_render_configs() {
        let tmp = TempDir::new().unwrap();
        let mut app = loaded_app(&tmp);
        select(&mut app, "debug");
        app.handle_key(KeyCode::Char(' '));
        let text = screen(&app);
        assert!(text.contains("Save (1)"));
        assert!(text.contains("UNSPECIFIED"));
        assert!(text.contains("[x] on"));
        assert!(text.contains("Unsupported type: duration"));
        assert!(text.contains("(was: false)"));
    }

    #[test]
    fn test_render_audits() {
        let tmp = TempDir::new().unwrap();
        let mut app = audits_app(&tmp);
        let ticket = {
            app.handle_key(KeyCode::Char('R'));
            match app.drain_requests().remove(0) {
                Request::FetchAudits(ticket) => ticket,
                other => panic!("unexpected request: {:?}", other),
            }
        };
        let payload = STANDARD.encode(
            r#"{"environment":"prod","project":"billing","items":[{"key":"port","old_value":"80","new_value":"8080"}]}"#,
        );
        app.handle_response(Response::Audits(
            ticket,
            Ok(vec![
                AuditRecord {
                    action: "config_updated".into(),
                    actor: "bob".into(),
                    payload: Some(payload),
                    ts: None,
                },
                AuditRecord {
                    action: "user_created".into(),
                    actor: "root".into(),
                    payload: Some("%%%".into()),
                    ts: None,
                },
            ]),
        ));
        let text = screen(&app);
        assert!(text.contains("release: -"));
        assert!(text.contains("port: 80 → 8080"));
        assert!(text.contains("Invalid payload"));
    }

    #[test]
    fn test_diff_line_styles_only_changed_values() {
        let changed = diff_line(DiffLine {
            key: "port".into(),
            old_value: "80".into(),
            new_value: "8080".into(),
        });
        assert!(changed.spans[2].style.add_modifier.contains(Modifier::CROSSED_OUT));
        assert!(changed.spans[4].style.add_modifier.contains(Modifier::BOLD));

        let same = diff_line(DiffLine {
            key: "host".into(),
            old_value: "a".into(),
            new_value: "a".into(),
        });
        assert_eq!(same.spans[2].content, "a");
        assert!(!same.spans[2].style.add_modifier.contains(Modifier::CROSSED_OUT));
        assert!(!same.spans[4].style.add_modifier.contains(Modifier::BOLD));
    }

    #[test]
    fn test_render_login() {
        let tmp = TempDir::new().unwrap();
        let mut app = new_app(&tmp, false);
        type_text(&mut app, "admin");
        app.handle_key(KeyCode::Tab);
        type_text(&mut app, "pw");
        let text = screen(&app);
        assert!(text.contains("Username: admin"));
        assert!(text.contains("Password: **"));
        assert!(!text.contains("pw"));
    }
}
