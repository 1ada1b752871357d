use std::path::PathBuf;

use chrono::{DateTime, FixedOffset, Local, NaiveDate};
use clap::{Parser, Subcommand};

use crate::api::{invalidate_on_unauthorized, ApiClient};
use crate::config::{Settings, DEFAULT_CONFIG_FILE};
use crate::core::audit::AuditView;
use crate::core::control::{number_input, Control, ControlKind, RawValue};
use crate::core::{AuditQuery, ConfigEditor, FetchOutcome, SaveOutcome};
use crate::error::{ConsoleError, Result};
use crate::models::AuditRecord;
use crate::storage::{TokenState, TokenStore};

#[derive(Parser, Debug)]
#[command(name = "rtc-console", author, version, about = "Runtime configuration admin console")]
pub struct Cli {
    /// 配置文件路径
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// 覆盖配置文件和环境变量中的服务地址
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// 交互式终端界面
    Tui {
        #[arg(long)]
        project: String,
        #[arg(long)]
        release: String,
        /// 缺省为 prod
        #[arg(long)]
        env: Option<String>,
    },
    /// 登录并保存令牌
    Login {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },
    /// 清除本地令牌
    Logout,
    /// 修改配置值，只提交有变化的 key
    Set {
        #[arg(long)]
        project: String,
        #[arg(long)]
        env: Option<String>,
        #[arg(long)]
        release: String,
        /// KEY=VALUE
        #[arg(required = true, value_parser = parse_assignment)]
        assignments: Vec<(String, String)>,
    },
    /// 列出项目
    Projects {
        /// 按名称搜索
        #[arg(long, default_value = "")]
        q: String,
        #[arg(long, default_value_t = 20)]
        limit: u32,
        #[arg(long, default_value_t = 0)]
        offset: u32,
    },
    /// 查看审计日志（默认昨天到今天）
    Audits {
        #[arg(long)]
        action: Option<String>,
        #[arg(long)]
        actor: Option<String>,
        #[arg(long)]
        q: Option<String>,
        #[arg(long)]
        limit: Option<u32>,
        /// 起始日期 YYYY-MM-DD，从当天 00:00:00 开始
        #[arg(long)]
        from: Option<NaiveDate>,
        /// 结束日期 YYYY-MM-DD，到当天 23:59:59 为止
        #[arg(long)]
        to: Option<NaiveDate>,
    },
}

impl Cli {
    /// 配置加载完毕后应用命令行覆盖；配置文件损坏时一并返回解析错误
    pub fn settings(&self) -> Result<(Settings, Option<ConsoleError>)> {
        let (mut settings, invalid) = Settings::load(&self.config)?;
        if let Some(url) = &self.base_url {
            settings.base_url = url.clone();
        }
        Ok((settings, invalid))
    }
}

/// 解析 KEY=VALUE，value 可以为空
pub fn parse_assignment(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{}'", s)),
    }
}

/// 把命令行赋值按控件类型转成编辑，写入编辑会话
pub fn apply_assignments(editor: &mut ConfigEditor, assignments: &[(String, String)]) -> Result<()> {
    for (key, value) in assignments {
        let entry = editor
            .session()
            .get(key)
            .ok_or_else(|| ConsoleError::Config(format!("unknown key: {}", key)))?;
        let control = Control::for_entry(entry);
        if control.disabled {
            return Err(ConsoleError::Config(format!("'{}' is read-only", key)));
        }
        let raw = match control.kind {
            ControlKind::Text(_) => RawValue::Text(value.clone()),
            ControlKind::Toggle(_) => match value.as_str() {
                "true" => RawValue::Bool(true),
                "false" => RawValue::Bool(false),
                other => {
                    return Err(ConsoleError::Config(format!(
                        "'{}' expects true or false, got '{}'",
                        key, other
                    )))
                }
            },
            ControlKind::Number(_) => match number_input(&entry.value_type, value) {
                Some(text) => RawValue::Text(text),
                None => {
                    return Err(ConsoleError::Config(format!(
                        "'{}' expects {}, got '{}'",
                        key, entry.value_type, value
                    )))
                }
            },
            ControlKind::Unsupported(name) => {
                return Err(ConsoleError::Config(format!(
                    "'{}' has unsupported type: {}",
                    key, name
                )))
            }
        };
        editor.record_edit(key, raw);
    }
    Ok(())
}

/// 审计记录的纯文本形式
pub fn format_audit(record: &AuditRecord) -> String {
    let ts = record
        .ts
        .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string());
    let mut out = format!("{}  {}  {}\n", ts, record.actor, record.action);
    match AuditView::from_record(record) {
        AuditView::Invalid => out.push_str("    Invalid payload\n"),
        AuditView::ConfigUpdated {
            environment,
            project,
            release,
            items,
        } => {
            out.push_str(&format!(
                "    env: {}  project: {}  release: {}\n",
                environment, project, release
            ));
            for item in items {
                let marker = if item.changed() { "*" } else { " " };
                out.push_str(&format!(
                    "  {} {}: {} -> {}\n",
                    marker, item.key, item.old_value, item.new_value
                ));
            }
        }
        AuditView::Fields(fields) => {
            for (name, value) in fields {
                out.push_str(&format!("    {}: {}\n", name, value.replace('\n', "\n      ")));
            }
        }
    }
    out
}

/// 审计查询：默认窗口为昨天到今天，--from / --to 只覆盖给出的一端
pub fn audit_query(
    now: DateTime<FixedOffset>,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<AuditQuery> {
    let mut query = AuditQuery::new(now);
    if from.is_some() || to.is_some() {
        let (default_from, default_to) = query.dates();
        query.set_dates(from.unwrap_or(default_from), to.unwrap_or(default_to))?;
    }
    Ok(query)
}

/// 无界面命令统一入口；401 时清除令牌。登录失败的 401 只说明密码错误，保留已有令牌。
pub async fn run_headless(command: Command, settings: &Settings) -> Result<()> {
    let mut token = TokenStore::load(&settings.token_path)?;
    let client = ApiClient::new(&settings.base_url, settings.request_timeout())?
        .with_token(token.token().map(str::to_string));

    let is_login = matches!(command, Command::Login { .. });
    let result = execute(command, &client, &mut token, settings).await;
    if let Err(e) = &result {
        if !is_login {
            invalidate_on_unauthorized(e, &mut token)?;
        }
    }
    result
}

async fn execute(
    command: Command,
    client: &ApiClient,
    token: &mut TokenStore,
    settings: &Settings,
) -> Result<()> {
    match command {
        Command::Login { username, password } => {
            let jwt = client.login(&username, &password).await?;
            let state = TokenState::from_jwt(&jwt);
            let name = state.username.clone();
            token.save(state)?;
            println!("Logged in as {}", if name.is_empty() { username } else { name });
            Ok(())
        }
        Command::Logout => {
            token.clear()?;
            println!("Logged out");
            Ok(())
        }
        Command::Set {
            project,
            env,
            release,
            assignments,
        } => {
            let env = env.unwrap_or_else(|| settings.default_environment.clone());
            let mut editor = ConfigEditor::new(&project, Some(&env), &release);
            set_values(client, &mut editor, &assignments).await
        }
        Command::Projects { q, limit, offset } => {
            let list = client.list_projects(&q, limit, offset).await?;
            for project in &list.projects {
                if project.description.is_empty() {
                    println!("{}", project.name);
                } else {
                    println!("{}  - {}", project.name, project.description);
                }
            }
            println!("{} of {} project(s)", list.projects.len(), list.total);
            Ok(())
        }
        Command::Audits {
            action,
            actor,
            q,
            limit,
            from,
            to,
        } => {
            let mut query = audit_query(Local::now().fixed_offset(), from, to)?;
            query.action = action.unwrap_or_default();
            query.actor = actor.unwrap_or_default();
            query.q = q.unwrap_or_default();
            query.limit = limit.or(settings.audit_limit);
            let records = client.list_audits(&query).await?;
            for record in &records {
                println!("{}", format_audit(record));
            }
            println!("{} record(s)", records.len());
            Ok(())
        }
        Command::Tui { .. } => Err(ConsoleError::Config(
            "tui is not a headless command".to_string(),
        )),
    }
}

/// 拉取、记录编辑、只提交差异
async fn set_values(
    client: &ApiClient,
    editor: &mut ConfigEditor,
    assignments: &[(String, String)],
) -> Result<()> {
    let ticket = editor.begin_fetch();
    let configs = client.list_configs(&ticket.target).await;
    if let FetchOutcome::Failed(e) = editor.complete_fetch(&ticket, configs) {
        return Err(e);
    }

    apply_assignments(editor, assignments)?;

    let Some(ticket) = editor.begin_save() else {
        println!("Nothing to save, all values unchanged");
        return Ok(());
    };
    for (key, m) in editor.session().modifications() {
        println!("  {}: {} -> {}", key, m.old_value, m.new_value);
    }
    let result = client
        .set_config_values(&ticket.target, &ticket.changes)
        .await;
    match editor.complete_save(&ticket, result) {
        SaveOutcome::Saved { count, .. } => {
            println!(
                "Saved {} change(s) to {}/{}/{}",
                count, ticket.target.project, ticket.target.environment, ticket.target.release
            );
            Ok(())
        }
        SaveOutcome::Failed(e) => Err(e),
        SaveOutcome::Stale => Ok(()),
    }
}
