pub mod api;
pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod models;
pub mod storage;
pub mod tui;

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::api::ApiClient;
use crate::cli::{Cli, Command};
use crate::config::Settings;
use crate::core::{AuditLog, AuditQuery, ConfigEditor, Debouncer};
use crate::error::ConsoleError;
use crate::storage::TokenStore;

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// 界面模式下日志写文件，避免破坏终端
fn init_file_logging(path: &Path) -> std::io::Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn init_stderr_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .init();
}

fn run_tui(settings: &Settings, project: &str, release: &str, env: Option<&str>) -> crate::error::Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    let token = TokenStore::load(&settings.token_path)?;
    let client = ApiClient::new(&settings.base_url, settings.request_timeout())?;

    let env = env.unwrap_or(&settings.default_environment);
    let editor = ConfigEditor::new(project, Some(env), release);
    let mut query = AuditQuery::new(chrono::Local::now().fixed_offset());
    query.limit = settings.audit_limit;
    let audit_log = AuditLog::new(query, Debouncer::new(settings.search_debounce()));

    tracing::info!(project, release, env, base_url = %settings.base_url, "starting console");
    let mut app = tui::App::new(editor, audit_log, token);
    tui::run(&mut app, client, &runtime)?;
    Ok(())
}

/// 配置文件损坏时的警告要等日志初始化之后才能记录
fn report_invalid_settings(path: &Path, invalid: Option<&ConsoleError>) {
    if let Some(e) = invalid {
        tracing::warn!("invalid config file {:?}, using defaults: {}", path, e);
    }
}

fn main() {
    let cli = Cli::parse();

    let (settings, invalid) = match cli.settings() {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Failed to load settings: {}", e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Command::Tui {
            project,
            release,
            env,
        } => {
            if let Err(e) = init_file_logging(&settings.log_file) {
                eprintln!("Failed to open log file {:?}: {}", settings.log_file, e);
                std::process::exit(1);
            }
            report_invalid_settings(&cli.config, invalid.as_ref());
            run_tui(&settings, &project, &release, env.as_deref())
        }
        command => {
            init_stderr_logging();
            report_invalid_settings(&cli.config, invalid.as_ref());
            tokio::runtime::Runtime::new()
                .map_err(ConsoleError::from)
                .and_then(|runtime| runtime.block_on(cli::run_headless(command, &settings)))
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
