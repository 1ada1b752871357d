pub mod app;

pub use app::{App, Focus, InputMode, MenuPanel, Request, Response};

use std::io;
use std::time::{Duration, Instant};

use crossterm::event::{self, Event, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use tokio::runtime::Runtime;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::api::ApiClient;

/// 按键轮询间隔，同时是去抖和结果回收的 tick
const TICK: Duration = Duration::from_millis(100);

/// 启动 TUI 事件循环。网络请求在 runtime 上并发执行，结果经 channel 回到循环。
pub fn run(app: &mut App, client: ApiClient, runtime: &Runtime) -> io::Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let result = event_loop(app, &client, runtime, &tx, &mut rx, &mut terminal);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

fn event_loop(
    app: &mut App,
    client: &ApiClient,
    runtime: &Runtime,
    tx: &UnboundedSender<Response>,
    rx: &mut UnboundedReceiver<Response>,
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
) -> io::Result<()> {
    app.start();
    while app.is_running() {
        dispatch(app, client, runtime, tx);
        terminal.draw(|frame| app.render(frame))?;

        if event::poll(TICK)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    app.handle_key(key.code);
                }
            }
        }

        while let Ok(response) = rx.try_recv() {
            app.handle_response(response);
        }
        app.tick(Instant::now());
    }
    Ok(())
}

/// 把 App 积压的请求逐个派发为 tokio 任务
fn dispatch(app: &mut App, client: &ApiClient, runtime: &Runtime, tx: &UnboundedSender<Response>) {
    let requests = app.drain_requests();
    if requests.is_empty() {
        return;
    }
    // 登录后 token 会变，每批请求使用当前 token
    let client = client.clone().with_token(app.token().map(str::to_string));
    for request in requests {
        let client = client.clone();
        let tx = tx.clone();
        runtime.spawn(async move {
            let response = execute(&client, request).await;
            // 接收端关闭说明界面已退出
            let _ = tx.send(response);
        });
    }
}

/// 执行单个请求
pub async fn execute(client: &ApiClient, request: Request) -> Response {
    match request {
        Request::Login { username, password } => {
            Response::LoggedIn(client.login(&username, &password).await)
        }
        Request::FetchEnvironments { project } => {
            Response::Environments(client.list_environments(&project).await)
        }
        Request::FetchReleases {
            project,
            environment,
        } => {
            let result = client.list_releases(&project, &environment).await;
            Response::Releases {
                environment,
                result,
            }
        }
        Request::FetchConfigs(ticket) => {
            let result = client.list_configs(&ticket.target).await;
            Response::Configs(ticket, result)
        }
        Request::SaveConfigs(ticket) => {
            let result = client
                .set_config_values(&ticket.target, &ticket.changes)
                .await;
            Response::Saved(ticket, result)
        }
        Request::FetchAudits(ticket) => {
            let result = client.list_audits(&ticket.query).await;
            Response::Audits(ticket, result)
        }
        Request::FetchAuditActions => Response::AuditActions(client.list_audit_actions().await),
    }
}
