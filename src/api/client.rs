use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::header::AUTHORIZATION;
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;

use crate::core::{AuditQuery, ReleaseTarget};
use crate::error::{ConsoleError, Result};
use crate::models::{
    AuditList, AuditRecord, ConfigEntry, ConfigList, Envelope, Environment, EnvironmentList,
    ErrorBody, LoginRequest, LoginResponse, ProjectList, Release, ReleaseList,
};

/// 配置中心 REST 客户端。reqwest::Client 内部是 Arc，clone 代价很小，可以直接移入任务。
#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConsoleError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        })
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    /// base_url 之后逐段追加路径，每段单独转义，名称中的 `#`、`?`、`/` 不会截断路径
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| ConsoleError::Config(format!("invalid base url {}: {}", self.base_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| ConsoleError::Config(format!("invalid base url {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn configs_url(&self, target: &ReleaseTarget) -> Result<Url> {
        self.url(&[
            "api",
            "v1",
            "projects",
            target.project.as_str(),
            "envs",
            target.environment.as_str(),
            "releases",
            target.release.as_str(),
            "configs",
        ])
    }

    /// 附加 `Authorization: jwt <token>`，未登录时直接失败不发请求
    fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        let token = self.token.as_deref().ok_or(ConsoleError::NotLoggedIn)?;
        Ok(request.header(AUTHORIZATION, format!("jwt {}", token)))
    }

    /// POST /api/v1/login，返回 token
    pub async fn login(&self, username: &str, password: &str) -> Result<String> {
        let body = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        };
        let request = self.client.post(self.url(&["api", "v1", "login"])?).json(&body);
        let response: LoginResponse = send_json(request).await?;
        tracing::info!(username, "logged in");
        Ok(response.token)
    }

    /// GET /api/v1/projects?q=&limit=&offset=
    pub async fn list_projects(&self, q: &str, limit: u32, offset: u32) -> Result<ProjectList> {
        let request = self.client.get(self.url(&["api", "v1", "projects"])?).query(&[
            ("q", q.to_string()),
            ("limit", limit.to_string()),
            ("offset", offset.to_string()),
        ]);
        send_json(self.authorized(request)?).await
    }

    /// GET /api/v1/projects/{project}/envs
    pub async fn list_environments(&self, project: &str) -> Result<Vec<Environment>> {
        let url = self.url(&["api", "v1", "projects", project, "envs"])?;
        let request = self.authorized(self.client.get(url))?;
        let list: EnvironmentList = send_json(request).await?;
        Ok(list.environments)
    }

    /// GET /api/v1/projects/{project}/envs/{env}/releases
    pub async fn list_releases(&self, project: &str, environment: &str) -> Result<Vec<Release>> {
        let url = self.url(&["api", "v1", "projects", project, "envs", environment, "releases"])?;
        let request = self.authorized(self.client.get(url))?;
        let list: ReleaseList = send_json(request).await?;
        Ok(list.releases)
    }

    /// GET .../releases/{release}/configs
    pub async fn list_configs(&self, target: &ReleaseTarget) -> Result<Vec<ConfigEntry>> {
        let request = self.authorized(self.client.get(self.configs_url(target)?))?;
        let list: ConfigList = send_json(request).await?;
        tracing::debug!(count = list.configs.len(), env = %target.environment, "configs fetched");
        Ok(list.configs)
    }

    /// PUT .../releases/{release}/configs，body 只包含修改过的 key
    pub async fn set_config_values(
        &self,
        target: &ReleaseTarget,
        changes: &BTreeMap<String, String>,
    ) -> Result<()> {
        let request = self
            .authorized(self.client.put(self.configs_url(target)?))?
            .json(changes);
        let response = send(request).await?;
        tracing::debug!(status = response.status().as_u16(), "config values submitted");
        Ok(())
    }

    /// GET /api/v1/audits?action=&actor=&from=&to=&q=&limit=
    pub async fn list_audits(&self, query: &AuditQuery) -> Result<Vec<AuditRecord>> {
        let request = self
            .authorized(self.client.get(self.url(&["api", "v1", "audits"])?))?
            .query(&query.params());
        let list: AuditList = send_json(request).await?;
        Ok(list.audits)
    }

    /// GET /api/v1/audits/actions
    pub async fn list_audit_actions(&self) -> Result<Vec<String>> {
        let request = self.authorized(self.client.get(self.url(&["api", "v1", "audits", "actions"])?))?;
        send_json(request).await
    }
}

/// 发送请求并把非 2xx 映射为错误：401 → Unauthorized，其他 → Status（带服务端 error 文本）
async fn send(request: RequestBuilder) -> Result<Response> {
    let response = request
        .send()
        .await
        .map_err(|e| ConsoleError::Transport(e.to_string()))?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) => body.error,
        Err(_) if text.trim().is_empty() => status.canonical_reason().unwrap_or_default().to_string(),
        Err(_) => text,
    };

    if status == StatusCode::UNAUTHORIZED {
        tracing::warn!("request rejected as unauthorized: {}", message);
        return Err(ConsoleError::Unauthorized(message));
    }
    Err(ConsoleError::Status {
        status: status.as_u16(),
        message,
    })
}

/// 发送请求并解出 `{"data": T}`
async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T> {
    let response = send(request).await?;
    let bytes = response
        .bytes()
        .await
        .map_err(|e| ConsoleError::Transport(e.to_string()))?;
    let envelope: Envelope<T> = serde_json::from_slice(&bytes)
        .map_err(|e| ConsoleError::InvalidResponse(e.to_string()))?;
    Ok(envelope.data)
}
