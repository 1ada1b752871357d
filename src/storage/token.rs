use std::path::{Path, PathBuf};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// 持久化的登录状态
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenState {
    pub token: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl TokenState {
    /// 从 JWT 构造，用户名和角色取自 claims（不校验签名，仅用于展示）
    pub fn from_jwt(token: &str) -> Self {
        let claims = decode_claims(token).unwrap_or_default();
        Self {
            token: token.to_string(),
            username: claims.username,
            roles: claims.roles,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct Claims {
    #[serde(rename = "Username", default)]
    username: String,
    #[serde(rename = "Roles", default)]
    roles: Vec<String>,
}

fn decode_claims(token: &str) -> Option<Claims> {
    let segment = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(segment.trim_end_matches('=')).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// 会话令牌存储：内存状态 + JSON 文件持久化。显式的读、写、清除。
pub struct TokenStore {
    state: Option<TokenState>,
    file_path: PathBuf,
}

impl TokenStore {
    /// 从 JSON 文件加载。文件不存在视为未登录，文件损坏则记录警告并视为未登录。
    pub fn load(file_path: &Path) -> Result<Self> {
        let state = if file_path.exists() {
            match std::fs::read_to_string(file_path) {
                Ok(content) => match serde_json::from_str::<TokenState>(&content) {
                    Ok(state) => Some(state),
                    Err(e) => {
                        tracing::warn!("token file is corrupted, ignoring it: {}", e);
                        None
                    }
                },
                Err(e) => {
                    tracing::warn!("cannot read token file: {}", e);
                    None
                }
            }
        } else {
            None
        };

        Ok(Self {
            state,
            file_path: file_path.to_path_buf(),
        })
    }

    pub fn state(&self) -> Option<&TokenState> {
        self.state.as_ref()
    }

    pub fn token(&self) -> Option<&str> {
        self.state.as_ref().map(|s| s.token.as_str())
    }

    pub fn username(&self) -> Option<&str> {
        self.state.as_ref().map(|s| s.username.as_str())
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    /// 写入新令牌并落盘
    pub fn save(&mut self, state: TokenState) -> Result<()> {
        let json = serde_json::to_string_pretty(&state)?;

        if let Some(parent) = self.file_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        std::fs::write(&self.file_path, json)?;
        self.state = Some(state);
        Ok(())
    }

    /// 登出或 401 时清除
    pub fn clear(&mut self) -> Result<()> {
        self.state = None;
        if self.file_path.exists() {
            std::fs::remove_file(&self.file_path)?;
        }
        Ok(())
    }
}
