#[derive(Debug, thiserror::Error)]
pub enum ConsoleError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("not logged in, run `rtc-console login` first")]
    NotLoggedIn,

    #[error("request failed with status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConsoleError {
    /// HTTP 状态码（仅 Status / Unauthorized 有）
    pub fn status(&self) -> Option<u16> {
        match self {
            ConsoleError::Status { status, .. } => Some(*status),
            ConsoleError::Unauthorized(_) => Some(401),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ConsoleError::Unauthorized(_) | ConsoleError::NotLoggedIn)
    }
}

pub type Result<T> = std::result::Result<T, ConsoleError>;
