pub mod client;

pub use client::ApiClient;

use crate::error::{ConsoleError, Result};
use crate::storage::TokenStore;

/// 服务端返回 401 时清除本地令牌。返回是否执行了清除。
pub fn invalidate_on_unauthorized(err: &ConsoleError, store: &mut TokenStore) -> Result<bool> {
    if !matches!(err, ConsoleError::Unauthorized(_)) {
        return Ok(false);
    }
    if store.token().is_some() {
        tracing::info!("session token rejected, clearing {:?}", store.path());
    }
    store.clear()?;
    Ok(true)
}
