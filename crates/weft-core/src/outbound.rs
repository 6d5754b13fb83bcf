//! Outbound-action capability.
//!
//! The [`Outbound`] trait is the only way a handler acts on the platform.
//! The HTTP client that implements it for a real bot lives outside this
//! workspace; the runtime and tests plug in their own implementations.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::error::{ApiError, ApiResult};

/// Platform API access for one bot.
#[async_trait]
pub trait Outbound: Send + Sync {
    /// Calls a raw API method with JSON parameters.
    async fn call_api(&self, method: &str, params: Value) -> ApiResult<Value>;

    /// Sends a text message to a chat.
    async fn send_message(&self, chat_id: i64, text: &str) -> ApiResult<Value> {
        self.call_api("sendMessage", json!({ "chat_id": chat_id, "text": text }))
            .await
    }
}

/// Shared outbound capability.
pub type BoxedOutbound = Arc<dyn Outbound>;

/// An outbound capability with nothing behind it; every call fails with
/// [`ApiError::NotConnected`].
#[derive(Debug, Default, Clone, Copy)]
pub struct DetachedOutbound;

#[async_trait]
impl Outbound for DetachedOutbound {
    async fn call_api(&self, _method: &str, _params: Value) -> ApiResult<Value> {
        Err(ApiError::NotConnected)
    }
}
