//! Backend gateway records.
//!
//! The backend exposes two JSON endpoints. Both answer with a payload field and
//! an `errorMessage` field; a non-empty `errorMessage` always wins.
//!
//! | Call    | Request                              | Response                  |
//! |---------|--------------------------------------|---------------------------|
//! | command | `{command, args, channel, user}`     | `{result, errorMessage}`  |
//! | link    | `{url, channel, user}`               | `{title, errorMessage}`   |
//!
//! An optional quote service is queried with `GET <endpoint>/rexpl/?q=<topic>`
//! and answers with a single [`Quote`].

use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, GatewayResult};

/// Endpoint descriptor: URL plus pre-shared key sent as `x-api-key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    /// Full URL the request is POSTed to.
    pub url: String,
    /// Pre-shared key.
    pub api_key: String,
}

impl EndpointConfig {
    /// Creates an endpoint descriptor.
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
        }
    }
}

/// Request body for a dot-prefixed chat command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRequest {
    /// Command name without the prefix character.
    pub command: String,
    /// Remaining words joined with single spaces, or empty.
    pub args: String,
    /// Where the reply will be sent.
    pub channel: String,
    /// Full source identity of the sender.
    pub user: String,
}

/// Response body for a command call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResponse {
    /// Text to relay back, empty for no reply.
    #[serde(default)]
    pub result: String,
    /// Failure reported by the backend.
    #[serde(default)]
    pub error_message: String,
}

/// Request body for a link title lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRequest {
    /// The URL exactly as it appeared in the chat line.
    pub url: String,
    /// Where the reply will be sent.
    pub channel: String,
    /// Full source identity of the sender.
    pub user: String,
}

/// Response body for a link title lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkResponse {
    /// Page title, empty for no reply.
    #[serde(default)]
    pub title: String,
    /// Failure reported by the backend.
    #[serde(default)]
    pub error_message: String,
}

/// A stored quote returned by the quote service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    /// When the quote was stored, as the service formats it.
    #[serde(default)]
    pub time_added: String,
    /// Topic the quote is filed under.
    #[serde(default)]
    pub topic: String,
    /// Who added it.
    #[serde(default)]
    pub handle: String,
    /// The quote text.
    #[serde(default)]
    pub content: String,
}

impl Quote {
    /// Chat reply text: `'<topic>': <content>`.
    pub fn reply(&self) -> String {
        format!("'{}': {}", self.topic, self.content)
    }
}

/// A gateway response that resolves to reply text or a backend failure.
pub trait GatewayReply {
    /// Resolves the response. `errorMessage` takes precedence over the payload.
    fn into_result(self) -> GatewayResult<String>;
}

impl GatewayReply for CommandResponse {
    fn into_result(self) -> GatewayResult<String> {
        resolve(self.result, self.error_message)
    }
}

impl GatewayReply for LinkResponse {
    fn into_result(self) -> GatewayResult<String> {
        resolve(self.title, self.error_message)
    }
}

fn resolve(payload: String, error_message: String) -> GatewayResult<String> {
    if error_message.is_empty() {
        Ok(payload)
    } else {
        Err(GatewayError::Backend(error_message))
    }
}
