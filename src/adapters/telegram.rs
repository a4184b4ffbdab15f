//! Telegram Bot API client
//!
//! Sends, edits and pins channel posts, and receives command updates either by
//! long polling (`getUpdates`) or by webhook registration.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, error, info};

use super::MessagingApi;
use crate::domain::{ChatId, MessageId};
use crate::error::{Result, TwodError};

/// Retry hint used when a 429 carries no `retry_after`
const DEFAULT_RETRY_AFTER_SECS: u64 = 1;

/// Incoming update (only the parts the bot reads)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<IncomingMessage>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IncomingMessage {
    pub message_id: i64,
    #[serde(default)]
    pub from: Option<User>,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_code: Option<i64>,
    #[serde(default)]
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

/// Decode a Bot API envelope, mapping 429s to [`TwodError::RateLimited`]
pub fn decode_response<T: DeserializeOwned>(status: StatusCode, body: &str) -> Result<T> {
    let envelope: ApiResponse<T> = match serde_json::from_str(body) {
        Ok(envelope) => envelope,
        Err(e) => {
            if status == StatusCode::TOO_MANY_REQUESTS {
                return Err(TwodError::RateLimited {
                    retry_after_secs: DEFAULT_RETRY_AFTER_SECS,
                });
            }
            return Err(TwodError::Telegram {
                code: status.as_u16() as i64,
                description: format!("unreadable response ({}): {}", e, truncate(body, 200)),
            });
        }
    };

    if envelope.ok {
        return envelope.result.ok_or_else(|| TwodError::Telegram {
            code: status.as_u16() as i64,
            description: "ok response without result".to_string(),
        });
    }

    let retry_after = envelope.parameters.and_then(|p| p.retry_after);
    let code = envelope.error_code.unwrap_or(status.as_u16() as i64);
    if code == 429 || retry_after.is_some() {
        return Err(TwodError::RateLimited {
            retry_after_secs: retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS),
        });
    }

    Err(TwodError::Telegram {
        code,
        description: envelope
            .description
            .unwrap_or_else(|| "no description".to_string()),
    })
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Telegram Bot API client
#[derive(Clone)]
pub struct TelegramClient {
    client: Client,
    base_url: String,
}

impl TelegramClient {
    pub fn new(api_base_url: &str, bot_token: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: format!("{}/bot{}", api_base_url.trim_end_matches('/'), bot_token),
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: Value) -> Result<T> {
        self.call_with_timeout(method, body, None).await
    }

    async fn call_with_timeout<T: DeserializeOwned>(
        &self,
        method: &str,
        body: Value,
        timeout: Option<Duration>,
    ) -> Result<T> {
        let url = format!("{}/{}", self.base_url, method);
        let mut request = self.client.post(&url).json(&body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        // reqwest errors carry the URL, which embeds the bot token
        let resp = request
            .send()
            .await
            .map_err(|e| TwodError::Http(e.without_url()))?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| TwodError::Http(e.without_url()))?;

        let decoded = decode_response(status, &text);
        match &decoded {
            Ok(_) => debug!(method, "Telegram call succeeded"),
            Err(TwodError::RateLimited { retry_after_secs }) => {
                debug!(method, retry_after_secs, "Telegram call rate limited")
            }
            Err(e) => error!(method, "Telegram call failed: {}", e),
        }
        decoded
    }

    /// Verify the token and return the bot account
    pub async fn get_me(&self) -> Result<User> {
        self.call("getMe", json!({})).await
    }

    /// Long-poll for updates after `offset`
    pub async fn get_updates(&self, offset: Option<i64>, timeout_secs: u64) -> Result<Vec<Update>> {
        let mut body = json!({
            "timeout": timeout_secs,
            "allowed_updates": ["message"],
        });
        if let Some(offset) = offset {
            body["offset"] = json!(offset);
        }
        self.call_with_timeout(
            "getUpdates",
            body,
            Some(Duration::from_secs(timeout_secs + 10)),
        )
        .await
    }

    pub async fn set_webhook(&self, url: &str, secret_token: Option<&str>) -> Result<()> {
        let mut body = json!({
            "url": url,
            "allowed_updates": ["message"],
        });
        if let Some(secret) = secret_token {
            body["secret_token"] = json!(secret);
        }
        let _: bool = self.call("setWebhook", body).await?;
        info!("Telegram webhook registered at {}", url);
        Ok(())
    }

    pub async fn delete_webhook(&self) -> Result<()> {
        let _: bool = self.call("deleteWebhook", json!({})).await?;
        info!("Telegram webhook removed, using long polling");
        Ok(())
    }
}

#[async_trait]
impl MessagingApi for TelegramClient {
    async fn send_message(&self, chat: &ChatId, text: &str) -> Result<MessageId> {
        let sent: SentMessage = self
            .call(
                "sendMessage",
                json!({
                    "chat_id": chat.as_str(),
                    "text": text,
                    "parse_mode": "Markdown",
                    "disable_web_page_preview": true,
                }),
            )
            .await?;
        Ok(MessageId(sent.message_id))
    }

    async fn edit_message_text(&self, chat: &ChatId, message: MessageId, text: &str) -> Result<()> {
        // Result is the edited Message, or `true` for inline messages
        let _: Value = self
            .call(
                "editMessageText",
                json!({
                    "chat_id": chat.as_str(),
                    "message_id": message.0,
                    "text": text,
                    "parse_mode": "Markdown",
                    "disable_web_page_preview": true,
                }),
            )
            .await?;
        Ok(())
    }

    async fn pin_message(&self, chat: &ChatId, message: MessageId) -> Result<()> {
        let _: bool = self
            .call(
                "pinChatMessage",
                json!({
                    "chat_id": chat.as_str(),
                    "message_id": message.0,
                    "disable_notification": true,
                }),
            )
            .await?;
        Ok(())
    }

    async fn unpin_message(&self, chat: &ChatId, message: MessageId) -> Result<()> {
        let _: bool = self
            .call(
                "unpinChatMessage",
                json!({
                    "chat_id": chat.as_str(),
                    "message_id": message.0,
                }),
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_sent_message() {
        let body = r#"{"ok":true,"result":{"message_id":4711,"chat":{"id":-100}}}"#;
        let sent: SentMessage = decode_response(StatusCode::OK, body).unwrap();
        assert_eq!(sent.message_id, 4711);
    }

    #[test]
    fn test_decode_rate_limit_with_retry_after() {
        let body = r#"{"ok":false,"error_code":429,"description":"Too Many Requests: retry after 14","parameters":{"retry_after":14}}"#;
        let err = decode_response::<bool>(StatusCode::TOO_MANY_REQUESTS, body).unwrap_err();
        assert_eq!(err.retry_after(), Some(14));
    }

    #[test]
    fn test_decode_rate_limit_without_body() {
        let err = decode_response::<bool>(StatusCode::TOO_MANY_REQUESTS, "<html>").unwrap_err();
        assert_eq!(err.retry_after(), Some(DEFAULT_RETRY_AFTER_SECS));
    }

    #[test]
    fn test_decode_api_error() {
        let body = r#"{"ok":false,"error_code":400,"description":"Bad Request: chat not found"}"#;
        match decode_response::<bool>(StatusCode::BAD_REQUEST, body).unwrap_err() {
            TwodError::Telegram { code, description } => {
                assert_eq!(code, 400);
                assert!(description.contains("chat not found"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_parse_command_update() {
        let body = r#"{"update_id":900,"message":{"message_id":3,"from":{"id":42,"is_bot":false,"first_name":"Ko"},"chat":{"id":42,"type":"private"},"text":"/status"}}"#;
        let update: Update = serde_json::from_str(body).unwrap();
        let message = update.message.unwrap();
        assert_eq!(message.from.unwrap().id, 42);
        assert_eq!(message.text.as_deref(), Some("/status"));
    }

    #[test]
    fn test_token_is_part_of_base_url() {
        let client =
            TelegramClient::new("https://api.telegram.org/", "123:abc", Duration::from_secs(5))
                .unwrap();
        assert_eq!(client.base_url, "https://api.telegram.org/bot123:abc");
    }
}
