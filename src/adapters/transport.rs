//! HTTP messaging transport.
//!
//! Sends outbound messages through a graph-API-style JSON endpoint. Access
//! tokens are short-lived and fetched from the platform's auth endpoint
//! through the injected [`TokenCache`].

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::domain::OutboundMessage;

use super::{MessagingTransport, ProviderError, TokenCache};

/// Messaging platform client
pub struct HttpTransport {
    base_url: String,
    /// Sender identity on the platform (e.g. a business phone-number id)
    sender_id: String,
    /// Long-lived credential exchanged for short-lived access tokens
    client_secret: String,
    tokens: Arc<TokenCache>,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    ok: bool,
    description: Option<String>,
}

impl HttpTransport {
    pub fn new(
        base_url: impl Into<String>,
        sender_id: impl Into<String>,
        client_secret: impl Into<String>,
        tokens: Arc<TokenCache>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            sender_id: sender_id.into(),
            client_secret: client_secret.into(),
            tokens,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            self.sender_id,
            method
        )
    }

    /// Fetch an access token, going through the cache first
    async fn access_token(&self) -> Result<String, ProviderError> {
        if let Some(token) = self.tokens.get(&self.sender_id) {
            return Ok(token);
        }

        let response = self
            .client
            .post(self.api_url("auth"))
            .json(&json!({ "client_secret": self.client_secret }))
            .send()
            .await
            .map_err(ProviderError::from_http)?;

        if !response.status().is_success() {
            return Err(ProviderError::Unavailable(format!(
                "auth endpoint returned {}",
                response.status()
            )));
        }

        let auth: AuthResponse = response.json().await.map_err(ProviderError::from_http)?;
        self.tokens.put(&self.sender_id, &auth.access_token);

        Ok(auth.access_token)
    }

    fn message_body(channel_id: &str, message: &OutboundMessage) -> serde_json::Value {
        match message {
            OutboundMessage::Text { text } => json!({
                "to": channel_id,
                "type": "text",
                "text": { "body": text },
            }),
            OutboundMessage::Menu { text, options } => json!({
                "to": channel_id,
                "type": "interactive",
                "interactive": {
                    "body": { "text": text },
                    "action": {
                        "sections": options.iter().map(|o| json!({
                            "id": o.key,
                            "title": o.label,
                        })).collect::<Vec<_>>(),
                    },
                },
            }),
            OutboundMessage::Link { text, url } => json!({
                "to": channel_id,
                "type": "text",
                "text": { "body": format!("{}\n{}", text, url), "preview_url": true },
            }),
        }
    }
}

#[async_trait]
impl MessagingTransport for HttpTransport {
    fn name(&self) -> &str {
        "transport"
    }

    async fn send(
        &self,
        channel_id: &str,
        messages: &[OutboundMessage],
    ) -> Result<(), ProviderError> {
        let token = self.access_token().await?;
        let url = self.api_url("messages");

        // Messages are ordered; send sequentially so the platform
        // delivers them in order.
        for message in messages {
            let response = self
                .client
                .post(&url)
                .bearer_auth(&token)
                .json(&Self::message_body(channel_id, message))
                .send()
                .await
                .map_err(ProviderError::from_http)?;

            if response.status().as_u16() == 401 {
                self.tokens.invalidate(&self.sender_id);
                return Err(ProviderError::Unavailable("access token expired".into()));
            }
            if response.status().is_server_error() {
                return Err(ProviderError::Unavailable(format!(
                    "messages endpoint returned {}",
                    response.status()
                )));
            }

            let body: SendResponse = response.json().await.map_err(ProviderError::from_http)?;
            if !body.ok {
                return Err(ProviderError::Rejected(
                    body.description.unwrap_or_default(),
                ));
            }
        }

        Ok(())
    }
}
