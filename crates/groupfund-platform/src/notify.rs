use std::sync::Arc;

use async_trait::async_trait;
use groupfund_core::{FundError, FundResult, NotificationGateway};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::{MetaConfig, NotifierBackend, NotifierConfig, ZaloConfig};

const ZALO_MESSAGE_URL: &str = "https://openapi.zalo.me/v2.0/oa/message";
const ZALO_TOKEN_URL: &str = "https://oauth.zaloapp.com/v4/oa/access_token";
const META_MESSAGES_URL: &str = "https://graph.facebook.com/v18.0/me/messages";

pub fn build_notifier(config: &NotifierConfig) -> Arc<dyn NotificationGateway> {
    match config.backend {
        NotifierBackend::Zalo => Arc::new(ZaloNotifier::new(config.zalo.clone())),
        NotifierBackend::Meta => Arc::new(MetaNotifier::new(config.meta.clone())),
        NotifierBackend::None => Arc::new(DisabledNotifier),
    }
}

/// Used when no messaging backend is configured.
pub struct DisabledNotifier;

#[async_trait]
impl NotificationGateway for DisabledNotifier {
    fn is_configured(&self) -> bool {
        false
    }

    async fn send(&self, handle: &str, _text: &str) -> FundResult<()> {
        Err(FundError::upstream(format!(
            "no notification backend configured for {handle}"
        )))
    }
}

#[derive(Debug, Deserialize)]
struct ZaloReply {
    #[serde(default)]
    error: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ZaloToken {
    access_token: String,
}

/// Zalo Official Account messages. Falls back to the client-credentials
/// grant when no static access token is configured.
pub struct ZaloNotifier {
    config: ZaloConfig,
    http: reqwest::Client,
    fetched_token: RwLock<Option<String>>,
}

impl ZaloNotifier {
    pub fn new(config: ZaloConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            fetched_token: RwLock::new(None),
        }
    }

    async fn access_token(&self) -> FundResult<String> {
        if !self.config.access_token.is_empty() {
            return Ok(self.config.access_token.clone());
        }
        if let Some(token) = self.fetched_token.read().await.clone() {
            return Ok(token);
        }

        let response = self
            .http
            .post(ZALO_TOKEN_URL)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.config.app_id.as_str()),
                ("client_secret", self.config.app_secret.as_str()),
            ])
            .send()
            .await
            .map_err(FundError::upstream)?;
        if !response.status().is_success() {
            return Err(FundError::upstream(format!(
                "zalo token request failed with {}",
                response.status()
            )));
        }

        let token: ZaloToken = response.json().await.map_err(FundError::upstream)?;
        info!("fetched zalo access token");
        *self.fetched_token.write().await = Some(token.access_token.clone());
        Ok(token.access_token)
    }
}

#[async_trait]
impl NotificationGateway for ZaloNotifier {
    fn is_configured(&self) -> bool {
        !self.config.access_token.is_empty()
            || (!self.config.app_id.is_empty() && !self.config.app_secret.is_empty())
    }

    async fn send(&self, handle: &str, text: &str) -> FundResult<()> {
        let token = self.access_token().await?;
        let response = self
            .http
            .post(ZALO_MESSAGE_URL)
            .header("access_token", token)
            .json(&json!({
                "recipient": { "user_id": handle },
                "message": { "text": text },
            }))
            .send()
            .await
            .map_err(FundError::upstream)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FundError::upstream(format!("zalo returned {status}: {body}")));
        }

        let reply: ZaloReply = response.json().await.map_err(FundError::upstream)?;
        if reply.error != 0 {
            if reply.error == -216 {
                // Expired; the next send fetches a fresh one.
                *self.fetched_token.write().await = None;
            }
            warn!("zalo rejected message to {handle}: {} {}", reply.error, reply.message);
            return Err(FundError::upstream(format!(
                "zalo error {}: {}",
                reply.error, reply.message
            )));
        }
        Ok(())
    }
}

/// Facebook Messenger page messages.
pub struct MetaNotifier {
    config: MetaConfig,
    http: reqwest::Client,
}

impl MetaNotifier {
    pub fn new(config: MetaConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl NotificationGateway for MetaNotifier {
    fn is_configured(&self) -> bool {
        !self.config.page_access_token.is_empty()
    }

    async fn send(&self, handle: &str, text: &str) -> FundResult<()> {
        let response = self
            .http
            .post(META_MESSAGES_URL)
            .query(&[("access_token", self.config.page_access_token.as_str())])
            .json(&json!({
                "recipient": { "id": handle },
                "message": { "text": text },
            }))
            .send()
            .await
            .map_err(FundError::upstream)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FundError::upstream(format!("meta returned {status}: {body}")));
        }
        Ok(())
    }
}

/// Answers the Messenger subscription handshake.
pub fn verify_meta_subscription<'a>(
    config: &MetaConfig,
    mode: &str,
    token: &str,
    challenge: &'a str,
) -> Option<&'a str> {
    let matches = !config.verify_token.is_empty() && token == config.verify_token;
    (mode == "subscribe" && matches).then_some(challenge)
}
