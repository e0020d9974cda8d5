use async_trait::async_trait;
use serde_json::json;
use tracing::warn;

use crate::error::{GatewayError, Result};
use crate::filter::{identity_filter, StyleFilter, StyledAs};

#[derive(Debug, Clone, Default)]
pub struct OutgoingDm {
    pub sender: String,
    pub recipient: String,
    pub body: String,
    pub sent_at_iso: Option<String>,
    pub persona_id: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct OutgoingRoomMessage {
    pub sender: String,
    pub body: String,
    pub sent_at_iso: Option<String>,
    pub persona_id: Option<i64>,
}

/// Narrow verb set the core uses against the chat backend.
#[async_trait]
pub trait ChatGateway: Send + Sync {
    async fn ensure_user(&self, handle: &str, display_name: Option<&str>) -> Result<()>;

    async fn send_dm(&self, dm: OutgoingDm) -> Result<()>;

    async fn create_room(
        &self,
        name: &str,
        participants: &[String],
        slug: Option<&str>,
    ) -> Result<()>;

    async fn send_room_message(&self, room_slug: &str, message: OutgoingRoomMessage) -> Result<()>;

    /// Delete stored messages with `sent_at` after the cutoff (rewind).
    async fn purge_after(&self, cutoff_iso: &str) -> Result<()>;

    /// Delete all stored messages, rooms, and users (full reset).
    async fn purge_all(&self) -> Result<()>;
}

/// HTTP adapter for the chat backend.
pub struct HttpChatGateway {
    base_url: String,
    client: reqwest::Client,
    filter: StyleFilter,
}

impl HttpChatGateway {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_filter(base_url, identity_filter())
    }

    pub fn with_filter(base_url: impl Into<String>, filter: StyleFilter) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .expect("reqwest client"),
            filter,
        }
    }

    fn styled(&self, body: &str, persona_id: Option<i64>) -> String {
        match persona_id {
            Some(pid) => (self.filter)(body, pid, StyledAs::Chat),
            None => body.to_string(),
        }
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response> {
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %message, "chat backend error");
            return Err(GatewayError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(resp)
    }
}

#[async_trait]
impl ChatGateway for HttpChatGateway {
    async fn ensure_user(&self, handle: &str, display_name: Option<&str>) -> Result<()> {
        let url = format!("{}/users/{}", self.base_url, handle);
        let payload = display_name.map(|name| json!({ "display_name": name }));
        let resp = self.client.put(&url).json(&payload).send().await?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn send_dm(&self, dm: OutgoingDm) -> Result<()> {
        let payload = json!({
            "sender": dm.sender,
            "recipient": dm.recipient,
            "body": self.styled(&dm.body, dm.persona_id),
            "sent_at_iso": dm.sent_at_iso,
        });
        let url = format!("{}/dms", self.base_url);
        let resp = self.client.post(&url).json(&payload).send().await?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn create_room(
        &self,
        name: &str,
        participants: &[String],
        slug: Option<&str>,
    ) -> Result<()> {
        let payload = json!({
            "name": name,
            "participants": participants,
            "slug": slug,
        });
        let url = format!("{}/rooms", self.base_url);
        let resp = self.client.post(&url).json(&payload).send().await?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn send_room_message(&self, room_slug: &str, message: OutgoingRoomMessage) -> Result<()> {
        let payload = json!({
            "sender": message.sender,
            "body": self.styled(&message.body, message.persona_id),
            "sent_at_iso": message.sent_at_iso,
        });
        let url = format!("{}/rooms/{}/messages", self.base_url, room_slug);
        let resp = self.client.post(&url).json(&payload).send().await?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn purge_after(&self, cutoff_iso: &str) -> Result<()> {
        let url = format!("{}/messages", self.base_url);
        let resp = self
            .client
            .delete(&url)
            .query(&[("after", cutoff_iso)])
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn purge_all(&self) -> Result<()> {
        let url = format!("{}/messages", self.base_url);
        let resp = self.client.delete(&url).send().await?;
        Self::check(resp).await?;
        Ok(())
    }
}
