use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::error::{GatewayError, Result};
use crate::filter::{identity_filter, StyleFilter, StyledAs};

/// An email the simulator wants delivered.
#[derive(Debug, Clone, Default)]
pub struct OutgoingEmail {
    pub sender: String,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
    pub body: String,
    pub thread_id: Option<String>,
    pub sent_at_iso: Option<String>,
    /// Persona whose style filter applies; `None` for simulation-manager
    /// traffic.
    pub persona_id: Option<i64>,
}

impl OutgoingEmail {
    /// Drop empty address strings; the send is refused if nothing remains.
    fn normalized(mut self) -> Result<Self> {
        let clean = |list: &mut Vec<String>| {
            list.retain(|addr| !addr.trim().is_empty());
        };
        clean(&mut self.to);
        clean(&mut self.cc);
        clean(&mut self.bcc);
        if self.to.is_empty() && self.cc.is_empty() && self.bcc.is_empty() {
            return Err(GatewayError::EmptyRecipients);
        }
        Ok(self)
    }
}

/// Backend acknowledgement of a sent email.
#[derive(Debug, Clone, Deserialize)]
pub struct SentEmail {
    pub id: String,
    #[serde(default)]
    pub thread_id: Option<String>,
}

/// Narrow verb set the core uses against the email backend.
#[async_trait]
pub trait EmailGateway: Send + Sync {
    async fn ensure_mailbox(&self, address: &str, display_name: Option<&str>) -> Result<()>;

    /// MUST reject an empty recipient union.
    async fn send_email(&self, email: OutgoingEmail) -> Result<SentEmail>;

    /// Delete stored emails with `sent_at` after the cutoff (rewind).
    async fn purge_after(&self, cutoff_iso: &str) -> Result<()>;

    /// Delete all stored emails and mailboxes (full reset).
    async fn purge_all(&self) -> Result<()>;
}

/// HTTP adapter for the email backend.
pub struct HttpEmailGateway {
    base_url: String,
    client: reqwest::Client,
    filter: StyleFilter,
}

impl HttpEmailGateway {
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

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response> {
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %message, "email backend error");
            return Err(GatewayError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(resp)
    }
}

#[async_trait]
impl EmailGateway for HttpEmailGateway {
    async fn ensure_mailbox(&self, address: &str, display_name: Option<&str>) -> Result<()> {
        let url = format!("{}/mailboxes/{}", self.base_url, address);
        let payload = display_name.map(|name| json!({ "display_name": name }));
        let resp = self.client.put(&url).json(&payload).send().await?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn send_email(&self, email: OutgoingEmail) -> Result<SentEmail> {
        let email = email.normalized()?;
        let body = match email.persona_id {
            Some(pid) => (self.filter)(&email.body, pid, StyledAs::Email),
            None => email.body.clone(),
        };
        let payload = json!({
            "sender": email.sender,
            "to": email.to,
            "cc": email.cc,
            "bcc": email.bcc,
            "subject": email.subject,
            "body": body,
            "thread_id": email.thread_id,
            "sent_at_iso": email.sent_at_iso,
        });
        let url = format!("{}/emails/send", self.base_url);
        let resp = self.client.post(&url).json(&payload).send().await?;
        let resp = Self::check(resp).await?;
        Ok(resp.json().await?)
    }

    async fn purge_after(&self, cutoff_iso: &str) -> Result<()> {
        let url = format!("{}/emails", self.base_url);
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
        let url = format!("{}/emails", self.base_url);
        let resp = self.client.delete(&url).send().await?;
        Self::check(resp).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_rejects_empty_union() {
        let email = OutgoingEmail {
            sender: "a@co".into(),
            to: vec!["".into(), "  ".into()],
            ..Default::default()
        };
        assert!(matches!(
            email.normalized(),
            Err(GatewayError::EmptyRecipients)
        ));
    }

    #[test]
    fn normalization_keeps_cc_only_sends() {
        let email = OutgoingEmail {
            sender: "a@co".into(),
            cc: vec!["b@co".into()],
            ..Default::default()
        };
        let email = email.normalized().unwrap();
        assert_eq!(email.cc, vec!["b@co".to_string()]);
    }
}
