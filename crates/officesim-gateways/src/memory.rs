use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::chat::{ChatGateway, OutgoingDm, OutgoingRoomMessage};
use crate::email::{EmailGateway, OutgoingEmail, SentEmail};
use crate::error::{GatewayError, Result};

/// A delivered email as the in-memory backend stores it.
#[derive(Debug, Clone)]
pub struct StoredEmail {
    pub id: String,
    pub sender: String,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
    pub body: String,
    pub thread_id: Option<String>,
    pub sent_at_iso: Option<String>,
}

/// Email backend substitute for offline runs and tests.
#[derive(Default)]
pub struct InMemoryEmailGateway {
    next_id: AtomicU64,
    emails: Mutex<Vec<StoredEmail>>,
    mailboxes: Mutex<Vec<String>>,
}

impl InMemoryEmailGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emails(&self) -> Vec<StoredEmail> {
        self.emails.lock().unwrap().clone()
    }

    pub fn mailboxes(&self) -> Vec<String> {
        self.mailboxes.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmailGateway for InMemoryEmailGateway {
    async fn ensure_mailbox(&self, address: &str, _display_name: Option<&str>) -> Result<()> {
        let mut boxes = self.mailboxes.lock().unwrap();
        if !boxes.iter().any(|a| a == address) {
            boxes.push(address.to_string());
        }
        Ok(())
    }

    async fn send_email(&self, email: OutgoingEmail) -> Result<SentEmail> {
        if email.to.iter().all(|a| a.trim().is_empty())
            && email.cc.iter().all(|a| a.trim().is_empty())
            && email.bcc.iter().all(|a| a.trim().is_empty())
        {
            return Err(GatewayError::EmptyRecipients);
        }
        let id = format!("email-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let stored = StoredEmail {
            id: id.clone(),
            sender: email.sender,
            to: email.to,
            cc: email.cc,
            bcc: email.bcc,
            subject: email.subject,
            body: email.body,
            thread_id: email.thread_id.clone(),
            sent_at_iso: email.sent_at_iso,
        };
        self.emails.lock().unwrap().push(stored);
        Ok(SentEmail {
            id,
            thread_id: email.thread_id,
        })
    }

    async fn purge_after(&self, cutoff_iso: &str) -> Result<()> {
        // RFC 3339 strings compare chronologically.
        self.emails
            .lock()
            .unwrap()
            .retain(|e| e.sent_at_iso.as_deref().map(|t| t <= cutoff_iso).unwrap_or(true));
        Ok(())
    }

    async fn purge_all(&self) -> Result<()> {
        self.emails.lock().unwrap().clear();
        self.mailboxes.lock().unwrap().clear();
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct StoredDm {
    pub sender: String,
    pub recipient: String,
    pub body: String,
    pub sent_at_iso: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StoredRoomMessage {
    pub room_slug: String,
    pub sender: String,
    pub body: String,
    pub sent_at_iso: Option<String>,
}

/// Chat backend substitute for offline runs and tests.
#[derive(Default)]
pub struct InMemoryChatGateway {
    users: Mutex<Vec<String>>,
    rooms: Mutex<HashMap<String, Vec<String>>>,
    dms: Mutex<Vec<StoredDm>>,
    room_messages: Mutex<Vec<StoredRoomMessage>>,
}

impl InMemoryChatGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dms(&self) -> Vec<StoredDm> {
        self.dms.lock().unwrap().clone()
    }

    pub fn room_messages(&self) -> Vec<StoredRoomMessage> {
        self.room_messages.lock().unwrap().clone()
    }

    pub fn rooms(&self) -> Vec<String> {
        self.rooms.lock().unwrap().keys().cloned().collect()
    }

    pub fn room_participants(&self, slug: &str) -> Option<Vec<String>> {
        self.rooms.lock().unwrap().get(slug).cloned()
    }
}

#[async_trait]
impl ChatGateway for InMemoryChatGateway {
    async fn ensure_user(&self, handle: &str, _display_name: Option<&str>) -> Result<()> {
        let mut users = self.users.lock().unwrap();
        if !users.iter().any(|u| u == handle) {
            users.push(handle.to_string());
        }
        Ok(())
    }

    async fn send_dm(&self, dm: OutgoingDm) -> Result<()> {
        self.dms.lock().unwrap().push(StoredDm {
            sender: dm.sender,
            recipient: dm.recipient,
            body: dm.body,
            sent_at_iso: dm.sent_at_iso,
        });
        Ok(())
    }

    async fn create_room(
        &self,
        name: &str,
        participants: &[String],
        slug: Option<&str>,
    ) -> Result<()> {
        let slug = slug.unwrap_or(name).to_string();
        self.rooms
            .lock()
            .unwrap()
            .insert(slug, participants.to_vec());
        Ok(())
    }

    async fn send_room_message(&self, room_slug: &str, message: OutgoingRoomMessage) -> Result<()> {
        self.room_messages.lock().unwrap().push(StoredRoomMessage {
            room_slug: room_slug.to_string(),
            sender: message.sender,
            body: message.body,
            sent_at_iso: message.sent_at_iso,
        });
        Ok(())
    }

    async fn purge_after(&self, cutoff_iso: &str) -> Result<()> {
        let keep = |t: &Option<String>| t.as_deref().map(|t| t <= cutoff_iso).unwrap_or(true);
        self.dms.lock().unwrap().retain(|m| keep(&m.sent_at_iso));
        self.room_messages
            .lock()
            .unwrap()
            .retain(|m| keep(&m.sent_at_iso));
        Ok(())
    }

    async fn purge_all(&self) -> Result<()> {
        self.users.lock().unwrap().clear();
        self.rooms.lock().unwrap().clear();
        self.dms.lock().unwrap().clear();
        self.room_messages.lock().unwrap().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn email_ids_are_sequential_and_purgeable() {
        let gw = InMemoryEmailGateway::new();
        let first = gw
            .send_email(OutgoingEmail {
                sender: "a@co".into(),
                to: vec!["b@co".into()],
                subject: "s".into(),
                body: "b".into(),
                sent_at_iso: Some("2026-01-01T09:00:00+00:00".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(first.id, "email-1");
        gw.send_email(OutgoingEmail {
            sender: "a@co".into(),
            to: vec!["b@co".into()],
            subject: "s2".into(),
            body: "b".into(),
            sent_at_iso: Some("2026-01-01T11:00:00+00:00".into()),
            ..Default::default()
        })
        .await
        .unwrap();

        gw.purge_after("2026-01-01T10:00:00+00:00").await.unwrap();
        let left = gw.emails();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].subject, "s");
    }

    #[tokio::test]
    async fn empty_recipient_union_is_rejected() {
        let gw = InMemoryEmailGateway::new();
        let err = gw
            .send_email(OutgoingEmail {
                sender: "a@co".into(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::EmptyRecipients));
    }

    #[tokio::test]
    async fn rooms_track_participants() {
        let gw = InMemoryChatGateway::new();
        gw.create_room("Alpha Team", &["a".into(), "b".into()], Some("project-1-alpha"))
            .await
            .unwrap();
        assert_eq!(
            gw.room_participants("project-1-alpha").unwrap(),
            vec!["a".to_string(), "b".to_string()]
        );
    }
}
