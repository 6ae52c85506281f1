//! Boundary to the local chat-history store.
//!
//! The client only needs the operations on [`ChatStore`]; how messages are
//! laid out on disk is up to the implementation. [`MemoryStore`] keeps
//! everything in process and is what the binary and the tests use.

use std::collections::HashMap;

use anyhow::{Result, bail};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::event::{ChatKind, Event};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    pub message_id: String,
    pub from_user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    pub content: String,
    /// Milliseconds since the epoch.
    pub timestamp: i64,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default)]
    pub recalled: bool,
}

/// A message the server delivered while this user was offline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineMessage {
    #[serde(rename = "type")]
    pub kind: ChatKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    pub from_user_id: String,
    #[serde(default)]
    pub from_username: String,
    pub content: String,
    #[serde(default)]
    pub message_id: String,
    #[serde(default)]
    pub timestamp: i64,
}

impl OfflineMessage {
    pub fn into_event(self) -> Event {
        let timestamp = self.timestamp.to_string();
        match self.kind {
            ChatKind::Private => Event::PrivateMessageReceived {
                from_user_id: self.from_user_id,
                from_username: self.from_username,
                content: self.content,
                message_id: self.message_id,
                timestamp,
            },
            ChatKind::Group => Event::GroupMessageReceived {
                group_id: self.group_id.unwrap_or_default(),
                from_user_id: self.from_user_id,
                from_username: self.from_username,
                content: self.content,
                message_id: self.message_id,
                timestamp,
            },
        }
    }
}

pub trait ChatStore: Send + 'static {
    /// Selects the user whose history subsequent calls read and write.
    fn initialize(&mut self, user_id: &str) -> Result<()>;

    fn save_private_message(
        &mut self,
        from_user_id: &str,
        to_user_id: &str,
        content: &str,
        message_id: Option<&str>,
        timestamp: Option<i64>,
    ) -> Result<()>;

    fn save_group_message(
        &mut self,
        group_id: &str,
        from_user_id: &str,
        content: &str,
        message_id: Option<&str>,
        timestamp: Option<i64>,
    ) -> Result<()>;

    /// Up to `count` messages ending `offset` messages before the newest,
    /// oldest first.
    fn get_messages(
        &self,
        kind: ChatKind,
        target_id: &str,
        count: usize,
        offset: usize,
    ) -> Result<Vec<StoredMessage>>;

    fn clear_history(&mut self, kind: ChatKind, target_id: &str) -> Result<()>;

    fn offline_messages(&self) -> Result<Vec<OfflineMessage>>;

    fn clear_offline_messages(&mut self) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    current_user: Option<String>,
    conversations: HashMap<(ChatKind, String), Vec<StoredMessage>>,
    offline: Vec<OfflineMessage>,
    next_local_id: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_offline_messages(mut self, messages: Vec<OfflineMessage>) -> Self {
        self.offline.extend(messages);
        self
    }

    fn current_user(&self) -> Result<&str> {
        match self.current_user.as_deref() {
            Some(user) => Ok(user),
            None => bail!("chat store has no current user"),
        }
    }

    fn append(&mut self, kind: ChatKind, target_id: &str, mut message: StoredMessage) {
        if message.message_id.is_empty() {
            self.next_local_id += 1;
            message.message_id = format!("local-{}-{}", message.timestamp, self.next_local_id);
        }
        self.conversations
            .entry((kind, target_id.to_string()))
            .or_default()
            .push(message);
    }
}

impl ChatStore for MemoryStore {
    fn initialize(&mut self, user_id: &str) -> Result<()> {
        if user_id.is_empty() {
            bail!("cannot initialize chat store without a user id");
        }
        if self.current_user.as_deref() != Some(user_id) {
            self.conversations.clear();
        }
        self.current_user = Some(user_id.to_string());
        Ok(())
    }

    fn save_private_message(
        &mut self,
        from_user_id: &str,
        to_user_id: &str,
        content: &str,
        message_id: Option<&str>,
        timestamp: Option<i64>,
    ) -> Result<()> {
        let current = self.current_user()?;
        let other = if from_user_id == current {
            to_user_id
        } else {
            from_user_id
        }
        .to_string();

        let message = StoredMessage {
            message_id: message_id.unwrap_or_default().to_string(),
            from_user_id: from_user_id.to_string(),
            to_user_id: Some(to_user_id.to_string()),
            group_id: None,
            content: content.to_string(),
            timestamp: timestamp.unwrap_or_else(|| Utc::now().timestamp_millis()),
            is_read: false,
            recalled: false,
        };
        self.append(ChatKind::Private, &other, message);
        Ok(())
    }

    fn save_group_message(
        &mut self,
        group_id: &str,
        from_user_id: &str,
        content: &str,
        message_id: Option<&str>,
        timestamp: Option<i64>,
    ) -> Result<()> {
        self.current_user()?;
        let message = StoredMessage {
            message_id: message_id.unwrap_or_default().to_string(),
            from_user_id: from_user_id.to_string(),
            to_user_id: None,
            group_id: Some(group_id.to_string()),
            content: content.to_string(),
            timestamp: timestamp.unwrap_or_else(|| Utc::now().timestamp_millis()),
            is_read: false,
            recalled: false,
        };
        self.append(ChatKind::Group, group_id, message);
        Ok(())
    }

    fn get_messages(
        &self,
        kind: ChatKind,
        target_id: &str,
        count: usize,
        offset: usize,
    ) -> Result<Vec<StoredMessage>> {
        let Some(messages) = self.conversations.get(&(kind, target_id.to_string())) else {
            return Ok(Vec::new());
        };
        let end = messages.len().saturating_sub(offset);
        let start = end.saturating_sub(count);
        Ok(messages[start..end].to_vec())
    }

    fn clear_history(&mut self, kind: ChatKind, target_id: &str) -> Result<()> {
        self.conversations.remove(&(kind, target_id.to_string()));
        Ok(())
    }

    fn offline_messages(&self) -> Result<Vec<OfflineMessage>> {
        Ok(self.offline.clone())
    }

    fn clear_offline_messages(&mut self) -> Result<()> {
        self.offline.clear();
        Ok(())
    }
}
