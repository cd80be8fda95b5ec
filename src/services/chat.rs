//! In-process chat transcripts

use super::{ChatHandle, ChatRole, ChatSink};
use crate::error::{Error, Result};
use crate::llm::LanguageModel;
use crate::memory::Id;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Title of a chat before its first message is titled
pub const DEFAULT_TITLE: &str = "Новый чат";

const TITLE_FALLBACK_CHARS: usize = 50;

/// One message in a chat
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub role: ChatRole,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// A chat with its messages
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: Id,
    #[serde(skip)]
    pub owner_id: Id,
    pub title: String,
    pub messages: Vec<ChatMessage>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Default)]
struct State {
    next_id: i64,
    chats: HashMap<Id, Chat>,
}

/// Chat transcripts kept in memory
#[derive(Clone)]
pub struct InMemoryChatLog {
    model: Option<Arc<dyn LanguageModel>>,
    timeout: Duration,
    state: Arc<RwLock<State>>,
}

impl InMemoryChatLog {
    /// Chat log titling chats with `model` when present
    pub fn new(model: Option<Arc<dyn LanguageModel>>, timeout: Duration) -> Self {
        Self {
            model,
            timeout,
            state: Arc::new(RwLock::new(State::default())),
        }
    }

    /// A chat of `owner`
    pub async fn get(&self, owner: Id, chat: Id) -> Result<Chat> {
        let state = self.state.read().await;
        state
            .chats
            .get(&chat)
            .filter(|c| c.owner_id == owner)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("chat {}", chat)))
    }

    async fn remote_title(&self, first_message: &str) -> Result<String> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| Error::RemoteUnavailable("no language model configured".to_string()))?;
        let title = tokio::time::timeout(self.timeout, model.generate(&title_prompt(first_message)))
            .await
            .map_err(|_| Error::RemoteUnavailable("title generation timed out".to_string()))??;
        let title = title.trim().trim_matches('"').trim();
        if title.is_empty() {
            return Err(Error::UnparsableResponse("empty title".to_string()));
        }
        Ok(title.to_string())
    }
}

#[async_trait]
impl ChatSink for InMemoryChatLog {
    async fn open(&self, owner: Id, chat: Option<Id>) -> Result<ChatHandle> {
        let mut state = self.state.write().await;
        match chat {
            Some(id) => state
                .chats
                .get(&id)
                .filter(|c| c.owner_id == owner)
                .map(|c| ChatHandle {
                    id,
                    messages: c.messages.len(),
                })
                .ok_or_else(|| Error::NotFound(format!("chat {}", id))),
            None => {
                state.next_id += 1;
                let id = Id(state.next_id);
                state.chats.insert(
                    id,
                    Chat {
                        id,
                        owner_id: owner,
                        title: DEFAULT_TITLE.to_string(),
                        messages: Vec::new(),
                        updated_at: Utc::now(),
                    },
                );
                tracing::debug!(owner = %owner, chat = %id, "Chat created");
                Ok(ChatHandle { id, messages: 0 })
            }
        }
    }

    async fn append(&self, owner: Id, chat: Id, role: ChatRole, text: &str) -> Result<()> {
        let mut state = self.state.write().await;
        let entry = state
            .chats
            .get_mut(&chat)
            .filter(|c| c.owner_id == owner)
            .ok_or_else(|| Error::NotFound(format!("chat {}", chat)))?;
        let now = Utc::now();
        entry.messages.push(ChatMessage {
            role,
            text: text.to_string(),
            created_at: now,
        });
        entry.updated_at = now;
        Ok(())
    }

    async fn suggest_title(&self, first_message: &str) -> String {
        match self.remote_title(first_message).await {
            Ok(title) => title,
            Err(e) => {
                tracing::warn!(error = %e, "Chat title generation failed, using fallback");
                fallback_title(first_message)
            }
        }
    }

    async fn set_title(&self, owner: Id, chat: Id, title: &str) -> Result<()> {
        let mut state = self.state.write().await;
        let entry = state
            .chats
            .get_mut(&chat)
            .filter(|c| c.owner_id == owner)
            .ok_or_else(|| Error::NotFound(format!("chat {}", chat)))?;
        entry.title = title.to_string();
        Ok(())
    }
}

/// First 50 characters of the message, or the default title when blank
pub fn fallback_title(first_message: &str) -> String {
    let prefix: String = first_message.chars().take(TITLE_FALLBACK_CHARS).collect();
    let prefix = prefix.trim();
    if prefix.is_empty() {
        DEFAULT_TITLE.to_string()
    } else {
        prefix.to_string()
    }
}

fn title_prompt(first_message: &str) -> String {
    format!(
        "Создай краткое название для чата на основе первого сообщения пользователя. \
         Название должно быть коротким (до 5-7 слов) и отражать суть запроса.\n\n\
         Первое сообщение: \"{first_message}\"\n\n\
         Ответь ТОЛЬКО названием без дополнительных слов, объяснений или форматирования.\n\n\
         Примеры:\n\
         - \"Что посмотреть на выходных?\" → \"Рекомендации фильмов\"\n\
         - \"Напомни покормить кота завтра\" → \"Покормить кота\"\n\
         - \"Я люблю ужастики\" → \"Предпочтения в кино\""
    )
}
