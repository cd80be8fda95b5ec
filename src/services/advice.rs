//! Advice grounded in the user's own memories

use super::{Advice, AdviceService};
use crate::error::{Error, Result};
use crate::llm::LanguageModel;
use crate::memory::{types::prefix_chars, Id, MemoryStore, MemoryView};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Memories handed to the model per request
pub const CONTEXT_LIMIT: usize = 5;

/// Characters of memory content quoted per context line
const CONTEXT_CHARS: usize = 160;

/// Answer returned when no model is available or the model fails
pub const FALLBACK_ANSWER: &str = "Извините, не могу дать совет в данный момент. Попробуйте позже.";

/// Advice service recalling memories and asking the language model
#[derive(Clone)]
pub struct MemoryAdvisor {
    store: MemoryStore,
    model: Option<Arc<dyn LanguageModel>>,
    timeout: Duration,
}

impl MemoryAdvisor {
    pub fn new(store: MemoryStore, model: Option<Arc<dyn LanguageModel>>, timeout: Duration) -> Self {
        Self { store, model, timeout }
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| Error::RemoteUnavailable("no language model configured".to_string()))?;
        let answer = tokio::time::timeout(self.timeout, model.generate(prompt))
            .await
            .map_err(|_| Error::RemoteUnavailable("advice timed out".to_string()))??;
        let answer = answer.trim();
        if answer.is_empty() {
            return Err(Error::UnparsableResponse("empty advice".to_string()));
        }
        Ok(answer.to_string())
    }
}

#[async_trait]
impl AdviceService for MemoryAdvisor {
    async fn answer(&self, owner: Id, query: &str) -> Result<Advice> {
        let context = match self.store.recall(owner, query, CONTEXT_LIMIT).await {
            Ok(memories) => memories,
            Err(e @ Error::Decryption(_)) => return Err(e),
            Err(e) => {
                tracing::warn!(owner = %owner, error = %e, "Recall failed, advising without context");
                Vec::new()
            }
        };
        tracing::debug!(owner = %owner, context = context.len(), "Advice context recalled");

        let used_context = context.iter().map(context_line).collect();
        let prompt = build_prompt(query, &context);

        let answer = match self.generate(&prompt).await {
            Ok(answer) => answer,
            Err(e) => {
                tracing::warn!(owner = %owner, error = %e, "Advice generation failed");
                FALLBACK_ANSWER.to_string()
            }
        };

        Ok(Advice {
            answer,
            used_context,
            query: query.to_string(),
        })
    }
}

fn context_line(memory: &MemoryView) -> String {
    let folder = if memory.folder.is_empty() {
        String::new()
    } else {
        format!("[{}] ", memory.folder)
    };
    format!(
        "{}{}: {}",
        folder,
        memory.title,
        prefix_chars(&memory.content, CONTEXT_CHARS)
    )
}

/// Advice prompt with numbered memory lines
pub fn build_prompt(query: &str, context: &[MemoryView]) -> String {
    let mut listing = String::new();
    if !context.is_empty() {
        listing.push_str("\n\nРелевантные воспоминания пользователя:\n");
        for (i, memory) in context.iter().enumerate() {
            let folder = if memory.folder.is_empty() {
                "Общее"
            } else {
                memory.folder.as_str()
            };
            listing.push_str(&format!(
                "{}. [{}] {}: {}\n",
                i + 1,
                folder,
                memory.title,
                prefix_chars(&memory.content, CONTEXT_CHARS)
            ));
        }
    }

    format!(
        "Ты персональный AI-помощник. Пользователь просит совета или рекомендации.\n\n\
         Запрос пользователя: \"{query}\"\n{listing}\n\
         Если выше есть воспоминания пользователя, используй их для персонализации совета: \
         учитывай его предпочтения, интересы и прошлый опыт.\n\n\
         Дай полезный, конкретный и дружелюбный совет на русском языке. \
         Будь кратким (2-4 предложения), но информативным."
    )
}
