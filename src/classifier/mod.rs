//! Intent classification
//!
//! Every input text is mapped to exactly one [`Intent`]. The remote model is
//! asked first; any failure (transport error, timeout, unusable reply) falls
//! back to the keyword rules in [`rules`]. Classification never fails.
//!
//! ```text
//! text ─► [remote model] ──ok──► parse first {...} ──► Intent
//!              │ err / timeout        │ unparsable
//!              └──────────────► [keyword rules] ──► Intent
//! ```

pub mod rules;

pub use rules::{fallback_classify, match_folder};

use crate::error::{Error, Result};
use crate::llm::LanguageModel;
use crate::taxonomy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// What the user meant by a piece of text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Intent {
    /// A durable fact to remember, optionally with a taxonomy folder
    Memory { folder: Option<String> },
    /// A calendar event
    Calendar,
    /// A request for advice
    Advice,
    /// A reference to an audio note
    Audio,
}

impl Intent {
    /// Short label for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Intent::Memory { .. } => "memory",
            Intent::Calendar => "calendar",
            Intent::Advice => "advice",
            Intent::Audio => "audio",
        }
    }
}

/// Classifier with an optional remote model in front of the keyword rules
#[derive(Clone)]
pub struct Classifier {
    model: Option<Arc<dyn LanguageModel>>,
    timeout: Duration,
}

impl Classifier {
    /// Classifier that consults `model` first
    pub fn new(model: Arc<dyn LanguageModel>, timeout: Duration) -> Self {
        Self {
            model: Some(model),
            timeout,
        }
    }

    /// Classifier that only uses the keyword rules
    pub fn offline() -> Self {
        Self {
            model: None,
            timeout: Duration::from_secs(0),
        }
    }

    /// Whether a remote model is configured
    pub fn is_remote(&self) -> bool {
        self.model.is_some()
    }

    /// Classify `text`. Total: always returns one of the four intents.
    pub async fn classify(&self, text: &str) -> Intent {
        let Some(model) = &self.model else {
            return fallback_classify(text);
        };
        if text.trim().is_empty() {
            return fallback_classify(text);
        }

        match self.classify_remote(model.as_ref(), text).await {
            Ok(intent) => {
                tracing::debug!(kind = intent.kind(), model = model.name(), "Remote classification");
                intent
            }
            Err(e) => {
                tracing::warn!(error = %e, "Remote classification failed, using keyword rules");
                fallback_classify(text)
            }
        }
    }

    async fn classify_remote(&self, model: &dyn LanguageModel, text: &str) -> Result<Intent> {
        let prompt = build_prompt(text);
        let reply = tokio::time::timeout(self.timeout, model.generate(&prompt))
            .await
            .map_err(|_| Error::RemoteUnavailable("classification timed out".to_string()))??;

        let intent = parse_reply(&reply)?;
        Ok(repair_folder(intent, text))
    }
}

/// Keep a remote folder only if it is a taxonomy member; otherwise derive one
/// from the text.
fn repair_folder(intent: Intent, text: &str) -> Intent {
    match intent {
        Intent::Memory { folder: Some(name) } if !taxonomy::is_valid_folder(&name) => {
            let repaired = match_folder(text);
            tracing::info!(
                error = %Error::InvalidTaxonomyValue(name),
                folder = repaired,
                "Repaired folder from model reply"
            );
            Intent::Memory {
                folder: Some(repaired.to_string()),
            }
        }
        other => other,
    }
}

/// Extract the first well-formed JSON object from a model reply and map it
/// to an intent. Prose before or after the object is ignored.
pub fn parse_reply(reply: &str) -> Result<Intent> {
    let object = first_json_object(reply)
        .ok_or_else(|| Error::UnparsableResponse("no JSON object in reply".to_string()))?;

    let kind = object
        .get("kind")
        .and_then(Value::as_str)
        .map(|k| k.trim().to_lowercase())
        .ok_or_else(|| Error::UnparsableResponse("missing \"kind\"".to_string()))?;

    match kind.as_str() {
        "memory" => {
            let folder = object
                .get("folder")
                .and_then(Value::as_str)
                .map(|f| f.trim().to_string())
                .filter(|f| !f.is_empty());
            Ok(Intent::Memory { folder })
        }
        "calendar" => Ok(Intent::Calendar),
        "advice" => Ok(Intent::Advice),
        "audio" => Ok(Intent::Audio),
        other => Err(Error::UnparsableResponse(format!("unknown kind \"{}\"", other))),
    }
}

fn first_json_object(text: &str) -> Option<serde_json::Map<String, Value>> {
    text.match_indices('{').find_map(|(start, _)| {
        let mut stream = serde_json::Deserializer::from_str(&text[start..]).into_iter::<Value>();
        match stream.next() {
            Some(Ok(Value::Object(map))) => Some(map),
            _ => None,
        }
    })
}

fn build_prompt(text: &str) -> String {
    format!(
        "Ты классификатор сообщений личного ассистента. Определи намерение пользователя.\n\
         Варианты kind:\n\
         - \"memory\": факт, который нужно запомнить\n\
         - \"calendar\": событие или напоминание с датой/временем\n\
         - \"advice\": просьба о совете или рекомендации\n\
         - \"audio\": аудиозапись или голосовая заметка\n\n\
         Для \"memory\" выбери одну папку строго из списка:\n{}\n\n\
         Примеры:\n\
         \"Моя мама любит кофе\" -> {{\"kind\":\"memory\",\"folder\":\"Семья\"}}\n\
         \"Я люблю ужастики\" -> {{\"kind\":\"memory\",\"folder\":\"Фильмы и сериалы\"}}\n\
         \"Напомни завтра позвонить врачу\" -> {{\"kind\":\"calendar\",\"folder\":null}}\n\
         \"Что почитать в отпуске?\" -> {{\"kind\":\"advice\",\"folder\":null}}\n\n\
         Ответь только JSON вида {{\"kind\": \"...\", \"folder\": \"...\" или null}}.\n\n\
         Сообщение: {}",
        taxonomy::prompt_listing(),
        text
    )
}
