//! Echo summaries shown back to the user after routing

use super::IngestOutcome;
use crate::error::Result;
use chrono_tz::Tz;

/// One-line reply for a routed request. Event times are rendered in `tz`.
pub fn summary(outcome: &IngestOutcome, tz: Tz) -> Result<String> {
    Ok(match outcome {
        IngestOutcome::Memory(memory) => {
            let shown = [memory.content.as_str(), memory.title.as_str()]
                .into_iter()
                .find(|s| !s.is_empty())
                .unwrap_or("Заметка");
            format!("✅ Сохранено в папку \"{}\": {}", memory.folder, shown)
        }
        IngestOutcome::Calendar(event) => format!(
            "📅 Событие создано: \"{}\" на {}",
            event.title,
            event.starts_at.with_timezone(&tz).format("%d.%m.%Y, %H:%M:%S")
        ),
        IngestOutcome::Advice(advice) => advice.answer.clone(),
        IngestOutcome::Audio(note) => serde_json::to_string_pretty(note)?,
    })
}
