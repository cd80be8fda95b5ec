//! Russian natural-language dates and event titles
//!
//! Recognised forms (matched on the lower-cased text):
//!
//! ```text
//! date:  сегодня | завтра | послезавтра
//!        [в|во] понедельник … воскресенье   (next occurrence, today included)
//!        D <month genitive> [YYYY]
//!        DD.MM[.YYYY]
//! time:  [в] HH:MM | в H час(а|ов) | в H утра|дня|вечера|ночи
//! rel:   через N минут|часов|дней
//! ```
//!
//! A date without a time resolves to 12:00, a time without a date to today,
//! both in the configured timezone.

use crate::error::{Error, Result};
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use regex::{Captures, Regex};

const MONTHS: [&str; 12] = [
    "января",
    "февраля",
    "марта",
    "апреля",
    "мая",
    "июня",
    "июля",
    "августа",
    "сентября",
    "октября",
    "ноября",
    "декабря",
];

/// Accusative weekday forms, Monday first
const WEEKDAYS: [&str; 7] = [
    "понедельник",
    "вторник",
    "среду",
    "четверг",
    "пятницу",
    "субботу",
    "воскресенье",
];

/// Trigger phrases removed from event titles, longest first
const TRIGGERS: [&str; 9] = [
    "напомни мне о",
    "напомни мне",
    "создать событие",
    "добавить событие",
    "создай событие",
    "добавь событие",
    "напоминание",
    "напомнить",
    "напомни",
];

/// Titles shorter than this after stripping fall back to the raw text
const MIN_TITLE_CHARS: usize = 3;

/// Date/time parser and event title extractor for one timezone
#[derive(Debug, Clone)]
pub struct DateParser {
    tz: Tz,
    day_word: Regex,
    weekday: Regex,
    month_date: Regex,
    numeric_date: Regex,
    relative: Regex,
    clock: Regex,
    day_part: Regex,
    hour_word: Regex,
    triggers: Regex,
    time_markers: Regex,
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| Error::Internal(format!("invalid date pattern '{}': {}", pattern, e)))
}

impl DateParser {
    /// Parser resolving local times in `tz`
    pub fn new(tz: Tz) -> Result<Self> {
        let months = MONTHS.join("|");
        let weekdays = WEEKDAYS.join("|");
        let triggers = TRIGGERS.join("|");

        Ok(Self {
            tz,
            day_word: compile(r"\b(сегодня|послезавтра|завтра)\b")?,
            weekday: compile(&format!(r"\b(?:во?\s+)?({})\b", weekdays))?,
            month_date: compile(&format!(r"\b(\d{{1,2}})\s+({})(?:\s+(\d{{4}}))?\b", months))?,
            numeric_date: compile(r"\b(\d{1,2})\.(\d{1,2})(?:\.(\d{4}))?\b")?,
            relative: compile(r"\bчерез\s+(\d{1,4})\s+(минут[уы]?|час(?:а|ов)?|(?:дня|дней|день))\b")?,
            clock: compile(r"\b(\d{1,2}):(\d{2})\b")?,
            day_part: compile(r"\bв\s+(\d{1,2})\s*(утра|дня|вечера|ночи)\b")?,
            hour_word: compile(r"\bв\s+(\d{1,2})\s*час(?:а|ов)?\b")?,
            triggers: compile(&format!(r"(?i)(?:^|\s)(?:{})(?:\s|$)", triggers))?,
            time_markers: compile(&format!(
                r"(?i)\b(?:(?:послезавтра|завтра|сегодня|вчера)|во?\s+(?:{w})|через\s+\d{{1,4}}\s+\w+|в\s+\d{{1,2}}:\d{{2}}|\d{{1,2}}:\d{{2}}|в\s+\d{{1,2}}\s*(?:утра|дня|вечера|ночи)|в\s+\d{{1,2}}\s*час(?:а|ов)?|\d{{1,2}}\s+(?:{m})(?:\s+\d{{4}})?|\d{{1,2}}\.\d{{1,2}}(?:\.\d{{4}})?)\b",
                w = weekdays,
                m = months
            ))?,
        })
    }

    /// Timezone local times are resolved in
    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// Start instant described by `text`, relative to `now`.
    ///
    /// Returns `None` when nothing date- or time-like is recognised.
    pub fn parse(&self, text: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let lower = text.to_lowercase();
        let today = now.with_timezone(&self.tz).date_naive();
        let time = self.time_of_day(&lower);

        if let Some((offset, whole_days)) = self.relative(&lower) {
            return match (whole_days, time) {
                (true, Some(t)) => self.local(today + offset, t),
                _ => Some(now + offset),
            };
        }

        match (self.date(&lower, today), time) {
            (Some(d), Some(t)) => self.local(d, t),
            (Some(d), None) => self.local(d, NaiveTime::from_hms_opt(12, 0, 0)?),
            (None, Some(t)) => self.local(today, t),
            (None, None) => None,
        }
    }

    /// Event title: `text` without trigger phrases and date/time markers,
    /// matched case-insensitively. The remaining words keep their case.
    ///
    /// When fewer than three characters survive, the raw text is returned.
    pub fn extract_event_title(&self, text: &str) -> String {
        let stripped = self.triggers.replace_all(text, " ");
        let stripped = self.time_markers.replace_all(&stripped, " ");
        let title = stripped.split_whitespace().collect::<Vec<_>>().join(" ");

        if title.chars().count() < MIN_TITLE_CHARS {
            tracing::debug!("Event title too short after stripping, using raw text");
            return text.to_string();
        }
        title
    }

    fn local(&self, date: NaiveDate, time: NaiveTime) -> Option<DateTime<Utc>> {
        self.tz
            .from_local_datetime(&date.and_time(time))
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
    }

    fn relative(&self, text: &str) -> Option<(Duration, bool)> {
        let caps = self.relative.captures(text)?;
        let n: i64 = caps[1].parse().ok()?;
        let unit = &caps[2];
        if unit.starts_with("минут") {
            Some((Duration::minutes(n), false))
        } else if unit.starts_with("час") {
            Some((Duration::hours(n), false))
        } else {
            Some((Duration::days(n), true))
        }
    }

    fn date(&self, text: &str, today: NaiveDate) -> Option<NaiveDate> {
        if let Some(caps) = self.day_word.captures(text) {
            let days = match &caps[1] {
                "сегодня" => 0,
                "завтра" => 1,
                _ => 2,
            };
            return Some(today + Duration::days(days));
        }

        if let Some(caps) = self.numeric_date.captures(text) {
            if let Some(date) = calendar_date(&caps, caps[2].parse().ok(), today) {
                return Some(date);
            }
        }

        if let Some(caps) = self.month_date.captures(text) {
            let month = MONTHS.iter().position(|m| *m == &caps[2]).map(|i| i as u32 + 1);
            if let Some(date) = calendar_date(&caps, month, today) {
                return Some(date);
            }
        }

        if let Some(caps) = self.weekday.captures(text) {
            let target = WEEKDAYS.iter().position(|w| *w == &caps[1])? as i64;
            let current = today.weekday().num_days_from_monday() as i64;
            return Some(today + Duration::days((target - current).rem_euclid(7)));
        }

        None
    }

    fn time_of_day(&self, text: &str) -> Option<NaiveTime> {
        if let Some(caps) = self.clock.captures(text) {
            let hour = caps[1].parse().ok()?;
            let minute = caps[2].parse().ok()?;
            return NaiveTime::from_hms_opt(hour, minute, 0);
        }

        if let Some(caps) = self.day_part.captures(text) {
            let hour: u32 = caps[1].parse().ok()?;
            let hour = match (&caps[2], hour) {
                ("дня" | "вечера", h) if h < 12 => h + 12,
                ("утра" | "ночи", 12) => 0,
                (_, h) => h,
            };
            return NaiveTime::from_hms_opt(hour, 0, 0);
        }

        if let Some(caps) = self.hour_word.captures(text) {
            let hour = caps[1].parse().ok()?;
            return NaiveTime::from_hms_opt(hour, 0, 0);
        }

        None
    }
}

/// Day from group 1, optional year from group 3
fn calendar_date(caps: &Captures<'_>, month: Option<u32>, today: NaiveDate) -> Option<NaiveDate> {
    let day = caps[1].parse().ok()?;
    let month = month?;
    let year = match caps.get(3) {
        Some(y) => y.as_str().parse().ok()?,
        None => today.year(),
    };
    NaiveDate::from_ymd_opt(year, month, day)
}
