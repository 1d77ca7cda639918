//! Display helpers over capsule records.

use crate::capsule::{parse_timestamp, unlock_date_reached, Capsule, EventKind, UnlockCondition};
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use std::fmt;

/// Long en-US date, e.g. `January 5, 2025`. Unparseable input yields
/// `Invalid Date`.
pub fn format_date(raw: &str) -> String {
    match parse_timestamp(raw) {
        Some(date) => format_long_date(&date),
        None => "Invalid Date".to_string(),
    }
}

pub fn format_long_date<Tz: TimeZone>(date: &DateTime<Tz>) -> String
where
    Tz::Offset: fmt::Display,
{
    date.format("%B %-d, %Y").to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventDisplay {
    pub name: String,
    pub description: String,
}

/// Split an unlock event into name and description. `": "` wins over
/// `" - "`; without either delimiter the whole string is the name.
pub fn format_event_display(unlock_event: &str) -> EventDisplay {
    if unlock_event.is_empty() {
        return EventDisplay {
            name: "Unknown Event".to_string(),
            description: String::new(),
        };
    }
    let split = unlock_event
        .split_once(": ")
        .or_else(|| unlock_event.split_once(" - "));
    match split {
        Some((name, description)) => EventDisplay {
            name: name.to_string(),
            description: description.to_string(),
        },
        None => EventDisplay {
            name: unlock_event.to_string(),
            description: String::new(),
        },
    }
}

/// First `max_chars` characters followed by `...`, or the text unchanged
/// when it already fits.
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockStatus {
    Locked,
    Unlocked,
}

impl fmt::Display for UnlockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnlockStatus::Locked => f.write_str("Locked"),
            UnlockStatus::Unlocked => f.write_str("Unlocked"),
        }
    }
}

pub fn unlock_status(capsule: &Capsule) -> UnlockStatus {
    if capsule.is_unlocked {
        UnlockStatus::Unlocked
    } else {
        UnlockStatus::Locked
    }
}

/// Badge color for a capsule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusColor {
    /// Already unlocked.
    Green,
    /// Date reached, not yet opened.
    Yellow,
    /// Still waiting on its condition.
    Blue,
}

impl StatusColor {
    pub fn css_class(self) -> &'static str {
        match self {
            StatusColor::Green => "text-green-400",
            StatusColor::Yellow => "text-yellow-400",
            StatusColor::Blue => "text-blue-400",
        }
    }
}

pub fn status_color(capsule: &Capsule, now: DateTime<Utc>) -> StatusColor {
    if capsule.is_unlocked {
        StatusColor::Green
    } else if unlock_date_reached(capsule, now) {
        StatusColor::Yellow
    } else {
        StatusColor::Blue
    }
}

/// Characters of content shown in a feed preview.
pub const PREVIEW_CHARS: usize = 120;

/// One row of the public feed, ready to print or serialize.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedEntry {
    pub id: Option<String>,
    pub title: String,
    pub status: String,
    pub color: &'static str,
    pub unlock: String,
    pub preview: String,
    pub media_count: usize,
    pub tags: Vec<String>,
    pub created: Option<String>,
}

pub fn feed_entry(capsule: &Capsule, now: DateTime<Utc>) -> FeedEntry {
    FeedEntry {
        id: capsule.id.clone(),
        title: capsule.title.clone(),
        status: unlock_status(capsule).to_string(),
        color: status_color(capsule, now).css_class(),
        unlock: describe_unlock(&capsule.unlock),
        preview: truncate_text(&capsule.content, PREVIEW_CHARS),
        media_count: capsule.media.len(),
        tags: capsule.tags.clone(),
        created: capsule.created_at.as_deref().map(format_date),
    }
}

/// Human-readable unlock condition.
pub fn describe_unlock(unlock: &UnlockCondition) -> String {
    match unlock {
        UnlockCondition::Date(date) => format!("unlocks {}", format_long_date(date)),
        UnlockCondition::Location(fence) => format!(
            "unlocks within {} m of {:.4}, {:.4}",
            fence.radius, fence.latitude, fence.longitude
        ),
        UnlockCondition::Event { description, kind } => {
            let event = format_event_display(description);
            let mut text = format!("unlocks on {}", event.name);
            if !event.description.is_empty() {
                text.push_str(&format!(" ({})", event.description));
            }
            if *kind != EventKind::Custom {
                text.push_str(&format!(" [{}]", event_kind_label(*kind)));
            }
            text
        }
    }
}

fn event_kind_label(kind: EventKind) -> &'static str {
    match kind {
        EventKind::Custom => "custom",
        EventKind::Birthday => "birthday",
        EventKind::Holiday => "holiday",
        EventKind::Milestone => "milestone",
        EventKind::Manual => "manual",
    }
}
