//! Capsule records and the public feed query.
//!
//! Rows come back from the store in a flat shape where every unlock field is
//! optional. [`Capsule`] is the validated form: exactly one unlock condition,
//! matching the declared unlock type.

use crate::platform::RowStore;
use anyhow::Result;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

pub const DATABASE_ID: &str = "memory-capsules-db";
pub const CAPSULES_TABLE_ID: &str = "capsules";
pub const BUCKET_ID: &str = "capsule-media";

/// Maximum rows shown in the public feed.
pub const PUBLIC_FEED_LIMIT: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnlockType {
    Date,
    Location,
    Event,
}

impl fmt::Display for UnlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            UnlockType::Date => "date",
            UnlockType::Location => "location",
            UnlockType::Event => "event",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Birthday,
    Holiday,
    Milestone,
    Manual,
    /// Also covers event types this crate does not know.
    #[default]
    #[serde(other)]
    Custom,
}

/// A capsule row as stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapsuleRecord {
    #[serde(rename = "$id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub content: String,
    pub created_by: String,
    pub unlock_type: Option<UnlockType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unlock_date: Option<String>,
    /// JSON string: `{"latitude": .., "longitude": .., "radius": ..}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unlock_location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unlock_event: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<EventKind>,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub media_files: Vec<String>,
    /// JSON string: `{fileId: {name, type, size}}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_metadata: Option<String>,
    #[serde(default)]
    pub is_unlocked: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub collaborators: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    /// Store-managed creation timestamp.
    #[serde(rename = "$createdAt", default, skip_serializing_if = "Option::is_none")]
    pub row_created_at: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoFence {
    pub latitude: f64,
    pub longitude: f64,
    pub radius: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UnlockCondition {
    Date(DateTime<FixedOffset>),
    Location(GeoFence),
    Event { description: String, kind: EventKind },
}

impl UnlockCondition {
    pub fn unlock_type(&self) -> UnlockType {
        match self {
            UnlockCondition::Date(_) => UnlockType::Date,
            UnlockCondition::Location(_) => UnlockType::Location,
            UnlockCondition::Event { .. } => UnlockType::Event,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaMeta {
    pub name: String,
    #[serde(rename = "type")]
    pub mime_type: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFile {
    pub id: String,
    pub meta: Option<MediaMeta>,
}

/// A validated capsule.
#[derive(Debug, Clone, PartialEq)]
pub struct Capsule {
    pub id: Option<String>,
    pub title: String,
    pub content: String,
    pub created_by: String,
    pub unlock: UnlockCondition,
    pub is_public: bool,
    pub media: Vec<MediaFile>,
    pub is_unlocked: bool,
    pub tags: Vec<String>,
    pub collaborators: Vec<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapsuleError {
    #[error("capsule has no unlock type")]
    MissingUnlockType,
    #[error("{0} capsule has no {0} unlock condition")]
    MissingUnlockCondition(UnlockType),
    #[error("invalid unlock date {0:?}")]
    InvalidDate(String),
    #[error("invalid unlock location: {0}")]
    InvalidLocation(String),
    #[error("invalid media metadata: {0}")]
    InvalidMediaMetadata(String),
}

impl TryFrom<CapsuleRecord> for Capsule {
    type Error = CapsuleError;

    fn try_from(record: CapsuleRecord) -> Result<Self, Self::Error> {
        let unlock_type = record.unlock_type.ok_or(CapsuleError::MissingUnlockType)?;
        let unlock = unlock_condition(&record, unlock_type)?;
        let media = media_files(&record.media_files, record.media_metadata.as_deref())?;
        Ok(Capsule {
            id: record.id,
            title: record.title,
            content: record.content,
            created_by: record.created_by,
            unlock,
            is_public: record.is_public,
            media,
            is_unlocked: record.is_unlocked,
            tags: record.tags,
            collaborators: record.collaborators,
            created_at: record.created_at.or(record.row_created_at),
            updated_at: record.updated_at,
        })
    }
}

fn unlock_condition(
    record: &CapsuleRecord,
    unlock_type: UnlockType,
) -> Result<UnlockCondition, CapsuleError> {
    let missing = || CapsuleError::MissingUnlockCondition(unlock_type);
    match unlock_type {
        UnlockType::Date => {
            let raw = non_blank(record.unlock_date.as_deref()).ok_or_else(missing)?;
            parse_timestamp(raw)
                .map(UnlockCondition::Date)
                .ok_or_else(|| CapsuleError::InvalidDate(raw.to_string()))
        }
        UnlockType::Location => {
            let raw = non_blank(record.unlock_location.as_deref()).ok_or_else(missing)?;
            serde_json::from_str(raw)
                .map(UnlockCondition::Location)
                .map_err(|err| CapsuleError::InvalidLocation(err.to_string()))
        }
        UnlockType::Event => {
            let description = non_blank(record.unlock_event.as_deref()).ok_or_else(missing)?;
            Ok(UnlockCondition::Event {
                description: description.to_string(),
                kind: record.event_type.unwrap_or_default(),
            })
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.trim().is_empty())
}

fn media_files(ids: &[String], metadata: Option<&str>) -> Result<Vec<MediaFile>, CapsuleError> {
    let mut metadata: BTreeMap<String, MediaMeta> = match non_blank(metadata) {
        Some(raw) => serde_json::from_str(raw)
            .map_err(|err| CapsuleError::InvalidMediaMetadata(err.to_string()))?,
        None => BTreeMap::new(),
    };
    Ok(ids
        .iter()
        .map(|id| MediaFile {
            id: id.clone(),
            meta: metadata.remove(id),
        })
        .collect())
}

/// Parse the timestamp shapes the store and the web form produce: RFC 3339,
/// `datetime-local` values (`2025-06-01T09:30`) and plain dates. Values
/// without an offset are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed);
    }
    let utc = FixedOffset::east_opt(0)?;
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return utc.from_local_datetime(&naive).single();
        }
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
    utc.from_local_datetime(&date.and_hms_opt(0, 0, 0)?).single()
}

/// Whether a date capsule's unlock moment has passed at `now`.
pub fn unlock_date_reached(capsule: &Capsule, now: DateTime<Utc>) -> bool {
    match &capsule.unlock {
        UnlockCondition::Date(date) => now >= *date,
        _ => false,
    }
}

/// Builder for the store's JSON query strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    queries: Vec<String>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn equal(mut self, attribute: &str, value: impl Into<Value>) -> Self {
        let value: Value = value.into();
        self.queries.push(
            json!({ "method": "equal", "attribute": attribute, "values": [value] }).to_string(),
        );
        self
    }

    pub fn order_desc(mut self, attribute: &str) -> Self {
        self.queries
            .push(json!({ "method": "orderDesc", "attribute": attribute }).to_string());
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.queries
            .push(json!({ "method": "limit", "values": [limit] }).to_string());
        self
    }

    pub fn build(self) -> Vec<String> {
        self.queries
    }
}

/// Public capsules, newest first, capped to the feed limit.
pub fn public_feed_query() -> Vec<String> {
    Query::new()
        .equal("isPublic", true)
        .order_desc("$createdAt")
        .limit(PUBLIC_FEED_LIMIT)
        .build()
}

/// List public capsule rows. Rows that do not decode are skipped with a
/// warning; only a failed listing is an error.
pub fn list_public_capsules(store: &dyn RowStore) -> Result<Vec<CapsuleRecord>> {
    let list = store.list_rows_json(DATABASE_ID, CAPSULES_TABLE_ID, &public_feed_query())?;
    Ok(list.rows.into_iter().filter_map(decode_row).collect())
}

fn decode_row(row: Value) -> Option<CapsuleRecord> {
    let id = row.get("$id").and_then(Value::as_str).map(str::to_string);
    match serde_json::from_value(row) {
        Ok(record) => Some(record),
        Err(err) => {
            tracing::warn!(id = ?id, error = %err, "skipping undecodable capsule row");
            None
        }
    }
}

/// Load the public feed; listing failures degrade to an empty feed.
pub fn load_public_capsules(store: &dyn RowStore) -> Vec<CapsuleRecord> {
    match list_public_capsules(store) {
        Ok(rows) => {
            tracing::debug!(count = rows.len(), "loaded public capsules");
            rows
        }
        Err(err) => {
            tracing::warn!(error = %format!("{err:#}"), "failed to load public capsules");
            Vec::new()
        }
    }
}
