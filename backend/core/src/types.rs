use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::digest::{content_digest, ContentDigest};

/// A cached analysis result, one per content digest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub digest: ContentDigest,
    pub image_url: String,
    /// First choice message content from the vision provider.
    pub content: String,
    /// Full provider response body, kept for auditing.
    #[serde(default)]
    pub response: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AnalysisRecord {
    pub fn new(image_url: impl Into<String>, content: impl Into<String>, response: serde_json::Value) -> Self {
        let image_url = image_url.into();
        Self {
            digest: content_digest(&image_url),
            image_url,
            content: content.into(),
            response,
            created_at: Utc::now(),
        }
    }
}

/// One line of the audit trail.
///
/// Field names match the `saved_data.json` layout the bookmarklet tooling reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Written as RFC 3339. Offset-less ISO timestamps from older logs are
    /// read as UTC.
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub time: DateTime<Utc>,
    #[serde(rename = "imageDescription")]
    pub image_description: String,
    #[serde(rename = "imageUrl")]
    pub image_url: String,
}

impl AuditEntry {
    pub fn new(image_url: impl Into<String>, image_description: impl Into<String>) -> Self {
        Self {
            time: Utc::now(),
            image_description: image_description.into(),
            image_url: image_url.into(),
        }
    }
}

fn deserialize_timestamp<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    if let Ok(time) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(time.with_timezone(&Utc));
    }
    raw.parse::<NaiveDateTime>()
        .map(|naive| naive.and_utc())
        .map_err(|e| serde::de::Error::custom(format!("invalid timestamp {raw:?}: {e}")))
}

impl From<&AnalysisRecord> for AuditEntry {
    fn from(record: &AnalysisRecord) -> Self {
        Self::new(record.image_url.clone(), record.content.clone())
    }
}
