//! Timestamp extraction from document metadata

use crate::document::Document;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::Value;

/// Fields checked, in order, when the type-specific field is absent
pub const FALLBACK_FIELDS: &[&str] = &[
    "createdAt",
    "playedAt",
    "updatedAt",
    "mergedAt",
    "pushedAt",
    "closedAt",
    "publishedAt",
    "timestamp",
    "date",
];

/// Most meaningful timestamp field for an entity type
pub fn primary_field(doc_type: &str) -> Option<&'static str> {
    match doc_type {
        "recently_played" => Some("playedAt"),
        "tweet" => Some("createdAt"),
        "pull_request" => Some("mergedAt"),
        "repository" => Some("pushedAt"),
        "commit" => Some("committedAt"),
        "issue" => Some("updatedAt"),
        "track" | "artist" | "playlist" | "album" => Some("createdAt"),
        "event" => Some("startTime"),
        "message" => Some("timestamp"),
        "page" => Some("updatedAt"),
        _ => None,
    }
}

/// Parse RFC 3339 strings, plain dates, or epoch numbers (milliseconds above 1e11, else seconds)
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|naive| Utc.from_utc_datetime(&naive))
        }
        Value::Number(n) => {
            let raw = n.as_f64()?;
            if !raw.is_finite() || raw <= 0.0 {
                return None;
            }
            let millis = if raw > 1e11 { raw } else { raw * 1000.0 };
            Utc.timestamp_millis_opt(millis as i64).single()
        }
        _ => None,
    }
}

/// Timestamp of a document, type-specific field first
pub fn document_timestamp(doc: &Document) -> Option<DateTime<Utc>> {
    let meta = &doc.metadata;
    let primary = meta.doc_type.as_deref().and_then(primary_field);

    primary
        .into_iter()
        .chain(FALLBACK_FIELDS.iter().copied())
        .filter_map(|field| meta.get(field))
        .find_map(parse_timestamp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;
    use serde_json::json;

    #[test]
    fn test_primary_field_wins() {
        let doc = Document::new("pr")
            .with_type("pull_request")
            .with_attr("createdAt", "2026-01-01T00:00:00Z")
            .with_attr("mergedAt", "2026-02-01T00:00:00Z");
        let ts = document_timestamp(&doc).unwrap();
        assert_eq!(ts.month(), 2);
    }

    #[test]
    fn test_fallback_fields_and_epoch() {
        let doc = Document::new("x").with_type("tweet").with_attr("timestamp", 1_700_000_000_000u64);
        assert!(document_timestamp(&doc).is_some());

        let secs = parse_timestamp(&json!(1_700_000_000)).unwrap();
        let millis = parse_timestamp(&json!(1_700_000_000_000u64)).unwrap();
        assert_eq!(secs, millis);
    }

    #[test]
    fn test_plain_date_and_garbage() {
        assert!(parse_timestamp(&json!("2026-10-01")).is_some());
        assert!(parse_timestamp(&json!("not a date")).is_none());
        assert!(parse_timestamp(&json!(true)).is_none());
        assert!(document_timestamp(&Document::new("no time")).is_none());
    }
}
