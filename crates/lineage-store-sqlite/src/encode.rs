//! TEXT encodings for SQLite storage: uuids as hyphenated strings,
//! timestamps as fixed-precision RFC 3339 UTC (so lexicographic comparison
//! matches chronological order), uuid lists as JSON arrays.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use uuid::Uuid;

/// Encodes a timestamp for storage and for range-filter bounds.
pub fn encode_dt(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Decodes a stored timestamp. `idx` is the column index for error
/// reporting.
pub fn decode_dt(idx: usize, s: &str) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Decodes a stored uuid.
pub fn decode_uuid(idx: usize, s: &str) -> Result<Uuid, rusqlite::Error> {
    Uuid::parse_str(s)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Decodes an optional stored uuid.
pub fn decode_opt_uuid(idx: usize, s: Option<String>) -> Result<Option<Uuid>, rusqlite::Error> {
    s.map(|s| decode_uuid(idx, &s)).transpose()
}

/// Encodes a uuid list as a JSON array.
pub fn encode_uuid_list(ids: &[Uuid]) -> String {
    serde_json::to_string(ids).unwrap_or_else(|_| "[]".to_owned())
}

/// Decodes a JSON-array uuid list.
pub fn decode_uuid_list(idx: usize, s: &str) -> Result<Vec<Uuid>, rusqlite::Error> {
    serde_json::from_str(s)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Escapes `%`, `_`, and the escape character itself for a LIKE pattern
/// with `ESCAPE '\'`, lowercasing for case-insensitive matching.
pub fn escape_like(query: &str) -> String {
    let mut out = String::with_capacity(query.len());
    for ch in query.to_lowercase().chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_sort_lexicographically() {
        let early = Utc::now();
        let late = early + chrono::Duration::milliseconds(5);
        assert!(encode_dt(early) < encode_dt(late));
    }

    #[test]
    fn escape_like_neutralizes_wildcards() {
        assert_eq!(escape_like("100%_Smith\\"), "100\\%\\_smith\\\\");
    }

    #[test]
    fn uuid_list_round_trips() {
        let ids = vec![Uuid::new_v4(), Uuid::new_v4()];
        let encoded = encode_uuid_list(&ids);
        assert_eq!(decode_uuid_list(0, &encoded).unwrap(), ids);
    }
}
