//! Helper functions shared by the drivers.
//!
//! Providers report dates in several shapes: RFC 3339 timestamps over REST,
//! compact ISO 8601 values over XML-RPC, and bare dates in some payloads.
//! `parse_datetime` accepts all of them and normalizes to UTC.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

const NAIVE_FORMATS: &[&str] = &[
	"%Y-%m-%dT%H:%M:%S%.f",
	"%Y-%m-%d %H:%M:%S%.f",
	"%Y%m%dT%H:%M:%S",
	"%Y%m%dT%H%M%S",
];

/// Parses a provider date or timestamp.
///
/// Values without an offset are taken as UTC. Returns `None` for empty or
/// unparseable input.
pub fn parse_datetime(value: &str) -> Option<DateTime<Utc>> {
	let value = value.trim();
	if value.is_empty() {
		return None;
	}

	if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
		return Some(dt.with_timezone(&Utc));
	}
	// Offsets without a colon, e.g. "2024-01-31T10:00:00+0100".
	if let Ok(dt) = DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%z") {
		return Some(dt.with_timezone(&Utc));
	}
	for format in NAIVE_FORMATS {
		if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
			return Some(naive.and_utc());
		}
	}
	parse_date(value).map(|date| date.and_time(NaiveTime::MIN).and_utc())
}

/// Parses a `YYYY-MM-DD` date.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
	NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()
}

/// Shortens an identifier for log output.
pub fn truncate_id(id: &str) -> String {
	if id.chars().count() <= 8 {
		id.to_string()
	} else {
		format!("{}..", id.chars().take(8).collect::<String>())
	}
}
