//! Event normalization.
//!
//! Turns the raw rows of one person's Chronicle export into a clean, ordered
//! event sequence:
//!
//! 1. Drop rows without a record type or timestamp, and pre-aggregated usage stats
//! 2. Default every timezone to UTC if any row lacks one
//! 3. Sort by reported time and patch sparse timezone/app columns from neighbours
//! 4. Resolve each timestamp (reported in UTC) into the row's local timezone
//! 5. Order by instant, foreground before background on ties

use chrono::{DateTime, NaiveDateTime, Utc};
use chrono_tz::Tz;
use thiserror::Error;

use crate::record_type::RecordType;

/// Fallback timezone for rows that do not report one.
pub const DEFAULT_TIMEZONE: &str = "UTC";

/// Normalization errors. Any of these aborts processing for the person.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    /// The reported timestamp is not in a recognised format.
    #[error("invalid timestamp: {value:?}")]
    InvalidTimestamp { value: String },

    /// The timezone is not a known IANA name.
    #[error("unknown timezone: {value:?}")]
    UnknownTimezone { value: String },
}

/// One row as delivered by the record source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEvent {
    /// Package name of the app (e.g. `com.whatsapp`).
    pub app_id: Option<String>,
    /// Human-readable app title.
    pub title: Option<String>,
    /// Collector record type string.
    pub record_type: Option<String>,
    /// Reported timestamp, in UTC.
    pub timestamp: Option<String>,
    /// IANA timezone name of the device at logging time.
    pub timezone: Option<String>,
    pub person_id: String,
}

/// A cleaned event with a resolved local instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedEvent {
    pub app_id: String,
    pub title: String,
    pub record_type: RecordType,
    pub instant: DateTime<Tz>,
    pub person_id: String,
}

/// Intermediate row: parsed type and UTC time, metadata still sparse.
struct CleanRow {
    app_id: Option<String>,
    title: Option<String>,
    record_type: RecordType,
    reported: DateTime<Utc>,
    timezone: Option<String>,
    person_id: String,
}

/// Normalizes one person's raw rows into an ordered event sequence.
pub fn normalize_events(raw: Vec<RawEvent>) -> Result<Vec<NormalizedEvent>, NormalizeError> {
    let mut rows = Vec::with_capacity(raw.len());
    for event in raw {
        let (Some(record_type), Some(timestamp)) =
            (non_blank(event.record_type), non_blank(event.timestamp))
        else {
            continue;
        };
        let record_type = match record_type.parse::<RecordType>() {
            Ok(RecordType::UsageStat) => continue,
            Ok(record_type) => record_type,
            Err(e) => {
                tracing::trace!(error = %e, "dropping unsupported record");
                continue;
            }
        };
        let reported = parse_timestamp(&timestamp)
            .ok_or(NormalizeError::InvalidTimestamp { value: timestamp })?;
        rows.push(CleanRow {
            app_id: non_blank(event.app_id),
            title: non_blank(event.title),
            record_type,
            reported,
            timezone: non_blank(event.timezone),
            person_id: event.person_id,
        });
    }

    if rows.iter().any(|row| row.timezone.is_none()) {
        let person = rows.first().map(|row| row.person_id.as_str()).unwrap_or_default();
        tracing::warn!(
            person = %person,
            "record has no timezone information, registering reported time as UTC"
        );
        for row in &mut rows {
            row.timezone = Some(DEFAULT_TIMEZONE.to_string());
        }
    }

    rows.sort_by_key(|row| row.reported);
    fill_gaps(&mut rows, |row| &mut row.timezone);
    fill_gaps(&mut rows, |row| &mut row.app_id);

    let mut events = rows
        .into_iter()
        .map(|row| {
            let tz = parse_timezone(row.timezone.as_deref().unwrap_or(DEFAULT_TIMEZONE))?;
            Ok(NormalizedEvent {
                app_id: row.app_id.unwrap_or_default(),
                title: row.title.unwrap_or_default(),
                record_type: row.record_type,
                instant: row.reported.with_timezone(&tz),
                person_id: row.person_id,
            })
        })
        .collect::<Result<Vec<_>, NormalizeError>>()?;

    events.sort_by_key(|event| (event.instant, event.record_type.rank()));
    Ok(events)
}

/// Parses a collector timestamp into UTC.
///
/// Timestamps without an offset are taken to be UTC. An explicit offset is
/// honoured.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(dt.with_timezone(&Utc));
    }

    let naive = value.strip_suffix('Z').unwrap_or(value);
    [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ]
    .iter()
    .find_map(|format| NaiveDateTime::parse_from_str(naive, format).ok())
    .map(|dt| dt.and_utc())
}

/// Resolves an IANA timezone name.
pub fn parse_timezone(name: &str) -> Result<Tz, NormalizeError> {
    name.trim()
        .parse()
        .map_err(|_| NormalizeError::UnknownTimezone {
            value: name.to_string(),
        })
}

/// Carries the last seen value forward, then the next seen value backward.
fn fill_gaps<T>(rows: &mut [T], field: impl Fn(&mut T) -> &mut Option<String>) {
    let mut carry: Option<String> = None;
    for row in rows.iter_mut() {
        let slot = field(row);
        match slot {
            Some(value) => carry = Some(value.clone()),
            None => slot.clone_from(&carry),
        }
    }

    carry = None;
    for row in rows.iter_mut().rev() {
        let slot = field(row);
        match slot {
            Some(value) => carry = Some(value.clone()),
            None => slot.clone_from(&carry),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
