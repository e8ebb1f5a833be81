//! Per-person preprocessing: raw events to corrected, binned usage rows.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use thiserror::Error;

use crate::binning::{BinnedRow, DEFAULT_PRECISION_SECS, bin_interval};
use crate::correct::{CorrectedRow, DEFAULT_SESSION_THRESHOLD_SECS, correct_rows};
use crate::normalize::{NormalizeError, RawEvent, normalize_events, parse_timestamp, parse_timezone};
use crate::reconstruct::{ReconstructError, reconstruct_intervals};
use crate::record_type::UsageLabel;

/// Preprocessing configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreprocessOptions {
    /// Bin width in seconds.
    pub precision_secs: i64,
    /// Gaps, in seconds, that start a new engagement session.
    pub session_thresholds: Vec<i64>,
}

impl Default for PreprocessOptions {
    fn default() -> Self {
        Self {
            precision_secs: DEFAULT_PRECISION_SECS,
            session_thresholds: vec![DEFAULT_SESSION_THRESHOLD_SECS],
        }
    }
}

/// Errors that abort preprocessing of one person.
#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    #[error(transparent)]
    Reconstruct(#[from] ReconstructError),
}

/// Result of preprocessing one person.
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessOutput {
    /// Usage rows with positive duration, sorted by start.
    pub corrected: Vec<CorrectedRow>,
    /// Zero-length notification and screen markers, sorted by start.
    pub markers: Vec<BinnedRow>,
}

impl PreprocessOutput {
    pub fn total_seconds(&self) -> f64 {
        self.corrected
            .iter()
            .filter_map(|row| row.bin.duration_seconds)
            .sum()
    }
}

/// Runs normalization, reconstruction, binning and correction for one person.
///
/// Returns `Ok(None)` when the events contain no usage time at all.
pub fn preprocess_person(
    person_id: &str,
    events: Vec<RawEvent>,
    options: &PreprocessOptions,
) -> Result<Option<PreprocessOutput>, PreprocessError> {
    let events = normalize_events(events)?;
    let intervals = reconstruct_intervals(&events)?;
    tracing::debug!(
        person = %person_id,
        events = events.len(),
        intervals = intervals.len(),
        "reconstructed usage intervals"
    );

    let (markers, usage): (Vec<BinnedRow>, Vec<BinnedRow>) = intervals
        .iter()
        .flat_map(|interval| bin_interval(interval, options.precision_secs))
        .partition(BinnedRow::is_marker);

    let total: f64 = usage.iter().filter_map(|row| row.duration_seconds).sum();
    if total <= 0.0 {
        tracing::warn!(
            person = %person_id,
            "file does not seem to contain relevant data, skipping"
        );
        return Ok(None);
    }

    let mut usage = usage;
    usage.sort_by_key(|row| row.start);
    Ok(Some(PreprocessOutput {
        corrected: correct_rows(usage, &options.session_thresholds),
        markers,
    }))
}

/// A binned row as read back from a preprocessed table.
#[derive(Debug, Clone, Copy)]
pub struct StoredBin<'a> {
    pub person_id: &'a str,
    pub app_id: &'a str,
    pub title: &'a str,
    pub start: &'a str,
    pub end: Option<&'a str>,
    pub timezone: &'a str,
    pub label: UsageLabel,
}

impl StoredBin<'_> {
    /// Rebuilds the row in its local timezone, re-deriving calendar fields.
    pub fn restore(self) -> Result<BinnedRow, NormalizeError> {
        let tz = parse_timezone(self.timezone)?;
        let instant = |value: &str| {
            parse_timestamp(value)
                .map(|utc| utc.with_timezone(&tz))
                .ok_or_else(|| NormalizeError::InvalidTimestamp {
                    value: value.to_string(),
                })
        };
        let start = instant(self.start)?;
        let end = self.end.map(instant).transpose()?;
        Ok(BinnedRow::new(
            self.person_id.to_string(),
            self.app_id.to_string(),
            self.title.to_string(),
            start,
            end,
            self.label,
        ))
    }
}

/// Usage rows lasting longer than `threshold_minutes`.
pub fn long_usage(
    rows: &[CorrectedRow],
    threshold_minutes: f64,
) -> impl Iterator<Item = &CorrectedRow> {
    rows.iter()
        .filter(move |row| row.bin.duration_minutes() > threshold_minutes)
}

/// Audit line for a row flagged by [`long_usage`].
pub fn long_usage_line(row: &BinnedRow, threshold_minutes: f64) -> String {
    format!(
        "Person {} used {} more than {} minutes on {}",
        row.person_id,
        row.app_id,
        threshold_minutes,
        format_utc(row.start)
    )
}

fn format_utc(instant: DateTime<Tz>) -> String {
    instant
        .with_timezone(&Utc)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}
