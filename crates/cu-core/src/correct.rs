//! Overlap repair and session marking.
//!
//! A single forward pass over one person's binned rows, sorted by start:
//! overlapping rows on the same date are truncated, and each row is flagged as
//! starting a new engagement session (per gap threshold) and as an app switch.

use chrono::Duration;

use crate::binning::BinnedRow;

/// Default gap, in seconds, that separates two engagement sessions.
pub const DEFAULT_SESSION_THRESHOLD_SECS: i64 = 60;

/// A binned row with session and app-switch flags.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectedRow {
    pub bin: BinnedRow,
    /// One flag per session threshold, in the order the thresholds were given.
    pub new_session: Vec<bool>,
    pub app_switch: bool,
}

/// Column name for the new-session flag of a threshold, e.g. `engage_60s`.
pub fn engage_column(threshold_secs: i64) -> String {
    format!("engage_{threshold_secs}s")
}

/// Repairs overlaps and marks session starts and app switches.
///
/// Rows without a positive duration (markers included) are dropped, as are
/// rows that truncation leaves empty. `rows` must be sorted by start. This
/// never fails: overlaps are truncated with a warning.
pub fn correct_rows(rows: Vec<BinnedRow>, thresholds_secs: &[i64]) -> Vec<CorrectedRow> {
    let mut corrected: Vec<CorrectedRow> = Vec::with_capacity(rows.len());

    for bin in rows
        .into_iter()
        .filter(|row| row.duration_seconds.is_some_and(|d| d > 0.0))
    {
        let (new_session, app_switch) = loop {
            let Some(prev) = corrected.last_mut() else {
                break (vec![true; thresholds_secs.len()], false);
            };

            let prev_end = prev.bin.end.unwrap_or(prev.bin.start);
            let gap = bin.start - prev_end;
            let app_switch = prev.bin.app_id != bin.app_id;

            if gap < Duration::zero() && prev.bin.date == bin.date {
                tracing::warn!(
                    person = %bin.person_id,
                    open_app = %prev.bin.app_id,
                    open_since = %prev.bin.start.format("%Y-%m-%d %H:%M:%S"),
                    app = %bin.app_id,
                    opened_at = %bin.start.format("%Y-%m-%d %H:%M:%S"),
                    "overlapping usage, closing the earlier app"
                );
                prev.bin.set_end(bin.start);
                if !prev.bin.duration_seconds.is_some_and(|d| d > 0.0) {
                    // Opened at the same instant: the emptied row is replaced
                    // and this one is compared with the row before it.
                    corrected.pop();
                    continue;
                }
                break (vec![false; thresholds_secs.len()], app_switch);
            }

            let new_session = thresholds_secs
                .iter()
                .map(|&threshold| gap > Duration::seconds(threshold))
                .collect();
            break (new_session, app_switch);
        };

        corrected.push(CorrectedRow {
            bin,
            new_session,
            app_switch,
        });
    }

    corrected
}
