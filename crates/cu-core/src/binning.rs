//! Precision binning of usage intervals.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike};
use chrono_tz::Tz;

use crate::reconstruct::UsageInterval;
use crate::record_type::UsageLabel;
use crate::types::WeekDefinition;

/// Default bin width: one quarter hour.
pub const DEFAULT_PRECISION_SECS: i64 = 900;

/// One precision slice of a usage interval, with calendar metadata of its start.
#[derive(Debug, Clone, PartialEq)]
pub struct BinnedRow {
    pub person_id: String,
    pub app_id: String,
    pub title: String,
    pub start: DateTime<Tz>,
    /// `None` for markers.
    pub end: Option<DateTime<Tz>>,
    /// Local calendar date of `start`.
    pub date: NaiveDate,
    /// Day of week, Sunday = 1 through Saturday = 7.
    pub day: u32,
    pub weekday_mf: bool,
    pub weekday_mth: bool,
    pub weekday_sth: bool,
    pub hour: u32,
    /// Quarter of the hour, 1 through 4.
    pub quarter: u32,
    /// `None` for markers.
    pub duration_seconds: Option<f64>,
    pub label: UsageLabel,
}

impl BinnedRow {
    /// Builds a row, deriving calendar fields and duration from `start` and `end`.
    pub fn new(
        person_id: String,
        app_id: String,
        title: String,
        start: DateTime<Tz>,
        end: Option<DateTime<Tz>>,
        label: UsageLabel,
    ) -> Self {
        let weekday = start.weekday();
        Self {
            person_id,
            app_id,
            title,
            start,
            end,
            date: start.date_naive(),
            day: weekday.number_from_sunday(),
            weekday_mf: WeekDefinition::MondayFriday.is_weekday(weekday),
            weekday_mth: WeekDefinition::MondayThursday.is_weekday(weekday),
            weekday_sth: WeekDefinition::SundayThursday.is_weekday(weekday),
            hour: start.hour(),
            quarter: start.minute() / 15 + 1,
            duration_seconds: end.map(|end| seconds_between(start, end)),
            label,
        }
    }

    /// Moves the end of the row, keeping the duration in step.
    pub fn set_end(&mut self, end: DateTime<Tz>) {
        self.end = Some(end);
        self.duration_seconds = Some(seconds_between(self.start, end));
    }

    pub fn duration_minutes(&self) -> f64 {
        self.duration_seconds.unwrap_or(0.0) / 60.0
    }

    pub const fn is_marker(&self) -> bool {
        self.label.is_marker()
    }

    /// Whether the row's date counts as a week day under `definition`.
    pub const fn is_weekday(&self, definition: WeekDefinition) -> bool {
        match definition {
            WeekDefinition::MondayFriday => self.weekday_mf,
            WeekDefinition::MondayThursday => self.weekday_mth,
            WeekDefinition::SundayThursday => self.weekday_sth,
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn seconds_between(start: DateTime<Tz>, end: DateTime<Tz>) -> f64 {
    (end - start).num_milliseconds() as f64 / 1000.0
}

/// Splits an interval into precision-wide rows.
///
/// The start is rounded down to a multiple of `precision_secs` within its hour.
/// The first row starts at the true start and the last row ends at the true
/// end; interior rows are exactly `precision_secs` wide. Markers produce a
/// single row without end or duration. A non-positive precision yields a single
/// row spanning the whole interval.
pub fn bin_interval(interval: &UsageInterval, precision_secs: i64) -> Vec<BinnedRow> {
    let make_row = |start, end| {
        BinnedRow::new(
            interval.person_id.clone(),
            interval.app_id.clone(),
            interval.title.clone(),
            start,
            end,
            interval.label,
        )
    };

    if interval.is_marker() {
        return vec![make_row(interval.start, None)];
    }
    if precision_secs <= 0 {
        return vec![make_row(interval.start, Some(interval.end))];
    }

    let (start, end) = (interval.start, interval.end);
    let precision = Duration::seconds(precision_secs);
    let into_hour = i64::from(start.minute() * 60 + start.second());
    let rounded = start
        - Duration::seconds(into_hour % precision_secs)
        - Duration::nanoseconds(i64::from(start.nanosecond()));
    let slices = ((end - rounded).num_seconds() / precision_secs).max(0);

    let mut rows = Vec::new();
    let mut boundary = rounded;
    for slice in 0..=slices {
        let slice_start = if slice == 0 { start } else { boundary };
        boundary += precision;
        let slice_end = if slice == slices { end } else { boundary };
        if slice > 0 && slice == slices && slice_start == end {
            break;
        }
        rows.push(make_row(slice_start, Some(slice_end)));
    }
    rows
}
