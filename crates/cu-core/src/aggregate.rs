//! Per-person aggregation of corrected rows into daily, hourly and
//! quarter-hourly summary tables.
//!
//! Every table is gap-filled: each date of the reporting window gets exactly
//! one row, and each hour/quarter/category column exists on every row, with
//! zeros where nothing happened.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Datelike, Days, NaiveDate};
use chrono_tz::Tz;

use crate::category::CategoryLookup;
use crate::correct::{CorrectedRow, engage_column};
use crate::types::{DayWindow, WeekDefinition};

/// Summary configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryOptions {
    /// Emit quarter-hour tables.
    pub quarterly: bool,
    /// Emit week and weekend tables.
    pub split_week: bool,
    pub week_definition: WeekDefinition,
    /// Emit daytime and nighttime tables.
    pub split_day: bool,
    pub day_window: DayWindow,
    /// Keep the first and last observed days, which are usually partial.
    pub include_start_end: bool,
    /// Cap on the number of reported days, counted from the first one.
    pub max_days: Option<u32>,
}

impl Default for SummaryOptions {
    fn default() -> Self {
        Self {
            quarterly: false,
            split_week: true,
            week_definition: WeekDefinition::default(),
            split_day: false,
            day_window: DayWindow::default(),
            include_start_end: false,
            max_days: None,
        }
    }
}

/// The kinds of table a person summary can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SummaryKind {
    Daily,
    Hourly,
    Quarterly,
    Week,
    Weekend,
    Daytime,
    Nighttime,
    AppcodingDaily,
    AppcodingHourly,
    AppcodingQuarterly,
    AppcodingWeek,
    AppcodingWeekend,
    AppcodingDaytime,
    AppcodingNighttime,
}

impl SummaryKind {
    pub const ALL: [Self; 14] = [
        Self::Daily,
        Self::Hourly,
        Self::Quarterly,
        Self::Week,
        Self::Weekend,
        Self::Daytime,
        Self::Nighttime,
        Self::AppcodingDaily,
        Self::AppcodingHourly,
        Self::AppcodingQuarterly,
        Self::AppcodingWeek,
        Self::AppcodingWeekend,
        Self::AppcodingDaytime,
        Self::AppcodingNighttime,
    ];

    /// File stem used for this kind of table.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Hourly => "hourly",
            Self::Quarterly => "quarterly",
            Self::Week => "week",
            Self::Weekend => "weekend",
            Self::Daytime => "daytime",
            Self::Nighttime => "nighttime",
            Self::AppcodingDaily => "appcoding_daily",
            Self::AppcodingHourly => "appcoding_hourly",
            Self::AppcodingQuarterly => "appcoding_quarterly",
            Self::AppcodingWeek => "appcoding_week",
            Self::AppcodingWeekend => "appcoding_weekend",
            Self::AppcodingDaytime => "appcoding_daytime",
            Self::AppcodingNighttime => "appcoding_nighttime",
        }
    }

    /// Whether cohort summaries report a standard deviation next to the mean.
    #[must_use]
    pub const fn reports_spread(self) -> bool {
        matches!(
            self,
            Self::Daily
                | Self::Week
                | Self::Weekend
                | Self::Quarterly
                | Self::Daytime
                | Self::Nighttime
                | Self::AppcodingDaily
        )
    }
}

impl fmt::Display for SummaryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of a summary table: a person, a date and one value per column.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRow {
    pub person_id: String,
    pub date: NaiveDate,
    pub values: Vec<f64>,
}

/// A wide table keyed by `(person_id, date)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SummaryTable {
    pub columns: Vec<String>,
    pub rows: Vec<SummaryRow>,
}

impl SummaryTable {
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Value of `column` on `date`, if both exist.
    pub fn value(&self, date: NaiveDate, column: &str) -> Option<f64> {
        let index = self.column_index(column)?;
        self.rows
            .iter()
            .find(|row| row.date == date)
            .and_then(|row| row.values.get(index).copied())
    }

    /// Appends the rows of another table.
    ///
    /// Columns the other table lacks read as zero; new columns are appended
    /// and read as zero on existing rows.
    pub fn append(&mut self, other: Self) {
        for column in &other.columns {
            if self.column_index(column).is_none() {
                self.columns.push(column.clone());
                for row in &mut self.rows {
                    row.values.push(0.0);
                }
            }
        }

        let mapping: Vec<Option<usize>> = self
            .columns
            .iter()
            .map(|column| other.column_index(column))
            .collect();
        for row in other.rows {
            let values = mapping
                .iter()
                .map(|index| index.and_then(|i| row.values.get(i).copied()).unwrap_or(0.0))
                .collect();
            self.rows.push(SummaryRow {
                person_id: row.person_id,
                date: row.date,
                values,
            });
        }
    }
}

/// All summary tables of one person.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersonSummary {
    pub person_id: String,
    pub tables: BTreeMap<SummaryKind, SummaryTable>,
}

impl PersonSummary {
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn table(&self, kind: SummaryKind) -> Option<&SummaryTable> {
        self.tables.get(&kind)
    }
}

/// Time resolution of a table's columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Granularity {
    Day,
    Hour,
    Quarter,
}

impl Granularity {
    const fn slots(self) -> usize {
        match self {
            Self::Day => 1,
            Self::Hour => 24,
            Self::Quarter => 96,
        }
    }

    fn slot(self, row: &CorrectedRow) -> usize {
        let hour = row.bin.hour.min(23) as usize;
        let quarter = row.bin.quarter.clamp(1, 4) as usize;
        match self {
            Self::Day => 0,
            Self::Hour => hour,
            Self::Quarter => hour * 4 + quarter - 1,
        }
    }

    fn suffix(self, slot: usize) -> String {
        match self {
            Self::Day => String::new(),
            Self::Hour => format!("_h{slot}"),
            Self::Quarter => format!("_h{}_q{}", slot / 4, slot % 4 + 1),
        }
    }
}

/// Summed metrics of one time bucket.
#[derive(Debug, Clone)]
struct Totals {
    minutes: f64,
    app_switches: f64,
    new_sessions: Vec<f64>,
}

impl Totals {
    fn new(thresholds: usize) -> Self {
        Self {
            minutes: 0.0,
            app_switches: 0.0,
            new_sessions: vec![0.0; thresholds],
        }
    }

    fn add(&mut self, row: &CorrectedRow) {
        self.minutes += row.bin.duration_minutes();
        if row.app_switch {
            self.app_switches += 1.0;
        }
        for (count, flag) in self.new_sessions.iter_mut().zip(&row.new_session) {
            if *flag {
                *count += 1.0;
            }
        }
    }

    /// Values in the order of [`metric_names`].
    fn metrics(&self) -> Vec<f64> {
        let per_minute = if self.minutes > 0.0 {
            self.app_switches / self.minutes
        } else {
            0.0
        };
        let mut values = vec![self.minutes, self.app_switches, per_minute];
        values.extend(&self.new_sessions);
        values
    }
}

fn metric_names(thresholds: &[i64]) -> Vec<String> {
    let mut names = vec![
        "dur".to_string(),
        "appcnt".to_string(),
        "switchpermin".to_string(),
    ];
    names.extend(
        thresholds
            .iter()
            .map(|&t| format!("{}_cnt", engage_column(t))),
    );
    names
}

/// Engagement sessions under one gap threshold.
#[derive(Debug, Clone, PartialEq)]
struct Sessions {
    /// Session index of every row.
    row_session: Vec<usize>,
    /// Span of each session in minutes, from its first start to its last end.
    minutes: Vec<f64>,
}

impl Sessions {
    #[allow(clippy::cast_precision_loss)]
    fn from_flags(rows: &[CorrectedRow], threshold_index: usize) -> Self {
        let mut row_session = Vec::with_capacity(rows.len());
        let mut spans: Vec<(DateTime<Tz>, DateTime<Tz>)> = Vec::new();
        for row in rows {
            let end = row.bin.end.unwrap_or(row.bin.start);
            let starts_new = row
                .new_session
                .get(threshold_index)
                .copied()
                .unwrap_or(false);
            if let Some((_, last_end)) = spans.last_mut().filter(|_| !starts_new) {
                *last_end = end.max(*last_end);
            } else {
                spans.push((row.bin.start, end));
            }
            row_session.push(spans.len() - 1);
        }
        let minutes = spans
            .into_iter()
            .map(|(start, end)| (end - start).num_milliseconds() as f64 / 60_000.0)
            .collect();
        Self {
            row_session,
            minutes,
        }
    }
}

/// Per-person aggregation state.
struct Aggregator<'a> {
    person_id: &'a str,
    rows: &'a [CorrectedRow],
    thresholds: &'a [i64],
    sessions: Vec<Sessions>,
    categories: Option<&'a dyn CategoryLookup>,
}

impl Aggregator<'_> {
    fn usage_table(&self, rows: &[usize], dates: &[NaiveDate], granularity: Granularity) -> SummaryTable {
        let metrics = metric_names(self.thresholds);
        let slots = granularity.slots();
        let mut columns: Vec<String> = metrics
            .iter()
            .flat_map(|metric| (0..slots).map(move |slot| format!("{metric}{}", granularity.suffix(slot))))
            .collect();
        if granularity == Granularity::Day {
            columns.extend(
                self.thresholds
                    .iter()
                    .map(|&t| format!("{}_dur", engage_column(t))),
            );
        }

        let by_date = group_by_date(self.rows, rows);
        let table_rows = dates
            .iter()
            .map(|date| {
                let day_rows = by_date.get(date).map_or(&[][..], Vec::as_slice);
                let mut cells = vec![Totals::new(self.thresholds.len()); slots];
                for &i in day_rows {
                    let row = &self.rows[i];
                    cells[granularity.slot(row)].add(row);
                }
                let per_cell: Vec<Vec<f64>> = cells.iter().map(Totals::metrics).collect();
                let mut values: Vec<f64> = (0..metrics.len())
                    .flat_map(|m| per_cell.iter().map(move |cell| cell[m]))
                    .collect();
                if granularity == Granularity::Day {
                    values.extend(self.mean_session_minutes(day_rows));
                }
                SummaryRow {
                    person_id: self.person_id.to_string(),
                    date: *date,
                    values,
                }
            })
            .collect();

        SummaryTable {
            columns,
            rows: table_rows,
        }
    }

    /// Mean span of the distinct sessions touching `rows`, per threshold.
    #[allow(clippy::cast_precision_loss)]
    fn mean_session_minutes(&self, rows: &[usize]) -> Vec<f64> {
        self.sessions
            .iter()
            .map(|sessions| {
                let distinct: BTreeSet<usize> =
                    rows.iter().map(|&i| sessions.row_session[i]).collect();
                if distinct.is_empty() {
                    return 0.0;
                }
                let total: f64 = distinct.iter().map(|&s| sessions.minutes[s]).sum();
                total / distinct.len() as f64
            })
            .collect()
    }

    fn category_table(
        &self,
        lookup: &dyn CategoryLookup,
        rows: &[usize],
        dates: &[NaiveDate],
        granularity: Granularity,
    ) -> SummaryTable {
        let slots = granularity.slots();
        let schemes: Vec<(&String, Vec<String>)> = lookup
            .columns()
            .iter()
            .map(|column| (column, lookup.output_labels(column)))
            .collect();

        let mut columns = Vec::new();
        let mut offsets = Vec::with_capacity(schemes.len());
        for (column, labels) in &schemes {
            offsets.push(columns.len());
            for label in labels {
                columns.extend(
                    (0..slots).map(|slot| format!("{column}_{label}_dur{}", granularity.suffix(slot))),
                );
            }
        }

        let by_date = group_by_date(self.rows, rows);
        let table_rows = dates
            .iter()
            .map(|date| {
                let mut values = vec![0.0; columns.len()];
                for &i in by_date.get(date).map_or(&[][..], Vec::as_slice) {
                    let row = &self.rows[i];
                    let slot = granularity.slot(row);
                    for ((column, labels), offset) in schemes.iter().zip(&offsets) {
                        let label = lookup.label_or_unmapped(&row.bin.app_id, column);
                        if let Ok(position) = labels.binary_search_by(|l| l.as_str().cmp(label)) {
                            values[offset + position * slots + slot] += row.bin.duration_minutes();
                        }
                    }
                }
                SummaryRow {
                    person_id: self.person_id.to_string(),
                    date: *date,
                    values,
                }
            })
            .collect();

        SummaryTable {
            columns,
            rows: table_rows,
        }
    }

    /// Daily table of a subset of rows, plus its category counterpart.
    fn split_tables(
        &self,
        tables: &mut BTreeMap<SummaryKind, SummaryTable>,
        kinds: (SummaryKind, SummaryKind),
        rows: &[usize],
        dates: &[NaiveDate],
    ) {
        let (kind, appcoding_kind) = kinds;
        let (rows, dates) = if rows.is_empty() {
            tracing::warn!(person = %self.person_id, "no {kind} data");
            (&[][..], &[][..])
        } else {
            (rows, dates)
        };
        tables.insert(kind, self.usage_table(rows, dates, Granularity::Day));
        if let Some(lookup) = self.categories {
            tables.insert(
                appcoding_kind,
                self.category_table(lookup, rows, dates, Granularity::Day),
            );
        }
    }
}

fn group_by_date(all: &[CorrectedRow], rows: &[usize]) -> BTreeMap<NaiveDate, Vec<usize>> {
    let mut grouped: BTreeMap<NaiveDate, Vec<usize>> = BTreeMap::new();
    for &i in rows {
        grouped.entry(all[i].bin.date).or_default().push(i);
    }
    grouped
}

/// Dates to report on, after the boundary and maximum-days policy.
///
/// Without `include_start_end` the first observed start date and the last
/// observed end date are dropped. `max_days` keeps at most that many days
/// from the start of the window.
pub fn reporting_dates(rows: &[CorrectedRow], options: &SummaryOptions) -> Vec<NaiveDate> {
    let first = rows.iter().map(|row| row.bin.date).min();
    let last = rows
        .iter()
        .map(|row| row.bin.end.map_or(row.bin.date, |end| end.date_naive()))
        .max();
    let (Some(first), Some(last)) = (first, last) else {
        return Vec::new();
    };

    let window = if options.include_start_end {
        Some((first, last))
    } else {
        first.succ_opt().zip(last.pred_opt())
    };
    let Some((start, mut end)) = window else {
        return Vec::new();
    };
    if let Some(max_days) = options.max_days {
        match max_days
            .checked_sub(1)
            .and_then(|extra| start.checked_add_days(Days::new(u64::from(extra))))
        {
            Some(cap) => end = end.min(cap),
            None => return Vec::new(),
        }
    }

    start.iter_days().take_while(|date| *date <= end).collect()
}

/// Builds every summary table for one person.
///
/// `rows` are the person's corrected usage rows sorted by start, with one
/// new-session flag per entry of `thresholds`. An empty summary is returned
/// (and a warning logged) when no rows fall inside the reporting window.
pub fn summarise_person(
    person_id: &str,
    rows: &[CorrectedRow],
    thresholds: &[i64],
    options: &SummaryOptions,
    categories: Option<&dyn CategoryLookup>,
) -> PersonSummary {
    let mut summary = PersonSummary {
        person_id: person_id.to_string(),
        tables: BTreeMap::new(),
    };

    let dates = reporting_dates(rows, options);
    let (Some(&first), Some(&last)) = (dates.first(), dates.last()) else {
        tracing::warn!(person = %person_id, "no data");
        return summary;
    };
    let kept: Vec<usize> = rows
        .iter()
        .enumerate()
        .filter(|(_, row)| row.bin.date >= first && row.bin.date <= last)
        .map(|(i, _)| i)
        .collect();
    if kept.is_empty() {
        tracing::warn!(person = %person_id, "no data");
        return summary;
    }

    let aggregator = Aggregator {
        person_id,
        rows,
        thresholds,
        sessions: (0..thresholds.len())
            .map(|t| Sessions::from_flags(rows, t))
            .collect(),
        categories,
    };
    let tables = &mut summary.tables;

    tables.insert(
        SummaryKind::Daily,
        aggregator.usage_table(&kept, &dates, Granularity::Day),
    );
    tables.insert(
        SummaryKind::Hourly,
        aggregator.usage_table(&kept, &dates, Granularity::Hour),
    );
    if options.quarterly {
        tables.insert(
            SummaryKind::Quarterly,
            aggregator.usage_table(&kept, &dates, Granularity::Quarter),
        );
    }

    if let Some(lookup) = categories {
        tables.insert(
            SummaryKind::AppcodingDaily,
            aggregator.category_table(lookup, &kept, &dates, Granularity::Day),
        );
        tables.insert(
            SummaryKind::AppcodingHourly,
            aggregator.category_table(lookup, &kept, &dates, Granularity::Hour),
        );
        if options.quarterly {
            tables.insert(
                SummaryKind::AppcodingQuarterly,
                aggregator.category_table(lookup, &kept, &dates, Granularity::Quarter),
            );
        }
    }

    if options.split_week {
        let definition = options.week_definition;
        let (week, weekend): (Vec<usize>, Vec<usize>) = kept
            .iter()
            .partition(|&&i| rows[i].bin.is_weekday(definition));
        let (week_dates, weekend_dates): (Vec<NaiveDate>, Vec<NaiveDate>) = dates
            .iter()
            .partition(|date| definition.is_weekday(date.weekday()));
        aggregator.split_tables(
            tables,
            (SummaryKind::Week, SummaryKind::AppcodingWeek),
            &week,
            &week_dates,
        );
        aggregator.split_tables(
            tables,
            (SummaryKind::Weekend, SummaryKind::AppcodingWeekend),
            &weekend,
            &weekend_dates,
        );
    }

    if options.split_day {
        let window = options.day_window;
        let (day, night): (Vec<usize>, Vec<usize>) = kept
            .iter()
            .partition(|&&i| window.is_daytime(rows[i].bin.start.time()));
        aggregator.split_tables(
            tables,
            (SummaryKind::Daytime, SummaryKind::AppcodingDaytime),
            &day,
            &dates,
        );
        aggregator.split_tables(
            tables,
            (SummaryKind::Nighttime, SummaryKind::AppcodingNighttime),
            &night,
            &dates,
        );
    }

    summary
}
