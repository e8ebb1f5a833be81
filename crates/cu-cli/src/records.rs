//! Reading raw exports and reading/writing per-person preprocessed tables.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use cu_core::{BinnedRow, CorrectedRow, RawEvent, StoredBin, UsageLabel, engage_column};
use serde::Deserialize;

/// Prefix shared by every per-person file name.
pub const FILE_PREFIX: &str = "ChronicleData";
pub const PREPROCESSED_PREFIX: &str = "ChronicleData_preprocessed";
pub const SUBSETTED_PREFIX: &str = "ChronicleData_subsetted";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f%:z";

/// Per-person CSV files in `dir`, sorted by name.
pub fn person_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries =
        std::fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry
            .with_context(|| format!("failed to read {}", dir.display()))?
            .path();
        let is_person_file = path.is_file()
            && path.extension().is_some_and(|ext| ext == "csv")
            && path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(FILE_PREFIX));
        if is_person_file {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Person id encoded in a file name: everything after the first `-` of the stem.
///
/// `ChronicleData-abc-1.csv` and `ChronicleData_preprocessed-abc-1.csv` both
/// give `abc-1`.
pub fn person_id(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    let (_, id) = stem.split_once('-')?;
    (!id.is_empty()).then(|| id.to_string())
}

/// File name for a person's table written with `prefix`.
pub fn person_file_name(prefix: &str, person_id: &str) -> String {
    format!("{prefix}-{person_id}.csv")
}

/// A row of a raw Chronicle export. Legacy column names are accepted.
#[derive(Debug, Deserialize)]
struct RawRecord {
    #[serde(default, alias = "app_fullname", alias = "general.fullname")]
    app_package_name: Option<String>,
    #[serde(default, alias = "app_title")]
    application_label: Option<String>,
    #[serde(default, alias = "app_record_type", alias = "ol.recordtype")]
    interaction_type: Option<String>,
    #[serde(default, alias = "app_date_logged", alias = "ol.datelogged")]
    event_timestamp: Option<String>,
    #[serde(default, alias = "app_timezone", alias = "ol.timezone")]
    timezone: Option<String>,
    #[serde(default)]
    participant_id: Option<String>,
}

impl RawRecord {
    fn into_event(self, default_person: &str) -> RawEvent {
        let person_id = self
            .participant_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| default_person.to_string());
        RawEvent {
            app_id: self.app_package_name,
            title: self.application_label,
            record_type: self.interaction_type,
            timestamp: self.event_timestamp,
            timezone: self.timezone,
            person_id,
        }
    }
}

/// Reads the raw events of one export file.
pub fn read_raw_events(path: &Path, person_id: &str) -> Result<Vec<RawEvent>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    parse_raw_events(file, person_id).with_context(|| format!("failed to parse {}", path.display()))
}

fn parse_raw_events<R: Read>(reader: R, person_id: &str) -> Result<Vec<RawEvent>> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let mut events = Vec::new();
    for (idx, record) in rdr.deserialize::<RawRecord>().enumerate() {
        let record = record.with_context(|| format!("invalid row {}", idx + 1))?;
        events.push(record.into_event(person_id));
    }
    Ok(events)
}

/// One person's preprocessed rows.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredPerson {
    pub person_id: String,
    /// Session thresholds the flags were computed with, in column order.
    pub thresholds: Vec<i64>,
    pub corrected: Vec<CorrectedRow>,
    pub markers: Vec<BinnedRow>,
}

impl StoredPerson {
    /// App of every usage row, repeats included.
    pub fn apps(&self) -> impl Iterator<Item = &str> {
        self.corrected.iter().map(|row| row.bin.app_id.as_str())
    }
}

const PARTICIPANT: &str = "participant_id";
const APP: &str = "app_fullname";
const TITLE: &str = "app_title";
const START: &str = "start_timestamp";
const END: &str = "end_timestamp";
const TIMEZONE: &str = "timezone";
const LABEL: &str = "interaction_type";
const SWITCH: &str = "switch_app";

fn header(thresholds: &[i64]) -> Vec<String> {
    let mut columns: Vec<String> = [
        PARTICIPANT,
        APP,
        TITLE,
        START,
        END,
        TIMEZONE,
        "date",
        "day",
        "weekdayMF",
        "weekdayMTh",
        "weekdaySTh",
        "hour",
        "quarter",
        "duration_seconds",
        LABEL,
    ]
    .iter()
    .map(ToString::to_string)
    .collect();
    columns.extend(thresholds.iter().map(|t| engage_column(*t)));
    columns.push(SWITCH.to_string());
    columns
}

fn flag(value: bool) -> String {
    let flag = if value { "1" } else { "0" };
    flag.to_string()
}

fn bin_fields(row: &BinnedRow) -> Vec<String> {
    vec![
        row.person_id.clone(),
        row.app_id.clone(),
        row.title.clone(),
        row.start.format(TIMESTAMP_FORMAT).to_string(),
        row.end
            .map(|end| end.format(TIMESTAMP_FORMAT).to_string())
            .unwrap_or_default(),
        row.start.timezone().name().to_string(),
        row.date.format("%Y-%m-%d").to_string(),
        row.day.to_string(),
        flag(row.weekday_mf),
        flag(row.weekday_mth),
        flag(row.weekday_sth),
        row.hour.to_string(),
        row.quarter.to_string(),
        row.duration_seconds.map(|d| d.to_string()).unwrap_or_default(),
        row.label.to_string(),
    ]
}

/// Writes usage rows and markers, interleaved by start time.
///
/// Markers leave the session and switch columns empty.
pub fn write_preprocessed<W: Write>(writer: W, person: &StoredPerson) -> Result<()> {
    let mut rows: Vec<(&BinnedRow, Option<&CorrectedRow>)> = person
        .corrected
        .iter()
        .map(|row| (&row.bin, Some(row)))
        .chain(person.markers.iter().map(|row| (row, None)))
        .collect();
    rows.sort_by_key(|(bin, _)| bin.start);

    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(header(&person.thresholds))?;
    for (bin, corrected) in rows {
        let mut fields = bin_fields(bin);
        match corrected {
            Some(row) => {
                fields.extend(row.new_session.iter().map(|f| flag(*f)));
                fields.push(flag(row.app_switch));
            }
            None => fields.extend(std::iter::repeat_n(String::new(), person.thresholds.len() + 1)),
        }
        wtr.write_record(&fields)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Writes a person's table to `path`.
pub fn write_preprocessed_file(path: &Path, person: &StoredPerson) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    write_preprocessed(file, person).with_context(|| format!("failed to write {}", path.display()))
}

/// Reads a person's table from `path`.
pub fn read_preprocessed_file(path: &Path, person_id: &str) -> Result<StoredPerson> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    read_preprocessed(file, person_id).with_context(|| format!("failed to parse {}", path.display()))
}

/// Column positions of a preprocessed table, resolved from its header.
struct Columns {
    participant: Option<usize>,
    app: usize,
    title: Option<usize>,
    start: usize,
    end: Option<usize>,
    timezone: Option<usize>,
    label: usize,
    engage: Vec<(i64, usize)>,
    switch: Option<usize>,
}

impl Columns {
    fn resolve(headers: &csv::StringRecord) -> Result<Self> {
        let engage = headers
            .iter()
            .enumerate()
            .filter_map(|(index, name)| engage_threshold(name).map(|t| (t, index)))
            .collect();
        Ok(Self {
            participant: find_column(headers, &[PARTICIPANT, "person"]),
            app: require_column(headers, &[APP, "app_package_name", "full_name"])?,
            title: find_column(headers, &[TITLE, "application_label"]),
            start: require_column(headers, &[START, "start"])?,
            end: find_column(headers, &[END, "end"]),
            timezone: find_column(headers, &[TIMEZONE, "app_timezone"]),
            label: require_column(headers, &[LABEL, "app_usage_flag"])?,
            engage,
            switch: find_column(headers, &[SWITCH]),
        })
    }
}

fn find_column(headers: &csv::StringRecord, names: &[&str]) -> Option<usize> {
    headers.iter().position(|h| names.contains(&h.trim()))
}

fn require_column(headers: &csv::StringRecord, names: &[&str]) -> Result<usize> {
    match find_column(headers, names) {
        Some(index) => Ok(index),
        None => bail!("missing column {}", names[0]),
    }
}

/// Threshold of an `engage_<T>s` (or legacy `app_engage_<T>s`) column.
fn engage_threshold(column: &str) -> Option<i64> {
    let column = column.trim();
    let column = column.strip_prefix("app_").unwrap_or(column);
    column
        .strip_prefix("engage_")?
        .strip_suffix('s')?
        .parse()
        .ok()
}

fn is_set(value: &str) -> bool {
    matches!(value.trim(), "1" | "1.0" | "true" | "True")
}

fn read_preprocessed<R: Read>(reader: R, person_id: &str) -> Result<StoredPerson> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let columns = Columns::resolve(rdr.headers()?)?;

    let mut corrected = Vec::new();
    let mut markers = Vec::new();
    for (idx, record) in rdr.records().enumerate() {
        let record = record.with_context(|| format!("invalid row {}", idx + 1))?;
        let field = |index: Option<usize>| index.and_then(|i| record.get(i)).unwrap_or("");
        let label: UsageLabel = field(Some(columns.label))
            .parse()
            .with_context(|| format!("invalid interaction type on row {}", idx + 1))?;
        let end = field(columns.end).trim();
        let timezone = field(columns.timezone).trim();
        let row_person = field(columns.participant).trim();
        let bin = StoredBin {
            person_id: if row_person.is_empty() { person_id } else { row_person },
            app_id: field(Some(columns.app)),
            title: field(columns.title),
            start: field(Some(columns.start)).trim(),
            end: (!end.is_empty()).then_some(end),
            timezone: if timezone.is_empty() { "UTC" } else { timezone },
            label,
        }
        .restore()
        .with_context(|| format!("invalid row {}", idx + 1))?;

        if bin.is_marker() {
            markers.push(bin);
        } else if bin.duration_seconds.is_some_and(|d| d > 0.0) {
            corrected.push(CorrectedRow {
                new_session: columns
                    .engage
                    .iter()
                    .map(|(_, index)| is_set(field(Some(*index))))
                    .collect(),
                app_switch: is_set(field(columns.switch)),
                bin,
            });
        } else {
            tracing::debug!(person = %person_id, row = idx + 1, "skipping row without duration");
        }
    }
    corrected.sort_by_key(|row| row.bin.start);

    Ok(StoredPerson {
        person_id: person_id.to_string(),
        thresholds: columns.engage.iter().map(|(t, _)| *t).collect(),
        corrected,
        markers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cu_core::{PreprocessOptions, preprocess_person};

    const RAW: &str = "\
app_package_name,application_label,interaction_type,event_timestamp,timezone,extra
com.whatsapp,WhatsApp,Move to Foreground,2024-01-15T09:00:00.000Z,Europe/Brussels,x
com.whatsapp,WhatsApp,Move to Background,2024-01-15T09:20:00.000Z,Europe/Brussels,x
android,Android,Screen Interactive,2024-01-15T09:30:00.000Z,Europe/Brussels,x
com.spotify,Spotify,Move to Foreground,2024-01-15T09:40:00.000Z,Europe/Brussels,x
com.spotify,,Move to Background,2024-01-15T09:41:00.000Z,Europe/Brussels,x
";

    #[test]
    fn person_id_comes_from_file_name() {
        assert_eq!(
            person_id(Path::new("raw/ChronicleData-abc-1.csv")).as_deref(),
            Some("abc-1")
        );
        assert_eq!(
            person_id(Path::new("ChronicleData_preprocessed-p7.csv")).as_deref(),
            Some("p7")
        );
        assert_eq!(person_id(Path::new("ChronicleData.csv")), None);
        assert_eq!(person_file_name(SUBSETTED_PREFIX, "p7"), "ChronicleData_subsetted-p7.csv");
    }

    #[test]
    fn person_files_are_filtered_and_sorted() {
        let temp = tempfile::tempdir().unwrap();
        for name in [
            "ChronicleData-b.csv",
            "ChronicleData-a.csv",
            "notes.csv",
            "ChronicleData-c.txt",
        ] {
            std::fs::write(temp.path().join(name), "").unwrap();
        }
        let files = person_files(temp.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["ChronicleData-a.csv", "ChronicleData-b.csv"]);
    }

    #[test]
    fn raw_rows_are_read_with_blank_fields_as_missing() {
        let events = parse_raw_events(RAW.as_bytes(), "p1").unwrap();
        assert_eq!(events.len(), 5);
        assert_eq!(events[0].app_id.as_deref(), Some("com.whatsapp"));
        assert_eq!(events[0].record_type.as_deref(), Some("Move to Foreground"));
        assert_eq!(events[0].person_id, "p1");
        assert_eq!(events[4].title, None);
    }

    #[test]
    fn legacy_raw_columns_are_accepted() {
        let raw = "\
participant_id,app_fullname,app_title,app_record_type,app_date_logged,app_timezone
p9,com.whatsapp,WhatsApp,Move to Foreground,2024-01-15T09:00:00Z,UTC
";
        let events = parse_raw_events(raw.as_bytes(), "fallback").unwrap();
        assert_eq!(events[0].person_id, "p9");
        assert_eq!(events[0].timezone.as_deref(), Some("UTC"));
        assert_eq!(events[0].timestamp.as_deref(), Some("2024-01-15T09:00:00Z"));
    }

    fn stored() -> StoredPerson {
        let events = parse_raw_events(RAW.as_bytes(), "p1").unwrap();
        let options = PreprocessOptions {
            precision_secs: 900,
            session_thresholds: vec![30, 60],
        };
        let output = preprocess_person("p1", events, &options).unwrap().unwrap();
        StoredPerson {
            person_id: "p1".to_string(),
            thresholds: options.session_thresholds,
            corrected: output.corrected,
            markers: output.markers,
        }
    }

    #[test]
    fn preprocessed_table_layout() {
        let mut out = Vec::new();
        write_preprocessed(&mut out, &stored()).unwrap();
        let out = String::from_utf8(out).unwrap();

        insta::assert_snapshot!(out, @r"
        participant_id,app_fullname,app_title,start_timestamp,end_timestamp,timezone,date,day,weekdayMF,weekdayMTh,weekdaySTh,hour,quarter,duration_seconds,interaction_type,engage_30s,engage_60s,switch_app
        p1,com.whatsapp,WhatsApp,2024-01-15T10:00:00.000+01:00,2024-01-15T10:15:00.000+01:00,Europe/Brussels,2024-01-15,2,1,1,1,10,1,900,App Usage,1,1,0
        p1,com.whatsapp,WhatsApp,2024-01-15T10:15:00.000+01:00,2024-01-15T10:20:00.000+01:00,Europe/Brussels,2024-01-15,2,1,1,1,10,2,300,App Usage,0,0,0
        p1,android,Android,2024-01-15T10:30:00.000+01:00,,Europe/Brussels,2024-01-15,2,1,1,1,10,3,,Screen Interactive,,,
        p1,com.spotify,Spotify,2024-01-15T10:40:00.000+01:00,2024-01-15T10:41:00.000+01:00,Europe/Brussels,2024-01-15,2,1,1,1,10,3,60,App Usage,1,1,1
        ");
    }

    #[test]
    fn preprocessed_table_reads_back() {
        let person = stored();
        let mut out = Vec::new();
        write_preprocessed(&mut out, &person).unwrap();

        let back = read_preprocessed(out.as_slice(), "p1").unwrap();
        assert_eq!(back, person);
    }

    #[test]
    fn legacy_flag_columns_are_recognised() {
        let table = "\
participant_id,app_fullname,start_timestamp,end_timestamp,timezone,interaction_type,app_engage_60s,switch_app
p1,a,2024-01-15T10:00:00Z,2024-01-15T10:05:00Z,UTC,App Usage,1,0
p1,b,2024-01-15T10:05:00Z,2024-01-15T10:05:00Z,UTC,App Usage,0,1
";
        let person = read_preprocessed(table.as_bytes(), "p1").unwrap();
        assert_eq!(person.thresholds, vec![60]);
        assert_eq!(person.corrected.len(), 1);
        assert_eq!(person.corrected[0].new_session, vec![true]);
        assert_eq!(person.corrected[0].bin.title, "");
        assert_eq!(engage_threshold("engage_300s"), Some(300));
        assert_eq!(engage_threshold("engaged"), None);
    }

    #[test]
    fn missing_required_column_is_an_error() {
        let table = "participant_id,start_timestamp\np1,2024-01-15T10:00:00Z\n";
        let err = read_preprocessed(table.as_bytes(), "p1").unwrap_err();
        assert!(err.to_string().contains("app_fullname"));
    }
}
