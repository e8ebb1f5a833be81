//! App list files and summary table output.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use anyhow::{Context, Result, bail};
use cu_core::{CategoryLookup, CohortTable, RecodeTable, SummaryTable};

/// Column holding the app id in recode, subset and remove files.
pub const FULL_NAME: &str = "full_name";
const PARTICIPANT: &str = "participant_id";

fn open(path: &Path) -> Result<File> {
    File::open(path).with_context(|| format!("failed to open {}", path.display()))
}

fn create(path: &Path) -> Result<File> {
    File::create(path).with_context(|| format!("failed to create {}", path.display()))
}

/// Header positions of `full_name` and of every other column.
fn split_header(headers: &csv::StringRecord) -> Result<(usize, Vec<(usize, String)>)> {
    let Some(key) = headers.iter().position(|h| h.trim() == FULL_NAME) else {
        bail!("missing column {FULL_NAME}");
    };
    let others = headers
        .iter()
        .enumerate()
        .filter(|(index, _)| *index != key)
        .map(|(index, name)| (index, name.trim().to_string()))
        .collect();
    Ok((key, others))
}

/// Reads a recode file: `full_name` plus one column per category scheme.
pub fn read_recode(path: &Path) -> Result<RecodeTable> {
    parse_recode(open(path)?).with_context(|| format!("failed to parse {}", path.display()))
}

fn parse_recode<R: Read>(reader: R) -> Result<RecodeTable> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let (key, schemes) = split_header(rdr.headers()?)?;
    let mut table = RecodeTable::new(schemes.iter().map(|(_, name)| name.clone()).collect());
    for record in rdr.records() {
        let record = record?;
        let Some(app) = record.get(key).map(str::trim).filter(|app| !app.is_empty()) else {
            continue;
        };
        let labels = schemes
            .iter()
            .filter_map(|(index, name)| {
                record
                    .get(*index)
                    .map(|label| (name.clone(), label.trim().to_string()))
            })
            .collect();
        table.insert(app, labels);
    }
    Ok(table)
}

/// Reads a subset file as `(app, flag)` pairs from its first flag column.
pub fn read_subset_list(path: &Path) -> Result<Vec<(String, String)>> {
    parse_subset_list(open(path)?).with_context(|| format!("failed to parse {}", path.display()))
}

fn parse_subset_list<R: Read>(reader: R) -> Result<Vec<(String, String)>> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let (key, flags) = split_header(rdr.headers()?)?;
    let Some((flag, column)) = flags.first().cloned() else {
        bail!("subset file has no flag column next to {FULL_NAME}");
    };
    if flags.len() > 1 {
        tracing::warn!(
            column = %column,
            ignored = flags.len() - 1,
            "subset file has more than one flag column, only the first is used"
        );
    }

    let mut entries = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let app = record.get(key).unwrap_or_default().trim();
        if app.is_empty() {
            continue;
        }
        entries.push((app.to_string(), record.get(flag).unwrap_or_default().to_string()));
    }
    Ok(entries)
}

/// Reads the `full_name` column of a remove file.
pub fn read_remove_list(path: &Path) -> Result<Vec<String>> {
    parse_remove_list(open(path)?).with_context(|| format!("failed to parse {}", path.display()))
}

fn parse_remove_list<R: Read>(reader: R) -> Result<Vec<String>> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let (key, _) = split_header(rdr.headers()?)?;
    let mut apps = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let app = record.get(key).unwrap_or_default().trim();
        if !app.is_empty() {
            apps.push(app.to_string());
        }
    }
    Ok(apps)
}

/// Writes a per-day table, keyed by person and date.
pub fn write_summary<W: Write>(writer: W, table: &SummaryTable) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    let mut header = vec![PARTICIPANT.to_string(), "date".to_string()];
    header.extend(table.columns.iter().cloned());
    wtr.write_record(&header)?;
    for row in &table.rows {
        let mut fields = vec![row.person_id.clone(), row.date.format("%Y-%m-%d").to_string()];
        fields.extend(row.values.iter().map(ToString::to_string));
        wtr.write_record(&fields)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Writes a per-person table. Undefined values are left empty.
pub fn write_cohort<W: Write>(writer: W, table: &CohortTable) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    let mut header = vec![PARTICIPANT.to_string()];
    header.extend(table.columns.iter().cloned());
    wtr.write_record(&header)?;
    for row in &table.rows {
        let mut fields = vec![row.person_id.clone()];
        fields.extend(
            row.values
                .iter()
                .map(|value| value.map(|v| v.to_string()).unwrap_or_default()),
        );
        wtr.write_record(&fields)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Writes every app seen, with its recode labels when a recode table is given.
///
/// Apps only present in the recode table are listed too.
pub fn write_app_list<W: Write>(
    writer: W,
    seen: &BTreeSet<String>,
    recode: Option<&RecodeTable>,
) -> Result<()> {
    let mut apps: BTreeSet<&str> = seen.iter().map(String::as_str).collect();
    let columns: &[String] = match recode {
        Some(table) => {
            apps.extend(table.apps());
            table.columns()
        }
        None => &[],
    };

    let mut wtr = csv::Writer::from_writer(writer);
    let mut header = vec![FULL_NAME.to_string()];
    header.extend(columns.iter().cloned());
    wtr.write_record(&header)?;
    let empty = BTreeMap::new();
    for app in apps {
        let labels = recode.and_then(|table| table.labels(app)).unwrap_or(&empty);
        let mut fields = vec![app.to_string()];
        fields.extend(
            columns
                .iter()
                .map(|column| labels.get(column).cloned().unwrap_or_default()),
        );
        wtr.write_record(&fields)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_summary_file(path: &Path, table: &SummaryTable) -> Result<()> {
    write_summary(create(path)?, table).with_context(|| format!("failed to write {}", path.display()))
}

pub fn write_cohort_file(path: &Path, table: &CohortTable) -> Result<()> {
    write_cohort(create(path)?, table).with_context(|| format!("failed to write {}", path.display()))
}

pub fn write_app_list_file(
    path: &Path,
    seen: &BTreeSet<String>,
    recode: Option<&RecodeTable>,
) -> Result<()> {
    write_app_list(create(path)?, seen, recode)
        .with_context(|| format!("failed to write {}", path.display()))
}
