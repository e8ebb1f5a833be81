//! Summary command: per-person and cohort tables from preprocessed data.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use cu_core::{
    CategoryLookup, CategoryShare, PersonSummary, RecodeTable, SummaryKind, SummaryOptions,
    SummaryTable, category_shares, share_table, summarise_cohort, summarise_person,
};
use rayon::prelude::*;

use crate::records::{person_files, person_id, read_preprocessed_file};
use crate::tables::{read_recode, write_app_list_file, write_cohort_file, write_summary_file};

/// File receiving the category shares of every person.
pub const PERCENTAGES_FILE: &str = "summary_appcoding_percentages.csv";

#[derive(Debug, Args)]
pub struct SummaryArgs {
    /// Folder with preprocessed or subsetted tables.
    pub input_dir: PathBuf,
    /// Folder the summary tables are written to.
    pub output_dir: PathBuf,

    #[command(flatten)]
    pub files: SummaryFiles,
}

/// Optional inputs and outputs of the summary stage.
#[derive(Debug, Clone, Default, Args)]
pub struct SummaryFiles {
    /// CSV with `full_name` and one column per app category scheme.
    #[arg(long = "recodefile")]
    pub recode_file: Option<PathBuf>,

    /// Where to write the list of every app seen.
    #[arg(long = "fullapplistfile")]
    pub full_app_list_file: Option<PathBuf>,
}

/// What one person contributes to the cohort output.
struct PersonOutput {
    summary: PersonSummary,
    apps: BTreeSet<String>,
    shares: Vec<CategoryShare>,
}

/// Outcome of summarising a folder.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SummaryReport {
    pub files: usize,
    pub persons: usize,
    pub tables: Vec<SummaryKind>,
}

pub fn run<W: Write>(writer: &mut W, args: &SummaryArgs, options: &SummaryOptions) -> Result<()> {
    let report = summarise_dir(&args.input_dir, &args.output_dir, &args.files, options)?;
    writeln!(
        writer,
        "Summarised {} of {} persons into {}",
        report.persons,
        report.files,
        args.output_dir.display()
    )?;
    for kind in &report.tables {
        writeln!(writer, "  {kind}.csv")?;
    }
    Ok(())
}

/// Summarises every person table of `input_dir` into `output_dir`.
pub fn summarise_dir(
    input_dir: &Path,
    output_dir: &Path,
    files: &SummaryFiles,
    options: &SummaryOptions,
) -> Result<SummaryReport> {
    let recode = files.recode_file.as_deref().map(read_recode).transpose()?;
    let paths = person_files(input_dir)?;
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create {}", output_dir.display()))?;
    tracing::info!(files = paths.len(), dir = ?input_dir, "summarising");

    let outputs: Vec<PersonOutput> = paths
        .par_iter()
        .filter_map(|path| match summarise_file(path, options, recode.as_ref()) {
            Ok(output) => Some(output),
            Err(e) => {
                tracing::warn!(path = ?path, error = %format!("{e:#}"), "skipping file");
                None
            }
        })
        .collect();

    let mut tables: BTreeMap<SummaryKind, SummaryTable> = BTreeMap::new();
    let mut apps = BTreeSet::new();
    let mut shares = Vec::new();
    for output in &outputs {
        for (kind, table) in &output.summary.tables {
            tables.entry(*kind).or_default().append(table.clone());
        }
        apps.extend(output.apps.iter().cloned());
        shares.extend(output.shares.iter().cloned());
    }

    for (kind, table) in &tables {
        write_summary_file(&output_dir.join(format!("{kind}.csv")), table)?;
        write_cohort_file(
            &output_dir.join(format!("summary_{kind}.csv")),
            &summarise_cohort(*kind, table),
        )?;
    }
    if recode.is_some() {
        write_cohort_file(&output_dir.join(PERCENTAGES_FILE), &share_table(&shares))?;
    }
    if let Some(path) = &files.full_app_list_file {
        write_app_list_file(path, &apps, recode.as_ref())?;
    }

    Ok(SummaryReport {
        files: paths.len(),
        persons: outputs.iter().filter(|o| !o.summary.is_empty()).count(),
        tables: tables.into_keys().collect(),
    })
}

fn summarise_file(
    path: &Path,
    options: &SummaryOptions,
    recode: Option<&RecodeTable>,
) -> Result<PersonOutput> {
    let person_id = person_id(path)
        .with_context(|| format!("no person id in file name {}", path.display()))?;
    let person = read_preprocessed_file(path, &person_id)?;
    let lookup = recode.map(|table| table as &dyn CategoryLookup);

    let summary = summarise_person(
        &person_id,
        &person.corrected,
        &person.thresholds,
        options,
        lookup,
    );
    let shares = lookup
        .map(|lookup| category_shares(&person_id, person.apps(), lookup))
        .unwrap_or_default();
    Ok(PersonOutput {
        summary,
        apps: person.apps().map(ToString::to_string).collect(),
        shares,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Config;
    use crate::commands::preprocess::preprocess_dir;

    /// Three days of use; only the middle one is inside the reporting window.
    const RAW: &str = "\
app_package_name,application_label,interaction_type,event_timestamp,timezone
com.whatsapp,WhatsApp,Move to Foreground,2024-01-15T09:00:00Z,UTC
com.whatsapp,WhatsApp,Move to Background,2024-01-15T09:10:00Z,UTC
com.whatsapp,WhatsApp,Move to Foreground,2024-01-16T09:00:00Z,UTC
com.whatsapp,WhatsApp,Move to Background,2024-01-16T09:10:00Z,UTC
com.spotify,Spotify,Move to Foreground,2024-01-16T09:20:00Z,UTC
com.spotify,Spotify,Move to Background,2024-01-16T09:25:00Z,UTC
com.whatsapp,WhatsApp,Move to Foreground,2024-01-17T09:00:00Z,UTC
com.whatsapp,WhatsApp,Move to Background,2024-01-17T09:10:00Z,UTC
";

    fn preprocessed(temp: &Path) -> PathBuf {
        let raw = temp.join("raw");
        let pre = temp.join("pre");
        std::fs::create_dir_all(&raw).unwrap();
        std::fs::write(raw.join("ChronicleData-p1.csv"), RAW).unwrap();
        std::fs::write(raw.join("ChronicleData-p2.csv"), RAW).unwrap();
        preprocess_dir(&raw, &pre, &Config::default()).unwrap();
        pre
    }

    #[test]
    fn summary_writes_person_and_cohort_tables() {
        let temp = tempfile::tempdir().unwrap();
        let pre = preprocessed(temp.path());
        let out = temp.path().join("out");

        let report = summarise_dir(&pre, &out, &SummaryFiles::default(), &SummaryOptions::default())
            .unwrap();
        assert_eq!(report.files, 2);
        assert_eq!(report.persons, 2);
        assert_eq!(
            report.tables,
            vec![
                SummaryKind::Daily,
                SummaryKind::Hourly,
                SummaryKind::Week,
                SummaryKind::Weekend,
            ]
        );

        let daily = std::fs::read_to_string(out.join("daily.csv")).unwrap();
        let mut lines = daily.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("participant_id,date,dur,"));
        assert_eq!(lines.clone().count(), 2);
        assert!(lines.all(|line| line.contains(",2024-01-16,15,")));

        let cohort = std::fs::read_to_string(out.join("summary_daily.csv")).unwrap();
        assert!(cohort.starts_with("participant_id,dur_mean,dur_std,"));
        assert!(cohort.trim_end().ends_with(",1"));
        assert!(out.join("summary_hourly.csv").exists());
        assert!(!out.join(PERCENTAGES_FILE).exists());
    }

    #[test]
    fn apps_opened_together_start_one_session() {
        let temp = tempfile::tempdir().unwrap();
        let raw = temp.path().join("raw");
        let pre = temp.path().join("pre");
        let out = temp.path().join("out");
        std::fs::create_dir_all(&raw).unwrap();
        std::fs::write(
            raw.join("ChronicleData-p1.csv"),
            "\
app_package_name,application_label,interaction_type,event_timestamp,timezone
c,C,Move to Foreground,2024-01-15T09:00:00Z,UTC
c,C,Move to Background,2024-01-15T09:05:00Z,UTC
b,B,Move to Foreground,2024-01-16T10:00:00Z,UTC
a,A,Move to Foreground,2024-01-16T10:00:00Z,UTC
android,Android,Power Off,2024-01-16T10:10:00Z,UTC
c,C,Move to Foreground,2024-01-17T09:00:00Z,UTC
c,C,Move to Background,2024-01-17T09:05:00Z,UTC
",
        )
        .unwrap();
        preprocess_dir(&raw, &pre, &Config::default()).unwrap();
        summarise_dir(&pre, &out, &SummaryFiles::default(), &SummaryOptions::default()).unwrap();

        let daily = std::fs::read_to_string(out.join("daily.csv")).unwrap();
        let mut lines = daily.lines();
        let header: Vec<_> = lines.next().unwrap().split(',').collect();
        let row: Vec<_> = lines.next().unwrap().split(',').collect();
        assert!(lines.next().is_none());
        let value = |name: &str| -> f64 {
            let index = header.iter().position(|h| *h == name).unwrap();
            row[index].parse().unwrap()
        };

        assert_eq!(row[1], "2024-01-16");
        assert_eq!(value("dur"), 10.0);
        assert_eq!(value("engage_60s_cnt"), 1.0);
        assert_eq!(value("engage_60s_dur"), 10.0);
    }

    #[test]
    fn summary_with_recode_writes_shares_and_app_list() {
        let temp = tempfile::tempdir().unwrap();
        let pre = preprocessed(temp.path());
        let out = temp.path().join("out");
        let recode = temp.path().join("recode.csv");
        std::fs::write(&recode, "full_name,category\ncom.whatsapp,communication\n").unwrap();
        let files = SummaryFiles {
            recode_file: Some(recode),
            full_app_list_file: Some(temp.path().join("apps.csv")),
        };

        summarise_dir(&pre, &out, &files, &SummaryOptions::default()).unwrap();

        let shares = std::fs::read_to_string(out.join(PERCENTAGES_FILE)).unwrap();
        insta::assert_snapshot!(shares, @r"
        participant_id,communication,unmapped
        p1,0.5,0.5
        p2,0.5,0.5
        ");

        let apps = std::fs::read_to_string(temp.path().join("apps.csv")).unwrap();
        insta::assert_snapshot!(apps, @r"
        full_name,category
        com.spotify,
        com.whatsapp,communication
        ");
        assert!(out.join("appcoding_daily.csv").exists());
        assert!(out.join("summary_appcoding_daily.csv").exists());
    }
}
