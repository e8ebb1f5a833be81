//! Preprocess command: raw exports to per-person binned usage tables.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use cu_core::{long_usage, long_usage_line, preprocess_person};
use rayon::prelude::*;

use crate::Config;
use crate::records::{
    PREPROCESSED_PREFIX, StoredPerson, person_file_name, person_files, person_id,
    read_raw_events, write_preprocessed_file,
};

#[derive(Debug, Args)]
pub struct PreprocessArgs {
    /// Folder with raw `ChronicleData-<id>.csv` exports.
    pub input_dir: PathBuf,
    /// Folder the preprocessed tables are written to.
    pub preproc_dir: PathBuf,
}

/// Outcome of preprocessing a folder.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PreprocessReport {
    pub files: usize,
    pub written: usize,
    pub log_lines: usize,
}

pub fn run<W: Write>(writer: &mut W, args: &PreprocessArgs, config: &Config) -> Result<()> {
    let report = preprocess_dir(&args.input_dir, &args.preproc_dir, config)?;
    writeln!(
        writer,
        "Preprocessed {} of {} files into {}",
        report.written,
        report.files,
        args.preproc_dir.display()
    )?;
    Ok(())
}

/// Preprocesses every person file of `input_dir` into `output_dir`.
///
/// Persons that fail are logged and skipped.
pub fn preprocess_dir(input_dir: &Path, output_dir: &Path, config: &Config) -> Result<PreprocessReport> {
    let files = person_files(input_dir)?;
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create {}", output_dir.display()))?;
    tracing::info!(files = files.len(), dir = ?input_dir, "preprocessing");

    let thresholds = &config.log_options.log_exceed_durations_minutes;
    let outcomes: Vec<Vec<(usize, String)>> = files
        .par_iter()
        .filter_map(|path| match preprocess_file(path, output_dir, config) {
            Ok(Some(person)) => Some(long_usage_lines(&person, thresholds)),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(path = ?path, error = %format!("{e:#}"), "skipping file");
                None
            }
        })
        .collect();

    let mut report = PreprocessReport {
        files: files.len(),
        written: outcomes.len(),
        log_lines: 0,
    };
    if let Some(log_dir) = &config.log_dir {
        report.log_lines = append_long_usage(log_dir, thresholds, outcomes)?;
    }
    Ok(report)
}

fn preprocess_file(path: &Path, output_dir: &Path, config: &Config) -> Result<Option<StoredPerson>> {
    let person_id = person_id(path)
        .with_context(|| format!("no person id in file name {}", path.display()))?;
    let events = read_raw_events(path, &person_id)?;
    let options = config.preprocess_options();
    let Some(output) = preprocess_person(&person_id, events, &options)
        .with_context(|| format!("failed to preprocess person {person_id}"))?
    else {
        return Ok(None);
    };

    let person = StoredPerson {
        person_id,
        thresholds: options.session_thresholds,
        corrected: output.corrected,
        markers: output.markers,
    };
    let target = output_dir.join(person_file_name(PREPROCESSED_PREFIX, &person.person_id));
    write_preprocessed_file(&target, &person)?;
    tracing::debug!(person = %person.person_id, rows = person.corrected.len(), "wrote preprocessed table");
    Ok(Some(person))
}

/// Long-usage lines of one person, tagged with the index of their threshold.
fn long_usage_lines(person: &StoredPerson, thresholds: &[f64]) -> Vec<(usize, String)> {
    thresholds
        .iter()
        .enumerate()
        .flat_map(|(index, &threshold)| {
            long_usage(&person.corrected, threshold)
                .map(move |row| (index, long_usage_line(&row.bin, threshold)))
        })
        .collect()
}

/// File collecting the long-usage lines of one threshold.
pub fn long_usage_log_name(threshold_minutes: f64) -> String {
    format!("log_exceed_durations_minutes_{threshold_minutes}.txt")
}

fn append_long_usage(
    log_dir: &Path,
    thresholds: &[f64],
    outcomes: Vec<Vec<(usize, String)>>,
) -> Result<usize> {
    let mut by_threshold: BTreeMap<usize, Vec<String>> = BTreeMap::new();
    for (index, line) in outcomes.into_iter().flatten() {
        by_threshold.entry(index).or_default().push(line);
    }
    if thresholds.is_empty() {
        return Ok(0);
    }

    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("failed to create {}", log_dir.display()))?;
    let mut written = 0;
    for (index, threshold) in thresholds.iter().enumerate() {
        let path = log_dir.join(long_usage_log_name(*threshold));
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        for line in by_threshold.remove(&index).unwrap_or_default() {
            writeln!(file, "{line}").with_context(|| format!("failed to write {}", path.display()))?;
            written += 1;
        }
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogOptions;

    const RAW: &str = "\
app_package_name,application_label,interaction_type,event_timestamp,timezone
com.whatsapp,WhatsApp,Move to Foreground,2024-01-15T09:00:00Z,UTC
com.whatsapp,WhatsApp,Move to Background,2024-01-15T09:40:00Z,UTC
";

    #[test]
    fn preprocess_writes_tables_and_skips_bad_files() {
        let temp = tempfile::tempdir().unwrap();
        let input = temp.path().join("raw");
        let output = temp.path().join("preprocessed");
        std::fs::create_dir_all(&input).unwrap();
        std::fs::write(input.join("ChronicleData-p1.csv"), RAW).unwrap();
        std::fs::write(
            input.join("ChronicleData-p2.csv"),
            "app_package_name,interaction_type,event_timestamp,timezone\na,Move to Foreground,yesterday,UTC\n",
        )
        .unwrap();

        let config = Config {
            log_dir: Some(temp.path().join("logs")),
            log_options: LogOptions {
                log_exceed_durations_minutes: vec![30.0, 60.0],
            },
            precision: 3600,
            ..Config::default()
        };
        let report = preprocess_dir(&input, &output, &config).unwrap();

        assert_eq!(
            report,
            PreprocessReport {
                files: 2,
                written: 1,
                log_lines: 1,
            }
        );
        assert!(output.join("ChronicleData_preprocessed-p1.csv").exists());
        assert!(!output.join("ChronicleData_preprocessed-p2.csv").exists());

        let log = std::fs::read_to_string(
            temp.path().join("logs").join("log_exceed_durations_minutes_30.txt"),
        )
        .unwrap();
        assert_eq!(
            log,
            "Person p1 used com.whatsapp more than 30 minutes on 2024-01-15 09:00:00\n"
        );
        let log_60 = std::fs::read_to_string(
            temp.path().join("logs").join("log_exceed_durations_minutes_60.txt"),
        )
        .unwrap();
        assert!(log_60.is_empty());
    }

    #[test]
    fn run_reports_counts() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::write(temp.path().join("ChronicleData-p1.csv"), RAW).unwrap();
        let args = PreprocessArgs {
            input_dir: temp.path().to_path_buf(),
            preproc_dir: temp.path().join("out"),
        };
        let mut output = Vec::new();
        run(&mut output, &args, &Config::default()).unwrap();

        let output = String::from_utf8(output).unwrap();
        assert!(output.starts_with("Preprocessed 1 of 1 files into "));
    }
}
