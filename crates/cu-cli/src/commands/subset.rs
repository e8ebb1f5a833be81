//! Subset command: keep or drop apps in preprocessed tables.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use cu_core::AppFilter;
use rayon::prelude::*;

use crate::records::{
    SUBSETTED_PREFIX, person_file_name, person_files, person_id, read_preprocessed_file,
    write_preprocessed_file,
};
use crate::tables::{read_remove_list, read_subset_list};

#[derive(Debug, Args)]
pub struct SubsetArgs {
    /// Folder with preprocessed tables.
    pub preproc_dir: PathBuf,
    /// Folder the subsetted tables are written to.
    pub subset_dir: PathBuf,

    #[command(flatten)]
    pub lists: AppLists,
}

/// App list files driving the subset.
#[derive(Debug, Clone, Default, Args)]
pub struct AppLists {
    /// CSV with `full_name` and a 0/1 column; only apps flagged 1 are kept.
    #[arg(long = "subsetfile")]
    pub subset_file: Option<PathBuf>,

    /// CSV with a `full_name` column of apps to drop.
    #[arg(long = "removefile")]
    pub remove_file: Option<PathBuf>,
}

impl AppLists {
    /// Builds the filter described by the list files.
    pub fn filter(&self) -> Result<AppFilter> {
        let mut filter = AppFilter::new();
        if let Some(path) = &self.subset_file {
            filter = filter.include_flagged(read_subset_list(path)?);
        }
        if let Some(path) = &self.remove_file {
            filter = filter.remove(read_remove_list(path)?);
        }
        Ok(filter)
    }
}

pub fn run<W: Write>(writer: &mut W, args: &SubsetArgs) -> Result<()> {
    let filter = args.lists.filter()?;
    if !filter.is_active() {
        tracing::warn!("no subset or remove file given, tables are copied unchanged");
    }
    let written = subset_dir(&args.preproc_dir, &args.subset_dir, &filter)?;
    writeln!(
        writer,
        "Subsetted {written} files into {}",
        args.subset_dir.display()
    )?;
    Ok(())
}

/// Applies `filter` to every preprocessed table of `input_dir`.
pub fn subset_dir(input_dir: &Path, output_dir: &Path, filter: &AppFilter) -> Result<usize> {
    let files = person_files(input_dir)?;
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create {}", output_dir.display()))?;

    let written = files
        .par_iter()
        .filter_map(|path| match subset_file(path, output_dir, filter) {
            Ok(()) => Some(()),
            Err(e) => {
                tracing::warn!(path = ?path, error = %format!("{e:#}"), "skipping file");
                None
            }
        })
        .count();
    Ok(written)
}

fn subset_file(path: &Path, output_dir: &Path, filter: &AppFilter) -> Result<()> {
    let person_id = person_id(path)
        .with_context(|| format!("no person id in file name {}", path.display()))?;
    let mut person = read_preprocessed_file(path, &person_id)?;
    let before = person.corrected.len();
    person.corrected = filter.apply(person.corrected, |row| row.bin.app_id.as_str());
    person.markers = filter.apply(person.markers, |row| row.app_id.as_str());
    tracing::debug!(
        person = %person_id,
        kept = person.corrected.len(),
        dropped = before - person.corrected.len(),
        "subsetted usage rows"
    );

    let target = output_dir.join(person_file_name(SUBSETTED_PREFIX, &person_id));
    write_preprocessed_file(&target, &person)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Config;
    use crate::commands::preprocess::preprocess_dir;

    const RAW: &str = "\
app_package_name,application_label,interaction_type,event_timestamp,timezone
com.whatsapp,WhatsApp,Move to Foreground,2024-01-15T09:00:00Z,UTC
com.whatsapp,WhatsApp,Move to Background,2024-01-15T09:10:00Z,UTC
com.spotify,Spotify,Move to Foreground,2024-01-15T09:20:00Z,UTC
com.spotify,Spotify,Move to Background,2024-01-15T09:25:00Z,UTC
";

    #[test]
    fn subset_keeps_flagged_apps() {
        let temp = tempfile::tempdir().unwrap();
        let raw = temp.path().join("raw");
        let preprocessed = temp.path().join("pre");
        let subsetted = temp.path().join("sub");
        std::fs::create_dir_all(&raw).unwrap();
        std::fs::write(raw.join("ChronicleData-p1.csv"), RAW).unwrap();
        preprocess_dir(&raw, &preprocessed, &Config::default()).unwrap();

        let subset_file = temp.path().join("subset.csv");
        std::fs::write(&subset_file, "full_name,keep\ncom.whatsapp,0\ncom.spotify,1\n").unwrap();
        let lists = AppLists {
            subset_file: Some(subset_file),
            remove_file: None,
        };
        let written = subset_dir(&preprocessed, &subsetted, &lists.filter().unwrap()).unwrap();
        assert_eq!(written, 1);

        let person =
            read_preprocessed_file(&subsetted.join("ChronicleData_subsetted-p1.csv"), "p1").unwrap();
        let apps: Vec<_> = person.apps().collect();
        assert_eq!(apps, vec!["com.spotify"]);
    }

    #[test]
    fn missing_list_file_is_an_error() {
        let lists = AppLists {
            subset_file: None,
            remove_file: Some(PathBuf::from("/nonexistent/remove.csv")),
        };
        assert!(lists.filter().is_err());
    }
}
