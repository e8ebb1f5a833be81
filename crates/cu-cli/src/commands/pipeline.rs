//! The `all` command: every stage in order.

use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use crate::Config;
use crate::commands::preprocess::preprocess_dir;
use crate::commands::subset::{AppLists, subset_dir};
use crate::commands::summary::{SummaryFiles, summarise_dir};

#[derive(Debug, Args)]
pub struct PipelineArgs {
    /// Folder with raw `ChronicleData-<id>.csv` exports.
    pub input_dir: PathBuf,
    /// Folder for preprocessed tables.
    pub preproc_dir: PathBuf,
    /// Folder for subsetted tables.
    pub subset_dir: PathBuf,
    /// Folder for summary tables.
    pub output_dir: PathBuf,

    #[command(flatten)]
    pub lists: AppLists,

    #[command(flatten)]
    pub files: SummaryFiles,
}

/// Preprocesses, subsets when a list file is given, then summarises.
pub fn run<W: Write>(writer: &mut W, args: &PipelineArgs, config: &Config) -> Result<()> {
    let options = config.summary_options()?;
    let filter = args.lists.filter()?;

    let preprocessed = preprocess_dir(&args.input_dir, &args.preproc_dir, config)?;
    writeln!(
        writer,
        "Preprocessed {} of {} files into {}",
        preprocessed.written,
        preprocessed.files,
        args.preproc_dir.display()
    )?;

    let summary_input = if filter.is_active() {
        let written = subset_dir(&args.preproc_dir, &args.subset_dir, &filter)?;
        writeln!(
            writer,
            "Subsetted {written} files into {}",
            args.subset_dir.display()
        )?;
        &args.subset_dir
    } else {
        tracing::debug!("no subset or remove file given, summarising preprocessed tables");
        &args.preproc_dir
    };

    let report = summarise_dir(summary_input, &args.output_dir, &args.files, &options)?;
    writeln!(
        writer,
        "Summarised {} of {} persons into {}",
        report.persons,
        report.files,
        args.output_dir.display()
    )?;
    Ok(())
}
