//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use cu_core::WeekDefinition;

use crate::commands::pipeline::PipelineArgs;
use crate::commands::preprocess::PreprocessArgs;
use crate::commands::subset::SubsetArgs;
use crate::commands::summary::SummaryArgs;

/// Chronicle app-usage preprocessing.
///
/// Rebuilds app usage sessions from raw Chronicle exports and summarises
/// them per person and day.
#[derive(Debug, Parser)]
#[command(name = "cu", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub settings: Settings,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Rebuild binned usage rows from raw exports.
    #[command(alias = "preprocessing")]
    Preprocess(PreprocessArgs),

    /// Keep or drop apps in preprocessed tables.
    #[command(alias = "subsetting")]
    Subset(SubsetArgs),

    /// Build per-person and cohort summary tables.
    Summary(SummaryArgs),

    /// Run preprocessing, subsetting and summary in one go.
    All(PipelineArgs),
}

/// Run settings that override the configuration file.
#[derive(Debug, Clone, Default, Args)]
pub struct Settings {
    /// Bin width in seconds.
    #[arg(long, global = true)]
    pub precision: Option<i64>,

    /// Gap in seconds that starts a new engagement session (repeatable).
    #[arg(long = "session-interval", global = true)]
    pub session_intervals: Vec<i64>,

    /// Folder for long-usage logs.
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    /// Logging options as JSON, e.g. '{"log_exceed_durations_minutes":[15,30]}'.
    #[arg(long, global = true)]
    pub log_options: Option<String>,

    /// Keep the first and last observed days.
    #[arg(long, global = true)]
    pub include_start_end: bool,

    /// Also write quarter-hour tables.
    #[arg(long, global = true)]
    pub quarterly: bool,

    /// Write week and weekend tables.
    #[arg(long, global = true)]
    pub split_week: bool,

    /// Skip week and weekend tables.
    #[arg(long, global = true, conflicts_with = "split_week")]
    pub no_split_week: bool,

    /// Week days for the week split: weekdayMF, weekdayMTh or weekdaySTh.
    #[arg(long, global = true)]
    pub week_definition: Option<WeekDefinition>,

    /// Write daytime and nighttime tables.
    #[arg(long, global = true)]
    pub split_day: bool,

    /// Start of daytime (HH:MM).
    #[arg(long, global = true)]
    pub daytime: Option<String>,

    /// Start of nighttime (HH:MM).
    #[arg(long, global = true)]
    pub nighttime: Option<String>,

    /// Report at most this many days per person.
    #[arg(long, global = true)]
    pub max_days: Option<u32>,
}
