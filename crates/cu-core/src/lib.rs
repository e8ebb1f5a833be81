//! Core domain logic for app-usage session reconstruction.
//!
//! This crate turns one person's raw Chronicle interaction log into usage
//! summaries:
//! - Normalization: cleaning, timezone resolution and ordering of raw events
//! - Reconstruction: the per-app open/close state machine producing intervals
//! - Binning and correction: precision slices, overlap repair, session flags
//! - Aggregation: gap-filled daily, hourly and quarterly tables per person
//!
//! It performs no file I/O.

pub mod aggregate;
pub mod binning;
pub mod category;
pub mod cohort;
pub mod correct;
pub mod normalize;
pub mod preprocess;
pub mod reconstruct;
pub mod record_type;
pub mod subset;
pub mod types;

pub use aggregate::{
    PersonSummary, SummaryKind, SummaryOptions, SummaryRow, SummaryTable, reporting_dates,
    summarise_person,
};
pub use binning::{BinnedRow, bin_interval};
pub use category::{CategoryLookup, RecodeTable, UNMAPPED};
pub use cohort::{CategoryShare, CohortRow, CohortTable, category_shares, share_table, summarise_cohort};
pub use correct::{CorrectedRow, correct_rows, engage_column};
pub use normalize::{NormalizeError, NormalizedEvent, RawEvent, normalize_events};
pub use preprocess::{
    PreprocessError, PreprocessOptions, PreprocessOutput, StoredBin, long_usage, long_usage_line,
    preprocess_person,
};
pub use reconstruct::{ReconstructError, UsageInterval, reconstruct_intervals};
pub use record_type::{RecordType, UnknownRecordType, UsageLabel};
pub use subset::AppFilter;
pub use types::{ConfigError, DayWindow, WeekDefinition};
