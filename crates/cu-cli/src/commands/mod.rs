//! CLI subcommand implementations.

pub mod pipeline;
pub mod preprocess;
pub mod subset;
pub mod summary;
