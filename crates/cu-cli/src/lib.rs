//! Chronicle usage CLI library.
//!
//! This crate provides the CLI interface and the CSV file handling around
//! the core pipeline.

mod cli;
pub mod commands;
mod config;
pub mod records;
pub mod tables;

pub use cli::{Cli, Commands, Settings};
pub use config::{Config, LogOptions};
