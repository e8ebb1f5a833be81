//! Configuration loading and management.

use std::fmt;
use std::path::{Path, PathBuf};

use cu_core::types::validate_summary_precision;
use cu_core::{ConfigError, DayWindow, PreprocessOptions, SummaryOptions, WeekDefinition};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

use crate::cli::Settings;

/// Application configuration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bin width in seconds.
    pub precision: i64,
    /// Gaps, in seconds, that start a new engagement session.
    pub session_intervals: Vec<i64>,
    pub quarterly: bool,
    pub split_week: bool,
    /// One of `weekdayMF`, `weekdayMTh`, `weekdaySTh`.
    pub week_definition: WeekDefinition,
    pub split_day: bool,
    /// Start of daytime, `HH:MM`.
    pub daytime: String,
    /// Start of nighttime, `HH:MM`.
    pub nighttime: String,
    pub include_start_end: bool,
    pub max_days: Option<u32>,
    /// Folder for long-usage logs.
    pub log_dir: Option<PathBuf>,
    pub log_options: LogOptions,
}

/// Long-usage logging options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogOptions {
    /// Usage rows longer than any of these (minutes) are logged.
    pub log_exceed_durations_minutes: Vec<f64>,
}

impl LogOptions {
    pub fn is_empty(&self) -> bool {
        self.log_exceed_durations_minutes.is_empty()
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("precision", &self.precision)
            .field("session_intervals", &self.session_intervals)
            .field("quarterly", &self.quarterly)
            .field("split_week", &self.split_week)
            .field("week_definition", &self.week_definition)
            .field("split_day", &self.split_day)
            .field("daytime", &self.daytime)
            .field("nighttime", &self.nighttime)
            .field("include_start_end", &self.include_start_end)
            .field("max_days", &self.max_days)
            .field("log_dir", &self.log_dir)
            .field("log_options", &self.log_options)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        let preprocess = PreprocessOptions::default();
        Self {
            precision: preprocess.precision_secs,
            session_intervals: preprocess.session_thresholds,
            quarterly: false,
            split_week: true,
            week_definition: WeekDefinition::default(),
            split_day: false,
            daytime: "10:00".to_string(),
            nighttime: "22:00".to_string(),
            include_start_end: false,
            max_days: None,
            log_dir: None,
            log_options: LogOptions::default(),
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment variables (CU_*)
        figment = figment.merge(Env::prefixed("CU_"));

        figment.extract()
    }

    /// Applies command-line settings on top of the loaded configuration.
    pub fn with_settings(mut self, settings: &Settings) -> Result<Self, serde_json::Error> {
        if let Some(precision) = settings.precision {
            self.precision = precision;
        }
        if !settings.session_intervals.is_empty() {
            self.session_intervals.clone_from(&settings.session_intervals);
        }
        if let Some(dir) = &settings.log_dir {
            self.log_dir = Some(dir.clone());
        }
        if let Some(options) = &settings.log_options {
            self.log_options = serde_json::from_str(options)?;
        }
        if settings.include_start_end {
            self.include_start_end = true;
        }
        if settings.quarterly {
            self.quarterly = true;
        }
        if settings.split_week {
            self.split_week = true;
        }
        if settings.no_split_week {
            self.split_week = false;
        }
        if let Some(definition) = settings.week_definition {
            self.week_definition = definition;
        }
        if settings.split_day {
            self.split_day = true;
        }
        if let Some(daytime) = &settings.daytime {
            self.daytime.clone_from(daytime);
        }
        if let Some(nighttime) = &settings.nighttime {
            self.nighttime.clone_from(nighttime);
        }
        if settings.max_days.is_some() {
            self.max_days = settings.max_days;
        }
        Ok(self)
    }

    /// Rejects settings no stage could run with.
    ///
    /// The precision limit only applies when summaries will be built.
    pub fn validate(&self, summarising: bool) -> Result<(), ConfigError> {
        if summarising {
            validate_summary_precision(self.precision)?;
        }
        self.summary_options()?;
        if !self.log_options.is_empty() && self.log_dir.is_none() {
            return Err(ConfigError::LogOptionsWithoutDirectory);
        }
        Ok(())
    }

    pub fn preprocess_options(&self) -> PreprocessOptions {
        PreprocessOptions {
            precision_secs: self.precision,
            session_thresholds: self.session_intervals.clone(),
        }
    }

    pub fn summary_options(&self) -> Result<SummaryOptions, ConfigError> {
        Ok(SummaryOptions {
            quarterly: self.quarterly,
            split_week: self.split_week,
            week_definition: self.week_definition,
            split_day: self.split_day,
            day_window: DayWindow::parse(&self.daytime, &self.nighttime)?,
            include_start_end: self.include_start_end,
            max_days: self.max_days,
        })
    }
}

/// Returns the platform-specific config directory for cu.
///
/// On Linux: `~/.config/cu`
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("cu"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dirs_config_path_ends_with_cu() {
        let path = dirs_config_path().unwrap();
        assert_eq!(path.file_name().unwrap(), "cu");
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert_eq!(config.precision, 900);
        assert_eq!(config.session_intervals, vec![60]);
        assert!(config.validate(true).is_ok());

        let options = config.summary_options().unwrap();
        assert_eq!(options, SummaryOptions::default());
    }

    #[test]
    fn test_load_from_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(
            &path,
            "precision = 300\nsession_intervals = [30, 120]\nweek_definition = \"weekdaySTh\"\n",
        )
        .unwrap();

        let config = Config::load_from(Some(&path)).unwrap();
        assert_eq!(config.precision, 300);
        assert_eq!(config.session_intervals, vec![30, 120]);
        assert_eq!(config.week_definition, WeekDefinition::SundayThursday);
    }

    #[test]
    fn test_settings_override_config() {
        let settings = Settings {
            precision: Some(60),
            no_split_week: true,
            max_days: Some(7),
            log_dir: Some(PathBuf::from("logs")),
            log_options: Some(r#"{"log_exceed_durations_minutes":[15,30]}"#.to_string()),
            ..Settings::default()
        };
        let config = Config::default().with_settings(&settings).unwrap();

        assert_eq!(config.precision, 60);
        assert!(!config.split_week);
        assert_eq!(config.max_days, Some(7));
        assert_eq!(config.log_options.log_exceed_durations_minutes, vec![15.0, 30.0]);
        assert!(config.validate(true).is_ok());
    }

    #[test]
    fn test_invalid_log_options_json() {
        let settings = Settings {
            log_options: Some("{not json".to_string()),
            ..Settings::default()
        };
        assert!(Config::default().with_settings(&settings).is_err());
    }

    #[test]
    fn test_validate_rejects_coarse_precision_for_summaries() {
        let config = Config {
            precision: 3600,
            ..Config::default()
        };
        assert!(config.validate(false).is_ok());
        assert_eq!(
            config.validate(true),
            Err(ConfigError::PrecisionTooCoarse {
                precision: 3600,
                max: 900
            })
        );
    }

    #[test]
    fn test_validate_rejects_bad_time_of_day() {
        let config = Config {
            nighttime: "late".to_string(),
            ..Config::default()
        };
        assert!(matches!(
            config.validate(false),
            Err(ConfigError::InvalidTimeOfDay { .. })
        ));
    }

    #[test]
    fn test_load_rejects_unknown_week_definition() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "week_definition = \"weekdayXY\"\n").unwrap();

        let err = Config::load_from(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("weekdayXY"), "{err}");
    }

    #[test]
    fn test_validate_requires_log_dir_for_log_options() {
        let config = Config {
            log_options: LogOptions {
                log_exceed_durations_minutes: vec![15.0],
            },
            ..Config::default()
        };
        assert_eq!(
            config.validate(false),
            Err(ConfigError::LogOptionsWithoutDirectory)
        );
    }
}
