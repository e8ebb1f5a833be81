//! Core type definitions with validation.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Summaries are built at quarter-hour resolution, so bins must not be coarser.
pub const MAX_SUMMARY_PRECISION_SECS: i64 = 15 * 60;

/// Run-level configuration errors, rejected before any file is processed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The bin precision is coarser than the summary stage can handle.
    #[error(
        "precision of {precision}s is above a quarter hour; summaries need a precision of at most {max}s"
    )]
    PrecisionTooCoarse { precision: i64, max: i64 },

    /// The week definition selector is not one of the known encodings.
    #[error("unknown weekday definition: {value} (expected weekdayMF, weekdayMTh or weekdaySTh)")]
    UnknownWeekDefinition { value: String },

    /// A day/night boundary could not be parsed as `HH:MM`.
    #[error("invalid time of day: {value} (expected HH:MM)")]
    InvalidTimeOfDay { value: String },

    /// Long-usage logging was requested without a place to write it.
    #[error("log options were given but no log directory was specified")]
    LogOptionsWithoutDirectory,
}

/// Checks that binned rows can be rolled up to quarter-hour granularity.
pub fn validate_summary_precision(precision_secs: i64) -> Result<(), ConfigError> {
    if precision_secs > MAX_SUMMARY_PRECISION_SECS {
        return Err(ConfigError::PrecisionTooCoarse {
            precision: precision_secs,
            max: MAX_SUMMARY_PRECISION_SECS,
        });
    }
    Ok(())
}

/// Which days count as the working week when splitting week and weekend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum WeekDefinition {
    /// Monday through Friday.
    #[default]
    MondayFriday,
    /// Monday through Thursday.
    MondayThursday,
    /// Sunday through Thursday.
    SundayThursday,
}

impl WeekDefinition {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::MondayFriday => "weekdayMF",
            Self::MondayThursday => "weekdayMTh",
            Self::SundayThursday => "weekdaySTh",
        }
    }

    /// Returns true if `day` is a week day under this definition.
    #[must_use]
    pub fn is_weekday(&self, day: Weekday) -> bool {
        let from_monday = day.num_days_from_monday();
        match self {
            Self::MondayFriday => from_monday < 5,
            Self::MondayThursday => from_monday < 4,
            Self::SundayThursday => from_monday < 4 || from_monday == 6,
        }
    }
}

impl fmt::Display for WeekDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WeekDefinition {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "weekdayMF" => Ok(Self::MondayFriday),
            "weekdayMTh" => Ok(Self::MondayThursday),
            "weekdaySTh" => Ok(Self::SundayThursday),
            _ => Err(ConfigError::UnknownWeekDefinition {
                value: s.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for WeekDefinition {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<WeekDefinition> for String {
    fn from(def: WeekDefinition) -> Self {
        def.as_str().to_string()
    }
}

/// Parses an `HH:MM` wall-clock time.
pub fn parse_time_of_day(value: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").map_err(|_| ConfigError::InvalidTimeOfDay {
        value: value.to_string(),
    })
}

/// Wall-clock window splitting daytime from nighttime usage.
///
/// Daytime is the half-open range `[daytime, nighttime)`. When `daytime` is
/// later than `nighttime` the window wraps around midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    pub daytime: NaiveTime,
    pub nighttime: NaiveTime,
}

impl DayWindow {
    pub fn parse(daytime: &str, nighttime: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            daytime: parse_time_of_day(daytime)?,
            nighttime: parse_time_of_day(nighttime)?,
        })
    }

    #[must_use]
    pub fn is_daytime(&self, time: NaiveTime) -> bool {
        if self.daytime <= self.nighttime {
            time >= self.daytime && time < self.nighttime
        } else {
            time >= self.daytime || time < self.nighttime
        }
    }
}

const fn hour_of_day(hour: u32) -> NaiveTime {
    match NaiveTime::from_hms_opt(hour, 0, 0) {
        Some(time) => time,
        None => panic!("hour of day out of range"),
    }
}

pub const DEFAULT_DAYTIME: NaiveTime = hour_of_day(10);
pub const DEFAULT_NIGHTTIME: NaiveTime = hour_of_day(22);

impl Default for DayWindow {
    fn default() -> Self {
        Self {
            daytime: DEFAULT_DAYTIME,
            nighttime: DEFAULT_NIGHTTIME,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precision_above_quarter_is_rejected() {
        assert!(validate_summary_precision(900).is_ok());
        assert!(validate_summary_precision(60).is_ok());
        let err = validate_summary_precision(3600).unwrap_err();
        assert_eq!(
            err,
            ConfigError::PrecisionTooCoarse {
                precision: 3600,
                max: 900
            }
        );
    }

    #[test]
    fn week_definitions_parse() {
        for def in [
            WeekDefinition::MondayFriday,
            WeekDefinition::MondayThursday,
            WeekDefinition::SundayThursday,
        ] {
            assert_eq!(def.as_str().parse::<WeekDefinition>().unwrap(), def);
        }
        assert!(matches!(
            "weekdayXY".parse::<WeekDefinition>(),
            Err(ConfigError::UnknownWeekDefinition { .. })
        ));
    }

    #[test]
    fn week_definitions_classify_days() {
        let mf = WeekDefinition::MondayFriday;
        assert!(mf.is_weekday(Weekday::Fri));
        assert!(!mf.is_weekday(Weekday::Sun));

        let mth = WeekDefinition::MondayThursday;
        assert!(mth.is_weekday(Weekday::Thu));
        assert!(!mth.is_weekday(Weekday::Fri));

        let sth = WeekDefinition::SundayThursday;
        assert!(sth.is_weekday(Weekday::Sun));
        assert!(!sth.is_weekday(Weekday::Sat));
        assert!(!sth.is_weekday(Weekday::Fri));
    }

    #[test]
    fn day_window_is_half_open() {
        let window = DayWindow::default();
        let at = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap();
        assert_eq!(window, DayWindow::parse("10:00", "22:00").unwrap());
        assert!(window.is_daytime(at(10, 0)));
        assert!(window.is_daytime(at(21, 59)));
        assert!(!window.is_daytime(at(22, 0)));
        assert!(!window.is_daytime(at(3, 0)));
    }

    #[test]
    fn day_window_wraps_midnight() {
        let window = DayWindow::parse("20:00", "06:00").unwrap();
        let at = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap();
        assert!(window.is_daytime(at(23, 0)));
        assert!(window.is_daytime(at(2, 0)));
        assert!(!window.is_daytime(at(12, 0)));
    }

    #[test]
    fn bad_time_of_day_errors() {
        assert!(matches!(
            DayWindow::parse("25:00", "22:00"),
            Err(ConfigError::InvalidTimeOfDay { .. })
        ));
    }
}
