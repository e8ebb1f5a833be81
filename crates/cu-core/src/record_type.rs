//! Record type enums as the single source of truth for Chronicle interaction strings.

use std::fmt;
use std::str::FromStr;

/// Interaction types reported by the Chronicle collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    ForegroundMove,
    BackgroundMove,
    PowerOff,
    NotificationSeen,
    NotificationInterruption,
    ScreenInteractive,
    ScreenNonInteractive,
    /// Pre-aggregated usage statistic. Not an event; dropped by the normalizer.
    UsageStat,
}

impl RecordType {
    /// Tie-break rank for events sharing an instant.
    ///
    /// Foreground sorts before background so that a switch reported at the same
    /// millisecond opens the new app before the old one is closed.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::ForegroundMove => 0,
            Self::BackgroundMove => 1,
            _ => 2,
        }
    }

    /// The interval label produced for this record type, if it emits one on its own.
    #[must_use]
    pub const fn marker_label(self) -> Option<UsageLabel> {
        match self {
            Self::NotificationSeen => Some(UsageLabel::NotificationSeen),
            Self::NotificationInterruption => Some(UsageLabel::NotificationInterruption),
            Self::ScreenInteractive => Some(UsageLabel::ScreenInteractive),
            Self::ScreenNonInteractive => Some(UsageLabel::ScreenNonInteractive),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ForegroundMove => "Move to Foreground",
            Self::BackgroundMove => "Move to Background",
            Self::PowerOff => "Power Off",
            Self::NotificationSeen => "Notification Seen",
            Self::NotificationInterruption => "Notification Interruption",
            Self::ScreenInteractive => "Screen Interactive",
            Self::ScreenNonInteractive => "Screen Non-interactive",
            Self::UsageStat => "Usage Stat",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = UnknownRecordType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Move to Foreground" | "MOVE_TO_FOREGROUND" => Ok(Self::ForegroundMove),
            "Move to Background" | "MOVE_TO_BACKGROUND" => Ok(Self::BackgroundMove),
            "Power Off" | "Device Shutdown" | "POWER_OFF" | "DEVICE_SHUTDOWN" => Ok(Self::PowerOff),
            "Notification Seen" | "NOTIFICATION_SEEN" => Ok(Self::NotificationSeen),
            "Notification Interruption" | "NOTIFICATION_INTERRUPTION" => {
                Ok(Self::NotificationInterruption)
            }
            "Screen Interactive" | "SCREEN_INTERACTIVE" => Ok(Self::ScreenInteractive),
            "Screen Non-interactive" | "Screen Non-Interactive" | "SCREEN_NON_INTERACTIVE" => {
                Ok(Self::ScreenNonInteractive)
            }
            "Usage Stat" | "USAGE_STAT" => Ok(Self::UsageStat),
            other => Err(UnknownRecordType(other.to_string())),
        }
    }
}

/// Error type for unknown record type strings.
#[derive(Debug, Clone)]
pub struct UnknownRecordType(String);

impl fmt::Display for UnknownRecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown record type: {}", self.0)
    }
}

impl std::error::Error for UnknownRecordType {}

/// Label attached to every reconstructed interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UsageLabel {
    AppUsage,
    PowerOff,
    NotificationSeen,
    NotificationInterruption,
    ScreenInteractive,
    ScreenNonInteractive,
}

impl UsageLabel {
    /// Markers are instantaneous: they carry a start but no end or duration.
    #[must_use]
    pub const fn is_marker(self) -> bool {
        !matches!(self, Self::AppUsage | Self::PowerOff)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AppUsage => "App Usage",
            Self::PowerOff => "Power Off",
            Self::NotificationSeen => "Notification Seen",
            Self::NotificationInterruption => "Notification Interruption",
            Self::ScreenInteractive => "Screen Interactive",
            Self::ScreenNonInteractive => "Screen Non-interactive",
        }
    }
}

impl fmt::Display for UsageLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UsageLabel {
    type Err = UnknownRecordType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "App Usage" => Ok(Self::AppUsage),
            "Power Off" => Ok(Self::PowerOff),
            "Notification Seen" => Ok(Self::NotificationSeen),
            "Notification Interruption" => Ok(Self::NotificationInterruption),
            "Screen Interactive" => Ok(Self::ScreenInteractive),
            "Screen Non-interactive" => Ok(Self::ScreenNonInteractive),
            other => Err(UnknownRecordType(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_display_labels() {
        let variants = [
            RecordType::ForegroundMove,
            RecordType::BackgroundMove,
            RecordType::PowerOff,
            RecordType::NotificationSeen,
            RecordType::NotificationInterruption,
            RecordType::ScreenInteractive,
            RecordType::ScreenNonInteractive,
            RecordType::UsageStat,
        ];

        for variant in &variants {
            let parsed: RecordType = variant.to_string().parse().expect("should parse");
            assert_eq!(parsed, *variant, "roundtrip failed for {variant:?}");
        }
    }

    #[test]
    fn collector_constants_parse() {
        assert_eq!(
            "MOVE_TO_FOREGROUND".parse::<RecordType>().unwrap(),
            RecordType::ForegroundMove
        );
        assert_eq!(
            "Device Shutdown".parse::<RecordType>().unwrap(),
            RecordType::PowerOff
        );
    }

    #[test]
    fn unknown_type_errors() {
        let err = "Keyguard Hidden".parse::<RecordType>().unwrap_err();
        assert_eq!(err.to_string(), "unknown record type: Keyguard Hidden");
    }

    #[test]
    fn foreground_ranks_before_background() {
        assert!(RecordType::ForegroundMove.rank() < RecordType::BackgroundMove.rank());
        assert!(RecordType::BackgroundMove.rank() < RecordType::PowerOff.rank());
    }

    #[test]
    fn only_usage_and_power_off_have_duration() {
        assert!(!UsageLabel::AppUsage.is_marker());
        assert!(!UsageLabel::PowerOff.is_marker());
        assert!(UsageLabel::ScreenInteractive.is_marker());
        assert_eq!(
            RecordType::NotificationSeen.marker_label(),
            Some(UsageLabel::NotificationSeen)
        );
        assert_eq!(RecordType::ForegroundMove.marker_label(), None);
    }
}
