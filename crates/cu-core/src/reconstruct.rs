//! Usage interval reconstruction.
//!
//! Replays one person's normalized events through a per-app open/close state
//! machine and emits the resulting usage intervals.
//!
//! # Algorithm Summary
//!
//! 1. A foreground move opens the app and silently closes every app opened
//!    earlier. The most recently opened of those is remembered as discarded.
//! 2. A background move closes the app and emits its interval. A discarded app
//!    backgrounded within one second of the foreground that displaced it still
//!    gets its interval.
//! 3. A power off closes every open app, emitting power-off intervals.
//! 4. Notification and screen events emit zero-length markers.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration};
use chrono_tz::Tz;
use thiserror::Error;

use crate::normalize::NormalizedEvent;
use crate::record_type::{RecordType, UsageLabel};

/// A late background event for a displaced app is honoured within this window
/// of the foreground event that displaced it.
pub const BACKGROUND_GRACE_MS: i64 = 1000;

/// Reconstruction errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReconstructError {
    /// An app was closed at an instant earlier than the one it was opened at.
    #[error("timepoints out of order: {app_id} opened at {opened_at} but closed at {closed_at}")]
    OutOfOrder {
        app_id: String,
        opened_at: DateTime<Tz>,
        closed_at: DateTime<Tz>,
    },
}

/// A reconstructed span of usage, or a zero-length marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageInterval {
    pub person_id: String,
    pub app_id: String,
    pub title: String,
    pub start: DateTime<Tz>,
    /// Equal to `start` for markers.
    pub end: DateTime<Tz>,
    pub label: UsageLabel,
}

impl UsageInterval {
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub const fn is_marker(&self) -> bool {
        self.label.is_marker()
    }
}

/// Open/closed state of one app.
#[derive(Debug, Clone)]
struct OpenApp {
    is_open: bool,
    opened_at: DateTime<Tz>,
    /// Title seen when the app was foregrounded.
    title: String,
}

/// The app most recently force-closed by a foreground collision.
#[derive(Debug, Clone)]
struct DiscardedApp {
    app_id: String,
    /// When the displacing foreground event happened.
    foreground_at: DateTime<Tz>,
    opened_at: DateTime<Tz>,
}

/// Reconstruction pass state. Owned by a single call to [`reconstruct_intervals`].
#[derive(Debug, Default)]
struct Reconstructor {
    apps: BTreeMap<String, OpenApp>,
    discarded: Option<DiscardedApp>,
    intervals: Vec<UsageInterval>,
}

impl Reconstructor {
    fn process(&mut self, event: &NormalizedEvent) -> Result<(), ReconstructError> {
        match event.record_type {
            RecordType::ForegroundMove => self.on_foreground(event),
            RecordType::BackgroundMove => self.on_background(event)?,
            RecordType::PowerOff => self.on_power_off(event)?,
            other => {
                if let Some(label) = other.marker_label() {
                    self.intervals.push(UsageInterval {
                        person_id: event.person_id.clone(),
                        app_id: event.app_id.clone(),
                        title: event.title.clone(),
                        start: event.instant,
                        end: event.instant,
                        label,
                    });
                }
            }
        }
        Ok(())
    }

    fn on_foreground(&mut self, event: &NormalizedEvent) {
        let now = event.instant;
        self.apps.insert(
            event.app_id.clone(),
            OpenApp {
                is_open: true,
                opened_at: now,
                title: event.title.clone(),
            },
        );

        let mut latest: Option<DiscardedApp> = None;
        for (app_id, app) in &mut self.apps {
            if *app_id == event.app_id || !app.is_open || app.opened_at >= now {
                continue;
            }
            tracing::trace!(
                app = %event.app_id,
                older = %app_id,
                at = %now,
                "app moved to foreground while another was still open, discarding older app"
            );
            app.is_open = false;
            if latest.as_ref().is_none_or(|d| app.opened_at >= d.opened_at) {
                latest = Some(DiscardedApp {
                    app_id: app_id.clone(),
                    foreground_at: now,
                    opened_at: app.opened_at,
                });
            }
        }
        if latest.is_some() {
            self.discarded = latest;
        }
    }

    fn on_background(&mut self, event: &NormalizedEvent) -> Result<(), ReconstructError> {
        let now = event.instant;
        let within_grace = self.discarded.as_ref().is_some_and(|d| {
            d.app_id == event.app_id
                && now - d.foreground_at < Duration::milliseconds(BACKGROUND_GRACE_MS)
        });
        let recovered = if within_grace { self.discarded.take() } else { None };
        if let Some(discarded) = recovered {
            let title = self
                .apps
                .get(&discarded.app_id)
                .map(|app| app.title.clone())
                .unwrap_or_default();
            self.emit(event, &discarded.app_id, title, discarded.opened_at, UsageLabel::AppUsage)?;
            if let Some(app) = self.apps.get_mut(&discarded.app_id) {
                app.is_open = false;
            }
        }

        let Some(app) = self.apps.get_mut(&event.app_id) else {
            return Ok(());
        };
        if !app.is_open {
            return Ok(());
        }
        app.is_open = false;
        let (opened_at, title) = (app.opened_at, app.title.clone());
        self.emit(event, &event.app_id, title, opened_at, UsageLabel::AppUsage)
    }

    fn on_power_off(&mut self, event: &NormalizedEvent) -> Result<(), ReconstructError> {
        let open: Vec<(String, String, DateTime<Tz>)> = self
            .apps
            .iter_mut()
            .filter(|(_, app)| app.is_open)
            .map(|(app_id, app)| {
                app.is_open = false;
                (app_id.clone(), app.title.clone(), app.opened_at)
            })
            .collect();

        for (app_id, title, opened_at) in open {
            self.emit(event, &app_id, title, opened_at, UsageLabel::PowerOff)?;
        }
        Ok(())
    }

    fn emit(
        &mut self,
        event: &NormalizedEvent,
        app_id: &str,
        title: String,
        opened_at: DateTime<Tz>,
        label: UsageLabel,
    ) -> Result<(), ReconstructError> {
        if event.instant < opened_at {
            return Err(ReconstructError::OutOfOrder {
                app_id: app_id.to_string(),
                opened_at,
                closed_at: event.instant,
            });
        }
        self.intervals.push(UsageInterval {
            person_id: event.person_id.clone(),
            app_id: app_id.to_string(),
            title,
            start: opened_at,
            end: event.instant,
            label,
        });
        Ok(())
    }
}

/// Reconstructs usage intervals from an ordered event sequence.
///
/// Events are processed in the given order. The output is sorted by
/// `(start, end)`. Apps still open after the last event emit nothing.
pub fn reconstruct_intervals(
    events: &[NormalizedEvent],
) -> Result<Vec<UsageInterval>, ReconstructError> {
    let mut state = Reconstructor::default();
    for event in events {
        state.process(event)?;
    }

    let mut intervals = state.intervals;
    intervals.sort_by_key(|interval| (interval.start, interval.end));
    Ok(intervals)
}
