//! Include-list and remove-list filtering of apps.

use std::collections::HashSet;

/// Keeps or drops rows by app id.
///
/// With an include list, only listed apps are kept. Apps on the remove list
/// are always dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppFilter {
    include: Option<HashSet<String>>,
    remove: HashSet<String>,
}

impl AppFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts to apps whose flag is `1`.
    #[must_use]
    pub fn include_flagged<I, A, F>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = (A, F)>,
        A: Into<String>,
        F: AsRef<str>,
    {
        let apps = entries
            .into_iter()
            .filter(|(_, flag)| is_set(flag.as_ref()))
            .map(|(app, _)| app.into())
            .collect();
        self.include = Some(apps);
        self
    }

    #[must_use]
    pub fn remove<I, A>(mut self, apps: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        self.remove.extend(apps.into_iter().map(Into::into));
        self
    }

    /// Whether the filter would drop anything at all.
    pub fn is_active(&self) -> bool {
        self.include.is_some() || !self.remove.is_empty()
    }

    pub fn keeps(&self, app_id: &str) -> bool {
        if self.remove.contains(app_id) {
            return false;
        }
        self.include
            .as_ref()
            .is_none_or(|include| include.contains(app_id))
    }

    /// Retains the rows whose app passes the filter.
    pub fn apply<T>(&self, rows: Vec<T>, app_id: impl Fn(&T) -> &str) -> Vec<T> {
        rows.into_iter().filter(|row| self.keeps(app_id(row))).collect()
    }
}

fn is_set(flag: &str) -> bool {
    matches!(flag.trim(), "1" | "1.0")
}
