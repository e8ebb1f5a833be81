//! App category lookup.

use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Label given to apps the lookup has no entry for.
pub const UNMAPPED: &str = "unmapped";

/// Maps an app to one label per category scheme.
///
/// Schemes are only known at run time (they are the columns of the recode
/// file), so labels are plain strings keyed by scheme name.
pub trait CategoryLookup {
    /// Category scheme names, in a stable order.
    fn columns(&self) -> &[String];

    /// The scheme → label mapping for an app, if the app is known.
    fn labels(&self, app_id: &str) -> Option<&BTreeMap<String, String>>;

    /// Every label a scheme can produce.
    fn known_labels(&self, column: &str) -> BTreeSet<String>;

    /// Label of `app_id` under `column`, or [`UNMAPPED`].
    fn label_or_unmapped(&self, app_id: &str, column: &str) -> &str {
        self.labels(app_id)
            .and_then(|labels| labels.get(column))
            .map_or(UNMAPPED, String::as_str)
    }

    /// Sorted labels a scheme's output columns are built from, `unmapped` included.
    fn output_labels(&self, column: &str) -> Vec<String> {
        let mut labels = self.known_labels(column);
        labels.insert(UNMAPPED.to_string());
        labels.into_iter().collect()
    }
}

/// In-memory recode table, one row per app.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecodeTable {
    columns: Vec<String>,
    apps: HashMap<String, BTreeMap<String, String>>,
}

impl RecodeTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            apps: HashMap::new(),
        }
    }

    /// Adds or replaces the labels of an app. Blank labels are skipped.
    pub fn insert(&mut self, app_id: impl Into<String>, labels: BTreeMap<String, String>) {
        let labels = labels
            .into_iter()
            .filter(|(column, label)| !label.trim().is_empty() && self.columns.contains(column))
            .collect();
        self.apps.insert(app_id.into(), labels);
    }

    /// App ids with an entry, in no particular order.
    pub fn apps(&self) -> impl Iterator<Item = &str> {
        self.apps.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.apps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }
}

impl CategoryLookup for RecodeTable {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn labels(&self, app_id: &str) -> Option<&BTreeMap<String, String>> {
        self.apps.get(app_id)
    }

    fn known_labels(&self, column: &str) -> BTreeSet<String> {
        self.apps
            .values()
            .filter_map(|labels| labels.get(column).cloned())
            .collect()
    }
}
