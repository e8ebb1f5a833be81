//! Cohort summaries: one row per person, collapsing their per-day tables.

use std::collections::{BTreeMap, BTreeSet};

use crate::aggregate::{SummaryKind, SummaryTable};
use crate::category::CategoryLookup;

/// One person's collapsed values. `None` where a statistic is undefined.
#[derive(Debug, Clone, PartialEq)]
pub struct CohortRow {
    pub person_id: String,
    pub values: Vec<Option<f64>>,
}

/// A table keyed by person id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CohortTable {
    pub columns: Vec<String>,
    pub rows: Vec<CohortRow>,
}

impl CohortTable {
    pub fn value(&self, person_id: &str, column: &str) -> Option<f64> {
        let index = self.columns.iter().position(|c| c == column)?;
        self.rows
            .iter()
            .find(|row| row.person_id == person_id)
            .and_then(|row| row.values.get(index).copied().flatten())
    }
}

/// Collapses a concatenated table of many persons into per-person statistics.
///
/// Every column becomes `<column>_mean`, followed by `<column>_std` (sample
/// standard deviation) when `kind` reports spread. Daily tables also get
/// `num_days`. Persons are ordered by id.
pub fn summarise_cohort(kind: SummaryKind, table: &SummaryTable) -> CohortTable {
    let spread = kind.reports_spread();
    let mut columns = Vec::new();
    for column in &table.columns {
        columns.push(format!("{column}_mean"));
        if spread {
            columns.push(format!("{column}_std"));
        }
    }
    if kind == SummaryKind::Daily {
        columns.push("num_days".to_string());
    }

    let mut by_person: BTreeMap<&str, Vec<&[f64]>> = BTreeMap::new();
    for row in &table.rows {
        by_person
            .entry(row.person_id.as_str())
            .or_default()
            .push(&row.values);
    }

    let rows = by_person
        .into_iter()
        .map(|(person_id, rows)| {
            let mut values = Vec::with_capacity(columns.len());
            for index in 0..table.columns.len() {
                let sample: Vec<f64> = rows
                    .iter()
                    .map(|values| values.get(index).copied().unwrap_or(0.0))
                    .collect();
                values.push(mean(&sample));
                if spread {
                    values.push(sample_std(&sample));
                }
            }
            if kind == SummaryKind::Daily {
                values.push(Some(count(rows.len())));
            }
            CohortRow {
                person_id: person_id.to_string(),
                values,
            }
        })
        .collect();

    CohortTable { columns, rows }
}

#[allow(clippy::cast_precision_loss)]
fn count(n: usize) -> f64 {
    n as f64
}

fn mean(sample: &[f64]) -> Option<f64> {
    if sample.is_empty() {
        return None;
    }
    Some(sample.iter().sum::<f64>() / count(sample.len()))
}

/// Standard deviation with one degree of freedom removed.
fn sample_std(sample: &[f64]) -> Option<f64> {
    if sample.len() < 2 {
        return None;
    }
    let mean = mean(sample)?;
    let squares: f64 = sample.iter().map(|v| (v - mean).powi(2)).sum();
    Some((squares / count(sample.len() - 1)).sqrt())
}

/// Share of a person's distinct apps falling under each label.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryShare {
    pub person_id: String,
    pub label: String,
    pub count: usize,
    pub share: f64,
}

/// Counts a person's distinct apps per label of the lookup's first scheme.
///
/// Returns nothing when the lookup has no schemes or the person no apps.
pub fn category_shares<'a>(
    person_id: &str,
    app_ids: impl IntoIterator<Item = &'a str>,
    lookup: &dyn CategoryLookup,
) -> Vec<CategoryShare> {
    let Some(column) = lookup.columns().first() else {
        return Vec::new();
    };
    let apps: BTreeSet<&str> = app_ids.into_iter().collect();

    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for app in &apps {
        *counts.entry(lookup.label_or_unmapped(app, column)).or_default() += 1;
    }

    let total = count(apps.len());
    counts
        .into_iter()
        .map(|(label, n)| CategoryShare {
            person_id: person_id.to_string(),
            label: label.to_string(),
            count: n,
            share: count(n) / total,
        })
        .collect()
}

/// Pivots shares into one row per person and one column per label.
pub fn share_table(shares: &[CategoryShare]) -> CohortTable {
    let labels: BTreeSet<&str> = shares.iter().map(|s| s.label.as_str()).collect();
    let columns: Vec<String> = labels.iter().map(ToString::to_string).collect();

    let mut by_person: BTreeMap<&str, Vec<Option<f64>>> = BTreeMap::new();
    for share in shares {
        let values = by_person
            .entry(share.person_id.as_str())
            .or_insert_with(|| vec![None; columns.len()]);
        if let Some(index) = columns.iter().position(|c| *c == share.label) {
            values[index] = Some(share.share);
        }
    }

    let rows = by_person
        .into_iter()
        .map(|(person_id, values)| CohortRow {
            person_id: person_id.to_string(),
            values,
        })
        .collect();
    CohortTable { columns, rows }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::SummaryRow;
    use crate::category::RecodeTable;
    use chrono::NaiveDate;

    fn row(person: &str, day: u32, values: Vec<f64>) -> SummaryRow {
        SummaryRow {
            person_id: person.to_string(),
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            values,
        }
    }

    fn table() -> SummaryTable {
        SummaryTable {
            columns: vec!["dur".to_string(), "appcnt".to_string()],
            rows: vec![
                row("p2", 15, vec![10.0, 1.0]),
                row("p1", 15, vec![2.0, 4.0]),
                row("p1", 16, vec![4.0, 0.0]),
                row("p1", 17, vec![6.0, 2.0]),
            ],
        }
    }

    #[test]
    fn daily_reports_mean_std_and_days() {
        let cohort = summarise_cohort(SummaryKind::Daily, &table());

        assert_eq!(
            cohort.columns,
            vec!["dur_mean", "dur_std", "appcnt_mean", "appcnt_std", "num_days"]
        );
        let persons: Vec<_> = cohort.rows.iter().map(|r| r.person_id.as_str()).collect();
        assert_eq!(persons, vec!["p1", "p2"]);
        assert_eq!(cohort.value("p1", "dur_mean"), Some(4.0));
        assert_eq!(cohort.value("p1", "dur_std"), Some(2.0));
        assert_eq!(cohort.value("p1", "num_days"), Some(3.0));
        assert_eq!(cohort.value("p2", "dur_mean"), Some(10.0));
        assert_eq!(cohort.value("p2", "dur_std"), None);
    }

    #[test]
    fn hourly_reports_mean_only() {
        let cohort = summarise_cohort(SummaryKind::Hourly, &table());
        assert_eq!(cohort.columns, vec!["dur_mean", "appcnt_mean"]);
        assert_eq!(cohort.value("p1", "appcnt_mean"), Some(2.0));
    }

    #[test]
    fn shares_count_distinct_apps() {
        let mut recode = RecodeTable::new(vec!["category".to_string()]);
        recode.insert(
            "a",
            BTreeMap::from([("category".to_string(), "social".to_string())]),
        );
        recode.insert(
            "b",
            BTreeMap::from([("category".to_string(), "social".to_string())]),
        );
        let shares = category_shares("p1", ["a", "b", "a", "c"], &recode);

        assert_eq!(
            shares,
            vec![
                CategoryShare {
                    person_id: "p1".to_string(),
                    label: "social".to_string(),
                    count: 2,
                    share: 2.0 / 3.0,
                },
                CategoryShare {
                    person_id: "p1".to_string(),
                    label: "unmapped".to_string(),
                    count: 1,
                    share: 1.0 / 3.0,
                },
            ]
        );

        let mut all = shares;
        all.extend(category_shares("p2", ["c"], &recode));
        let pivot = share_table(&all);
        assert_eq!(pivot.columns, vec!["social", "unmapped"]);
        assert_eq!(pivot.value("p2", "unmapped"), Some(1.0));
        assert_eq!(pivot.value("p2", "social"), None);
    }
}
