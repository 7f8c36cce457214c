use crate::record::ServiceRecord;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GroupKey {
    City,
    Service,
}

impl GroupKey {
    fn of<'a>(&self, record: &'a ServiceRecord) -> &'a str {
        match self {
            GroupKey::City => &record.city,
            GroupKey::Service => &record.service_name,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GroupCount {
    pub label: String,
    pub count: usize,
}

/// Rows per group, largest first; ties keep ascending key order.
pub fn group_count(rows: &[&ServiceRecord], key: GroupKey) -> Vec<GroupCount> {
    let mut groups: BTreeMap<&str, usize> = BTreeMap::new();
    for record in rows {
        *groups.entry(key.of(record)).or_insert(0) += 1;
    }

    let mut counts: Vec<GroupCount> = groups
        .into_iter()
        .map(|(label, count)| GroupCount {
            label: label.to_string(),
            count,
        })
        .collect();
    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts
}

/// Duplicate vehicle identifiers within the scoped rows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct RepeatStats {
    pub total: usize,
    pub distinct: usize,
    pub repeats: usize,
}

impl RepeatStats {
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.repeats as f64 / self.total as f64 * 100.0
    }
}

pub fn repeat_stats(rows: &[&ServiceRecord]) -> RepeatStats {
    let distinct = rows
        .iter()
        .map(|r| r.car_no.as_str())
        .collect::<HashSet<_>>()
        .len();

    RepeatStats {
        total: rows.len(),
        distinct,
        repeats: rows.len() - distinct,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct BillingSummary {
    pub records: usize,
    pub amount_wo_gst: f64,
    pub total_gmv: f64,
}

/// Sums the monetary columns; unparseable amounts contribute nothing.
pub fn billing_summary(rows: &[&ServiceRecord]) -> BillingSummary {
    BillingSummary {
        records: rows.len(),
        amount_wo_gst: rows.iter().filter_map(|r| r.amount_wo_gst).sum(),
        total_gmv: rows.iter().filter_map(|r| r.total_gmv).sum(),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct DashboardStats {
    pub total_orders: usize,
    pub repeat_orders: usize,
    pub working_cities: usize,
}

pub fn dashboard_stats(rows: &[&ServiceRecord]) -> DashboardStats {
    let cities = rows
        .iter()
        .map(|r| r.city.as_str())
        .collect::<HashSet<_>>()
        .len();

    DashboardStats {
        total_orders: rows.len(),
        repeat_orders: repeat_stats(rows).repeats,
        working_cities: cities,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::fixtures::{alpha_table, record};
    use crate::filter::scope_to_source;

    #[test]
    fn alpha_scenario() {
        let table = alpha_table();
        let scope = scope_to_source(&table, "alpha");
        assert_eq!(scope.len(), 4);

        let by_city = group_count(scope.rows(), GroupKey::City);
        assert_eq!(
            by_city,
            vec![
                GroupCount { label: "Pune".into(), count: 3 },
                GroupCount { label: "Delhi".into(), count: 1 },
            ]
        );

        let repeats = repeat_stats(scope.rows());
        assert_eq!(repeats.repeats, 1);
        assert_eq!(format!("{:.2}", repeats.percentage()), "25.00");
    }

    #[test]
    fn group_totals_match_row_count() {
        let table = alpha_table();
        let scope = scope_to_source(&table, "alpha");
        for key in [GroupKey::City, GroupKey::Service] {
            let total: usize = group_count(scope.rows(), key).iter().map(|g| g.count).sum();
            assert_eq!(total, scope.len());
        }
    }

    #[test]
    fn ties_keep_key_order() {
        let rows = vec![
            record("a", "Pune", "Wash", "1", None),
            record("a", "Agra", "Wash", "2", None),
            record("a", "Delhi", "Wash", "3", None),
            record("a", "Delhi", "Wash", "4", None),
        ];
        let refs: Vec<&ServiceRecord> = rows.iter().collect();
        let labels: Vec<String> = group_count(&refs, GroupKey::City)
            .into_iter()
            .map(|g| g.label)
            .collect();
        assert_eq!(labels, vec!["Delhi", "Agra", "Pune"]);
    }

    #[test]
    fn repeats_plus_distinct_is_total() {
        let table = alpha_table();
        let rows: Vec<&ServiceRecord> = table.records().iter().collect();
        let stats = repeat_stats(&rows);
        assert_eq!(stats.repeats + stats.distinct, stats.total);
    }

    #[test]
    fn empty_scope_has_zero_percentage() {
        let stats = repeat_stats(&[]);
        assert_eq!(stats.total, 0);
        assert_eq!(stats.percentage(), 0.0);
    }

    #[test]
    fn billing_sums_skip_missing_amounts() {
        let mut missing = record("a", "Pune", "Wash", "9", None);
        missing.amount_wo_gst = None;
        let rows = vec![record("a", "Pune", "Wash", "1", None), missing];
        let refs: Vec<&ServiceRecord> = rows.iter().collect();
        let summary = billing_summary(&refs);
        assert_eq!(summary.records, 2);
        assert_eq!(summary.amount_wo_gst, 1000.0);
        assert_eq!(summary.total_gmv, 2360.0);
    }

    #[test]
    fn dashboard_counts() {
        let table = alpha_table();
        let scope = scope_to_source(&table, "alpha");
        assert_eq!(
            dashboard_stats(scope.rows()),
            DashboardStats {
                total_orders: 4,
                repeat_orders: 1,
                working_cities: 2
            }
        );
    }
}
