//! Enumeration of collection work.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

/// Project category, used only to group projects in the output document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, EnumString, EnumIter, IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Category {
    PreTge,
    PostTge,
}

/// Leaderboard time window as understood by the remote API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, EnumString, EnumIter, IntoStaticStr)]
pub enum Period {
    #[serde(rename = "7d")]
    #[strum(serialize = "7d")]
    Days7,

    #[serde(rename = "30d")]
    #[strum(serialize = "30d")]
    Days30,

    #[serde(rename = "3m")]
    #[strum(serialize = "3m")]
    Months3,

    #[serde(rename = "6m")]
    #[strum(serialize = "6m")]
    Months6,

    #[serde(rename = "12m")]
    #[strum(serialize = "12m")]
    Months12,
}

impl Period {
    /// The query-string value sent to the leaderboard endpoint.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

/// One `(project, period)` unit of collection work.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkItem {
    pub project_id: String,
    pub category: Category,
    pub period: Period,
}

impl core::fmt::Display for WorkItem {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} ({}) {}", self.project_id, self.category, self.period)
    }
}

/// The configured projects of one category, in input order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectList {
    pub category: Category,
    pub projects: Vec<String>,
}

/// Everything a collection run has to walk through.
///
/// Work items are produced as a flat, deterministic sequence: categories in the
/// order given, projects in input order within each category, then periods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionPlan {
    lists: Vec<ProjectList>,
    periods: Vec<Period>,
}

impl CollectionPlan {
    #[must_use]
    pub const fn new(lists: Vec<ProjectList>, periods: Vec<Period>) -> Self {
        Self { lists, periods }
    }

    #[must_use]
    pub fn periods(&self) -> &[Period] {
        &self.periods
    }

    #[must_use]
    pub fn lists(&self) -> &[ProjectList] {
        &self.lists
    }

    /// Number of distinct projects across all categories.
    #[must_use]
    pub fn project_count(&self) -> usize {
        self.lists.iter().map(|list| list.projects.len()).sum()
    }

    /// Whether the plan walks `project_id` under `category`.
    #[must_use]
    pub fn contains(&self, category: Category, project_id: &str) -> bool {
        self.lists
            .iter()
            .any(|list| list.category == category && list.projects.iter().any(|p| p == project_id))
    }

    /// The full cross product of projects and periods.
    #[must_use]
    pub fn work_items(&self) -> Vec<WorkItem> {
        self.lists
            .iter()
            .flat_map(|list| {
                list.projects.iter().flat_map(move |project_id| {
                    self.periods.iter().map(move |&period| WorkItem {
                        project_id: project_id.clone(),
                        category: list.category,
                        period,
                    })
                })
            })
            .collect()
    }

    /// Keep only the named projects, preserving order.
    ///
    /// Returns the names that did not match any configured project.
    pub fn retain_projects(&mut self, only: &[String]) -> Vec<String> {
        let unknown = only
            .iter()
            .filter(|wanted| !self.lists.iter().any(|list| list.projects.contains(wanted)))
            .cloned()
            .collect();

        for list in &mut self.lists {
            list.projects.retain(|project| only.contains(project));
        }

        unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::str::FromStr;
    use strum::IntoEnumIterator;

    fn plan() -> CollectionPlan {
        CollectionPlan::new(
            vec![
                ProjectList {
                    category: Category::PreTge,
                    projects: vec!["A".into(), "B".into()],
                },
                ProjectList {
                    category: Category::PostTge,
                    projects: vec!["C".into()],
                },
            ],
            vec![Period::Days7, Period::Days30],
        )
    }

    #[test]
    fn test_work_items_cross_product_in_order() {
        let items = plan().work_items();
        let labels: Vec<_> = items.iter().map(|i| format!("{}/{}", i.project_id, i.period)).collect();
        assert_eq!(labels, ["A/7d", "A/30d", "B/7d", "B/30d", "C/7d", "C/30d"]);
        assert_eq!(items[4].category, Category::PostTge);
    }

    #[test]
    fn test_project_count() {
        assert_eq!(plan().project_count(), 3);
    }

    #[test]
    fn test_contains_matches_category_and_project() {
        let plan = plan();
        assert!(plan.contains(Category::PreTge, "B"));
        assert!(plan.contains(Category::PostTge, "C"));
        assert!(!plan.contains(Category::PostTge, "A"));
        assert!(!plan.contains(Category::PreTge, "Z"));
    }

    #[test]
    fn test_period_round_trips_through_strings() {
        for period in Period::iter() {
            assert_eq!(Period::from_str(period.as_str()).unwrap(), period);
            let json = serde_json::to_string(&period).unwrap();
            assert_eq!(json, format!("\"{}\"", period.as_str()));
        }
    }

    #[test]
    fn test_period_rejects_unknown() {
        let err = Period::from_str("14d").unwrap_err();
        let err: &dyn core::error::Error = &err;
        assert!(!err.to_string().is_empty());
    }

    #[test]
    fn test_category_names() {
        assert_eq!(Category::PreTge.to_string(), "pre_tge");
        assert_eq!(serde_json::to_string(&Category::PostTge).unwrap(), "\"post_tge\"");
    }

    #[test]
    fn test_retain_projects_reports_unknown() {
        let mut plan = plan();
        let unknown = plan.retain_projects(&["B".into(), "Z".into()]);
        assert_eq!(unknown, ["Z"]);
        assert_eq!(plan.project_count(), 1);
        assert_eq!(plan.work_items()[0].project_id, "B");
    }
}
