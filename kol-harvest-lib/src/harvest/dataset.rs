//! Aggregated collection results and the output document.

use super::plan::{Category, Period};
use super::record::RankingRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Records of one project, keyed by period.
///
/// A period whose collection failed maps to an empty list rather than being absent.
pub type ProjectDataset = BTreeMap<Period, Vec<RankingRecord>>;

/// Projects of one category, keyed by project ID.
pub type CategoryDatasets = BTreeMap<String, ProjectDataset>;

/// A user's placement on one leaderboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub rank: u64,
    pub mindshare: f64,
    pub community_score: f64,
}

/// Everything known about one user across all collected leaderboards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserEntry {
    #[serde(rename = "name")]
    pub display_name: String,
    pub username: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,

    pub follower_count: u64,
    pub smart_follower_count: u64,

    #[serde(rename = "twitter_user_url", default, skip_serializing_if = "Option::is_none")]
    pub profile_url: Option<String>,

    /// project ID -> period -> placement
    pub projects: BTreeMap<String, BTreeMap<Period, Placement>>,
}

impl UserEntry {
    fn from_record(record: &RankingRecord) -> Self {
        Self {
            display_name: record.display_name.clone(),
            username: record.username.clone(),
            icon: record.icon.clone(),
            bio: record.bio.clone(),
            follower_count: record.follower_count,
            smart_follower_count: record.smart_follower_count,
            profile_url: record.profile_url.clone(),
            projects: BTreeMap::new(),
        }
    }
}

/// Users keyed by lowercased username.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserIndex(BTreeMap<String, UserEntry>);

impl UserIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one leaderboard's records into the index.
    ///
    /// The profile is taken from the first record seen for a user; placements
    /// accumulate per project and period. Records without a username cannot be
    /// keyed and are left out. Returns the number of records folded in.
    pub fn fold(&mut self, project_id: &str, period: Period, records: &[RankingRecord]) -> usize {
        let mut folded = 0;

        for record in records.iter().filter(|r| !r.username.is_empty()) {
            let entry = self
                .0
                .entry(record.username.to_lowercase())
                .or_insert_with(|| UserEntry::from_record(record));

            let _ = entry.projects.entry(project_id.to_string()).or_default().insert(
                period,
                Placement {
                    rank: record.rank,
                    mindshare: record.mindshare,
                    community_score: record.community_score,
                },
            );

            folded += 1;
        }

        folded
    }

    #[must_use]
    pub fn get(&self, username: &str) -> Option<&UserEntry> {
        self.0.get(&username.to_lowercase())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn usernames(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

/// Run-level counters exposed in the output document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionStats {
    /// Number of KOL records collected, counting repeats across leaderboards.
    #[serde(rename = "totalKOLs")]
    pub total_kols: u64,
    pub total_data_points: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub unique_users: u64,

    #[serde(default)]
    pub skipped_projects: u64,
}

impl CollectionStats {
    pub fn record_success(&mut self, records: usize) {
        self.successful_requests += 1;
        self.add_data_points(records);
    }

    pub const fn record_failure(&mut self) {
        self.failed_requests += 1;
    }

    pub fn add_data_points(&mut self, records: usize) {
        let records = records as u64;
        self.total_kols += records;
        self.total_data_points += records;
    }
}

/// The document handed to downstream persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarvestDocument {
    pub last_update: DateTime<Utc>,
    pub total_projects: usize,
    pub total_durations: usize,
    pub categories: BTreeMap<Category, CategoryDatasets>,
    pub users: UserIndex,
    pub stats: CollectionStats,
}

impl HarvestDocument {
    /// The dataset of a project, if the document has one.
    #[must_use]
    pub fn project(&self, category: Category, project_id: &str) -> Option<&ProjectDataset> {
        self.categories.get(&category).and_then(|projects| projects.get(project_id))
    }

    /// Whether the project has a non-empty record list for every one of `periods`.
    #[must_use]
    pub fn is_project_complete(&self, category: Category, project_id: &str, periods: &[Period]) -> bool {
        self.project(category, project_id)
            .is_some_and(|dataset| periods.iter().all(|p| dataset.get(p).is_some_and(|records| !records.is_empty())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(username: &str, rank: u64) -> RankingRecord {
        RankingRecord::from_raw(&json!({"username": username, "name": username, "rank": rank, "mindshare": 0.1}), 0)
    }

    #[test]
    fn test_fold_accumulates_across_projects_and_periods() {
        let mut index = UserIndex::new();
        let _ = index.fold("A", Period::Days7, &[record("Alice", 1), record("bob", 2)]);
        let _ = index.fold("A", Period::Days30, &[record("alice", 3)]);
        let _ = index.fold("B", Period::Days7, &[record("ALICE", 5)]);

        assert_eq!(index.len(), 2);
        let alice = index.get("alice").unwrap();
        assert_eq!(alice.display_name, "Alice");
        assert_eq!(alice.projects["A"][&Period::Days7].rank, 1);
        assert_eq!(alice.projects["A"][&Period::Days30].rank, 3);
        assert_eq!(alice.projects["B"][&Period::Days7].rank, 5);
    }

    #[test]
    fn test_fold_skips_records_without_username() {
        let mut index = UserIndex::new();
        let folded = index.fold("A", Period::Days7, &[record("", 1), record("carol", 2)]);
        assert_eq!(folded, 1);
        assert_eq!(index.usernames().collect::<Vec<_>>(), ["carol"]);
    }

    #[test]
    fn test_stats_counting() {
        let mut stats = CollectionStats::default();
        stats.record_success(3);
        stats.record_success(0);
        stats.record_failure();
        assert_eq!(stats.successful_requests, 2);
        assert_eq!(stats.failed_requests, 1);
        assert_eq!(stats.total_data_points, 3);
        assert_eq!(stats.total_kols, 3);
    }

    #[test]
    fn test_stats_wire_names() {
        let value = serde_json::to_value(CollectionStats::default()).unwrap();
        for key in ["totalKOLs", "totalDataPoints", "successfulRequests", "failedRequests", "uniqueUsers", "skippedProjects"] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
    }

    #[test]
    fn test_project_completeness() {
        let mut dataset = ProjectDataset::new();
        let _ = dataset.insert(Period::Days7, vec![record("a", 1)]);
        let _ = dataset.insert(Period::Days30, Vec::new());

        let mut categories = BTreeMap::new();
        let _ = categories.insert(Category::PreTge, BTreeMap::from([("A".to_string(), dataset)]));

        let doc = HarvestDocument {
            last_update: Utc::now(),
            total_projects: 1,
            total_durations: 2,
            categories,
            users: UserIndex::new(),
            stats: CollectionStats::default(),
        };

        assert!(doc.is_project_complete(Category::PreTge, "A", &[Period::Days7]));
        assert!(!doc.is_project_complete(Category::PreTge, "A", &[Period::Days7, Period::Days30]));
        assert!(!doc.is_project_complete(Category::PostTge, "A", &[Period::Days7]));
        assert!(!doc.is_project_complete(Category::PreTge, "B", &[Period::Days7]));
    }

    #[test]
    fn test_document_shape() {
        let doc = HarvestDocument {
            last_update: Utc::now(),
            total_projects: 0,
            total_durations: 5,
            categories: BTreeMap::from([(Category::PreTge, BTreeMap::new()), (Category::PostTge, BTreeMap::new())]),
            users: UserIndex::new(),
            stats: CollectionStats::default(),
        };

        let value = serde_json::to_value(&doc).unwrap();
        assert!(value["lastUpdate"].is_string());
        assert_eq!(value["totalDurations"], 5);
        assert!(value["categories"]["pre_tge"].is_object());
        assert!(value["categories"]["post_tge"].is_object());
        assert!(value["users"].is_object());

        let back: HarvestDocument = serde_json::from_value(value).unwrap();
        assert_eq!(back.total_durations, 5);
    }
}
