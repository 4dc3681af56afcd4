//! Normalization of raw leaderboard rows.
//!
//! The gateway is loose about types: numbers sometimes arrive as strings, fields
//! go missing, and the community score lives under a provider-specific name.
//! Every row is turned into a [`RankingRecord`] with well-defined defaults.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Provider-specific field holding the community score.
const INSIGHTFULNESS_FIELD: &str = "last_7_day_avg_llm_insightfulness_score_scaled";

const UNKNOWN_DISPLAY_NAME: &str = "Unknown User";

const PROFILE_URL_PREFIX: &str = "https://x.com/";

/// One KOL's placement on one leaderboard.
///
/// Field names on the wire match what downstream importers already consume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingRecord {
    pub username: String,

    #[serde(rename = "name")]
    pub display_name: String,

    pub rank: u64,
    pub mindshare: f64,
    pub community_score: f64,
    pub follower_count: u64,
    pub smart_follower_count: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,

    #[serde(rename = "twitter_user_url", default, skip_serializing_if = "Option::is_none")]
    pub profile_url: Option<String>,
}

impl RankingRecord {
    /// Normalize the row found at `index` of a leaderboard response.
    ///
    /// Missing or unusable ranks fall back to `index + 1`, missing or
    /// non-numeric numbers fall back to 0, and a missing profile URL is built
    /// from the username.
    #[must_use]
    pub fn from_raw(raw: &Value, index: usize) -> Self {
        let username = string_field(raw, "username").unwrap_or_default();

        let rank = positive_integer(raw.get("rank")).unwrap_or(index as u64 + 1);

        let community_score = raw
            .get(INSIGHTFULNESS_FIELD)
            .and_then(non_negative_float)
            .or_else(|| raw.get("community_score").and_then(non_negative_float))
            .unwrap_or(0.0);

        let profile_url = string_field(raw, "twitter_user_url")
            .or_else(|| (!username.is_empty()).then(|| format!("{PROFILE_URL_PREFIX}{username}")));

        Self {
            display_name: string_field(raw, "name").unwrap_or_else(|| UNKNOWN_DISPLAY_NAME.to_string()),
            rank,
            mindshare: raw.get("mindshare").and_then(non_negative_float).unwrap_or(0.0),
            community_score,
            follower_count: raw.get("follower_count").and_then(non_negative_integer).unwrap_or(0),
            smart_follower_count: raw.get("smart_follower_count").and_then(non_negative_integer).unwrap_or(0),
            icon: string_field(raw, "icon"),
            bio: string_field(raw, "bio"),
            profile_url,
            username,
        }
    }

    /// Normalize every row of a leaderboard response, keeping order.
    #[must_use]
    pub fn from_rows(rows: &[Value]) -> Vec<Self> {
        rows.iter().enumerate().map(|(index, raw)| Self::from_raw(raw, index)).collect()
    }
}

fn string_field(raw: &Value, name: &str) -> Option<String> {
    raw.get(name)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|n| n.is_finite())
}

fn non_negative_float(value: &Value) -> Option<f64> {
    as_number(value).map(|n| n.max(0.0))
}

#[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss, reason = "value is finite and non-negative")]
fn non_negative_integer(value: &Value) -> Option<u64> {
    if let Some(n) = value.as_u64() {
        return Some(n);
    }

    as_number(value).map(|n| n.max(0.0).trunc() as u64)
}

fn positive_integer(value: Option<&Value>) -> Option<u64> {
    value.and_then(non_negative_integer).filter(|&n| n >= 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_rank_uses_position() {
        let record = RankingRecord::from_raw(&json!({"username": "x", "mindshare": 0.5}), 2);
        assert_eq!(record.rank, 3);
        assert!((record.mindshare - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_non_numeric_follower_count_is_zero() {
        let record = RankingRecord::from_raw(&json!({"follower_count": "not-a-number"}), 0);
        assert_eq!(record.follower_count, 0);
    }

    #[test]
    fn test_all_fields_present() {
        let raw = json!({
            "name": "Alice",
            "username": "alice",
            "rank": "4",
            "mindshare": 0.0123,
            "last_7_day_avg_llm_insightfulness_score_scaled": 87.5,
            "follower_count": 10_500,
            "smart_follower_count": "321",
            "icon": "https://img.example/alice.png",
            "bio": "builder",
            "twitter_user_url": "https://twitter.com/alice"
        });

        let record = RankingRecord::from_raw(&raw, 0);
        assert_eq!(record.display_name, "Alice");
        assert_eq!(record.username, "alice");
        assert_eq!(record.rank, 4);
        assert!((record.community_score - 87.5).abs() < f64::EPSILON);
        assert_eq!(record.follower_count, 10_500);
        assert_eq!(record.smart_follower_count, 321);
        assert_eq!(record.icon.as_deref(), Some("https://img.example/alice.png"));
        assert_eq!(record.bio.as_deref(), Some("builder"));
        assert_eq!(record.profile_url.as_deref(), Some("https://twitter.com/alice"));
    }

    #[test]
    fn test_defaults_for_empty_row() {
        let record = RankingRecord::from_raw(&json!({}), 0);
        assert_eq!(record.display_name, "Unknown User");
        assert_eq!(record.username, "");
        assert_eq!(record.rank, 1);
        assert!(record.mindshare.abs() < f64::EPSILON);
        assert!(record.community_score.abs() < f64::EPSILON);
        assert_eq!(record.smart_follower_count, 0);
        assert_eq!(record.icon, None);
        assert_eq!(record.profile_url, None);
    }

    #[test]
    fn test_profile_url_built_from_username() {
        let record = RankingRecord::from_raw(&json!({"username": "bob"}), 0);
        assert_eq!(record.profile_url.as_deref(), Some("https://x.com/bob"));
    }

    #[test]
    fn test_zero_rank_falls_back_to_position() {
        let record = RankingRecord::from_raw(&json!({"rank": 0}), 9);
        assert_eq!(record.rank, 10);
    }

    #[test]
    fn test_negative_numbers_clamp_to_zero() {
        let record = RankingRecord::from_raw(&json!({"mindshare": -1.0, "follower_count": -20}), 0);
        assert!(record.mindshare.abs() < f64::EPSILON);
        assert_eq!(record.follower_count, 0);
    }

    #[test]
    fn test_community_score_field_used_when_provider_field_absent() {
        let record = RankingRecord::from_raw(&json!({"community_score": 12}), 0);
        assert!((record.community_score - 12.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_from_rows_keeps_order() {
        let rows = vec![json!({"username": "a"}), json!({"username": "b", "rank": 7})];
        let records = RankingRecord::from_rows(&rows);
        assert_eq!(records[0].rank, 1);
        assert_eq!(records[1].rank, 7);
        assert_eq!(records[1].username, "b");
    }

    #[test]
    fn test_serialized_field_names() {
        let record = RankingRecord::from_raw(&json!({"username": "z", "name": "Zed"}), 0);
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["name"], "Zed");
        assert_eq!(value["twitter_user_url"], "https://x.com/z");
        assert!(value.get("icon").is_none());
        assert!(value.get("display_name").is_none());
    }
}
