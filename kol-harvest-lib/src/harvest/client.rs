//! Gateway client for the challenge → proof-of-work → data protocol.
//!
//! Every attempt fetches a fresh challenge, since challenges are single-use and
//! expire quickly. Failed attempts are classified and paced by the
//! [`RateController`] before the next one starts.

use super::error::FetchError;
use super::plan::WorkItem;
use super::pow::{self, ProofHeaders};
use super::rate::RateController;
use crate::Result;
use core::sync::atomic::{AtomicU32, Ordering};
use core::time::Duration;
use layered::{Execute, Service, Stack};
use ohno::IntoAppError;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use serde::Deserialize;
use seatbelt::retry::Retry;
use seatbelt::{RecoveryInfo, ResilienceContext};
use serde_json::Value;
use std::sync::Arc;
use tick::Clock;
use url::Url;

const LOG_TARGET: &str = "    client";

type FetchResult = core::result::Result<Vec<Value>, FetchError>;

/// Something that can produce the raw rows of one leaderboard.
pub trait LeaderboardSource {
    fn fetch(&self, item: &WorkItem) -> impl Future<Output = core::result::Result<Vec<Value>, FetchError>> + Send;
}

/// Fixed parameters sent with every leaderboard request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardQuery {
    pub top_n: u32,
    pub community_tier: String,
    pub customized_community: String,
    pub community_yaps: bool,
}

impl LeaderboardQuery {
    fn pairs(&self, item: &WorkItem) -> [(&'static str, String); 6] {
        [
            ("duration", item.period.as_str().to_string()),
            ("topic_id", item.project_id.clone()),
            ("top_n", self.top_n.to_string()),
            ("community_tier", self.community_tier.clone()),
            ("customized_community", self.customized_community.clone()),
            ("community_yaps", self.community_yaps.to_string()),
        ]
    }
}

/// Where the gateway lives and how to talk to it.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub challenge_url: Url,
    pub leaderboard_url: Url,
    pub user_agent: String,
    pub request_timeout: Duration,
    pub query: LeaderboardQuery,
}

/// A challenge as issued by the gateway.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Challenge {
    pub challenge: String,
    pub difficulty: f64,
}

#[derive(Debug, Clone)]
pub struct FetchClient {
    http: reqwest::Client,
    settings: GatewaySettings,
    rate: RateController,
    max_attempts: u32,
}

impl FetchClient {
    pub fn new(settings: GatewaySettings, rate: RateController, max_attempts: u32) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let _ = headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .user_agent(settings.user_agent.clone())
            .default_headers(headers)
            .timeout(settings.request_timeout)
            .build()
            .into_app_err("unable to build the HTTP client")?;

        Ok(Self {
            http,
            settings,
            rate,
            max_attempts: max_attempts.max(1),
        })
    }

    #[must_use]
    pub const fn settings(&self) -> &GatewaySettings {
        &self.settings
    }

    /// Ask the gateway for a new challenge.
    pub async fn fetch_challenge(&self) -> core::result::Result<Challenge, FetchError> {
        let response = self
            .http
            .get(self.settings.challenge_url.clone())
            .send()
            .await
            .map_err(|e| FetchError::ChallengeFetch(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::ChallengeFetch(format!("HTTP {status}")));
        }

        response
            .json::<Challenge>()
            .await
            .map_err(|e| FetchError::ChallengeFetch(format!("unusable challenge payload: {e}")))
    }

    /// Run one full attempt: challenge, proof of work, data request.
    pub async fn fetch_once(&self, item: &WorkItem) -> core::result::Result<Vec<Value>, FetchError> {
        let challenge = self.fetch_challenge().await?;
        log::debug!(target: LOG_TARGET, "Got challenge for {item} at difficulty {}", challenge.difficulty);

        let proof = solve_off_thread(challenge).await?;

        let mut request = self
            .http
            .get(self.settings.leaderboard_url.clone())
            .query(&self.settings.query.pairs(item));
        for (name, value) in proof.to_header_pairs() {
            request = request.header(name, value);
        }

        let response = request.send().await.map_err(FetchError::Network)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::from_status(status));
        }

        let body = response.bytes().await.map_err(FetchError::Network)?;
        let value: Value =
            serde_json::from_slice(&body).map_err(|e| FetchError::MalformedResponse(format!("body is not JSON: {e}")))?;

        extract_rows(value)
    }

    /// Fetch one leaderboard, retrying classified failures up to the attempt limit.
    ///
    /// Every attempt reruns the whole challenge, proof and data sequence. The
    /// wait before the next attempt comes from the [`RateController`] for the
    /// kind of failure just seen.
    pub async fn fetch_with_retry(&self, item: &WorkItem) -> FetchResult {
        let clock = Clock::new_tokio();
        let context = ResilienceContext::new(&clock).name("leaderboard_fetch");

        let attempts = Arc::new(AtomicU32::new(0));
        let recovery_attempts = Arc::clone(&attempts);
        let execute_attempts = Arc::clone(&attempts);
        let rate = self.rate.clone();
        let max_attempts = self.max_attempts;
        let client = self.clone();

        let service = (
            Retry::layer("retry", &context)
                .clone_input()
                .recovery_with(move |result: &FetchResult, _| {
                    let attempt = recovery_attempts.load(Ordering::Relaxed).saturating_sub(1);
                    match result {
                        Err(e) if e.is_retryable() => {
                            let mut rng = rand::thread_rng();
                            RecoveryInfo::retry().delay(rate.next_delay(attempt, e.kind(), &mut rng))
                        }
                        _ => RecoveryInfo::never(),
                    }
                })
                .max_retry_attempts(max_attempts.saturating_sub(1))
                .on_retry(move |output: &FetchResult, args| {
                    if let Err(e) = output {
                        log::warn!(target: LOG_TARGET,
                            "Attempt {}/{max_attempts} failed: {e}; retrying in {}ms",
                            args.attempt().index() + 1,
                            args.retry_delay().as_millis()
                        );
                    }
                }),
            Execute::new(move |item: WorkItem| {
                let _ = execute_attempts.fetch_add(1, Ordering::Relaxed);
                let client = client.clone();
                async move { client.fetch_once(&item).await }
            }),
        )
        .into_service();

        match service.execute(item.clone()).await {
            Err(e) if e.is_retryable() => Err(FetchError::ExhaustedRetries {
                attempts: attempts.load(Ordering::Relaxed),
                last: Box::new(e),
            }),
            other => other,
        }
    }
}

impl LeaderboardSource for FetchClient {
    fn fetch(&self, item: &WorkItem) -> impl Future<Output = core::result::Result<Vec<Value>, FetchError>> + Send {
        self.fetch_with_retry(item)
    }
}

/// Proof-of-work is CPU-bound, so keep it off the async worker threads.
async fn solve_off_thread(challenge: Challenge) -> core::result::Result<ProofHeaders, FetchError> {
    let Challenge { challenge, difficulty } = challenge;

    tokio::task::spawn_blocking(move || pow::solve(&challenge, difficulty))
        .await
        .map_err(|e| FetchError::ChallengeFetch(format!("proof-of-work task failed: {e}")))?
        .map_err(FetchError::from)
}

/// Pull the record rows out of a leaderboard payload.
///
/// The gateway answers either with a bare array or with an object wrapping the
/// array in `data`.
pub fn extract_rows(payload: Value) -> core::result::Result<Vec<Value>, FetchError> {
    match payload {
        Value::Array(rows) => Ok(rows),
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Array(rows)) => Ok(rows),
            Some(_) => Err(FetchError::MalformedResponse("`data` is not an array".into())),
            None => Err(FetchError::MalformedResponse("object has no `data` field".into())),
        },
        other => Err(FetchError::MalformedResponse(format!("expected an array or object, found {}", json_kind(&other)))),
    }
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harvest::plan::{Category, Period};
    use serde_json::json;

    #[test]
    fn test_bare_array_is_used_directly() {
        let rows = extract_rows(json!([{"username": "a"}, {"username": "b"}])).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_data_field_is_unwrapped() {
        let rows = extract_rows(json!({"data": [{"username": "a"}], "total": 1})).unwrap();
        assert_eq!(rows, vec![json!({"username": "a"})]);
    }

    #[test]
    fn test_other_shapes_are_malformed() {
        for payload in [json!("oops"), json!(42), json!(null), json!({"items": []}), json!({"data": {"x": 1}})] {
            let err = extract_rows(payload).unwrap_err();
            assert!(matches!(err, FetchError::MalformedResponse(_)), "{err}");
            assert!(!err.is_retryable());
        }
    }

    #[test]
    fn test_query_pairs() {
        let query = LeaderboardQuery {
            top_n: 100,
            community_tier: "tier1".into(),
            customized_community: "customized".into(),
            community_yaps: true,
        };
        let item = WorkItem {
            project_id: "ALPHA".into(),
            category: Category::PreTge,
            period: Period::Months3,
        };

        let pairs = query.pairs(&item);
        assert_eq!(pairs[0], ("duration", "3m".to_string()));
        assert_eq!(pairs[1], ("topic_id", "ALPHA".to_string()));
        assert_eq!(pairs[2], ("top_n", "100".to_string()));
        assert_eq!(pairs[5], ("community_yaps", "true".to_string()));
    }
}
