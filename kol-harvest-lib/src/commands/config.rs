use crate::Result;
use crate::harvest::client::{GatewaySettings, LeaderboardQuery};
use crate::harvest::plan::{Category, CollectionPlan, Period, ProjectList};
use crate::harvest::rate::RateController;
use camino::{Utf8Path, Utf8PathBuf};
use core::time::Duration;
use humantime_serde::re::humantime::format_duration;
use ohno::{IntoAppError, app_err};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::io;
use url::Url;

/// The default configuration TOML content, embedded from `default_config.toml`
pub const DEFAULT_CONFIG_TOML: &str = include_str!("../../default_config.toml");

/// Configuration file looked up when none is given explicitly.
pub const DEFAULT_CONFIG_FILE: &str = "kol-harvest.toml";

const MIN_REQUEST_TIMEOUT: Duration = Duration::from_secs(1);
const MAX_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Leaderboard windows collected for every project
    #[serde(default = "default_durations")]
    pub durations: Vec<Period>,

    /// Where the collected document is written
    #[serde(default = "default_output_path")]
    pub output_path: Utf8PathBuf,

    /// Where the progress checkpoint is written
    #[serde(default = "default_checkpoint_path")]
    pub checkpoint_path: Utf8PathBuf,

    /// Countdown before collection starts
    #[serde(default = "default_confirm_delay", with = "humantime_serde")]
    pub confirm_delay: Duration,

    /// Hosts in these domains refuse to collect
    #[serde(default)]
    pub production_domains: Vec<String>,

    #[serde(default)]
    pub projects: ProjectsConfig,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub rate: RateConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectsConfig {
    #[serde(default)]
    pub pre_tge: Vec<String>,

    #[serde(default)]
    pub post_tge: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ApiConfig {
    #[serde(default = "default_challenge_url")]
    pub challenge_url: String,

    #[serde(default = "default_leaderboard_url")]
    pub leaderboard_url: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,

    #[serde(default = "default_top_n")]
    pub top_n: u32,

    #[serde(default = "default_community_tier")]
    pub community_tier: String,

    #[serde(default = "default_customized_community")]
    pub customized_community: String,

    #[serde(default = "default_community_yaps")]
    pub community_yaps: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RateConfig {
    #[serde(default = "default_base_delay", with = "humantime_serde")]
    pub base_delay: Duration,

    #[serde(default = "default_max_jitter", with = "humantime_serde")]
    pub max_jitter: Duration,

    #[serde(default = "default_max_delay", with = "humantime_serde")]
    pub max_delay: Duration,

    #[serde(default = "default_retry_delay", with = "humantime_serde")]
    pub retry_delay: Duration,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_project_delay", with = "humantime_serde")]
    pub project_delay: Duration,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_batch_delay", with = "humantime_serde")]
    pub batch_delay: Duration,
}

fn default_durations() -> Vec<Period> {
    vec![Period::Days7, Period::Days30, Period::Months3, Period::Months6, Period::Months12]
}

fn default_output_path() -> Utf8PathBuf {
    Utf8PathBuf::from("kol-data.json")
}

fn default_checkpoint_path() -> Utf8PathBuf {
    Utf8PathBuf::from("kol-checkpoint.json")
}

const fn default_confirm_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_challenge_url() -> String {
    "https://hub.kaito.ai/api/v1/anti-crawling/challenge".to_string()
}

fn default_leaderboard_url() -> String {
    "https://hub.kaito.ai/api/v1/gateway/ai/kol/mindshare/top-leaderboard".to_string()
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36"
        .to_string()
}

const fn default_request_timeout() -> Duration {
    Duration::from_secs(15)
}

const fn default_top_n() -> u32 {
    100
}

fn default_community_tier() -> String {
    "tier1".to_string()
}

fn default_customized_community() -> String {
    "customized".to_string()
}

const fn default_community_yaps() -> bool {
    true
}

const fn default_base_delay() -> Duration {
    Duration::from_millis(500)
}

const fn default_max_jitter() -> Duration {
    Duration::from_millis(500)
}

const fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

const fn default_retry_delay() -> Duration {
    Duration::from_secs(3)
}

const fn default_backoff_multiplier() -> f64 {
    2.0
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_project_delay() -> Duration {
    Duration::from_secs(2)
}

const fn default_batch_size() -> usize {
    10
}

const fn default_batch_delay() -> Duration {
    Duration::from_secs(30)
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            challenge_url: default_challenge_url(),
            leaderboard_url: default_leaderboard_url(),
            user_agent: default_user_agent(),
            request_timeout: default_request_timeout(),
            top_n: default_top_n(),
            community_tier: default_community_tier(),
            customized_community: default_customized_community(),
            community_yaps: default_community_yaps(),
        }
    }
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            base_delay: default_base_delay(),
            max_jitter: default_max_jitter(),
            max_delay: default_max_delay(),
            retry_delay: default_retry_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            max_attempts: default_max_attempts(),
            project_delay: default_project_delay(),
            batch_size: default_batch_size(),
            batch_delay: default_batch_delay(),
        }
    }
}

impl Config {
    /// Load configuration from a file or use defaults
    ///
    /// Without an explicit path, `kol-harvest.toml` in `base_dir` is used if it exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or fails validation
    pub fn load(base_dir: &Utf8Path, config_path: Option<&Utf8PathBuf>) -> Result<Self> {
        let (final_path, text) = if let Some(path) = config_path {
            let text = fs::read_to_string(path).into_app_err_with(|| format!("reading kol-harvest configuration file '{path}'"))?;
            (path.clone(), text)
        } else {
            let path = base_dir.join(DEFAULT_CONFIG_FILE);
            match fs::read_to_string(&path) {
                Ok(text) => (path, text),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    let config = Self::default();
                    config.validate()?;
                    return Ok(config);
                }
                Err(e) => return Err(e).into_app_err_with(|| format!("reading kol-harvest configuration file '{path}'")),
            }
        };

        let config: Self = toml::from_str(&text).into_app_err_with(|| format!("parsing configuration file '{final_path}'"))?;
        config.validate()?;

        Ok(config)
    }

    /// Save the default configuration to a TOML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written
    pub fn save_default(output_path: &Utf8Path) -> Result<()> {
        fs::write(output_path, DEFAULT_CONFIG_TOML).into_app_err_with(|| format!("writing default configuration to {output_path}"))?;
        Ok(())
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns an error describing the first problem found
    pub fn validate(&self) -> Result<()> {
        if self.durations.is_empty() {
            return Err(app_err!("at least one duration must be configured"));
        }

        let mut seen_durations = BTreeSet::new();
        for period in &self.durations {
            if !seen_durations.insert(period) {
                return Err(app_err!("duration '{period}' is listed more than once"));
            }
        }

        let mut seen_projects = BTreeSet::new();
        for (category, projects) in [(Category::PreTge, &self.projects.pre_tge), (Category::PostTge, &self.projects.post_tge)] {
            for project in projects {
                if project.trim().is_empty() {
                    return Err(app_err!("empty project ID in the {category} list"));
                }

                if !seen_projects.insert(project.as_str()) {
                    return Err(app_err!("project '{project}' is listed more than once"));
                }
            }
        }

        let rate = &self.rate;
        if !rate.backoff_multiplier.is_finite() || rate.backoff_multiplier < 1.0 {
            return Err(app_err!("backoff_multiplier must be at least 1, got {}", rate.backoff_multiplier));
        }

        if rate.max_attempts == 0 {
            return Err(app_err!("max_attempts must be at least 1"));
        }

        if rate.max_delay < rate.base_delay {
            return Err(app_err!(
                "max_delay ({}) must not be shorter than base_delay ({})",
                format_duration(rate.max_delay),
                format_duration(rate.base_delay)
            ));
        }

        let timeout = self.api.request_timeout;
        if !(MIN_REQUEST_TIMEOUT..=MAX_REQUEST_TIMEOUT).contains(&timeout) {
            return Err(app_err!(
                "request_timeout must be between 1s and 2m, got {}",
                format_duration(timeout)
            ));
        }

        if self.api.top_n == 0 {
            return Err(app_err!("top_n must be at least 1"));
        }

        let _ = parse_url("challenge_url", &self.api.challenge_url)?;
        let _ = parse_url("leaderboard_url", &self.api.leaderboard_url)?;

        Ok(())
    }

    /// All configured projects and durations as a plan.
    #[must_use]
    pub fn plan(&self) -> CollectionPlan {
        CollectionPlan::new(
            vec![
                ProjectList {
                    category: Category::PreTge,
                    projects: self.projects.pre_tge.clone(),
                },
                ProjectList {
                    category: Category::PostTge,
                    projects: self.projects.post_tge.clone(),
                },
            ],
            self.durations.clone(),
        )
    }

    #[must_use]
    pub fn rate_controller(&self) -> RateController {
        let rate = &self.rate;
        RateController {
            base_delay: rate.base_delay,
            max_jitter: rate.max_jitter,
            max_delay: rate.max_delay,
            retry_delay: rate.retry_delay,
            backoff_multiplier: rate.backoff_multiplier,
            project_delay: rate.project_delay,
            batch_size: rate.batch_size,
            batch_delay: rate.batch_delay,
        }
    }

    /// Gateway endpoints and request parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if an endpoint URL does not parse
    pub fn gateway(&self) -> Result<GatewaySettings> {
        Ok(GatewaySettings {
            challenge_url: parse_url("challenge_url", &self.api.challenge_url)?,
            leaderboard_url: parse_url("leaderboard_url", &self.api.leaderboard_url)?,
            user_agent: self.api.user_agent.clone(),
            request_timeout: self.api.request_timeout,
            query: LeaderboardQuery {
                top_n: self.api.top_n,
                community_tier: self.api.community_tier.clone(),
                customized_community: self.api.customized_community.clone(),
                community_yaps: self.api.community_yaps,
            },
        })
    }
}

fn parse_url(key: &str, value: &str) -> Result<Url> {
    let url = Url::parse(value).into_app_err_with(|| format!("{key} '{value}' is not a valid URL"))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(app_err!("{key} '{value}' must use http or https"));
    }
    Ok(url)
}

impl Default for Config {
    fn default() -> Self {
        toml::from_str(DEFAULT_CONFIG_TOML).expect("default_config.toml should be valid TOML that deserializes to Config")
    }
}
