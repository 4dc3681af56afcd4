use super::pow::InvalidDifficulty;
use super::rate::ErrorKind;
use reqwest::StatusCode;
use thiserror::Error;

/// Everything that can go wrong while fetching one leaderboard.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The challenge request failed or returned something unusable.
    #[error("unable to obtain a challenge: {0}")]
    ChallengeFetch(String),

    /// The challenge carried a difficulty no proof can satisfy.
    #[error("unusable challenge: {0}")]
    Difficulty(#[from] InvalidDifficulty),

    #[error("proof rejected or challenge expired (HTTP {0})")]
    Auth(StatusCode),

    #[error("rate limited by the gateway (HTTP {0})")]
    Throttle(StatusCode),

    #[error("gateway server error (HTTP {0})")]
    Server(StatusCode),

    #[error("unexpected HTTP status {0}")]
    UnexpectedStatus(StatusCode),

    #[error("network failure: {0}")]
    Network(#[source] reqwest::Error),

    /// The payload is neither an array of records nor an object with a `data` array.
    #[error("malformed leaderboard response: {0}")]
    MalformedResponse(String),

    #[error("gave up after {attempts} attempt(s): {last}")]
    ExhaustedRetries { attempts: u32, last: Box<Self> },
}

impl FetchError {
    /// Classify the failure for backoff purposes.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Auth(_) => ErrorKind::Auth,
            Self::Throttle(_) => ErrorKind::Throttle,
            Self::Server(_) => ErrorKind::ServerError,
            Self::ChallengeFetch(_) | Self::Difficulty(_) | Self::UnexpectedStatus(_) | Self::Network(_) | Self::MalformedResponse(_) => {
                ErrorKind::Network
            }
            Self::ExhaustedRetries { last, .. } => last.kind(),
        }
    }

    /// Whether another attempt could plausibly succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        !matches!(self, Self::MalformedResponse(_) | Self::ExhaustedRetries { .. })
    }

    /// Map a non-success data response status to an error.
    #[must_use]
    pub fn from_status(status: StatusCode) -> Self {
        match status {
            StatusCode::UNAUTHORIZED => Self::Auth(status),
            StatusCode::TOO_MANY_REQUESTS => Self::Throttle(status),
            s if s.is_server_error() => Self::Server(s),
            s => Self::UnexpectedStatus(s),
        }
    }
}
