//! Fractional-difficulty proof-of-work solver.
//!
//! The gateway issues a `(challenge, difficulty)` pair. A nonce is accepted when
//! `sha256("{challenge}:{nonce}")`, rendered as lowercase hex, starts with
//! `floor(difficulty)` zero digits and, when the difficulty has a fractional
//! part, the next hex digit is below `ceil(16 * (1 - frac)) mod 16`.
//!
//! The search starts at nonce 0 and walks upward, so the returned nonce is the
//! smallest one that satisfies the target.

use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::time::Instant;
use thiserror::Error;

const LOG_TARGET: &str = "       pow";

/// How often the search reports its progress.
const PROGRESS_INTERVAL: u64 = 100_000;

/// A SHA-256 hex digest is 64 digits long, so no target can ask for more.
const MAX_DIFFICULTY: f64 = 64.0;

/// Headers proving work was done for one challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofHeaders {
    pub challenge: String,
    pub nonce: u64,
    pub hash: String,
}

impl ProofHeaders {
    /// Header name/value pairs to attach to the data request.
    #[must_use]
    pub fn to_header_pairs(&self) -> [(&'static str, String); 3] {
        [
            ("x-challenge", self.challenge.clone()),
            ("x-nonce", self.nonce.to_string()),
            ("x-hash", self.hash.clone()),
        ]
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq)]
#[error("difficulty {0} is outside the solvable range 0..=64")]
pub struct InvalidDifficulty(pub f64);

/// The acceptance rule derived from a difficulty value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    zero_digits: usize,

    /// Exclusive upper bound for the hex digit following the zero prefix.
    /// `None` means the digit is unconstrained.
    digit_bound: Option<u32>,
}

impl Target {
    pub fn from_difficulty(difficulty: f64) -> Result<Self, InvalidDifficulty> {
        if !difficulty.is_finite() || !(0.0..=MAX_DIFFICULTY).contains(&difficulty) {
            return Err(InvalidDifficulty(difficulty));
        }

        let whole = difficulty.floor();
        let frac = difficulty - whole;

        #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss, reason = "range checked above")]
        let zero_digits = whole as usize;

        #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss, reason = "value lies in 1..=16")]
        let threshold = (16.0 * (1.0 - frac)).ceil() as u32 % 16;

        // A tiny fractional part makes the threshold wrap to 0, which no digit
        // can satisfy. Treat it as "any digit" rather than an unsolvable target.
        let digit_bound = (frac > 0.0 && threshold > 0).then_some(threshold);

        Ok(Self { zero_digits, digit_bound })
    }

    #[must_use]
    pub fn is_met(&self, hex_hash: &str) -> bool {
        let bytes = hex_hash.as_bytes();
        if bytes.len() < self.zero_digits || !bytes.iter().take(self.zero_digits).all(|&b| b == b'0') {
            return false;
        }

        match self.digit_bound {
            None => true,
            Some(bound) => bytes
                .get(self.zero_digits)
                .and_then(|&b| char::from(b).to_digit(16))
                .is_some_and(|digit| digit < bound),
        }
    }
}

/// Hash one candidate the way the gateway does.
#[must_use]
pub fn hash_candidate(challenge: &str, nonce: u64) -> String {
    let mut key = String::with_capacity(challenge.len() + 21);
    key.push_str(challenge);
    key.push(':');
    let _ = write!(key, "{nonce}");
    hex::encode(Sha256::digest(key.as_bytes()))
}

/// Search for the smallest nonce that satisfies `difficulty` for `challenge`.
///
/// The search is unbounded; it is CPU-bound and does not yield.
pub fn solve(challenge: &str, difficulty: f64) -> Result<ProofHeaders, InvalidDifficulty> {
    solve_with(challenge, difficulty, hash_candidate)
}

/// Like [`solve`], with the hash function supplied by the caller.
pub fn solve_with<H>(challenge: &str, difficulty: f64, hasher: H) -> Result<ProofHeaders, InvalidDifficulty>
where
    H: Fn(&str, u64) -> String,
{
    let target = Target::from_difficulty(difficulty)?;
    let started = Instant::now();

    let mut nonce: u64 = 0;
    loop {
        let hash = hasher(challenge, nonce);
        if target.is_met(&hash) {
            log::debug!(target: LOG_TARGET,
                "Solved difficulty {difficulty} with nonce {nonce} in {}ms",
                started.elapsed().as_millis()
            );

            return Ok(ProofHeaders {
                challenge: challenge.to_string(),
                nonce,
                hash,
            });
        }

        nonce += 1;
        if nonce % PROGRESS_INTERVAL == 0 {
            log::debug!(target: LOG_TARGET, "Still searching at nonce {nonce} (difficulty {difficulty})");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_integer_difficulty() {
        let target = Target::from_difficulty(2.0).unwrap();
        assert_eq!(target, Target { zero_digits: 2, digit_bound: None });
        assert!(target.is_met("00f1"));
        assert!(!target.is_met("0f01"));
    }

    #[test]
    fn test_target_fractional_difficulty() {
        // frac 0.5 -> ceil(8) % 16 = 8
        let target = Target::from_difficulty(1.5).unwrap();
        assert_eq!(target.digit_bound, Some(8));
        assert!(target.is_met("07ab"));
        assert!(!target.is_met("08ab"));
        assert!(!target.is_met("17ab"));
    }

    #[test]
    fn test_target_threshold_matches_formula() {
        // frac 0.25 -> ceil(12) = 12, frac 0.9 -> ceil(1.6) = 2
        assert_eq!(Target::from_difficulty(0.25).unwrap().digit_bound, Some(12));
        assert_eq!(Target::from_difficulty(3.9).unwrap().digit_bound, Some(2));
    }

    #[test]
    fn test_target_wrapped_threshold_is_unconstrained() {
        // frac 0.01 -> ceil(15.84) = 16 -> 16 % 16 = 0
        let target = Target::from_difficulty(1.01).unwrap();
        assert_eq!(target.digit_bound, None);
        assert!(target.is_met("0fff"));
    }

    #[test]
    fn test_target_rejects_invalid_difficulty() {
        assert!(Target::from_difficulty(-0.5).is_err());
        assert!(Target::from_difficulty(f64::NAN).is_err());
        assert!(Target::from_difficulty(f64::INFINITY).is_err());
        assert!(Target::from_difficulty(65.0).is_err());
    }

    #[test]
    fn test_zero_difficulty_accepts_first_nonce() {
        let proof = solve("anything", 0.0).unwrap();
        assert_eq!(proof.nonce, 0);
        assert_eq!(proof.hash, hash_candidate("anything", 0));
    }

    #[test]
    fn test_hash_candidate_joins_with_colon() {
        assert_eq!(hash_candidate("abc", 12), hex::encode(Sha256::digest(b"abc:12")));
        assert_eq!(hash_candidate("abc", 0).len(), 64);
    }

    #[test]
    fn test_solution_is_valid_and_minimal() {
        for (challenge, difficulty) in [("c0ffee", 1.0), ("deadbeef", 1.5), ("f00d", 2.25), ("x", 0.75)] {
            let proof = solve(challenge, difficulty).unwrap();
            let target = Target::from_difficulty(difficulty).unwrap();

            assert_eq!(proof.challenge, challenge);
            assert_eq!(proof.hash, hash_candidate(challenge, proof.nonce));
            assert!(target.is_met(&proof.hash));

            for smaller in 0..proof.nonce {
                assert!(
                    !target.is_met(&hash_candidate(challenge, smaller)),
                    "nonce {smaller} also satisfies {difficulty} for {challenge}"
                );
            }
        }
    }

    #[test]
    fn test_solve_with_stubbed_hash() {
        // Only nonce 7 produces a hash with two leading zeros.
        let proof = solve_with("c", 2.0, |_, nonce| if nonce == 7 { "00ab".into() } else { "ffff".into() }).unwrap();
        assert_eq!(proof.nonce, 7);
        assert_eq!(proof.hash, "00ab");
    }

    #[test]
    fn test_search_length_grows_with_difficulty() {
        let mean_nonce = |difficulty: f64| {
            let total: u64 = (0..200)
                .map(|i| solve(&format!("challenge-{i}"), difficulty).unwrap().nonce)
                .sum();
            total as f64 / 200.0
        };

        let means: Vec<f64> = [0.0, 0.5, 1.0, 1.5].into_iter().map(mean_nonce).collect();
        assert!(means.windows(2).all(|pair| pair[0] < pair[1]), "means not increasing: {means:?}");
    }

    #[test]
    fn test_header_pairs() {
        let proof = ProofHeaders {
            challenge: "abc".into(),
            nonce: 42,
            hash: "00ff".into(),
        };
        let pairs = proof.to_header_pairs();
        assert_eq!(pairs[0], ("x-challenge", "abc".to_string()));
        assert_eq!(pairs[1], ("x-nonce", "42".to_string()));
        assert_eq!(pairs[2], ("x-hash", "00ff".to_string()));
    }
}
