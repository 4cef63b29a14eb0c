//! Safety oracle integration.
//!
//! Queries an external fraud-scoring service per token address and reduces
//! the response to a score plus a Good/Bad/Unknown verdict. This boundary
//! never raises: any transport or parse failure becomes `(0, Unknown)`,
//! which the engine treats as non-tradable.
//!
//! Auth: `Authorization: Bearer {key}`, key resolved from the environment
//! at startup and held in a [`SecretString`].

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::SafetyConfig;
use crate::types::SafetyStatus;

const SOURCE_NAME: &str = "solsniffer";

/// Minimum score for a `Good` verdict; also the engine's entry threshold.
pub const GOOD_SCORE_THRESHOLD: u8 = 85;

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Outcome of scoring one token address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SafetyReport {
    pub score: u8,
    pub status: SafetyStatus,
}

impl SafetyReport {
    /// The report every failure path collapses to.
    pub fn unknown() -> Self {
        Self {
            score: 0,
            status: SafetyStatus::Unknown,
        }
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SafetyScorer: Send + Sync {
    /// Score one address. Infallible by contract; failures come back
    /// `Unknown`.
    async fn score(&self, address: &str) -> SafetyReport;
}

// ---------------------------------------------------------------------------
// API response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct OracleResponse {
    #[serde(default)]
    score: i64,
    #[serde(default)]
    fake_volume: bool,
    #[serde(default)]
    rugger: bool,
    #[serde(default)]
    cabal: bool,
}

impl OracleResponse {
    /// `Good` needs a passing score and a clean flag set; anything the
    /// oracle actually answered that falls short is `Bad`.
    fn verdict(&self) -> SafetyReport {
        let score = self.score.clamp(0, 100) as u8;
        let flagged = self.fake_volume || self.rugger || self.cabal;
        let status = if score >= GOOD_SCORE_THRESHOLD && !flagged {
            SafetyStatus::Good
        } else {
            SafetyStatus::Bad
        };
        SafetyReport { score, status }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// HTTP client for the safety oracle.
pub struct SolsnifferClient {
    http: Client,
    base_url: String,
    api_key: SecretString,
}

impl SolsnifferClient {
    pub fn new(cfg: &SafetyConfig, api_key: SecretString) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(cfg.timeout_secs))
            .user_agent("KESTREL/0.1.0 (token-sniper-agent)")
            .build()
            .context("Failed to build HTTP client for safety oracle")?;

        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    async fn try_score(&self, address: &str) -> Result<SafetyReport> {
        let url = format!("{}/{address}", self.base_url);
        debug!(url = %url, "Scoring token");

        let resp = self
            .http
            .get(&url)
            .bearer_auth(self.api_key.expose_secret())
            .send()
            .await
            .with_context(|| format!("{SOURCE_NAME} request failed"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            anyhow::bail!("{SOURCE_NAME} API error {status}");
        }

        let parsed: OracleResponse = resp
            .json()
            .await
            .with_context(|| format!("Failed to parse {SOURCE_NAME} response"))?;

        Ok(parsed.verdict())
    }
}

#[async_trait]
impl SafetyScorer for SolsnifferClient {
    async fn score(&self, address: &str) -> SafetyReport {
        match self.try_score(address).await {
            Ok(report) => report,
            Err(e) => {
                warn!(token = %address, error = %e, "Safety scoring failed, treating as Unknown");
                SafetyReport::unknown()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn response(score: i64, fake_volume: bool, rugger: bool, cabal: bool) -> OracleResponse {
        OracleResponse {
            score,
            fake_volume,
            rugger,
            cabal,
        }
    }

    #[test]
    fn test_verdict_good_at_threshold() {
        let report = response(85, false, false, false).verdict();
        assert_eq!(report.score, 85);
        assert_eq!(report.status, SafetyStatus::Good);
    }

    #[test]
    fn test_verdict_bad_below_threshold() {
        let report = response(84, false, false, false).verdict();
        assert_eq!(report.status, SafetyStatus::Bad);
    }

    #[test]
    fn test_verdict_bad_when_flagged() {
        assert_eq!(response(95, true, false, false).verdict().status, SafetyStatus::Bad);
        assert_eq!(response(95, false, true, false).verdict().status, SafetyStatus::Bad);
        assert_eq!(response(95, false, false, true).verdict().status, SafetyStatus::Bad);
    }

    #[test]
    fn test_verdict_score_clamped() {
        assert_eq!(response(150, false, false, false).verdict().score, 100);
        assert_eq!(response(-3, false, false, false).verdict().score, 0);
    }

    #[test]
    fn test_parse_response_defaults() {
        let parsed: OracleResponse = serde_json::from_str("{}").unwrap();
        let report = parsed.verdict();
        assert_eq!(report.score, 0);
        assert_eq!(report.status, SafetyStatus::Bad);
    }

    #[test]
    fn test_parse_full_response() {
        let parsed: OracleResponse = serde_json::from_str(
            r#"{"score": 90, "fake_volume": false, "rugger": false, "cabal": false}"#,
        )
        .unwrap();
        assert_eq!(parsed.verdict().status, SafetyStatus::Good);
    }

    #[test]
    fn test_unknown_report() {
        let report = SafetyReport::unknown();
        assert_eq!(report.score, 0);
        assert_eq!(report.status, SafetyStatus::Unknown);
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let mut cfg = SafetyConfig::default();
        cfg.base_url = "https://oracle.example.com/v1/token/".into();
        let client = SolsnifferClient::new(&cfg, SecretString::new("key".into())).unwrap();
        assert_eq!(client.base_url, "https://oracle.example.com/v1/token");
    }
}
