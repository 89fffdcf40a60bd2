//! Trial registry ingestion
//!
//! Fetches study records from the ClinicalTrials.gov v2 API and upserts
//! them into the trial store. Runs are idempotent: records are keyed by
//! `nct_id` and re-ingesting refreshes registry fields without touching
//! review state.
//!
//! The scheduler invokes [`RegistryIngestion`] through the
//! [`ScheduledJob`](crate::scheduler::ScheduledJob) trait; `trialscope
//! ingest` runs the same job once from the command line.

use async_trait::async_trait;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use serde::Deserialize;
use std::num::NonZeroU32;
use thiserror::Error;
use url::Url;

use crate::config::RegistryConfig;
use crate::db::{TrialStore, UpsertOutcome};
use crate::error::ErrorCategory;
use crate::models::{IngestStats, TrialUpsert};
use crate::scheduler::ScheduledJob;
use crate::utils::retry::{with_retry_if, RetryConfig};

/// Upper bound on pages fetched per run
const MAX_PAGES_PER_RUN: usize = 50;

// ============================================================================
// Errors
// ============================================================================

/// Ingestion errors, recoverable from the service's point of view: a failed
/// run is logged and the next scheduled firing retries it.
#[derive(Error, Debug)]
pub enum IngestError {
    /// HTTP transport errors
    #[error("registry request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status from the registry
    #[error("registry returned status {code}")]
    Status { code: u16 },

    /// Malformed registry payload
    #[error("failed to decode registry response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Registry returned an empty body
    #[error("registry returned an empty response")]
    EmptyResponse,

    /// Invalid registry base URL
    #[error("invalid registry url: {0}")]
    InvalidUrl(String),

    /// Database errors while storing fetched trials
    #[error("failed to store trial: {0}")]
    Storage(String),
}

impl IngestError {
    /// Check if this error is worth retrying within the same run
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Http(_) => true,
            Self::Status { code } => *code >= 500 || *code == 429,
            Self::Decode(_) | Self::EmptyResponse | Self::InvalidUrl(_) => false,
            Self::Storage(_) => false,
        }
    }

    /// Get the error category for handling strategies
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Http(_) | Self::Status { .. } => ErrorCategory::Network,
            Self::Storage(_) => ErrorCategory::Storage,
            Self::Decode(_) | Self::EmptyResponse | Self::InvalidUrl(_) => ErrorCategory::Other,
        }
    }
}

// ============================================================================
// Registry Payload
// ============================================================================

/// One page of the registry's study listing
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudiesPage {
    #[serde(default)]
    pub studies: Vec<Study>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Study {
    pub protocol_section: Option<ProtocolSection>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolSection {
    pub identification_module: Option<IdentificationModule>,
    pub status_module: Option<StatusModule>,
    pub description_module: Option<DescriptionModule>,
    pub conditions_module: Option<ConditionsModule>,
    pub design_module: Option<DesignModule>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentificationModule {
    pub nct_id: Option<String>,
    pub brief_title: Option<String>,
    pub official_title: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusModule {
    pub overall_status: Option<String>,
    pub start_date_struct: Option<DateStruct>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateStruct {
    pub date: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescriptionModule {
    pub brief_summary: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionsModule {
    #[serde(default)]
    pub conditions: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesignModule {
    #[serde(default)]
    pub phases: Vec<String>,
}

impl Study {
    /// Convert a registry study into an upsert payload.
    ///
    /// Returns `None` when the study carries no registry identifier.
    pub fn to_upsert(&self) -> Option<TrialUpsert> {
        let protocol = self.protocol_section.as_ref()?;
        let identification = protocol.identification_module.as_ref()?;
        let nct_id = identification.nct_id.clone()?;

        let title = identification
            .brief_title
            .clone()
            .or_else(|| identification.official_title.clone())
            .unwrap_or_else(|| nct_id.clone());

        let official_summary = protocol
            .description_module
            .as_ref()
            .and_then(|d| d.brief_summary.clone())
            .unwrap_or_default();

        let overall_status = protocol
            .status_module
            .as_ref()
            .and_then(|s| s.overall_status.clone());

        let start_date = protocol
            .status_module
            .as_ref()
            .and_then(|s| s.start_date_struct.as_ref())
            .and_then(|d| d.date.as_deref())
            .and_then(parse_registry_date);

        let conditions = protocol
            .conditions_module
            .as_ref()
            .filter(|c| !c.conditions.is_empty())
            .map(|c| c.conditions.join(", "));

        let phase = protocol
            .design_module
            .as_ref()
            .and_then(|d| d.phases.first().cloned());

        Some(TrialUpsert {
            nct_id,
            title,
            official_summary,
            overall_status,
            conditions,
            phase,
            start_date,
        })
    }
}

/// Parse a registry date, which may be a full date or just a month
fn parse_registry_date(raw: &str) -> Option<chrono::NaiveDate> {
    chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| chrono::NaiveDate::parse_from_str(&format!("{raw}-01"), "%Y-%m-%d"))
        .ok()
}

// ============================================================================
// Registry Client
// ============================================================================

/// HTTP client for the trial registry with rate limiting and retry
pub struct RegistryClient {
    client: reqwest::Client,
    base_url: Url,
    condition: String,
    page_size: u32,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    retry: RetryConfig,
}

impl RegistryClient {
    /// Create a client from registry configuration
    pub fn new(config: &RegistryConfig) -> Result<Self, IngestError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .gzip(true)
            .user_agent(format!("trialscope/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        let base_url = Url::parse(&config.base_url)
            .map_err(|e| IngestError::InvalidUrl(format!("{}: {e}", config.base_url)))?;

        let rate = NonZeroU32::new(config.requests_per_second)
            .unwrap_or_else(|| NonZeroU32::new(1).expect("1 is non-zero"));
        let rate_limiter = RateLimiter::direct(Quota::per_second(rate));

        Ok(Self {
            client,
            base_url,
            condition: config.condition.clone(),
            page_size: config.page_size,
            rate_limiter,
            retry: RetryConfig::default(),
        })
    }

    /// Override the retry policy (short delays in tests)
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Fetch one page of studies, retrying transient failures
    pub async fn fetch_page(&self, page_token: Option<&str>) -> Result<StudiesPage, IngestError> {
        self.rate_limiter.until_ready().await;

        with_retry_if(
            &self.retry,
            || self.request_page(page_token),
            IngestError::is_recoverable,
        )
        .await
    }

    async fn request_page(&self, page_token: Option<&str>) -> Result<StudiesPage, IngestError> {
        let mut url = self
            .base_url
            .join("studies")
            .map_err(|e| IngestError::InvalidUrl(e.to_string()))?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("query.cond", &self.condition);
            query.append_pair("pageSize", &self.page_size.to_string());
            if let Some(token) = page_token {
                query.append_pair("pageToken", token);
            }
        }

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(IngestError::Status {
                code: status.as_u16(),
            });
        }

        let body = response.text().await?;
        if body.trim().is_empty() {
            return Err(IngestError::EmptyResponse);
        }

        Ok(serde_json::from_str(&body)?)
    }
}

// ============================================================================
// Ingestion Job
// ============================================================================

/// The recurring ingestion task: fetch all study pages for the configured
/// condition and upsert them into the trial store.
pub struct RegistryIngestion {
    client: RegistryClient,
    store: TrialStore,
}

impl RegistryIngestion {
    pub fn new(client: RegistryClient, store: TrialStore) -> Self {
        Self { client, store }
    }

    /// Execute one full ingestion run
    pub async fn run_once(&self) -> Result<IngestStats, IngestError> {
        let mut stats = IngestStats::default();
        let mut page_token: Option<String> = None;
        let mut pages = 0;

        loop {
            let page = self.client.fetch_page(page_token.as_deref()).await?;
            pages += 1;

            for study in &page.studies {
                stats.fetched += 1;
                let Some(upsert) = study.to_upsert() else {
                    stats.skipped += 1;
                    continue;
                };

                match self.store.upsert(&upsert).await {
                    Ok(UpsertOutcome::Inserted) => stats.inserted += 1,
                    Ok(UpsertOutcome::Updated) => stats.updated += 1,
                    Err(e) => return Err(IngestError::Storage(e.to_string())),
                }
            }

            page_token = page.next_page_token;
            if page_token.is_none() {
                break;
            }
            if pages >= MAX_PAGES_PER_RUN {
                tracing::warn!(
                    pages = pages,
                    "Stopping ingestion run at page limit with more pages available"
                );
                break;
            }
        }

        crate::metrics::record_trials_upserted(stats.upserted() as u64);

        tracing::info!(
            fetched = stats.fetched,
            inserted = stats.inserted,
            updated = stats.updated,
            skipped = stats.skipped,
            "Ingestion run complete"
        );

        Ok(stats)
    }
}

#[async_trait]
impl ScheduledJob for RegistryIngestion {
    fn name(&self) -> &'static str {
        "registry-ingestion"
    }

    async fn run(&self) -> anyhow::Result<()> {
        self.run_once().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn study_json(nct_id: &str) -> serde_json::Value {
        serde_json::json!({
            "protocolSection": {
                "identificationModule": {
                    "nctId": nct_id,
                    "briefTitle": "A Study of Something",
                },
                "statusModule": {
                    "overallStatus": "RECRUITING",
                    "startDateStruct": { "date": "2024-03" },
                },
                "descriptionModule": { "briefSummary": "Summary text." },
                "conditionsModule": { "conditions": ["Osteosarcoma"] },
                "designModule": { "phases": ["PHASE2"] },
            }
        })
    }

    #[test]
    fn test_study_to_upsert() {
        let study: Study = serde_json::from_value(study_json("NCT00000001")).unwrap();
        let upsert = study.to_upsert().unwrap();

        assert_eq!(upsert.nct_id, "NCT00000001");
        assert_eq!(upsert.title, "A Study of Something");
        assert_eq!(upsert.overall_status.as_deref(), Some("RECRUITING"));
        assert_eq!(upsert.conditions.as_deref(), Some("Osteosarcoma"));
        assert_eq!(upsert.phase.as_deref(), Some("PHASE2"));
        assert_eq!(
            upsert.start_date,
            Some(chrono::NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
        );
    }

    #[test]
    fn test_study_without_nct_id_is_skipped() {
        let study: Study = serde_json::from_value(serde_json::json!({
            "protocolSection": { "identificationModule": { "briefTitle": "No ID" } }
        }))
        .unwrap();

        assert!(study.to_upsert().is_none());
    }

    #[test]
    fn test_parse_registry_date_forms() {
        assert_eq!(
            parse_registry_date("2023-07-15"),
            chrono::NaiveDate::from_ymd_opt(2023, 7, 15)
        );
        assert_eq!(
            parse_registry_date("2023-07"),
            chrono::NaiveDate::from_ymd_opt(2023, 7, 1)
        );
        assert_eq!(parse_registry_date("not a date"), None);
    }

    #[test]
    fn test_page_decode_with_token() {
        let page: StudiesPage = serde_json::from_value(serde_json::json!({
            "studies": [study_json("NCT00000002")],
            "nextPageToken": "abc123",
        }))
        .unwrap();

        assert_eq!(page.studies.len(), 1);
        assert_eq!(page.next_page_token.as_deref(), Some("abc123"));
    }

    #[test]
    fn test_error_recoverability() {
        assert!(IngestError::Status { code: 503 }.is_recoverable());
        assert!(IngestError::Status { code: 429 }.is_recoverable());
        assert!(!IngestError::Status { code: 404 }.is_recoverable());
        assert!(!IngestError::EmptyResponse.is_recoverable());
    }
}
