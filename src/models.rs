// Core data structures for trialscope

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A clinical trial record as stored and served by the backend.
///
/// Keyed by the registry identifier (`nct_id`). The registry fields
/// (`title`, `official_summary`, `overall_status`, ...) are refreshed on
/// every ingestion run; the review fields (`status`, `custom_summary`)
/// belong to this application and survive re-ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClinicalTrial {
    pub id: i32,
    pub nct_id: String,
    pub title: String,
    pub official_summary: String,
    pub custom_summary: Option<String>,
    pub status: ReviewStatus,
    /// Recruitment status as reported by the registry (e.g. "RECRUITING").
    pub overall_status: Option<String>,
    pub conditions: Option<String>,
    pub phase: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub first_seen_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl ClinicalTrial {
    /// Registry page for this trial
    pub fn source_url(&self) -> String {
        format!("https://clinicaltrials.gov/study/{}", self.nct_id)
    }
}

/// Review state of a trial within this application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewStatus {
    PendingReview,
    Approved,
    Rejected,
}

impl ReviewStatus {
    /// Database/string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingReview => "PENDING_REVIEW",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
        }
    }

    /// Create from string, case-insensitive
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "PENDING_REVIEW" => Some(Self::PendingReview),
            "APPROVED" => Some(Self::Approved),
            "REJECTED" => Some(Self::Rejected),
            _ => None,
        }
    }

    /// All review states, in workflow order
    pub fn all() -> [Self; 3] {
        [Self::PendingReview, Self::Approved, Self::Rejected]
    }
}

impl Default for ReviewStatus {
    fn default() -> Self {
        Self::PendingReview
    }
}

impl std::fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields a trial record is created or refreshed from during ingestion.
///
/// This is the upsert payload: review fields are intentionally absent so
/// re-ingesting an already reviewed trial cannot reset its review state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialUpsert {
    pub nct_id: String,
    pub title: String,
    pub official_summary: String,
    pub overall_status: Option<String>,
    pub conditions: Option<String>,
    pub phase: Option<String>,
    pub start_date: Option<NaiveDate>,
}

/// Filter and paging parameters for trial listings
#[derive(Debug, Clone, Default)]
pub struct TrialFilter {
    pub status: Option<ReviewStatus>,
    pub search: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl TrialFilter {
    pub const DEFAULT_LIMIT: i64 = 50;
    pub const MAX_LIMIT: i64 = 200;

    /// Clamp paging values into the supported range
    pub fn normalized(mut self) -> Self {
        if self.limit <= 0 {
            self.limit = Self::DEFAULT_LIMIT;
        }
        self.limit = self.limit.min(Self::MAX_LIMIT);
        self.offset = self.offset.max(0);
        self
    }
}

/// Per-run ingestion outcome counts
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct IngestStats {
    pub fetched: usize,
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
}

impl IngestStats {
    pub fn upserted(&self) -> usize {
        self.inserted + self.updated
    }
}
