use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fixed page size of the list endpoint.
pub const PAGE_SIZE: u32 = 20;

/// One analyst brokerage action on a ticker, as stored in `stocks`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct RatingRecord {
    pub code: Uuid,
    pub ticker: Option<String>,
    pub company: Option<String>,
    pub brokerage: Option<String>,
    pub action: Option<String>,
    pub rating_from: Option<String>,
    pub rating_to: Option<String>,
    pub target_from: Option<f64>,
    pub target_to: Option<f64>,
    pub record_time: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Insert-ready record produced by the feed normalizer.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRating {
    pub code: Uuid,
    pub ticker: String,
    pub company: String,
    pub brokerage: String,
    pub action: String,
    pub rating_from: String,
    pub rating_to: String,
    pub target_from: f64,
    pub target_to: f64,
    pub record_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingPage {
    pub stocks: Vec<RatingRecord>,
    pub current_page: u32,
    pub next_page: Option<u32>,
    pub total: u64,
    pub per_page: u32,
}

/// `page + 1` when rows remain past the current page.
pub fn next_page(page: u32, per_page: u32, total: u64) -> Option<u32> {
    let seen = u64::from(page) * u64::from(per_page);
    (seen < total).then(|| page.saturating_add(1))
}
