use crate::domain::rating::NewRating;
use crate::error::{Error, Result};
use crate::ingest::types::FeedItem;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Parses a currency-formatted amount: `"$1,234.50"` → `1234.5`.
///
/// Only `$` and `,` are stripped; anything else that does not parse as a
/// finite number is rejected.
pub fn parse_money(raw: &str) -> Result<f64> {
    let cleaned: String = raw.chars().filter(|c| !matches!(c, '$' | ',')).collect();
    let cleaned = cleaned.trim();
    let value = cleaned
        .parse::<f64>()
        .map_err(|e| Error::validation(format!("invalid monetary value {raw:?}: {e}")))?;
    if !value.is_finite() {
        return Err(Error::validation(format!(
            "invalid monetary value {raw:?}: not a finite number"
        )));
    }
    Ok(value)
}

impl NewRating {
    pub fn from_feed_item(item: &FeedItem, now: DateTime<Utc>) -> Result<Self> {
        let target_from = parse_money(&item.target_from).map_err(|e| with_context(e, "target_from", item))?;
        let target_to = parse_money(&item.target_to).map_err(|e| with_context(e, "target_to", item))?;

        Ok(Self {
            code: Uuid::new_v4(),
            ticker: item.ticker.clone(),
            company: item.company.clone(),
            brokerage: item.brokerage.clone(),
            action: item.action.clone(),
            rating_from: item.rating_from.clone(),
            rating_to: item.rating_to.clone(),
            target_from,
            target_to,
            record_time: item.time,
            created_at: now,
            updated_at: now,
        })
    }
}

fn with_context(err: Error, field: &str, item: &FeedItem) -> Error {
    match err {
        Error::Validation { message } => Error::validation(format!(
            "{field} of {} ({}): {message}",
            item.ticker, item.brokerage
        )),
        other => other,
    }
}
