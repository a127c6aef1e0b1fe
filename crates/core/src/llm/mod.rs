pub mod openai;

use crate::domain::rating::RatingRecord;
use crate::domain::recommendation::Recommendation;
use crate::error::Result;

/// Opaque ranker: takes candidate ratings, answers with free text.
#[async_trait::async_trait]
pub trait RankingOracle: Send + Sync {
    fn provider_name(&self) -> &'static str;

    async fn rank(&self, stocks: &[RatingRecord]) -> Result<String>;
}

/// Asks the oracle to rank `stocks`. An empty candidate set skips the call.
pub async fn recommend(oracle: &dyn RankingOracle, stocks: Vec<RatingRecord>) -> Result<Recommendation> {
    if stocks.is_empty() {
        tracing::info!(provider = oracle.provider_name(), "no recommendation candidates; skipping oracle");
        return Ok(Recommendation {
            stocks,
            message: None,
            priority: None,
        });
    }

    let message = oracle.rank(&stocks).await?;
    tracing::info!(
        provider = oracle.provider_name(),
        candidates = stocks.len(),
        message_len = message.len(),
        "ranking oracle answered"
    );

    Ok(Recommendation {
        stocks,
        message: Some(message),
        priority: None,
    })
}
