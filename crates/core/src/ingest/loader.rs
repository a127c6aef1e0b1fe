use crate::domain::rating::NewRating;
use crate::error::Result;
use crate::ingest::types::FeedPage;
use chrono::{DateTime, Utc};

/// Persists normalized ratings in the given order.
#[async_trait::async_trait]
pub trait RatingWriter: Send + Sync {
    async fn insert_all(&self, records: &[NewRating]) -> Result<u64>;
}

pub struct RatingLoader<W> {
    writer: W,
}

impl<W: RatingWriter> RatingLoader<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    /// Normalizes a whole page. The first malformed item fails the page, so
    /// nothing from it reaches the writer.
    pub fn normalize_page(page: &FeedPage, now: DateTime<Utc>) -> Result<Vec<NewRating>> {
        page.items
            .iter()
            .map(|item| NewRating::from_feed_item(item, now))
            .collect()
    }

    pub async fn load_page(&self, page: &FeedPage) -> Result<u64> {
        let records = Self::normalize_page(page, Utc::now())?;
        self.writer.insert_all(&records).await
    }
}
