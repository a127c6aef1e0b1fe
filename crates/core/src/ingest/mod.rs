pub mod loader;
pub mod normalize;
pub mod provider;
pub mod types;
pub mod walker;

pub use loader::{RatingLoader, RatingWriter};
pub use normalize::parse_money;
pub use provider::{FeedSource, HttpFeedSource};
pub use types::{FeedItem, FeedPage};
pub use walker::{FeedWalker, WalkMetrics};

use crate::error::Result;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestReport {
    pub calls: u64,
    pub items_observed: u64,
    pub items_inserted: u64,
    pub elapsed: Duration,
}

/// Walks the feed to the end, loading each page before requesting the next.
///
/// Any error stops the run immediately; the walker keeps its metrics and
/// current token so the caller can report how far it got.
pub async fn run<S, W>(walker: &mut FeedWalker<S>, loader: &RatingLoader<W>) -> Result<IngestReport>
where
    S: FeedSource,
    W: RatingWriter,
{
    let mut inserted: u64 = 0;
    while let Some(page) = walker.next_page().await? {
        let n = loader.load_page(&page).await?;
        inserted += n;

        let metrics = walker.metrics();
        tracing::info!(
            call = metrics.calls,
            page_items = page.items.len(),
            inserted = n,
            total_inserted = inserted,
            next_token = walker.token(),
            "feed page loaded"
        );
    }

    let metrics = walker.metrics();
    Ok(IngestReport {
        calls: metrics.calls,
        items_observed: metrics.items,
        items_inserted: inserted,
        elapsed: metrics.elapsed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::ingest::loader::tests::MemoryWriter;
    use crate::ingest::walker::tests::{item, ScriptedFeed};

    #[tokio::test]
    async fn run_loads_every_page_until_the_token_is_empty() {
        let feed = ScriptedFeed::default()
            .page("", vec![item("A", "$1,000.00", "$1,100.00"), item("B", "$1", "$2")], "t1")
            .page("t1", vec![item("C", "85.00", "$88.00")], "");
        let mut walker = FeedWalker::new(&feed, "");
        let loader = RatingLoader::new(MemoryWriter::default());

        let report = run(&mut walker, &loader).await.unwrap();
        assert_eq!(report.calls, 2);
        assert_eq!(report.items_observed, 3);
        assert_eq!(report.items_inserted, 3);
        assert_eq!(loader.writer().tickers(), vec!["A", "B", "C"]);

        let rows = loader.writer().rows.lock().unwrap();
        assert_eq!(rows[0].target_from, 1000.0);
        assert_eq!(rows[2].target_from, 85.0);
    }

    #[tokio::test]
    async fn bad_money_aborts_the_run_before_later_items_and_pages() {
        let feed = ScriptedFeed::default()
            .page("", vec![item("A", "$1", "$2")], "t1")
            .page("t1", vec![item("B", "$1", "$2"), item("BAD", "$x.00", "$2"), item("C", "$1", "$2")], "t2")
            .page("t2", vec![item("D", "$1", "$2")], "");
        let mut walker = FeedWalker::new(&feed, "");
        let loader = RatingLoader::new(MemoryWriter::default());

        let err = run(&mut walker, &loader).await.unwrap_err();
        assert!(matches!(err, Error::Validation { .. }), "{err:?}");

        let tickers = loader.writer().tickers();
        assert!(!tickers.contains(&"BAD".to_string()));
        assert!(!tickers.contains(&"C".to_string()));
        assert!(!tickers.contains(&"D".to_string()));
        assert_eq!(feed.calls(), vec!["", "t1"]);
    }

    #[tokio::test]
    async fn upstream_failure_is_fatal_to_the_run() {
        let feed = ScriptedFeed::default()
            .page("", vec![item("A", "$1", "$2")], "t1")
            .failure("t1", "connection reset");
        let mut walker = FeedWalker::new(&feed, "");
        let loader = RatingLoader::new(MemoryWriter::default());

        let err = run(&mut walker, &loader).await.unwrap_err();
        assert!(matches!(err, Error::UpstreamFeed { .. }));
        assert_eq!(loader.writer().tickers(), vec!["A"]);
        assert_eq!(walker.metrics().calls, 2);
    }
}
