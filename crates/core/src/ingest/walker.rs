use crate::error::Result;
use crate::ingest::provider::FeedSource;
use crate::ingest::types::FeedPage;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkMetrics {
    pub calls: u64,
    pub items: u64,
    pub elapsed: Duration,
}

/// Walks a continuation-token feed one page at a time.
///
/// The walk ends after the first page reporting an empty token, after any
/// error, or once `max_pages` calls were made. A finished walker never calls
/// the source again.
pub struct FeedWalker<S> {
    source: S,
    token: String,
    max_pages: Option<u64>,
    calls: u64,
    items: u64,
    started: Instant,
    finished: bool,
}

impl<S: FeedSource> FeedWalker<S> {
    pub fn new(source: S, start_token: impl Into<String>) -> Self {
        Self {
            source,
            token: start_token.into(),
            max_pages: None,
            calls: 0,
            items: 0,
            started: Instant::now(),
            finished: false,
        }
    }

    pub fn with_max_pages(mut self, max_pages: Option<u64>) -> Self {
        self.max_pages = max_pages;
        self
    }

    pub async fn next_page(&mut self) -> Result<Option<FeedPage>> {
        if self.finished {
            return Ok(None);
        }
        if self.max_pages.is_some_and(|max| self.calls >= max) {
            tracing::info!(
                calls = self.calls,
                resume_token = %self.token,
                "max pages reached; stopping feed walk"
            );
            self.finished = true;
            return Ok(None);
        }

        self.calls += 1;
        let page = match self.source.fetch_page(&self.token).await {
            Ok(page) => page,
            Err(err) => {
                self.finished = true;
                tracing::error!(
                    source = self.source.source_name(),
                    call = self.calls,
                    token = %self.token,
                    error = %err,
                    "feed page fetch failed; aborting walk"
                );
                return Err(err);
            }
        };

        self.items += page.items.len() as u64;
        match page.next_token() {
            Some(next) => self.token = next.to_string(),
            None => {
                self.token.clear();
                self.finished = true;
            }
        }

        Ok(Some(page))
    }

    /// Token the next call would send; empty once the feed is exhausted.
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn metrics(&self) -> WalkMetrics {
        WalkMetrics {
            calls: self.calls,
            items: self.items,
            elapsed: self.started.elapsed(),
        }
    }
}
