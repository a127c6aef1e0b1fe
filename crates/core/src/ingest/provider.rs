use crate::config::Settings;
use crate::error::{Error, Result};
use crate::ingest::types::FeedPage;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use std::time::Duration;

/// One page of the upstream rating feed per call. An empty token asks for the first page.
#[async_trait::async_trait]
pub trait FeedSource: Send + Sync {
    fn source_name(&self) -> &'static str;

    async fn fetch_page(&self, token: &str) -> Result<FeedPage>;
}

#[async_trait::async_trait]
impl<T: FeedSource + ?Sized> FeedSource for &T {
    fn source_name(&self) -> &'static str {
        (**self).source_name()
    }

    async fn fetch_page(&self, token: &str) -> Result<FeedPage> {
        (**self).fetch_page(token).await
    }
}

#[derive(Debug, Clone)]
pub struct HttpFeedSource {
    http: reqwest::Client,
    url: String,
    headers: HeaderMap,
}

impl HttpFeedSource {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(
            settings.require_stocks_url()?,
            settings.require_api_token()?,
            settings.feed_timeout,
        )
    }

    pub fn new(url: &str, api_token: &str, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {api_token}")).map_err(|_| {
            Error::Config {
                message: "API_TOKEN is not a valid header value".to_string(),
            }
        })?;
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config {
                message: format!("failed to build feed http client: {e}"),
            })?;

        Ok(Self {
            http,
            url: url.to_string(),
            headers,
        })
    }
}

#[async_trait::async_trait]
impl FeedSource for HttpFeedSource {
    fn source_name(&self) -> &'static str {
        "http_feed"
    }

    async fn fetch_page(&self, token: &str) -> Result<FeedPage> {
        let mut req = self.http.get(&self.url).headers(self.headers.clone());
        if !token.is_empty() {
            req = req.query(&[("next_page", token)]);
        }

        tracing::debug!(url = %self.url, token, "requesting feed page");

        let res = req
            .send()
            .await
            .map_err(|e| Error::upstream(format!("feed request failed: {e}")))?;

        let status = res.status();
        let text = res
            .text()
            .await
            .map_err(|e| Error::upstream(format!("failed to read feed response: {e}")))?;

        if !status.is_success() {
            return Err(Error::upstream(format!("feed HTTP {status}: {text}")));
        }

        serde_json::from_str::<FeedPage>(&text)
            .map_err(|e| Error::upstream(format!("failed to decode feed page: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Query, State};
    use axum::http::{HeaderMap as AxumHeaders, StatusCode};
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone)]
    struct Seen {
        authorization: Option<String>,
        content_type: Option<String>,
        token: Option<String>,
    }

    type Log = Arc<Mutex<Vec<Seen>>>;

    async fn feed(
        State(log): State<Log>,
        headers: AxumHeaders,
        Query(q): Query<HashMap<String, String>>,
    ) -> Result<Json<Value>, StatusCode> {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let token = q.get("next_page").cloned();
        log.lock().unwrap().push(Seen {
            authorization: header("authorization"),
            content_type: header("content-type"),
            token: token.clone(),
        });

        let item = |ticker: &str| {
            json!({
                "ticker": ticker,
                "target_from": "$1,000.00",
                "target_to": "$1,100.00",
                "company": "Co",
                "action": "target raised by",
                "brokerage": "B",
                "rating_from": "Buy",
                "rating_to": "Buy",
                "time": "2025-07-17T00:30:07Z"
            })
        };

        let body = match token.as_deref() {
            None => json!({"items": [item("A"), item("B")], "next_page": "B"}),
            Some("B") => json!({"items": [item("C")], "next_page": "C"}),
            Some("C") => json!({"items": [], "next_page": ""}),
            Some("broken") => return Ok(Json(json!({"items": "not a list"}))),
            Some(_) => return Err(StatusCode::BAD_GATEWAY),
        };
        Ok(Json(body))
    }

    async fn serve() -> (String, Log) {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route("/stocks", get(feed))
            .with_state(log.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/stocks"), log)
    }

    #[tokio::test]
    async fn first_page_has_no_token_and_carries_auth_headers() {
        let (url, log) = serve().await;
        let source = HttpFeedSource::new(&url, "secret", Duration::from_secs(5)).unwrap();

        let page = source.fetch_page("").await.unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.next_token(), Some("B"));

        let seen = log.lock().unwrap().clone();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].authorization.as_deref(), Some("Bearer secret"));
        assert_eq!(seen[0].content_type.as_deref(), Some("application/json"));
        assert_eq!(seen[0].token, None);
    }

    #[tokio::test]
    async fn continuation_token_is_sent_as_next_page() {
        let (url, log) = serve().await;
        let source = HttpFeedSource::new(&url, "secret", Duration::from_secs(5)).unwrap();

        let page = source.fetch_page("C").await.unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.next_token(), None);
        assert_eq!(log.lock().unwrap()[0].token.as_deref(), Some("C"));
    }

    #[tokio::test]
    async fn http_and_decode_failures_are_upstream_errors() {
        let (url, _log) = serve().await;
        let source = HttpFeedSource::new(&url, "secret", Duration::from_secs(5)).unwrap();

        let err = source.fetch_page("unknown").await.unwrap_err();
        assert!(matches!(err, Error::UpstreamFeed { .. }), "{err:?}");
        assert!(err.to_string().contains("502"));

        let err = source.fetch_page("broken").await.unwrap_err();
        assert!(matches!(err, Error::UpstreamFeed { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn unreachable_feed_is_an_upstream_error() {
        let source =
            HttpFeedSource::new("http://127.0.0.1:9/stocks", "secret", Duration::from_secs(2)).unwrap();
        let err = source.fetch_page("").await.unwrap_err();
        assert!(matches!(err, Error::UpstreamFeed { .. }), "{err:?}");
    }

    #[test]
    fn rejects_token_that_cannot_be_a_header() {
        let err = HttpFeedSource::new("http://x", "bad\ntoken", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }
}
