use crate::config::OpenAiSettings;
use crate::domain::rating::RatingRecord;
use crate::error::{Error, Result};
use crate::llm::RankingOracle;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_MAX_TOKENS: u32 = 800;
const NO_ANSWER_MESSAGE: &str = "No recommendation could be produced from the current data.";

/// Chat-completions client for an Azure OpenAI deployment.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    url: String,
    api_key: String,
    model: Option<String>,
    max_tokens: u32,
}

impl OpenAiClient {
    pub fn from_settings(settings: &OpenAiSettings) -> Result<Self> {
        Self::new(
            settings.require_base_url()?,
            settings.require_engine()?,
            settings.require_api_version()?,
            settings.require_api_key()?,
            settings.model.clone(),
            settings.timeout,
        )
    }

    pub fn new(
        base_url: &str,
        engine: &str,
        api_version: &str,
        api_key: &str,
        model: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let url = format!(
            "{}/openai/deployments/{engine}/chat/completions?api-version={api_version}",
            base_url.trim_end_matches('/')
        );

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config {
                message: format!("failed to build OpenAI http client: {e}"),
            })?;

        Ok(Self {
            http,
            url,
            api_key: api_key.to_string(),
            model,
            max_tokens: DEFAULT_MAX_TOKENS,
        })
    }

    async fn create_chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "api-key",
            HeaderValue::from_str(&self.api_key).map_err(|_| Error::Config {
                message: "OPENAI_API_KEY is not a valid header value".to_string(),
            })?,
        );

        let res = self
            .http
            .post(&self.url)
            .headers(headers)
            .json(req)
            .send()
            .await
            .map_err(|e| Error::oracle(format!("OpenAI request failed: {e}")))?;

        let status = res.status();
        let text = res
            .text()
            .await
            .map_err(|e| Error::oracle(format!("failed to read OpenAI response body: {e}")))?;

        if !status.is_success() {
            return Err(Error::Oracle {
                detail: format!("OpenAI HTTP {status}"),
                raw_output: Some(text),
            });
        }

        serde_json::from_str::<ChatResponse>(&text).map_err(|e| Error::Oracle {
            detail: format!("failed to decode OpenAI response: {e}"),
            raw_output: Some(text),
        })
    }

    fn request(&self, stocks: &[RatingRecord]) -> Result<ChatRequest> {
        Ok(ChatRequest {
            max_tokens: self.max_tokens,
            temperature: 0.0,
            frequency_penalty: 0,
            presence_penalty: 0,
            top_p: 0.95,
            stop: None,
            messages: vec![
                Message {
                    role: "system",
                    content: Self::system_prompt(),
                },
                Message {
                    role: "user",
                    content: Self::user_prompt(stocks)?,
                },
            ],
            model: self.model.clone(),
        })
    }

    fn system_prompt() -> String {
        [
            "You are an investment assistant for stock markets.",
            "You will receive a list of pre-selected analyst rating changes and must recommend your top 3 investments, weighing:",
            "  * action",
            "  * rating_from and rating_to",
            "  * target_from and target_to",
            "  * record_time",
            "Always start your answer with \"These are the stocks we think may interest you:\".",
            "Justify each recommendation.",
            "Finish by stating that this is only a recommendation based on the available data and not investment advice.",
        ]
        .join("\n")
    }

    fn user_prompt(stocks: &[RatingRecord]) -> Result<String> {
        let candidates = serde_json::to_string(stocks)
            .map_err(|e| Error::oracle(format!("failed to serialize candidates: {e}")))?;
        Ok(format!(
            "Recommend the 3 best stocks to invest in based on this data: {candidates}"
        ))
    }

    fn response_text(res: &ChatResponse) -> String {
        res.choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(NO_ANSWER_MESSAGE)
            .to_string()
    }
}

#[async_trait::async_trait]
impl RankingOracle for OpenAiClient {
    fn provider_name(&self) -> &'static str {
        "azure_openai"
    }

    async fn rank(&self, stocks: &[RatingRecord]) -> Result<String> {
        let req = self.request(stocks)?;
        let res = self.create_chat(&req).await?;

        if let Some(reason) = res.choices.first().and_then(|c| c.finish_reason.as_deref()) {
            if reason != "stop" {
                tracing::warn!(finish_reason = reason, "OpenAI answer did not finish cleanly");
            }
        }

        Ok(Self::response_text(&res))
    }
}

#[derive(Debug, Clone, Serialize)]
struct ChatRequest {
    max_tokens: u32,
    temperature: f32,
    frequency_penalty: i32,
    presence_penalty: i32,
    top_p: f32,
    stop: Option<Vec<String>>,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Clone, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{RawQuery, State};
    use axum::http::{HeaderMap as AxumHeaders, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, Default)]
    struct Captured {
        api_key: Option<String>,
        query: Option<String>,
        body: Option<Value>,
    }

    type Shared = Arc<Mutex<Captured>>;

    async fn chat(
        State(shared): State<Shared>,
        headers: AxumHeaders,
        RawQuery(query): RawQuery,
        Json(body): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        let mut c = shared.lock().unwrap();
        c.api_key = headers
            .get("api-key")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        c.query = query;
        c.body = Some(body);
        (
            StatusCode::OK,
            Json(json!({
                "id": "chatcmpl-1",
                "choices": [{
                    "index": 0,
                    "finish_reason": "stop",
                    "message": {"role": "assistant", "content": "These are the stocks we think may interest you: ETR"}
                }]
            })),
        )
    }

    async fn serve() -> (String, Shared) {
        let shared: Shared = Arc::default();
        let app = Router::new()
            .route("/openai/deployments/:engine/chat/completions", post(chat))
            .route(
                "/broken/openai/deployments/:engine/chat/completions",
                post(|| async { (StatusCode::TOO_MANY_REQUESTS, "slow down") }),
            )
            .with_state(shared.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), shared)
    }

    fn record() -> RatingRecord {
        RatingRecord {
            code: uuid::Uuid::nil(),
            ticker: Some("ETR".into()),
            company: Some("Entergy".into()),
            brokerage: Some("KeyCorp".into()),
            action: Some("target raised by".into()),
            rating_from: Some("Overweight".into()),
            rating_to: Some("Overweight".into()),
            target_from: Some(85.0),
            target_to: Some(88.0),
            record_time: None,
            created_at: None,
            updated_at: None,
        }
    }

    #[tokio::test]
    async fn posts_deployment_chat_with_candidates() {
        let (base, shared) = serve().await;
        let client = OpenAiClient::new(
            &format!("{base}/"),
            "gpt4o",
            "2024-02-01",
            "k-123",
            None,
            Duration::from_secs(5),
        )
        .unwrap();

        let text = client.rank(&[record()]).await.unwrap();
        assert!(text.starts_with("These are the stocks"));

        let c = shared.lock().unwrap().clone();
        assert_eq!(c.api_key.as_deref(), Some("k-123"));
        assert_eq!(c.query.as_deref(), Some("api-version=2024-02-01"));
        let body = c.body.unwrap();
        assert_eq!(body["max_tokens"], 800);
        assert_eq!(body["temperature"], 0.0);
        assert!(body["stop"].is_null());
        assert!(body.get("model").is_none());
        assert_eq!(body["messages"][0]["role"], "system");
        let user = body["messages"][1]["content"].as_str().unwrap();
        assert!(user.contains("\"ticker\":\"ETR\""));
    }

    #[tokio::test]
    async fn non_success_status_keeps_raw_body() {
        let (base, _shared) = serve().await;
        let client = OpenAiClient::new(
            &format!("{base}/broken"),
            "gpt4o",
            "2024-02-01",
            "k-123",
            None,
            Duration::from_secs(5),
        )
        .unwrap();

        match client.rank(&[record()]).await {
            Err(Error::Oracle { detail, raw_output }) => {
                assert!(detail.contains("429"), "{detail}");
                assert_eq!(raw_output.as_deref(), Some("slow down"));
            }
            other => panic!("expected oracle error, got {other:?}"),
        }
    }

    #[test]
    fn empty_choices_fall_back_to_fixed_message() {
        let res: ChatResponse = serde_json::from_value(json!({"choices": []})).unwrap();
        assert_eq!(OpenAiClient::response_text(&res), NO_ANSWER_MESSAGE);

        let res: ChatResponse =
            serde_json::from_value(json!({"choices": [{"message": {"content": null}}]})).unwrap();
        assert_eq!(OpenAiClient::response_text(&res), NO_ANSWER_MESSAGE);
    }
}
