use super::lines::{byte_lines, sse_data};
use super::{check_status, http_client, RetryPolicy};
use crate::error::GenerationError;
use crate::generation::{FragmentStream, GenerationPort};
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-3.5-turbo";

/// Settings for an OpenAI-compatible chat completions endpoint
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub model: String,

    /// Bearer token; usually taken from `OPENAI_API_KEY`
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    pub retry: RetryPolicy,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            model: DEFAULT_OPENAI_MODEL.to_string(),
            api_key: None,
            timeout_secs: 300,
            retry: RetryPolicy::default(),
        }
    }
}

impl std::fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout_secs", &self.timeout_secs)
            .field("retry", &self.retry)
            .finish()
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [Message<'a>; 2],
    stream: bool,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<Content>,
    #[serde(default)]
    delta: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    content: Option<String>,
}

impl ChatResponse {
    fn message_text(self) -> String {
        self.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .unwrap_or_default()
    }

    fn delta_text(self) -> Option<String> {
        self.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta)
            .and_then(|delta| delta.content)
    }
}

/// [`GenerationPort`] backed by `POST {base_url}/chat/completions`
#[derive(Debug)]
pub struct OpenAiGenerator {
    client: reqwest::Client,
    url: String,
    label: String,
    config: OpenAiConfig,
}

impl OpenAiGenerator {
    pub fn new(config: OpenAiConfig) -> Result<Self, GenerationError> {
        let client = http_client(config.timeout_secs)?;
        let url = format!("{}/chat/completions", config.base_url.trim_end_matches('/'));
        if config.api_key.is_none() {
            log::warn!("No API key configured for {url}; requests are sent unauthenticated");
        }
        Ok(Self {
            client,
            url,
            label: format!("openai:{}", config.model),
            config,
        })
    }

    async fn send(
        &self,
        system: &str,
        prompt: &str,
        stream: bool,
    ) -> Result<reqwest::Response, GenerationError> {
        let body = ChatRequest {
            model: &self.config.model,
            messages: [
                Message {
                    role: "system",
                    content: system,
                },
                Message {
                    role: "user",
                    content: prompt,
                },
            ],
            stream,
        };
        let body = &body;
        self.config
            .retry
            .run(&self.label, move || async move {
                let mut request = self.client.post(&self.url).json(body);
                if let Some(key) = &self.config.api_key {
                    request = request.bearer_auth(key);
                }
                if stream {
                    request = request.header(reqwest::header::ACCEPT, "text/event-stream");
                }
                check_status(request.send().await?).await
            })
            .await
    }
}

#[async_trait]
impl GenerationPort for OpenAiGenerator {
    async fn generate_once(&self, system: &str, prompt: &str) -> Result<String, GenerationError> {
        let response = self.send(system, prompt, false).await?;
        let body: ChatResponse = serde_json::from_slice(&response.bytes().await?)?;
        let text = body.message_text();
        if text.trim().is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        Ok(text)
    }

    async fn generate_stream(
        &self,
        system: &str,
        prompt: &str,
    ) -> Result<FragmentStream, GenerationError> {
        let response = self.send(system, prompt, true).await?;
        let mut lines = Box::pin(byte_lines(response.bytes_stream()));

        Ok(Box::pin(async_stream::stream! {
            while let Some(line) = lines.next().await {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                };
                let data = match sse_data(&line) {
                    Some(data) => data,
                    None => continue,
                };
                match serde_json::from_str::<ChatResponse>(data) {
                    Ok(chunk) => {
                        if let Some(text) = chunk.delta_text() {
                            yield Ok(text);
                        }
                    }
                    Err(e) => {
                        yield Err(GenerationError::from(e));
                        break;
                    }
                }
            }
        }))
    }

    fn name(&self) -> &str {
        &self.label
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn generator(server: &MockServer) -> OpenAiGenerator {
        OpenAiGenerator::new(OpenAiConfig {
            base_url: server.uri(),
            api_key: Some("sk-test".to_string()),
            retry: RetryPolicy::none(),
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_generate_once_sends_messages_and_reads_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-3.5-turbo",
                "messages": [
                    {"role": "system", "content": "sys"},
                    {"role": "user", "content": "hello"}
                ],
                "stream": false
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "Hi!"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let text = generator(&server).generate_once("sys", "hello").await.unwrap();
        assert_eq!(text, "Hi!");
    }

    #[tokio::test]
    async fn test_null_content_is_empty_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": null}}]
            })))
            .mount(&server)
            .await;

        let err = generator(&server).generate_once("s", "p").await.unwrap_err();
        assert!(matches!(err, GenerationError::EmptyResponse));
    }

    #[tokio::test]
    async fn test_generate_stream_parses_sse_deltas() {
        let server = MockServer::start().await;
        let body = concat!(
            ": keep-alive\n\n",
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Short \"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"answer\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
            "data: [DONE]\n\n",
        );
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({"stream": true})))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let stream = generator(&server).generate_stream("s", "p").await.unwrap();
        let fragments: Vec<String> = stream.try_collect().await.unwrap();
        assert_eq!(fragments, vec!["Short ", "answer"]);
    }

    #[tokio::test]
    async fn test_unauthorized_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
            .expect(1)
            .mount(&server)
            .await;

        let err = generator(&server).generate_stream("s", "p").await.err().unwrap();
        assert!(matches!(err, GenerationError::Api { status: 401, .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_debug_redacts_key() {
        let config = OpenAiConfig {
            api_key: Some("sk-secret".to_string()),
            ..Default::default()
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
