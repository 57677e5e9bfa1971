use super::lines::byte_lines;
use super::{check_status, http_client, RetryPolicy};
use crate::error::GenerationError;
use crate::generation::{FragmentStream, GenerationPort};
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};

pub const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3";

/// Settings for a local Ollama server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    pub host: String,
    pub model: String,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    pub retry: RetryPolicy,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_OLLAMA_HOST.to_string(),
            model: DEFAULT_OLLAMA_MODEL.to_string(),
            timeout_secs: 600,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    system: &'a str,
    prompt: &'a str,
    stream: bool,
}

/// One `/api/generate` object; streamed responses send one per line
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

/// [`GenerationPort`] backed by Ollama's `/api/generate`
#[derive(Debug)]
pub struct OllamaGenerator {
    client: reqwest::Client,
    url: String,
    label: String,
    config: OllamaConfig,
}

impl OllamaGenerator {
    pub fn new(config: OllamaConfig) -> Result<Self, GenerationError> {
        let client = http_client(config.timeout_secs)?;
        let url = format!("{}/api/generate", config.host.trim_end_matches('/'));
        log::debug!("Ollama backend at {url} using model '{}'", config.model);
        Ok(Self {
            client,
            url,
            label: format!("ollama:{}", config.model),
            config,
        })
    }

    async fn send(
        &self,
        system: &str,
        prompt: &str,
        stream: bool,
    ) -> Result<reqwest::Response, GenerationError> {
        let body = GenerateRequest {
            model: &self.config.model,
            system,
            prompt,
            stream,
        };
        let body = &body;
        self.config
            .retry
            .run(&self.label, move || async move {
                let response = self.client.post(&self.url).json(body).send().await?;
                check_status(response).await
            })
            .await
    }
}

#[async_trait]
impl GenerationPort for OllamaGenerator {
    async fn generate_once(&self, system: &str, prompt: &str) -> Result<String, GenerationError> {
        let response = self.send(system, prompt, false).await?;
        let body: GenerateResponse = serde_json::from_slice(&response.bytes().await?)?;
        if let Some(error) = body.error {
            return Err(GenerationError::Backend(error));
        }
        if body.response.trim().is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        Ok(body.response)
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
                let chunk = match line.and_then(|line| {
                    serde_json::from_str::<GenerateResponse>(&line).map_err(GenerationError::from)
                }) {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                };
                if let Some(error) = chunk.error {
                    yield Err(GenerationError::Backend(error));
                    break;
                }
                if !chunk.response.is_empty() {
                    yield Ok(chunk.response);
                }
                if chunk.done {
                    break;
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
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn generator(server: &MockServer) -> OllamaGenerator {
        OllamaGenerator::new(OllamaConfig {
            host: server.uri(),
            retry: RetryPolicy {
                max_retries: 2,
                base_delay_ms: 1,
                max_delay_ms: 1,
            },
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_generate_once_reads_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(serde_json::json!({
                "model": "llama3",
                "system": "sys",
                "prompt": "hello",
                "stream": false
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"response": "hi there", "done": true})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let text = generator(&server).generate_once("sys", "hello").await.unwrap();
        assert_eq!(text, "hi there");
    }

    #[tokio::test]
    async fn test_generate_once_empty_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"response": " "})),
            )
            .mount(&server)
            .await;

        let err = generator(&server).generate_once("s", "p").await.unwrap_err();
        assert!(matches!(err, GenerationError::EmptyResponse));
    }

    #[tokio::test]
    async fn test_generate_stream_yields_fragments_until_done() {
        let server = MockServer::start().await;
        let body = concat!(
            "{\"response\":\"The \",\"done\":false}\n",
            "{\"response\":\"\",\"done\":false}\n",
            "{\"response\":\"summary\",\"done\":false}\n",
            "{\"response\":\"\",\"done\":true}\n",
            "{\"response\":\"ignored\",\"done\":false}\n",
        );
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({"stream": true})))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/x-ndjson"))
            .mount(&server)
            .await;

        let stream = generator(&server).generate_stream("s", "p").await.unwrap();
        let fragments: Vec<String> = stream.try_collect().await.unwrap();
        assert_eq!(fragments, vec!["The ", "summary"]);
    }

    #[tokio::test]
    async fn test_generate_stream_surfaces_error_field() {
        let server = MockServer::start().await;
        let body = "{\"response\":\"partial\",\"done\":false}\n{\"error\":\"model crashed\"}\n";
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/x-ndjson"))
            .mount(&server)
            .await;

        let items: Vec<_> = generator(&server)
            .generate_stream("s", "p")
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_deref().unwrap(), "partial");
        assert!(matches!(&items[1], Err(GenerationError::Backend(msg)) if msg == "model crashed"));
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"response": "ok"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let text = generator(&server).generate_once("s", "p").await.unwrap();
        assert_eq!(text, "ok");
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_string("model not found"))
            .expect(1)
            .mount(&server)
            .await;

        let err = generator(&server).generate_once("s", "p").await.unwrap_err();
        match err {
            GenerationError::Api { status, message } => {
                assert_eq!(status, 404);
                assert_eq!(message, "model not found");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
