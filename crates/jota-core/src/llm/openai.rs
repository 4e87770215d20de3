use crate::constants::{defaults, endpoints, models};
use crate::error::{JotaError, ProviderError};
use crate::llm::traits::*;
use crate::llm::usage::{TokenCounter, Usage, UsageLedger};
use futures::channel::mpsc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Client for OpenAI-compatible chat completion endpoints.
///
/// Every request's token usage is appended to the ledger the client was built
/// with. Streaming responses carry no usage, so it is counted locally once the
/// stream finishes.
pub struct OpenAIClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    temperature: f32,
    ledger: UsageLedger,
}

impl OpenAIClient {
    pub fn new(api_key: impl Into<String>, ledger: UsageLedger) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(defaults::HTTP_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            api_key: api_key.into(),
            model: models::DEFAULT_CHAT_MODEL.to_string(),
            base_url: endpoints::OPENAI_BASE_URL.to_string(),
            temperature: defaults::TEMPERATURE,
            ledger,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn ledger(&self) -> &UsageLedger {
        &self.ledger
    }

    fn url(&self) -> String {
        format!(
            "{}{}",
            self.base_url.trim_end_matches('/'),
            endpoints::CHAT_COMPLETIONS_PATH
        )
    }

    fn request<'a>(
        &'a self,
        messages: &'a [Message],
        stop: &[&str],
        n: Option<usize>,
        max_tokens: Option<u32>,
        stream: bool,
    ) -> ChatCompletionRequest<'a> {
        ChatCompletionRequest {
            model: &self.model,
            messages,
            temperature: Some(self.temperature),
            stop: if stop.is_empty() {
                None
            } else {
                Some(stop.iter().map(|s| s.to_string()).collect())
            },
            n,
            max_tokens,
            stream: if stream { Some(true) } else { None },
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    n: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    index: usize,
    message: ResponseMessage,
    #[allow(dead_code)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatCompletionChunk {
    choices: Vec<ChoiceChunk>,
}

#[derive(Debug, Deserialize)]
struct ChoiceChunk {
    #[serde(default)]
    index: usize,
    delta: Delta,
    #[allow(dead_code)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Delta {
    #[allow(dead_code)]
    role: Option<String>,
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ProviderError,
}

/// Turn a provider response body into an error if it carries one.
fn check_error(status: reqwest::StatusCode, body: &str) -> Result<(), JotaError> {
    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body) {
        return Err(JotaError::Provider(envelope.error));
    }
    if !status.is_success() {
        return Err(JotaError::Llm(format!(
            "OpenAI API error ({}): {}",
            status, body
        )));
    }
    Ok(())
}

/// One decoded line of a server-sent event stream.
#[derive(Debug)]
pub(crate) enum SseLine {
    Chunk(ChatCompletionChunk),
    Done,
    Skip,
}

pub(crate) fn parse_sse_line(line: &str) -> Result<SseLine, JotaError> {
    let Some(data) = line.trim().strip_prefix("data:") else {
        return Ok(SseLine::Skip);
    };
    let data = data.trim();
    if data.is_empty() {
        return Ok(SseLine::Skip);
    }
    if data == "[DONE]" {
        return Ok(SseLine::Done);
    }
    Ok(SseLine::Chunk(serde_json::from_str(data)?))
}

/// Collects streamed fragments per choice index.
#[derive(Debug, Default)]
pub(crate) struct StreamAccumulator {
    choices: BTreeMap<usize, String>,
}

impl StreamAccumulator {
    /// Record a chunk, returning the fragment for the first choice.
    pub(crate) fn push(&mut self, chunk: &ChatCompletionChunk) -> Option<String> {
        let mut primary = None;
        for choice in &chunk.choices {
            let Some(ref content) = choice.delta.content else {
                continue;
            };
            self.choices
                .entry(choice.index)
                .or_default()
                .push_str(content);
            if choice.index == 0 {
                primary = Some(content.clone());
            }
        }
        primary
    }

    pub(crate) fn into_choices(self) -> Vec<String> {
        self.choices.into_values().collect()
    }
}

#[async_trait::async_trait]
impl LlmClient for OpenAIClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn generate_multiple(
        &self,
        messages: &[Message],
        stop: &[&str],
        n: usize,
        max_tokens: Option<u32>,
    ) -> Result<Vec<String>, JotaError> {
        let request_body = self.request(messages, stop, Some(n), max_tokens, false);
        tracing::debug!(
            "Chat completion request: model={} n={} messages={}",
            self.model,
            n,
            messages.len()
        );

        let response = self
            .client
            .post(self.url())
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        let response_text = response.text().await?;
        check_error(status, &response_text)?;

        let mut api_response: ChatCompletionResponse = serde_json::from_str(&response_text)
            .map_err(|e| JotaError::Llm(format!("Failed to parse response: {e}")))?;

        if let Some(usage) = api_response.usage {
            self.ledger.record(&self.model, usage);
        }

        api_response.choices.sort_by_key(|c| c.index);
        Ok(api_response
            .choices
            .into_iter()
            .map(|c| c.message.content.unwrap_or_default())
            .collect())
    }

    async fn generate_stream(
        &self,
        messages: &[Message],
        stop: &[&str],
        max_tokens: Option<u32>,
    ) -> Result<mpsc::UnboundedReceiver<StreamEvent>, JotaError> {
        let request_body = self.request(messages, stop, Some(1), max_tokens, true);
        tracing::debug!(
            "Streaming chat completion request: model={} messages={}",
            self.model,
            messages.len()
        );

        let response = self
            .client
            .post(self.url())
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            check_error(status, &text)?;
            return Err(JotaError::Llm(format!(
                "OpenAI API error ({}): {}",
                status, text
            )));
        }

        let (tx, rx) = mpsc::unbounded();

        let mut stream = response.bytes_stream();
        let model = self.model.clone();
        let ledger = self.ledger.clone();
        let prompt = messages.to_vec();
        tokio::spawn(async move {
            use futures::StreamExt;
            // Raw bytes until a full line arrives, so multi-byte characters
            // split across network chunks decode intact.
            let mut buffer: Vec<u8> = Vec::new();
            let mut accumulator = StreamAccumulator::default();

            'read: while let Some(chunk) = stream.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        let _ = tx.unbounded_send(StreamEvent::Error(e.to_string()));
                        return;
                    }
                };

                buffer.extend_from_slice(&chunk);

                while let Some(line_end) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=line_end).collect();
                    let line = String::from_utf8_lossy(&line);

                    match parse_sse_line(&line) {
                        Ok(SseLine::Skip) => continue,
                        Ok(SseLine::Done) => break 'read,
                        Ok(SseLine::Chunk(chunk)) => {
                            if let Some(text) = accumulator.push(&chunk) {
                                let _ = tx.unbounded_send(StreamEvent::TextDelta(text));
                            }
                        }
                        Err(e) => {
                            let _ = tx.unbounded_send(StreamEvent::Error(format!(
                                "Malformed stream chunk: {e}"
                            )));
                            return;
                        }
                    }
                }
            }

            match TokenCounter::for_model(&model) {
                Ok(counter) => {
                    let usage = counter.usage(&prompt, &accumulator.into_choices());
                    ledger.record(model, usage);
                }
                Err(e) => tracing::warn!("Stream usage not recorded: {}", e),
            }

            let _ = tx.unbounded_send(StreamEvent::Done);
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization_skips_unset_fields() {
        let client = OpenAIClient::new("key", UsageLedger::new()).with_model("gpt-4");
        let messages = vec![
            Message::system("schema").with_name("database_schema"),
            Message::user("hi"),
        ];
        let request = client.request(&messages, &[], Some(3), None, false);
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["model"], "gpt-4");
        assert_eq!(json["n"], 3);
        assert_eq!(json["messages"][0]["name"], "database_schema");
        assert_eq!(json["messages"][0]["role"], "system");
        assert!(json["messages"][1].get("name").is_none());
        assert!(json.get("stop").is_none());
        assert!(json.get("max_tokens").is_none());
        assert!(json.get("stream").is_none());
    }

    #[test]
    fn test_request_serialization_stream_and_stop() {
        let client = OpenAIClient::new("key", UsageLedger::new());
        let messages = vec![Message::user("hi")];
        let request = client.request(&messages, &["\"\"\""], Some(1), Some(2), true);
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["stream"], true);
        assert_eq!(json["stop"][0], "\"\"\"");
        assert_eq!(json["max_tokens"], 2);
    }

    #[test]
    fn test_check_error_reads_provider_body() {
        let body = r#"{"error":{"message":"Rate limit reached","type":"requests","code":"rate_limit_exceeded","param":null}}"#;
        let err = check_error(reqwest::StatusCode::TOO_MANY_REQUESTS, body).unwrap_err();
        match err {
            JotaError::Provider(ref e) => {
                assert_eq!(e.kind, "requests");
                assert_eq!(e.message, "Rate limit reached");
                assert!(e.param.is_none());
            }
            other => panic!("expected provider error, got {other:?}"),
        }
        assert_eq!(err.provider_code(), Some("rate_limit_exceeded"));
    }

    #[test]
    fn test_check_error_plain_failure() {
        let err = check_error(reqwest::StatusCode::BAD_GATEWAY, "upstream down").unwrap_err();
        assert!(matches!(err, JotaError::Llm(_)));
        assert!(check_error(reqwest::StatusCode::OK, r#"{"choices":[]}"#).is_ok());
    }

    #[test]
    fn test_parse_sse_lines() {
        assert!(matches!(parse_sse_line(": keep-alive").unwrap(), SseLine::Skip));
        assert!(matches!(parse_sse_line("data: ").unwrap(), SseLine::Skip));
        assert!(matches!(parse_sse_line("data: [DONE]").unwrap(), SseLine::Done));
        assert!(parse_sse_line("data: {not json").is_err());

        let line = r#"data: {"choices":[{"index":0,"delta":{"content":"Olá"},"finish_reason":null}]}"#;
        match parse_sse_line(line).unwrap() {
            SseLine::Chunk(chunk) => {
                assert_eq!(chunk.choices.len(), 1);
                assert_eq!(chunk.choices[0].delta.content.as_deref(), Some("Olá"));
            }
            other => panic!("expected chunk, got {other:?}"),
        }
    }

    #[test]
    fn test_accumulator_groups_by_choice() {
        let mut acc = StreamAccumulator::default();
        let chunks = [
            r#"data: {"choices":[{"index":0,"delta":{"role":"assistant"}}]}"#,
            r#"data: {"choices":[{"index":0,"delta":{"content":"Bom "}},{"index":1,"delta":{"content":"Oi"}}]}"#,
            r#"data: {"choices":[{"index":0,"delta":{"content":"dia"},"finish_reason":"stop"}]}"#,
        ];
        let mut primary = String::new();
        for line in chunks {
            if let SseLine::Chunk(chunk) = parse_sse_line(line).unwrap() {
                if let Some(text) = acc.push(&chunk) {
                    primary.push_str(&text);
                }
            }
        }
        assert_eq!(primary, "Bom dia");
        assert_eq!(acc.into_choices(), vec!["Bom dia".to_string(), "Oi".to_string()]);
    }
}
