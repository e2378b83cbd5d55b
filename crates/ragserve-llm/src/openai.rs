//! OpenAI-compatible chat provider.
//!
//! Covers both OpenAI proper and Azure OpenAI; the two differ only in
//! endpoint shape and auth header. Streaming decodes the `data:` SSE frames
//! from the chat completions endpoint into [`StreamChunk`]s.

use async_trait::async_trait;
use futures_util::StreamExt;
use ragserve_core::{
    ChatMessage, ChatModel, ChatParameters, ChatResponse, ChatRole, ChatStream, LlmError,
    StreamChunk, TokenUsage,
};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use crate::prompt::synthesize_system_prompt;
use crate::sse::SseLineBuffer;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

/// How credentials travel.
enum AuthStyle {
    /// `Authorization: Bearer <key>` (OpenAI)
    Bearer,
    /// `api-key: <key>` (Azure OpenAI)
    ApiKeyHeader,
}

/// Chat client for OpenAI and Azure OpenAI.
pub struct OpenAiChat {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    model: String,
    params: ChatParameters,
    auth: AuthStyle,
    send_model_field: bool,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
    usage: Option<ApiUsage>,
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

impl From<ApiUsage> for TokenUsage {
    fn from(u: ApiUsage) -> Self {
        TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct StreamDelta {
    content: Option<String>,
}

impl OpenAiChat {
    /// Client for api.openai.com.
    pub fn openai(
        api_key: impl Into<String>,
        model: impl Into<String>,
        params: ChatParameters,
    ) -> Result<Self, LlmError> {
        Ok(Self {
            client: build_client()?,
            api_key: api_key.into(),
            endpoint: OPENAI_CHAT_URL.to_string(),
            model: model.into(),
            params,
            auth: AuthStyle::Bearer,
            send_model_field: true,
        })
    }

    /// Client for an Azure OpenAI deployment.
    pub fn azure(
        endpoint: impl Into<String>,
        deployment_name: &str,
        api_version: &str,
        api_key: impl Into<String>,
        params: ChatParameters,
    ) -> Result<Self, LlmError> {
        let endpoint = format!(
            "{}/openai/deployments/{deployment_name}/chat/completions?api-version={api_version}",
            endpoint.into().trim_end_matches('/')
        );
        Ok(Self {
            client: build_client()?,
            api_key: api_key.into(),
            endpoint,
            model: deployment_name.to_string(),
            params,
            auth: AuthStyle::ApiKeyHeader,
            // Azure routes by deployment; the model field is ignored there.
            send_model_field: false,
        })
    }

    fn build_payload(
        &self,
        messages: &[ChatMessage],
        context: &[String],
        stream: bool,
    ) -> serde_json::Value {
        let mut wire_messages = vec![json!({
            "role": "system",
            "content": synthesize_system_prompt(context),
        })];
        for message in messages {
            wire_messages.push(json!({
                "role": role_str(message.role),
                "content": message.content,
            }));
        }

        let mut payload = json!({
            "messages": wire_messages,
            "temperature": self.params.temperature,
            "top_p": self.params.top_p,
            "max_tokens": self.params.max_tokens,
            "stream": stream,
        });
        if self.send_model_field {
            payload["model"] = json!(self.model);
        }
        if let Some(stop) = &self.params.stop {
            payload["stop"] = json!(stop);
        }
        if stream {
            payload["stream_options"] = json!({"include_usage": true});
        }
        payload
    }

    async fn send(
        &self,
        payload: &serde_json::Value,
    ) -> Result<reqwest::Response, LlmError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(payload);

        request = match self.auth {
            AuthStyle::Bearer => {
                request.header("Authorization", format!("Bearer {}", self.api_key))
            }
            AuthStyle::ApiKeyHeader => request.header("api-key", &self.api_key),
        };

        let response = request.send().await.map_err(classify_reqwest_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("{status}: {body}")));
        }
        Ok(response)
    }
}

fn build_client() -> Result<reqwest::Client, LlmError> {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| LlmError::Api(format!("http client: {e}")))
}

fn classify_reqwest_error(e: reqwest::Error) -> LlmError {
    if e.is_timeout() {
        LlmError::Timeout(e.to_string())
    } else {
        LlmError::Api(e.to_string())
    }
}

fn role_str(role: ChatRole) -> &'static str {
    match role {
        ChatRole::System => "system",
        ChatRole::User => "user",
        ChatRole::Assistant => "assistant",
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        context: &[String],
    ) -> Result<ChatResponse, LlmError> {
        let payload = self.build_payload(messages, context, false);
        let response = self.send(&payload).await?;

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("no choices returned".to_string()))?;

        Ok(ChatResponse {
            content: choice.message.content.unwrap_or_default(),
            usage: parsed.usage.map(TokenUsage::from),
            model: parsed.model,
            finish_reason: choice.finish_reason,
        })
    }

    async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        context: &[String],
    ) -> Result<ChatStream, LlmError> {
        let payload = self.build_payload(messages, context, true);
        let response = self.send(&payload).await?;

        let (tx, rx) = tokio::sync::mpsc::channel::<Result<StreamChunk, LlmError>>(32);

        tokio::spawn(async move {
            let mut bytes = response.bytes_stream();
            let mut buffer = SseLineBuffer::new();
            let mut usage: Option<TokenUsage> = None;
            let mut done_sent = false;

            'outer: while let Some(item) = bytes.next().await {
                let chunk = match item {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        let _ = tx.send(Err(LlmError::Stream(e.to_string()))).await;
                        return;
                    }
                };

                for payload in buffer.push(&chunk) {
                    if payload == "[DONE]" {
                        let _ = tx
                            .send(Ok(StreamChunk {
                                content: None,
                                done: true,
                                usage: usage.take(),
                            }))
                            .await;
                        done_sent = true;
                        break 'outer;
                    }

                    match serde_json::from_str::<StreamResponse>(&payload) {
                        Ok(parsed) => {
                            if let Some(api_usage) = parsed.usage {
                                usage = Some(api_usage.into());
                            }
                            if let Some(choice) = parsed.choices.into_iter().next() {
                                if let Some(content) = choice.delta.content {
                                    if !content.is_empty()
                                        && tx
                                            .send(Ok(StreamChunk {
                                                content: Some(content),
                                                done: false,
                                                usage: None,
                                            }))
                                            .await
                                            .is_err()
                                    {
                                        // Receiver dropped: cancelled.
                                        return;
                                    }
                                }
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, "unparseable stream frame, skipping");
                        }
                    }
                }
            }

            if !done_sent {
                let _ = tx
                    .send(Ok(StreamChunk {
                        content: None,
                        done: true,
                        usage: usage.take(),
                    }))
                    .await;
            }
        });

        debug!(model = %self.model, "chat stream opened");
        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    async fn test_connection(&self) -> bool {
        let probe = [ChatMessage::user("ping")];
        let mut payload = self.build_payload(&probe, &[], false);
        payload["max_tokens"] = json!(1);
        self.send(&payload).await.is_ok()
    }
}
