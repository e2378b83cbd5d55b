//! Anthropic chat provider.
//!
//! Speaks the `/v1/messages` API: the system prompt is a top-level field,
//! history carries only user/assistant turns, and streaming arrives as typed
//! SSE events (`content_block_delta`, `message_delta`, `message_stop`).

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
const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

/// Anthropic messages-API client.
pub struct AnthropicChat {
    client: reqwest::Client,
    api_key: String,
    model: String,
    params: ChatParameters,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    usage: Option<AnthropicUsage>,
    model: Option<String>,
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize, Default)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

impl From<AnthropicUsage> for TokenUsage {
    fn from(u: AnthropicUsage) -> Self {
        TokenUsage {
            prompt_tokens: u.input_tokens,
            completion_tokens: u.output_tokens,
            total_tokens: u.input_tokens + u.output_tokens,
        }
    }
}

/// One streamed SSE event, discriminated by its `type` field.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum StreamEvent {
    #[serde(rename = "message_start")]
    MessageStart { message: MessageStart },
    #[serde(rename = "content_block_delta")]
    ContentBlockDelta { delta: BlockDelta },
    #[serde(rename = "message_delta")]
    MessageDelta {
        #[serde(default)]
        usage: AnthropicUsage,
    },
    #[serde(rename = "message_stop")]
    MessageStop,
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct MessageStart {
    #[serde(default)]
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct BlockDelta {
    #[serde(default)]
    text: String,
}

impl AnthropicChat {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        params: ChatParameters,
    ) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| LlmError::Api(format!("http client: {e}")))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            params,
        })
    }

    fn build_payload(
        &self,
        messages: &[ChatMessage],
        context: &[String],
        stream: bool,
    ) -> serde_json::Value {
        // System turns fold into the top-level system field; the messages
        // array may only carry user/assistant roles.
        let mut system = synthesize_system_prompt(context);
        let mut wire_messages = Vec::new();
        for message in messages {
            match message.role {
                ChatRole::System => {
                    system.push_str("\n\n");
                    system.push_str(&message.content);
                }
                ChatRole::User => wire_messages.push(json!({
                    "role": "user",
                    "content": message.content,
                })),
                ChatRole::Assistant => wire_messages.push(json!({
                    "role": "assistant",
                    "content": message.content,
                })),
            }
        }

        let mut payload = json!({
            "model": self.model,
            "system": system,
            "messages": wire_messages,
            "temperature": self.params.temperature,
            "top_p": self.params.top_p,
            "max_tokens": self.params.max_tokens,
            "stream": stream,
        });
        if let Some(stop) = &self.params.stop {
            payload["stop_sequences"] = json!(stop);
        }
        payload
    }

    async fn send(
        &self,
        payload: &serde_json::Value,
    ) -> Result<reqwest::Response, LlmError> {
        let response = self
            .client
            .post(MESSAGES_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("Content-Type", "application/json")
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(e.to_string())
                } else {
                    LlmError::Api(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("{status}: {body}")));
        }
        Ok(response)
    }
}

#[async_trait]
impl ChatModel for AnthropicChat {
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

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let content: String = parsed
            .content
            .iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text.as_str())
            .collect();

        Ok(ChatResponse {
            content,
            usage: parsed.usage.map(TokenUsage::from),
            model: parsed.model,
            finish_reason: parsed.stop_reason,
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
            let mut usage = TokenUsage::default();
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
                    let event = match serde_json::from_str::<StreamEvent>(&payload) {
                        Ok(event) => event,
                        Err(e) => {
                            warn!(error = %e, "unparseable stream event, skipping");
                            continue;
                        }
                    };

                    match event {
                        StreamEvent::MessageStart { message } => {
                            usage.add(&message.usage.into());
                        }
                        StreamEvent::ContentBlockDelta { delta } => {
                            if !delta.text.is_empty()
                                && tx
                                    .send(Ok(StreamChunk {
                                        content: Some(delta.text),
                                        done: false,
                                        usage: None,
                                    }))
                                    .await
                                    .is_err()
                            {
                                return;
                            }
                        }
                        StreamEvent::MessageDelta { usage: delta_usage } => {
                            usage.add(&delta_usage.into());
                        }
                        StreamEvent::MessageStop => {
                            usage.total_tokens = usage.prompt_tokens + usage.completion_tokens;
                            let _ = tx
                                .send(Ok(StreamChunk {
                                    content: None,
                                    done: true,
                                    usage: Some(usage),
                                }))
                                .await;
                            done_sent = true;
                            break 'outer;
                        }
                        StreamEvent::Other => {}
                    }
                }
            }

            if !done_sent {
                usage.total_tokens = usage.prompt_tokens + usage.completion_tokens;
                let _ = tx
                    .send(Ok(StreamChunk {
                        content: None,
                        done: true,
                        usage: Some(usage),
                    }))
                    .await;
            }
        });

        debug!(model = %self.model, "anthropic stream opened");
        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    async fn test_connection(&self) -> bool {
        let probe = [ChatMessage::user("ping")];
        let mut payload = self.build_payload(&probe, &[], false);
        payload["max_tokens"] = json!(1);
        self.send(&payload).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> AnthropicChat {
        AnthropicChat::new("sk-ant-test", "claude-3-5-sonnet-latest", ChatParameters::default())
            .unwrap()
    }

    #[test]
    fn test_system_prompt_is_top_level_field() {
        let provider = provider();
        let context = vec!["retrieved passage".to_string()];
        let payload = provider.build_payload(&[ChatMessage::user("q")], &context, false);

        let system = payload["system"].as_str().unwrap();
        assert!(system.contains("Context:\nretrieved passage"));

        let wire = payload["messages"].as_array().unwrap();
        assert_eq!(wire.len(), 1);
        assert_eq!(wire[0]["role"], "user");
    }

    #[test]
    fn test_system_history_turns_fold_into_system() {
        let provider = provider();
        let messages = [
            ChatMessage::system("be terse"),
            ChatMessage::user("q"),
        ];
        let payload = provider.build_payload(&messages, &[], false);

        assert!(payload["system"].as_str().unwrap().ends_with("be terse"));
        let wire = payload["messages"].as_array().unwrap();
        assert_eq!(wire.len(), 1);
    }

    #[test]
    fn test_stop_sequences_field_name() {
        let mut params = ChatParameters::default();
        params.stop = Some(vec!["END".to_string()]);
        let provider =
            AnthropicChat::new("k", "claude-3-5-sonnet-latest", params).unwrap();

        let payload = provider.build_payload(&[], &[], false);
        assert_eq!(payload["stop_sequences"][0], "END");
        assert!(payload.get("stop").is_none());
    }

    #[test]
    fn test_response_parsing_concatenates_text_blocks() {
        let body = r#"{
            "content": [{"type": "text", "text": "Hello "},
                        {"type": "text", "text": "world"}],
            "usage": {"input_tokens": 9, "output_tokens": 3},
            "model": "claude-3-5-sonnet-20241022",
            "stop_reason": "end_turn"
        }"#;

        let parsed: MessagesResponse = serde_json::from_str(body).unwrap();
        let content: String = parsed
            .content
            .iter()
            .filter(|b| b.kind == "text")
            .map(|b| b.text.as_str())
            .collect();

        assert_eq!(content, "Hello world");
        let usage: TokenUsage = parsed.usage.unwrap().into();
        assert_eq!(usage.prompt_tokens, 9);
        assert_eq!(usage.completion_tokens, 3);
        assert_eq!(usage.total_tokens, 12);
    }

    #[test]
    fn test_stream_event_parsing() {
        let delta = r#"{"type": "content_block_delta", "index": 0,
                        "delta": {"type": "text_delta", "text": "Hi"}}"#;
        match serde_json::from_str::<StreamEvent>(delta).unwrap() {
            StreamEvent::ContentBlockDelta { delta } => assert_eq!(delta.text, "Hi"),
            other => panic!("unexpected event: {other:?}"),
        }

        let stop = r#"{"type": "message_stop"}"#;
        assert!(matches!(
            serde_json::from_str::<StreamEvent>(stop).unwrap(),
            StreamEvent::MessageStop
        ));

        let ping = r#"{"type": "ping"}"#;
        assert!(matches!(
            serde_json::from_str::<StreamEvent>(ping).unwrap(),
            StreamEvent::Other
        ));
    }

    #[test]
    fn test_message_delta_usage_accumulates() {
        let event = r#"{"type": "message_delta", "delta": {"stop_reason": "end_turn"},
                        "usage": {"output_tokens": 42}}"#;
        match serde_json::from_str::<StreamEvent>(event).unwrap() {
            StreamEvent::MessageDelta { usage } => assert_eq!(usage.output_tokens, 42),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
