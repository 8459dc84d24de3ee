use super::{
    api_base_or, check_status, http_client, parse_fragment, sse, FragmentStream, Provider,
};
use crate::config::ModelConfig;
use crate::error::GatewayError;
use crate::types::chat::{Choice, Usage};
use crate::types::completions::CompletionChoice;
use crate::types::{
    unix_now, ChatRequest, ChatResponse, ChatStreamChunk, CompletionsRequest,
    CompletionsResponse, CompletionsStreamChunk, Message, TaskType,
};
use crate::Result;
use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::debug;

const DEFAULT_API_BASE: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Anthropic API 请求格式
#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<Vec<String>>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

/// Anthropic API 响应格式
#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    id: String,
    content: Vec<ContentBlock>,
    model: String,
    stop_reason: Option<String>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

/// Anthropic SSE 事件类型
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicEvent {
    MessageStart { message: MessageStartData },
    ContentBlockDelta { delta: DeltaData },
    MessageDelta { delta: MessageDeltaData },
    MessageStop,
    Error { error: ErrorData },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct MessageStartData {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum DeltaData {
    TextDelta {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct MessageDeltaData {
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorData {
    #[serde(rename = "type", default)]
    error_type: String,
    message: String,
}

/// 转换 stop_reason 为 OpenAI 风格的 finish_reason
fn finish_reason(reason: &str) -> String {
    match reason {
        "end_turn" | "stop_sequence" => "stop".to_string(),
        "max_tokens" => "length".to_string(),
        other => other.to_string(),
    }
}

/// Messages API 客户端
#[derive(Debug, Clone)]
pub struct AnthropicProvider {
    model: String,
    api_key: String,
    api_base: String,
}

impl AnthropicProvider {
    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        let api_key = config
            .config
            .api_key
            .clone()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                GatewayError::config(format!("anthropic 模型 {} 缺少 api_key", config.name))
            })?;

        Ok(Self {
            model: config.name.clone(),
            api_key,
            api_base: api_base_or(&config.config.api_base, DEFAULT_API_BASE),
        })
    }

    /// 转换聊天请求，system 消息提取到独立字段
    fn convert_chat(&self, req: &ChatRequest, stream: bool) -> AnthropicRequest {
        let mut system_message: Option<String> = None;
        let mut messages = Vec::new();

        for msg in &req.messages {
            if msg.role == "system" {
                system_message = Some(match system_message {
                    Some(existing) => format!("{}\n{}", existing, msg.content),
                    None => msg.content.clone(),
                });
            } else {
                messages.push(AnthropicMessage {
                    role: msg.role.clone(),
                    content: msg.content.clone(),
                });
            }
        }

        AnthropicRequest {
            model: self.model.clone(),
            messages,
            system: system_message,
            max_tokens: req.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: req.temperature,
            top_p: req.top_p,
            stop_sequences: req.stop.clone(),
            stream,
        }
    }

    /// 补全请求作为单条用户消息发送
    fn convert_completions(&self, req: &CompletionsRequest, stream: bool) -> AnthropicRequest {
        AnthropicRequest {
            model: self.model.clone(),
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: req.prompt.clone(),
            }],
            system: None,
            max_tokens: req.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: req.temperature,
            top_p: None,
            stop_sequences: req.stop.clone(),
            stream,
        }
    }

    async fn send(&self, body: &AnthropicRequest) -> Result<reqwest::Response> {
        let url = format!("{}/v1/messages", self.api_base);
        debug!("转发请求到 {}", url);

        let response = http_client()
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;

        check_status(response, "Anthropic").await
    }

    async fn send_message(&self, body: &AnthropicRequest) -> Result<AnthropicResponse> {
        Ok(self.send(body).await?.json().await?)
    }

    /// 把 Anthropic 事件流转换为增量片段流
    async fn send_stream<C, F>(
        &self,
        body: &AnthropicRequest,
        make_chunk: F,
    ) -> Result<FragmentStream<C>>
    where
        C: Send + 'static,
        F: Fn(&str, &str, Option<String>, Option<String>) -> C + Send + 'static,
    {
        let response = self.send(body).await?;
        let model = self.model.clone();
        let events = sse::data_events(response.bytes_stream(), false);

        let stream = async_stream::stream! {
            futures_util::pin_mut!(events);
            let mut message_id = String::new();
            let mut stopped = false;

            while let Some(data) = events.next().await {
                let parsed = data.and_then(|d| parse_fragment::<AnthropicEvent>(&d, "Anthropic"));
                let event = match parsed {
                    Ok(event) => event,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                };
                match event {
                    AnthropicEvent::MessageStart { message } => {
                        message_id = message.id;
                    }
                    AnthropicEvent::ContentBlockDelta { delta: DeltaData::TextDelta { text } } => {
                        yield Ok(make_chunk(&message_id, &model, Some(text), None));
                    }
                    AnthropicEvent::MessageDelta { delta } => {
                        if let Some(reason) = delta.stop_reason {
                            yield Ok(make_chunk(&message_id, &model, None, Some(finish_reason(&reason))));
                        }
                    }
                    AnthropicEvent::MessageStop => {
                        stopped = true;
                        break;
                    }
                    AnthropicEvent::Error { error } => {
                        yield Err(GatewayError::upstream(
                            502,
                            format!("Anthropic 流错误 ({}): {}", error.error_type, error.message),
                        ));
                        return;
                    }
                    _ => {}
                }
            }

            // 没有 message_stop 就结束的流视为中断
            if !stopped {
                yield Err(GatewayError::upstream(502, sse::TRUNCATED_STREAM));
            }
        };

        Ok(Box::pin(stream))
    }
}

/// 提取文本内容
fn joined_text(blocks: Vec<ContentBlock>) -> String {
    blocks
        .into_iter()
        .filter(|block| block.block_type == "text")
        .map(|block| block.text)
        .collect::<Vec<_>>()
        .join("")
}

fn convert_usage(usage: &AnthropicUsage) -> Usage {
    Usage {
        prompt_tokens: usage.input_tokens,
        completion_tokens: usage.output_tokens,
        total_tokens: usage.input_tokens + usage.output_tokens,
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn supports(&self, task: TaskType) -> bool {
        matches!(task, TaskType::Chat | TaskType::Completions)
    }

    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        let resp = self.send_message(&self.convert_chat(req, false)).await?;
        let usage = convert_usage(&resp.usage);

        Ok(ChatResponse {
            id: resp.id,
            object: "chat.completion".to_string(),
            created: unix_now(),
            model: resp.model,
            choices: vec![Choice {
                index: 0,
                message: Message::assistant(joined_text(resp.content)),
                finish_reason: resp.stop_reason.as_deref().map(finish_reason),
            }],
            usage: Some(usage),
        })
    }

    async fn chat_stream(&self, req: &ChatRequest) -> Result<FragmentStream<ChatStreamChunk>> {
        self.send_stream(&self.convert_chat(req, true), |id, model, text, finish| {
            ChatStreamChunk::delta(id, model, text, finish)
        })
        .await
    }

    async fn completions(&self, req: &CompletionsRequest) -> Result<CompletionsResponse> {
        let resp = self
            .send_message(&self.convert_completions(req, false))
            .await?;
        let usage = convert_usage(&resp.usage);

        Ok(CompletionsResponse {
            id: resp.id,
            object: "text_completion".to_string(),
            created: unix_now(),
            model: resp.model,
            choices: vec![CompletionChoice {
                index: 0,
                text: joined_text(resp.content),
                finish_reason: resp.stop_reason.as_deref().map(finish_reason),
            }],
            usage: Some(usage),
        })
    }

    async fn completions_stream(
        &self,
        req: &CompletionsRequest,
    ) -> Result<FragmentStream<CompletionsStreamChunk>> {
        self.send_stream(&self.convert_completions(req, true), |id, model, text, finish| {
            CompletionsStreamChunk::delta(id, model, text, finish)
        })
        .await
    }
}
