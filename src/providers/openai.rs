use super::{
    api_base_or, check_status, http_client, parse_fragment, sse, FragmentStream, Provider,
};
use crate::config::ModelConfig;
use crate::error::GatewayError;
use crate::types::{
    ChatRequest, ChatResponse, ChatStreamChunk, CompletionsRequest, CompletionsResponse,
    CompletionsStreamChunk, EmbeddingsRequest, EmbeddingsResponse, TaskType,
};
use crate::Result;
use async_trait::async_trait;
use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// OpenAI 兼容接口（直接 passthrough）
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    model: String,
    api_key: String,
    api_base: String,
}

impl OpenAiProvider {
    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        let api_key = config
            .config
            .api_key
            .clone()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                GatewayError::config(format!("openai 模型 {} 缺少 api_key", config.name))
            })?;

        Ok(Self {
            model: config.name.clone(),
            api_key,
            api_base: api_base_or(&config.config.api_base, DEFAULT_API_BASE),
        })
    }

    /// 把端点请求体转换为上游请求：补上模型名并覆盖 stream
    fn upstream_body<T: Serialize>(&self, req: &T, stream: Option<bool>) -> Result<Value> {
        let mut body = serde_json::to_value(req)?;
        if let Value::Object(map) = &mut body {
            map.insert("model".to_string(), Value::String(self.model.clone()));
            match stream {
                Some(stream) => {
                    map.insert("stream".to_string(), Value::Bool(stream));
                }
                None => {
                    map.remove("stream");
                }
            }
        }
        Ok(body)
    }

    async fn post(&self, path: &str, body: &Value) -> Result<reqwest::Response> {
        let url = format!("{}/{}", self.api_base, path);
        debug!("转发请求到 {}", url);

        let response = http_client()
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;

        check_status(response, "OpenAI").await
    }

    async fn post_json<R: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<R> {
        let response = self.post(path, body).await?;
        Ok(response.json().await?)
    }

    /// 发起流式请求并把每个 `data:` 事件解析为增量片段
    async fn post_stream<C>(&self, path: &str, body: &Value) -> Result<FragmentStream<C>>
    where
        C: DeserializeOwned + Send + 'static,
    {
        let response = self.post(path, body).await?;
        let stream = sse::data_events(response.bytes_stream(), true)
            .map(|event| event.and_then(|data| parse_fragment::<C>(&data, "OpenAI")));
        Ok(Box::pin(stream))
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn supports(&self, _task: TaskType) -> bool {
        true
    }

    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        let body = self.upstream_body(req, Some(false))?;
        self.post_json("chat/completions", &body).await
    }

    async fn chat_stream(&self, req: &ChatRequest) -> Result<FragmentStream<ChatStreamChunk>> {
        let body = self.upstream_body(req, Some(true))?;
        self.post_stream("chat/completions", &body).await
    }

    async fn completions(&self, req: &CompletionsRequest) -> Result<CompletionsResponse> {
        let body = self.upstream_body(req, Some(false))?;
        self.post_json("completions", &body).await
    }

    async fn completions_stream(
        &self,
        req: &CompletionsRequest,
    ) -> Result<FragmentStream<CompletionsStreamChunk>> {
        let body = self.upstream_body(req, Some(true))?;
        self.post_stream("completions", &body).await
    }

    async fn embeddings(&self, req: &EmbeddingsRequest) -> Result<EmbeddingsResponse> {
        let body = self.upstream_body(req, None)?;
        self.post_json("embeddings", &body).await
    }
}
