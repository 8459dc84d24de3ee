pub mod anthropic;
pub mod openai;
pub mod resolver;
pub mod sse;

use crate::error::GatewayError;
use crate::types::{
    ChatRequest, ChatResponse, ChatStreamChunk, CompletionsRequest, CompletionsResponse,
    CompletionsStreamChunk, EmbeddingsRequest, EmbeddingsResponse, TaskType,
};
use crate::Result;
use async_trait::async_trait;
use futures_util::Stream;
use once_cell::sync::Lazy;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::pin::Pin;
use std::time::Duration;

pub use resolver::ProviderResolver;

/// 提供商产生的有序增量片段序列
pub type FragmentStream<T> = Pin<Box<dyn Stream<Item = Result<T>> + Send>>;

/// Provider trait - 所有 provider 必须实现
///
/// 实例在注册时构造一次，被该端点的所有并发请求共享，
/// 因此不能持有任何按请求变化的可变状态。
/// 未覆盖的能力默认返回 [`GatewayError::UnsupportedProvider`]，
/// 加载配置时会先用 [`Provider::supports`] 校验。
#[async_trait]
pub trait Provider: Send + Sync {
    /// 提供商标识，例如 `openai`
    fn name(&self) -> &str;

    /// 是否支持给定的端点类别
    fn supports(&self, task: TaskType) -> bool;

    async fn chat(&self, _req: &ChatRequest) -> Result<ChatResponse> {
        Err(self.unsupported(TaskType::Chat))
    }

    async fn chat_stream(&self, _req: &ChatRequest) -> Result<FragmentStream<ChatStreamChunk>> {
        Err(self.unsupported(TaskType::Chat))
    }

    async fn completions(&self, _req: &CompletionsRequest) -> Result<CompletionsResponse> {
        Err(self.unsupported(TaskType::Completions))
    }

    async fn completions_stream(
        &self,
        _req: &CompletionsRequest,
    ) -> Result<FragmentStream<CompletionsStreamChunk>> {
        Err(self.unsupported(TaskType::Completions))
    }

    async fn embeddings(&self, _req: &EmbeddingsRequest) -> Result<EmbeddingsResponse> {
        Err(self.unsupported(TaskType::Embeddings))
    }

    fn unsupported(&self, task: TaskType) -> GatewayError {
        GatewayError::UnsupportedProvider(format!("{} 不支持 {}", self.name(), task))
    }
}

/// 获取全局 HTTP 客户端（连接池复用）
///
/// 不设置总超时：流式响应可能持续很久，超时交给外层传输配置。
pub(crate) fn http_client() -> &'static Client {
    static CLIENT: Lazy<Client> = Lazy::new(|| {
        Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(10)
            .build()
            .unwrap_or_else(|_| Client::new())
    });
    &CLIENT
}

/// 检查上游状态码，非 2xx 时转换为 UpstreamError
pub(crate) async fn check_status(
    response: reqwest::Response,
    vendor: &str,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    // 限制错误响应体大小
    let error_body = response
        .text()
        .await
        .unwrap_or_default()
        .chars()
        .take(4096)
        .collect::<String>();
    Err(GatewayError::upstream(
        status.as_u16(),
        format!("{} API 错误: {}", vendor, error_body),
    ))
}

/// 解析上游流式片段；格式错误属于上游问题而不是客户端请求错误
pub(crate) fn parse_fragment<T: DeserializeOwned>(data: &str, vendor: &str) -> Result<T> {
    serde_json::from_str(data).map_err(|e| {
        GatewayError::upstream(502, format!("{} 流式片段格式错误: {}", vendor, e))
    })
}

/// 取配置中的 api_base，缺省时使用提供商默认地址
pub(crate) fn api_base_or(api_base: &Option<String>, default: &str) -> String {
    api_base
        .as_deref()
        .filter(|base| !base.is_empty())
        .unwrap_or(default)
        .trim_end_matches('/')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ChatOnly;

    #[async_trait]
    impl Provider for ChatOnly {
        fn name(&self) -> &str {
            "chat-only"
        }

        fn supports(&self, task: TaskType) -> bool {
            task == TaskType::Chat
        }
    }

    #[tokio::test]
    async fn test_default_capabilities_are_unsupported() {
        let provider = ChatOnly;
        let req: EmbeddingsRequest = serde_json::from_str(r#"{"input": "x"}"#).unwrap();

        let err = provider.embeddings(&req).await.unwrap_err();
        assert!(matches!(err, GatewayError::UnsupportedProvider(_)));
        assert!(err.to_string().contains("llm/v1/embeddings"));
    }

    #[test]
    fn test_malformed_fragment_is_upstream_error() {
        let err = parse_fragment::<serde_json::Value>("{\"a\":", "OpenAI").unwrap_err();
        assert!(matches!(err, GatewayError::UpstreamError { status: 502, .. }));
        assert_eq!(err.status_code(), hyper::StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_api_base_or() {
        assert_eq!(
            api_base_or(&None, "https://api.openai.com/v1"),
            "https://api.openai.com/v1"
        );
        assert_eq!(
            api_base_or(&Some(String::new()), "https://default"),
            "https://default"
        );
        assert_eq!(
            api_base_or(&Some("http://localhost:9000/".into()), "https://default"),
            "http://localhost:9000"
        );
    }
}
