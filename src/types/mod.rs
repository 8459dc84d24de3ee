pub mod chat;
pub mod completions;
pub mod embeddings;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use chat::{ChatRequest, ChatResponse, ChatStreamChunk, Message};
pub use completions::{CompletionsRequest, CompletionsResponse, CompletionsStreamChunk};
pub use embeddings::{EmbeddingsRequest, EmbeddingsResponse};

/// 新版调用路径前缀
pub const ENDPOINTS_BASE: &str = "/endpoints/";
/// 已弃用的网关调用路径前缀
pub const GATEWAY_ROUTE_BASE: &str = "/gateway/";
pub const QUERY_SUFFIX: &str = "/invocations";

/// 端点能力类别（封闭集合）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskType {
    #[serde(rename = "llm/v1/chat")]
    Chat,
    #[serde(rename = "llm/v1/completions")]
    Completions,
    #[serde(rename = "llm/v1/embeddings")]
    Embeddings,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Chat => "llm/v1/chat",
            TaskType::Completions => "llm/v1/completions",
            TaskType::Embeddings => "llm/v1/embeddings",
        }
    }

    /// 该类别是否存在流式能力
    pub fn supports_streaming(&self) -> bool {
        !matches!(self, TaskType::Embeddings)
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 对外展示的模型描述
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub provider: String,
}

/// `/api/2.0/endpoints/` 返回的端点视图
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    pub name: String,
    pub endpoint_type: TaskType,
    pub model: ModelInfo,
    pub endpoint_url: String,
    /// 预留字段，始终为空
    pub limit: Option<serde_json::Value>,
}

/// 已弃用的 `/api/2.0/gateway/routes/` 返回的路由视图
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteView {
    pub name: String,
    pub route_type: TaskType,
    pub model: ModelInfo,
    pub route_url: String,
    pub limit: Option<serde_json::Value>,
}

/// 当前 Unix 时间戳（秒）
pub(crate) fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
