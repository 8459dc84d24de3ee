//! 端点调用分发
//!
//! 每个端点在注册时编译为一个 [`Handler`]：固定的端点类别加上共享的提供商实例。
//! 所有端点共用同一个分发例程 [`Handler::invoke`]，按请求体中的 `stream`
//! 标志选择同步调用或流式调用。

use crate::error::GatewayError;
use crate::providers::{FragmentStream, Provider};
use crate::types::{ChatRequest, CompletionsRequest, EmbeddingsRequest, TaskType};
use crate::Result;
use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// 一次调用的结果
pub enum Invocation {
    /// 单个完整响应体
    Complete(Value),
    /// 按提供商产生顺序排列的增量片段
    Stream(FragmentStream<Value>),
}

impl std::fmt::Debug for Invocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Invocation::Complete(value) => f.debug_tuple("Complete").field(value).finish(),
            Invocation::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// 绑定了端点类别与提供商的请求处理器
#[derive(Clone)]
pub struct Handler {
    task: TaskType,
    provider: Arc<dyn Provider>,
}

impl Handler {
    /// 注册阶段构造处理器；提供商不支持该类别属于配置错误
    pub fn build(task: TaskType, provider: Arc<dyn Provider>) -> Result<Self> {
        if !provider.supports(task) {
            return Err(GatewayError::config(format!(
                "提供商 {} 不支持端点类别 {}",
                provider.name(),
                task
            )));
        }
        Ok(Self { task, provider })
    }

    pub fn task(&self) -> TaskType {
        self.task
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    /// 只有存在流式能力的类别才会按请求走流式路径
    fn streams(&self, requested: bool) -> bool {
        requested && self.task.supports_streaming()
    }

    /// 解析请求体并调用提供商。提供商错误原样返回，不做重试。
    pub async fn invoke(&self, body: &[u8]) -> Result<Invocation> {
        match self.task {
            TaskType::Chat => {
                let req: ChatRequest = parse_payload(body)?;
                req.validate().map_err(GatewayError::BadRequest)?;
                if self.streams(req.stream) {
                    debug!("{} chat 流式调用", self.provider.name());
                    let fragments = self.provider.chat_stream(&req).await?;
                    Ok(Invocation::Stream(erase(fragments)))
                } else {
                    complete(self.provider.chat(&req).await?)
                }
            }
            TaskType::Completions => {
                let req: CompletionsRequest = parse_payload(body)?;
                if self.streams(req.stream) {
                    debug!("{} completions 流式调用", self.provider.name());
                    let fragments = self.provider.completions_stream(&req).await?;
                    Ok(Invocation::Stream(erase(fragments)))
                } else {
                    complete(self.provider.completions(&req).await?)
                }
            }
            TaskType::Embeddings => {
                let req: EmbeddingsRequest = parse_payload(body)?;
                complete(self.provider.embeddings(&req).await?)
            }
        }
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handler")
            .field("task", &self.task)
            .field("provider", &self.provider.name())
            .finish()
    }
}

fn parse_payload<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    serde_json::from_slice(body)
        .map_err(|e| GatewayError::bad_request(format!("Invalid request payload: {}", e)))
}

fn complete<T: Serialize>(response: T) -> Result<Invocation> {
    Ok(Invocation::Complete(serde_json::to_value(response)?))
}

/// 擦除片段类型，保持顺序不变
fn erase<T: Serialize + Send + 'static>(fragments: FragmentStream<T>) -> FragmentStream<Value> {
    Box::pin(fragments.map(|fragment| fragment.and_then(|f| Ok(serde_json::to_value(f)?))))
}
