use super::{anthropic::AnthropicProvider, openai::OpenAiProvider, Provider};
use crate::config::ModelConfig;
use crate::error::GatewayError;
use crate::Result;
use std::collections::HashMap;
use std::sync::Arc;

/// 提供商构造函数：由模型配置构造一个共享实例
pub type ProviderConstructor =
    Arc<dyn Fn(&ModelConfig) -> Result<Arc<dyn Provider>> + Send + Sync>;

/// 提供商标识到构造函数的映射
///
/// 每个端点在注册时调用一次 [`ProviderResolver::resolve`]，
/// 未知标识属于配置错误，会让整次加载失败。
#[derive(Clone, Default)]
pub struct ProviderResolver {
    constructors: HashMap<String, ProviderConstructor>,
}

impl ProviderResolver {
    /// 不含任何提供商的空解析器
    pub fn new() -> Self {
        Self::default()
    }

    /// 内置提供商：openai、anthropic
    pub fn builtin() -> Self {
        Self::new()
            .register("openai", |model| {
                Ok(Arc::new(OpenAiProvider::from_config(model)?) as Arc<dyn Provider>)
            })
            .register("anthropic", |model| {
                Ok(Arc::new(AnthropicProvider::from_config(model)?) as Arc<dyn Provider>)
            })
    }

    /// 注册（或覆盖）一个提供商
    pub fn register<F>(mut self, provider_id: impl Into<String>, constructor: F) -> Self
    where
        F: Fn(&ModelConfig) -> Result<Arc<dyn Provider>> + Send + Sync + 'static,
    {
        self.constructors
            .insert(provider_id.into(), Arc::new(constructor));
        self
    }

    pub fn resolve(&self, model: &ModelConfig) -> Result<Arc<dyn Provider>> {
        let constructor = self.constructors.get(&model.provider).ok_or_else(|| {
            GatewayError::config(format!("未知的提供商: {}", model.provider))
        })?;
        constructor(model)
    }

    pub fn provider_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

impl std::fmt::Debug for ProviderResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderResolver")
            .field("providers", &self.provider_ids())
            .finish()
    }
}
