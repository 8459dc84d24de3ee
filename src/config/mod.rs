use crate::error::GatewayError;
use crate::types::TaskType;
use crate::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use serde_yaml::Value as YamlValue;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::warn;

static ENV_VAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("环境变量正则无效"));

static ENDPOINT_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._~-]+$").expect("端点名称正则无效"));

/// 主配置结构
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayConfig {
    #[serde(alias = "routes")]
    pub endpoints: Vec<EndpointConfig>,
}

/// 单个端点配置
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EndpointConfig {
    pub name: String,
    #[serde(alias = "route_type")]
    pub endpoint_type: TaskType,
    pub model: ModelConfig,
}

/// 模型与提供商配置
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelConfig {
    pub name: String,
    pub provider: String,
    #[serde(default)]
    pub config: ProviderSettings,
}

/// 提供商构造参数
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProviderSettings {
    #[serde(
        default,
        alias = "openai_api_key",
        alias = "anthropic_api_key",
        skip_serializing_if = "Option::is_none"
    )]
    pub api_key: Option<String>,
    #[serde(
        default,
        alias = "openai_api_base",
        skip_serializing_if = "Option::is_none"
    )]
    pub api_base: Option<String>,
    /// 提供商专属的其余参数
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl GatewayConfig {
    /// 从 YAML 文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            GatewayError::config(format!("无法读取配置文件 {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
    }

    /// 从 YAML 文本解析并验证配置
    pub fn from_yaml(content: &str) -> Result<Self> {
        let mut document: YamlValue = serde_yaml::from_str(content)?;
        Self::replace_env_vars(&mut document)?;
        let config: GatewayConfig = serde_yaml::from_value(document)?;
        config.validate()?;
        Ok(config)
    }

    /// 替换字符串值中的环境变量 ${VAR}；注释不参与替换
    fn replace_env_vars(value: &mut YamlValue) -> Result<()> {
        match value {
            YamlValue::String(text) => {
                if ENV_VAR_RE.is_match(text) {
                    *text = substitute_env(text)?;
                }
            }
            YamlValue::Sequence(items) => {
                for item in items {
                    Self::replace_env_vars(item)?;
                }
            }
            YamlValue::Mapping(map) => {
                for (_, item) in map.iter_mut() {
                    Self::replace_env_vars(item)?;
                }
            }
            YamlValue::Tagged(tagged) => Self::replace_env_vars(&mut tagged.value)?,
            _ => {}
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.endpoints.is_empty() {
            warn!("配置中没有任何端点");
        }

        let mut seen = HashSet::new();
        for endpoint in &self.endpoints {
            if !ENDPOINT_NAME_RE.is_match(&endpoint.name) {
                return Err(GatewayError::config(format!(
                    "端点名称无效（只允许字母、数字以及 . _ ~ -）: {:?}",
                    endpoint.name
                )));
            }
            if !seen.insert(endpoint.name.as_str()) {
                return Err(GatewayError::config(format!(
                    "端点名称重复: {}",
                    endpoint.name
                )));
            }
            if endpoint.model.name.is_empty() {
                return Err(GatewayError::config(format!(
                    "端点 {} 的 model.name 不能为空",
                    endpoint.name
                )));
            }
            if endpoint.model.provider.is_empty() {
                return Err(GatewayError::config(format!(
                    "端点 {} 的 model.provider 不能为空",
                    endpoint.name
                )));
            }
        }

        Ok(())
    }
}

fn substitute_env(text: &str) -> Result<String> {
    let mut result = text.to_string();

    for cap in ENV_VAR_RE.captures_iter(text) {
        let var_name = &cap[1];
        let var_value = std::env::var(var_name)
            .map_err(|_| GatewayError::config(format!("环境变量未找到: {}", var_name)))?;
        result = result.replace(&cap[0], &var_value);
    }

    Ok(result)
}
