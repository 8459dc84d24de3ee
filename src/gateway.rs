use crate::config::GatewayConfig;
use crate::directory::Directory;
use crate::metrics;
use crate::providers::ProviderResolver;
use crate::registry::RouteRegistry;
use crate::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

/// 网关服务对象：持有唯一的路由表实例，并通过句柄交给请求处理器
#[derive(Debug)]
pub struct Gateway {
    registry: Arc<RouteRegistry>,
    directory: Directory,
    resolver: ProviderResolver,
    config_path: Option<PathBuf>,
}

impl Gateway {
    /// 由已验证的配置构建；任何端点注册失败都会阻止启动
    pub fn from_config(config: &GatewayConfig, resolver: ProviderResolver) -> Result<Self> {
        let registry = Arc::new(RouteRegistry::new());
        registry.load(config, &resolver)?;

        Ok(Self {
            directory: Directory::new(Arc::clone(&registry)),
            registry,
            resolver,
            config_path: None,
        })
    }

    /// 从配置文件构建，并记住路径供后续重载
    pub fn from_file<P: AsRef<Path>>(path: P, resolver: ProviderResolver) -> Result<Self> {
        let path = path.as_ref();
        let config = GatewayConfig::from_file(path)?;
        let mut gateway = Self::from_config(&config, resolver)?;
        gateway.config_path = Some(path.to_path_buf());
        info!("已从 {} 加载 {} 个端点", path.display(), gateway.registry.len());
        Ok(gateway)
    }

    pub fn registry(&self) -> &Arc<RouteRegistry> {
        &self.registry
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    /// 应用新配置。失败时保留当前路由表继续服务。
    pub fn apply(&self, config: &GatewayConfig) -> Result<()> {
        let result = self.registry.load(config, &self.resolver);
        metrics::global_metrics().record_reload(result.is_ok());
        result
    }

    /// 重新读取配置文件并应用；没有配置文件路径时什么也不做
    pub fn reload(&self) -> Result<()> {
        let Some(path) = &self.config_path else {
            return Ok(());
        };

        let result = GatewayConfig::from_file(path).and_then(|config| self.apply(&config));
        match &result {
            Ok(()) => info!("配置已重载: {}", path.display()),
            Err(e) => error!("配置重载失败，继续使用旧路由表: {}", e),
        }
        result
    }
}
