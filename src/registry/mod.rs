//! 动态路由表
//!
//! 单写多读：写入方在旁边完整构建新表，再通过一次原子指针交换发布；
//! 读取方不加锁，看到的要么是完整的旧表，要么是完整的新表。

use crate::config::{EndpointConfig, GatewayConfig, ModelConfig};
use crate::dispatch::Handler;
use crate::error::GatewayError;
use crate::providers::ProviderResolver;
use crate::types::{
    Endpoint, ModelInfo, RouteView, TaskType, ENDPOINTS_BASE, GATEWAY_ROUTE_BASE, QUERY_SUFFIX,
};
use crate::Result;
use arc_swap::ArcSwap;
use indexmap::IndexMap;
use std::sync::Arc;
use tracing::info;

/// 一个已编译的端点：配置加上注册时绑定的处理器
#[derive(Debug, Clone)]
pub struct Route {
    pub name: String,
    pub task: TaskType,
    pub model: ModelConfig,
    pub handler: Handler,
}

impl Route {
    /// 解析提供商并构建处理器
    pub fn compile(config: &EndpointConfig, resolver: &ProviderResolver) -> Result<Self> {
        let provider = resolver.resolve(&config.model)?;
        let handler = Handler::build(config.endpoint_type, provider).map_err(|e| {
            GatewayError::config(format!("端点 {} 注册失败: {}", config.name, e))
        })?;

        Ok(Self {
            name: config.name.clone(),
            task: config.endpoint_type,
            model: config.model.clone(),
            handler,
        })
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            name: self.model.name.clone(),
            provider: self.model.provider.clone(),
        }
    }

    pub fn to_endpoint(&self) -> Endpoint {
        Endpoint {
            name: self.name.clone(),
            endpoint_type: self.task,
            model: self.model_info(),
            endpoint_url: format!("{}{}{}", ENDPOINTS_BASE, self.name, QUERY_SUFFIX),
            limit: None,
        }
    }

    pub fn to_route_view(&self) -> RouteView {
        RouteView {
            name: self.name.clone(),
            route_type: self.task,
            model: self.model_info(),
            route_url: format!("{}{}{}", GATEWAY_ROUTE_BASE, self.name, QUERY_SUFFIX),
            limit: None,
        }
    }
}

/// 按配置顺序排列的不可变路由表快照
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: IndexMap<String, Arc<Route>>,
}

impl RouteTable {
    pub fn get(&self, name: &str) -> Option<&Arc<Route>> {
        self.routes.get(name)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Route>> {
        self.routes.values()
    }
}

/// 编译整份配置；任何一个端点失败都会让整体失败
pub fn compile(config: &GatewayConfig, resolver: &ProviderResolver) -> Result<Vec<Route>> {
    config
        .endpoints
        .iter()
        .map(|endpoint| Route::compile(endpoint, resolver))
        .collect()
}

#[derive(Debug)]
pub struct RouteRegistry {
    table: ArcSwap<RouteTable>,
}

impl Default for RouteRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RouteRegistry {
    /// 空路由表
    pub fn new() -> Self {
        Self {
            table: ArcSwap::from_pointee(RouteTable::default()),
        }
    }

    /// 唯一的写操作：整体替换。名称重复时不发布，原表保持不变。
    pub fn replace_all(&self, routes: Vec<Route>) -> Result<()> {
        let mut table = IndexMap::with_capacity(routes.len());
        for route in routes {
            if table.contains_key(&route.name) {
                return Err(GatewayError::config(format!("端点名称重复: {}", route.name)));
            }
            table.insert(route.name.clone(), Arc::new(route));
        }

        let count = table.len();
        self.table.store(Arc::new(RouteTable { routes: table }));
        info!("路由表已发布，共 {} 个端点", count);
        Ok(())
    }

    /// 编译配置并发布；失败时保留当前路由表
    pub fn load(&self, config: &GatewayConfig, resolver: &ProviderResolver) -> Result<()> {
        let routes = compile(config, resolver)?;
        self.replace_all(routes)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Route>> {
        self.table.load().get(name).cloned()
    }

    /// 当前路由表的一致快照
    pub fn snapshot(&self) -> Arc<RouteTable> {
        self.table.load_full()
    }

    pub fn list_ordered(&self) -> Vec<Arc<Route>> {
        self.snapshot().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.table.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::ProviderSettings;
    use crate::providers::Provider;
    use async_trait::async_trait;

    pub(crate) struct NullProvider;

    #[async_trait]
    impl Provider for NullProvider {
        fn name(&self) -> &str {
            "null"
        }

        fn supports(&self, task: TaskType) -> bool {
            task != TaskType::Embeddings
        }
    }

    pub(crate) fn resolver() -> ProviderResolver {
        ProviderResolver::new()
            .register("null", |_| Ok(Arc::new(NullProvider) as Arc<dyn Provider>))
    }

    pub(crate) fn endpoint(name: &str, task: TaskType, provider: &str) -> EndpointConfig {
        EndpointConfig {
            name: name.to_string(),
            endpoint_type: task,
            model: ModelConfig {
                name: format!("{}-model", name),
                provider: provider.to_string(),
                config: ProviderSettings::default(),
            },
        }
    }

    pub(crate) fn routes(names: &[String]) -> Vec<Route> {
        let resolver = resolver();
        names
            .iter()
            .map(|n| Route::compile(&endpoint(n, TaskType::Chat, "null"), &resolver).unwrap())
            .collect()
    }

    fn names(registry: &RouteRegistry) -> Vec<String> {
        registry.list_ordered().iter().map(|r| r.name.clone()).collect()
    }

    #[test]
    fn test_starts_empty() {
        let registry = RouteRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.get("anything").is_none());
    }

    #[test]
    fn test_get_and_order() {
        let registry = RouteRegistry::new();
        let input: Vec<String> = ["zeta", "alpha", "mid"].iter().map(|s| s.to_string()).collect();
        registry.replace_all(routes(&input)).unwrap();

        assert_eq!(names(&registry), input);
        for name in &input {
            assert_eq!(&registry.get(name).unwrap().name, name);
        }
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_duplicate_names_leave_table_untouched() {
        let registry = RouteRegistry::new();
        registry.replace_all(routes(&["keep".to_string()])).unwrap();

        let err = registry
            .replace_all(routes(&["a".to_string(), "a".to_string()]))
            .unwrap_err();
        assert!(matches!(err, GatewayError::ConfigError(_)));
        assert_eq!(names(&registry), vec!["keep"]);
    }

    #[test]
    fn test_failed_load_is_transactional() {
        let registry = RouteRegistry::new();
        let resolver = resolver();
        let good = GatewayConfig {
            endpoints: vec![endpoint("chat", TaskType::Chat, "null")],
        };
        registry.load(&good, &resolver).unwrap();

        let unknown_provider = GatewayConfig {
            endpoints: vec![
                endpoint("other", TaskType::Chat, "null"),
                endpoint("broken", TaskType::Chat, "nonexistent"),
            ],
        };
        assert!(registry.load(&unknown_provider, &resolver).is_err());

        let unsupported_task = GatewayConfig {
            endpoints: vec![endpoint("embed", TaskType::Embeddings, "null")],
        };
        let err = registry.load(&unsupported_task, &resolver).unwrap_err();
        assert!(err.to_string().contains("embed"));

        assert_eq!(names(&registry), vec!["chat"]);
    }

    #[test]
    fn test_views() {
        let route = &routes(&["demo-chat".to_string()])[0];

        let endpoint = route.to_endpoint();
        assert_eq!(endpoint.endpoint_url, "/endpoints/demo-chat/invocations");
        assert_eq!(endpoint.model.name, "demo-chat-model");
        assert!(endpoint.limit.is_none());

        let view = route.to_route_view();
        assert_eq!(view.route_url, "/gateway/demo-chat/invocations");
        assert_eq!(view.route_type, TaskType::Chat);
    }

    #[test]
    fn test_concurrent_readers_see_whole_tables() {
        let registry = Arc::new(RouteRegistry::new());
        let old: Vec<String> = (0..50).map(|i| format!("old-{i}")).collect();
        let new: Vec<String> = (0..50).map(|i| format!("new-{i}")).collect();
        registry.replace_all(routes(&old)).unwrap();

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let (old, new) = (old.clone(), new.clone());
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        let seen: Vec<String> =
                            registry.list_ordered().iter().map(|r| r.name.clone()).collect();
                        assert!(seen == old || seen == new, "observed a mixed table");
                    }
                })
            })
            .collect();

        let prebuilt_old: Vec<Vec<Route>> = (0..50).map(|_| routes(&old)).collect();
        let prebuilt_new: Vec<Vec<Route>> = (0..50).map(|_| routes(&new)).collect();
        for (o, n) in prebuilt_old.into_iter().zip(prebuilt_new) {
            registry.replace_all(n).unwrap();
            registry.replace_all(o).unwrap();
        }

        for reader in readers {
            reader.join().unwrap();
        }
    }
}
