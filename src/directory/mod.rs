//! 只读目录接口：端点列表与单项查询
//!
//! 新旧两套视图共享同一张路由表，各自使用独立的分页大小。

pub mod token;

use crate::error::GatewayError;
use crate::registry::{Route, RouteRegistry};
use crate::types::{Endpoint, RouteView};
use crate::Result;
use serde::Serialize;
use std::ops::Range;
use std::sync::Arc;

/// `/api/2.0/endpoints/` 的分页大小
pub const ENDPOINTS_PAGE_SIZE: usize = 25;
/// 已弃用的 `/api/2.0/gateway/routes/` 的分页大小
pub const ROUTES_PAGE_SIZE: usize = 3000;

#[derive(Debug, Clone, Serialize)]
pub struct ListEndpointsResponse {
    pub endpoints: Vec<Endpoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchRoutesResponse {
    pub routes: Vec<RouteView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

/// 计算一页的下标范围以及下一页令牌
///
/// 只有在 `end` 之后仍有元素时才返回令牌，
/// 所以总数恰好是页大小的整数倍时不会出现多余的空页。
pub fn page_window(
    len: usize,
    page_token: Option<&str>,
    page_size: usize,
) -> Result<(Range<usize>, Option<String>)> {
    let start = token::decode(page_token)?;
    let end = start.saturating_add(page_size.max(1));

    let window = start.min(len)..end.min(len);
    let next = (len > end).then(|| token::encode(end));
    Ok((window, next))
}

#[derive(Debug, Clone)]
pub struct Directory {
    registry: Arc<RouteRegistry>,
    endpoints_page_size: usize,
    routes_page_size: usize,
}

impl Directory {
    pub fn new(registry: Arc<RouteRegistry>) -> Self {
        Self::with_page_sizes(registry, ENDPOINTS_PAGE_SIZE, ROUTES_PAGE_SIZE)
    }

    pub fn with_page_sizes(
        registry: Arc<RouteRegistry>,
        endpoints_page_size: usize,
        routes_page_size: usize,
    ) -> Self {
        Self {
            registry,
            endpoints_page_size,
            routes_page_size,
        }
    }

    pub fn list_endpoints(&self, page_token: Option<&str>) -> Result<ListEndpointsResponse> {
        let (endpoints, next_page_token) =
            self.page(page_token, self.endpoints_page_size, Route::to_endpoint)?;
        Ok(ListEndpointsResponse {
            endpoints,
            next_page_token,
        })
    }

    pub fn search_routes(&self, page_token: Option<&str>) -> Result<SearchRoutesResponse> {
        let (routes, next_page_token) =
            self.page(page_token, self.routes_page_size, Route::to_route_view)?;
        Ok(SearchRoutesResponse {
            routes,
            next_page_token,
        })
    }

    pub fn get_endpoint(&self, name: &str) -> Result<Endpoint> {
        self.registry
            .get(name)
            .map(|route| route.to_endpoint())
            .ok_or_else(|| GatewayError::EndpointNotFound(name.to_string()))
    }

    pub fn get_route(&self, name: &str) -> Result<RouteView> {
        self.registry
            .get(name)
            .map(|route| route.to_route_view())
            .ok_or_else(|| GatewayError::RouteNotFound(name.to_string()))
    }

    /// 在同一个快照上取一页，避免翻页过程中被并发重载打断
    fn page<T>(
        &self,
        page_token: Option<&str>,
        page_size: usize,
        view: impl Fn(&Route) -> T,
    ) -> Result<(Vec<T>, Option<String>)> {
        let table = self.registry.snapshot();
        let (window, next) = page_window(table.len(), page_token, page_size)?;
        let items = table
            .iter()
            .skip(window.start)
            .take(window.len())
            .map(|route| view(route))
            .collect();
        Ok((items, next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::tests::routes;

    fn directory(count: usize, page_size: usize) -> Directory {
        let registry = Arc::new(RouteRegistry::new());
        let names: Vec<String> = (0..count).map(|i| format!("endpoint-{i:02}")).collect();
        registry.replace_all(routes(&names)).unwrap();
        Directory::with_page_sizes(registry, page_size, page_size * 2)
    }

    /// 从无令牌开始一直翻到最后一页
    fn walk(directory: &Directory) -> (Vec<String>, usize) {
        let mut names = Vec::new();
        let mut pages = 0;
        let mut token: Option<String> = None;
        loop {
            let page = directory.list_endpoints(token.as_deref()).unwrap();
            pages += 1;
            names.extend(page.endpoints.into_iter().map(|e| e.name));
            match page.next_page_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }
        (names, pages)
    }

    #[test]
    fn test_pagination_completeness() {
        for (count, expected_pages) in [(0, 1), (1, 1), (10, 1), (15, 2), (20, 2), (35, 4)] {
            let directory = directory(count, 10);
            let (names, pages) = walk(&directory);
            let expected: Vec<String> = (0..count).map(|i| format!("endpoint-{i:02}")).collect();
            assert_eq!(names, expected, "count = {count}");
            assert_eq!(pages, expected_pages, "count = {count}");
        }
    }

    #[test]
    fn test_fifteen_endpoints_two_pages() {
        let directory = directory(15, 10);

        let first = directory.list_endpoints(None).unwrap();
        assert_eq!(first.endpoints.len(), 10);
        assert_eq!(first.endpoints[0].name, "endpoint-00");
        assert_eq!(first.endpoints[9].name, "endpoint-09");
        let token = first.next_page_token.expect("first page should carry a token");

        let second = directory.list_endpoints(Some(&token)).unwrap();
        assert_eq!(second.endpoints.len(), 5);
        assert_eq!(second.endpoints[0].name, "endpoint-10");
        assert_eq!(second.endpoints[4].name, "endpoint-14");
        assert!(second.next_page_token.is_none());
    }

    #[test]
    fn test_token_past_end_yields_empty_page() {
        let directory = directory(3, 10);
        let page = directory.list_endpoints(Some(&token::encode(50))).unwrap();
        assert!(page.endpoints.is_empty());
        assert!(page.next_page_token.is_none());
    }

    #[test]
    fn test_views_use_independent_page_sizes() {
        let directory = directory(15, 5);

        let endpoints = directory.list_endpoints(None).unwrap();
        assert_eq!(endpoints.endpoints.len(), 5);
        assert!(endpoints.next_page_token.is_some());

        let routes = directory.search_routes(None).unwrap();
        assert_eq!(routes.routes.len(), 10);
        assert!(routes.next_page_token.is_some());
    }

    #[test]
    fn test_malformed_token_rejected() {
        let directory = directory(3, 10);
        let err = directory.list_endpoints(Some("%%%")).unwrap_err();
        assert!(matches!(err, GatewayError::BadRequest(_)));
    }

    #[test]
    fn test_get_missing_names_endpoint() {
        let directory = directory(1, 10);
        assert_eq!(directory.get_endpoint("endpoint-00").unwrap().name, "endpoint-00");

        let err = directory.get_endpoint("missing-endpoint").unwrap_err();
        assert!(matches!(err, GatewayError::EndpointNotFound(_)));
        assert!(err.to_string().contains("missing-endpoint"));

        let err = directory.get_route("missing-endpoint").unwrap_err();
        assert!(matches!(err, GatewayError::RouteNotFound(_)));
        assert!(err.to_string().contains("route 'missing-endpoint'"));
    }

    #[test]
    fn test_response_omits_absent_token() {
        let directory = directory(1, 10);
        let json = serde_json::to_value(directory.list_endpoints(None).unwrap()).unwrap();
        assert!(json.get("next_page_token").is_none());
        assert_eq!(json["endpoints"][0]["name"], "endpoint-00");
    }
}
