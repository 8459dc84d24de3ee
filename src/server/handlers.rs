use super::streaming;
use crate::directory::{ListEndpointsResponse, SearchRoutesResponse};
use crate::dispatch::Invocation;
use crate::error::GatewayError;
use crate::gateway::Gateway;
use crate::metrics;
use crate::types::{ENDPOINTS_BASE, GATEWAY_ROUTE_BASE, QUERY_SUFFIX};
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::{HeaderValue, ALLOW, CACHE_CONTROL, CONTENT_TYPE};
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::borrow::Cow;
use std::sync::Arc;
use tracing::{debug, error, warn};

// 统一的 Body 类型，可以处理普通响应和流式响应
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
pub type BoxBody = http_body_util::combinators::UnsyncBoxBody<Bytes, BoxError>;

const ENDPOINTS_CRUD_BASE: &str = "/api/2.0/endpoints/";
const GATEWAY_CRUD_BASE: &str = "/api/2.0/gateway/routes/";
const ENDPOINTS_LIMITS_BASE: &str = "/api/2.0/endpoints/limits/";
const GATEWAY_LIMITS_BASE: &str = "/api/2.0/gateway/limits/";
const HEALTH_PATHS: [&str; 2] = ["/health", "/api/2.0/gateway/health"];
const INVOCATION_BASES: [&str; 2] = [ENDPOINTS_BASE, GATEWAY_ROUTE_BASE];

/// 请求路径解析结果
#[derive(Debug, PartialEq, Eq)]
pub enum Target<'a> {
    Health,
    Metrics,
    Invoke(&'a str),
    ListEndpoints,
    GetEndpoint(&'a str),
    SearchRoutes,
    GetRoute(&'a str),
    GetLimits,
    SetLimits,
    /// 路径存在但方法不匹配，携带允许的方法
    MethodNotAllowed(&'static str),
    NotFound,
}

/// 取 `base` 之后的单个路径段
fn single_segment<'a>(path: &'a str, base: &str) -> Option<&'a str> {
    path.strip_prefix(base)
        .filter(|rest| !rest.is_empty() && !rest.contains('/'))
}

/// 列表路径可带或不带末尾斜杠
fn is_collection(path: &str, base: &str) -> bool {
    path == base || path == base.trim_end_matches('/')
}

pub fn resolve_target<'a>(method: &Method, path: &'a str) -> Target<'a> {
    if let Some(target) = route(method, path) {
        target
    } else if route(&Method::GET, path).is_some() {
        Target::MethodNotAllowed("GET")
    } else if route(&Method::POST, path).is_some() {
        Target::MethodNotAllowed("POST")
    } else {
        Target::NotFound
    }
}

fn route<'a>(method: &Method, path: &'a str) -> Option<Target<'a>> {
    match *method {
        Method::GET => {
            if HEALTH_PATHS.contains(&path) {
                Some(Target::Health)
            } else if path == "/metrics" {
                Some(Target::Metrics)
            } else if single_segment(path, ENDPOINTS_LIMITS_BASE).is_some()
                || single_segment(path, GATEWAY_LIMITS_BASE).is_some()
            {
                Some(Target::GetLimits)
            } else if is_collection(path, ENDPOINTS_CRUD_BASE) {
                Some(Target::ListEndpoints)
            } else if let Some(name) = single_segment(path, ENDPOINTS_CRUD_BASE) {
                Some(Target::GetEndpoint(name))
            } else if is_collection(path, GATEWAY_CRUD_BASE) {
                Some(Target::SearchRoutes)
            } else {
                single_segment(path, GATEWAY_CRUD_BASE).map(Target::GetRoute)
            }
        }
        Method::POST => {
            if is_collection(path, ENDPOINTS_LIMITS_BASE) || is_collection(path, GATEWAY_LIMITS_BASE)
            {
                return Some(Target::SetLimits);
            }
            INVOCATION_BASES
                .iter()
                .find_map(|base| {
                    path.strip_prefix(base)
                        .and_then(|rest| rest.strip_suffix(QUERY_SUFFIX))
                        .filter(|name| !name.is_empty() && !name.contains('/'))
                })
                .map(Target::Invoke)
        }
        _ => None,
    }
}

/// 路径段中的名称按百分号编码解码
fn decode_name(name: &str) -> Result<Cow<'_, str>, GatewayError> {
    urlencoding::decode(name)
        .map_err(|e| GatewayError::bad_request(format!("Invalid endpoint name encoding: {}", e)))
}

#[derive(Debug, Default, Deserialize)]
struct ListQuery {
    page_token: Option<String>,
}

fn page_token(req: &Request<hyper::body::Incoming>) -> Result<Option<String>, GatewayError> {
    match req.uri().query() {
        None => Ok(None),
        Some(query) => serde_urlencoded::from_str::<ListQuery>(query)
            .map(|q| q.page_token)
            .map_err(|e| GatewayError::bad_request(format!("Invalid query string: {}", e))),
    }
}

/// 处理 HTTP 请求的主路由
pub async fn handle_request(
    req: Request<hyper::body::Incoming>,
    gateway: Arc<Gateway>,
) -> Result<Response<BoxBody>, BoxError> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    debug!("{} {}", method, path);

    let response = match resolve_target(&method, &path) {
        Target::Health => health_check(),
        Target::Metrics => metrics_endpoint(),
        Target::Invoke(name) => match decode_name(name) {
            Ok(name) => invoke(req, &gateway, &name).await?,
            Err(e) => error_response(&e),
        },
        Target::ListEndpoints => list_endpoints(&req, &gateway),
        Target::GetEndpoint(name) => respond(
            decode_name(name).and_then(|name| gateway.directory().get_endpoint(&name)),
        ),
        Target::SearchRoutes => search_routes(&req, &gateway),
        Target::GetRoute(name) => {
            respond(decode_name(name).and_then(|name| gateway.directory().get_route(&name)))
        }
        Target::GetLimits => error_response(&GatewayError::NotImplemented(
            "The get_limits API is not available yet.".to_string(),
        )),
        Target::SetLimits => error_response(&GatewayError::NotImplemented(
            "The set_limits API is not available yet.".to_string(),
        )),
        Target::MethodNotAllowed(allow) => method_not_allowed(allow),
        Target::NotFound => not_found(),
    };

    Ok(response)
}

/// 健康检查端点
fn health_check() -> Response<BoxBody> {
    json_response(StatusCode::OK, &json!({ "status": "OK" }))
}

fn metrics_endpoint() -> Response<BoxBody> {
    let body = metrics::global_metrics().export_prometheus();
    let mut response = Response::new(full(body));
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; version=0.0.4"));
    response
}

fn list_endpoints(
    req: &Request<hyper::body::Incoming>,
    gateway: &Gateway,
) -> Response<BoxBody> {
    let result: Result<ListEndpointsResponse, GatewayError> = page_token(req)
        .and_then(|token| gateway.directory().list_endpoints(token.as_deref()));
    respond(result)
}

fn search_routes(req: &Request<hyper::body::Incoming>, gateway: &Gateway) -> Response<BoxBody> {
    let result: Result<SearchRoutesResponse, GatewayError> = page_token(req)
        .and_then(|token| gateway.directory().search_routes(token.as_deref()));
    respond(result)
}

/// 调用端点：按名称查路由表，再交给绑定的处理器
async fn invoke(
    req: Request<hyper::body::Incoming>,
    gateway: &Gateway,
    name: &str,
) -> Result<Response<BoxBody>, BoxError> {
    let metrics = metrics::global_metrics();

    let Some(route) = gateway.registry().get(name) else {
        return Ok(error_response(&GatewayError::EndpointNotFound(
            name.to_string(),
        )));
    };

    let body = match req.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            metrics.record_failure();
            return Ok(error_response(&GatewayError::bad_request(format!(
                "Failed to read request body: {}",
                e
            ))));
        }
    };

    debug!(
        "调用端点 {} ({}, 提供商 {})",
        name,
        route.handler.task(),
        route.handler.provider().name()
    );

    match route.handler.invoke(&body).await {
        Ok(Invocation::Complete(value)) => {
            metrics.record_success();
            Ok(json_response(StatusCode::OK, &value))
        }
        Ok(Invocation::Stream(fragments)) => {
            metrics.record_stream();
            let mut response = Response::new(streaming::stream(fragments));
            let headers = response.headers_mut();
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
            headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
            // 禁用 Nginx 缓冲
            headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
            Ok(response)
        }
        Err(e) => {
            metrics.record_failure();
            if e.is_configuration() {
                error!("端点 {} 配置异常: {}", name, e);
            } else {
                warn!("端点 {} 调用失败: {}", name, e);
            }
            Ok(error_response(&e))
        }
    }
}

fn respond<T: Serialize>(result: Result<T, GatewayError>) -> Response<BoxBody> {
    match result {
        Ok(value) => json_response(StatusCode::OK, &value),
        Err(e) => error_response(&e),
    }
}

fn full(body: impl Into<Bytes>) -> BoxBody {
    Full::new(body.into())
        .map_err(|e| Box::new(e) as BoxError)
        .boxed_unsync()
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<BoxBody> {
    let (status, body) = match serde_json::to_vec(value) {
        Ok(body) => (status, body),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "detail": e.to_string() }).to_string().into_bytes(),
        ),
    };

    let mut response = Response::new(full(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

/// 单请求错误统一转换为 `{"detail": ...}`
fn error_response(err: &GatewayError) -> Response<BoxBody> {
    json_response(err.status_code(), &json!({ "detail": err.to_string() }))
}

/// 404 响应
fn not_found() -> Response<BoxBody> {
    json_response(StatusCode::NOT_FOUND, &json!({ "detail": "Not Found" }))
}

/// 405 响应，附带 `Allow` 头
fn method_not_allowed(allow: &'static str) -> Response<BoxBody> {
    let mut response = json_response(
        StatusCode::METHOD_NOT_ALLOWED,
        &json!({ "detail": "Method Not Allowed" }),
    );
    response
        .headers_mut()
        .insert(ALLOW, HeaderValue::from_static(allow));
    response
}
