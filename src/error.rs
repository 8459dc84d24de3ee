use hyper::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("配置错误: {0}")]
    ConfigError(String),

    #[error("IO 错误: {0}")]
    IoError(#[from] std::io::Error),

    #[error("YAML 解析错误: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("JSON 解析错误: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP 请求错误: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("The endpoint '{0}' is not present or active on the server. Please verify the endpoint name.")]
    EndpointNotFound(String),

    #[error("The route '{0}' is not present or active on the server. Please verify the route name.")]
    RouteNotFound(String),

    #[error("{0}")]
    NotImplemented(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("提供商不支持: {0}")]
    UnsupportedProvider(String),

    #[error("上游 API 错误: {status} - {message}")]
    UpstreamError { status: u16, message: String },
}

impl GatewayError {
    pub fn config(msg: impl Into<String>) -> Self {
        GatewayError::ConfigError(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        GatewayError::BadRequest(msg.into())
    }

    pub fn upstream(status: u16, message: impl Into<String>) -> Self {
        GatewayError::UpstreamError {
            status,
            message: message.into(),
        }
    }

    /// 配置类错误只在加载阶段出现，不会转换为单个请求的响应
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            GatewayError::ConfigError(_)
                | GatewayError::YamlError(_)
                | GatewayError::IoError(_)
                | GatewayError::UnsupportedProvider(_)
        )
    }

    /// 对外响应使用的 HTTP 状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::EndpointNotFound(_) | GatewayError::RouteNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            GatewayError::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            GatewayError::BadRequest(_) | GatewayError::JsonError(_) => StatusCode::BAD_REQUEST,
            GatewayError::UpstreamError { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            GatewayError::HttpError(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
