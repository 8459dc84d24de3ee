//! 列表分页的续页令牌
//!
//! 令牌是 `{"index": N}` 的 base64 编码。客户端只能原样回传，不应自行构造。

use crate::error::GatewayError;
use crate::Result;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
struct PageToken {
    index: usize,
}

pub fn encode(index: usize) -> String {
    let payload = serde_json::json!({ "index": index }).to_string();
    STANDARD.encode(payload)
}

/// 解码令牌；未提供令牌时从 0 开始
pub fn decode(token: Option<&str>) -> Result<usize> {
    let Some(token) = token else {
        return Ok(0);
    };

    let bytes = STANDARD
        .decode(token.trim())
        .map_err(|_| invalid(token))?;
    let parsed: PageToken = serde_json::from_slice(&bytes).map_err(|_| invalid(token))?;
    Ok(parsed.index)
}

fn invalid(token: &str) -> GatewayError {
    GatewayError::bad_request(format!("Invalid page token: {:?}", token))
}
