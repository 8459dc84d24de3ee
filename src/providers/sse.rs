use crate::error::GatewayError;
use crate::Result;
use futures_util::{Stream, StreamExt};
use hyper::body::Bytes;

/// 上游在未发送结束标记时断开
pub(crate) const TRUNCATED_STREAM: &str = "upstream stream ended before completion";

/// 将上游 SSE 字节流切分为 `data:` 负载
///
/// 按空行切分完整事件后再解码，避免多字节字符跨块被截断。
/// 事件分隔符可以是 `\n\n`、`\r\n\r\n` 或 `\r\r`。
/// `expect_done` 为真时 `[DONE]` 是唯一的正常结束方式：
/// 字节流在此之前结束（包括残留半个事件）会产生一个错误。
pub fn data_events<S>(bytes: S, expect_done: bool) -> impl Stream<Item = Result<String>> + Send
where
    S: Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Send + 'static,
{
    async_stream::stream! {
        futures_util::pin_mut!(bytes);
        let mut buffer: Vec<u8> = Vec::new();
        let mut done = false;

        'outer: while let Some(chunk) = bytes.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    yield Err(GatewayError::HttpError(e));
                    return;
                }
            };
            buffer.extend_from_slice(&chunk);

            while let Some((pos, separator_len)) = find_event_end(&buffer) {
                let event: Vec<u8> = buffer.drain(..pos + separator_len).collect();
                let event = String::from_utf8_lossy(&event[..pos]).into_owned();
                for line in event.split(['\r', '\n']) {
                    if let Some(data) = line.strip_prefix("data:") {
                        let data = data.trim();
                        if data == "[DONE]" {
                            done = true;
                            break 'outer;
                        }
                        if !data.is_empty() {
                            yield Ok(data.to_string());
                        }
                    }
                }
            }
        }

        let leftover = buffer.iter().any(|b| !b.is_ascii_whitespace());
        if !done && (expect_done || leftover) {
            yield Err(GatewayError::upstream(502, TRUNCATED_STREAM));
        }
    }
}

/// 返回第一个事件分隔符的位置与长度
fn find_event_end(buffer: &[u8]) -> Option<(usize, usize)> {
    (0..buffer.len()).find_map(|i| {
        let rest = &buffer[i..];
        if rest.starts_with(b"\r\n\r\n") {
            Some((i, 4))
        } else if rest.starts_with(b"\n\n") || rest.starts_with(b"\r\r") {
            Some((i, 2))
        } else {
            None
        }
    })
}
