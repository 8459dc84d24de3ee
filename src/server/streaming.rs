//! 把提供商的增量片段转换为 SSE 响应体
//!
//! 每拉到一个片段就立即输出一帧，不做整体缓冲。正常结束时追加 `[DONE]`；
//! 提供商中途出错时输出一个 `event: error` 帧并结束，不再追加 `[DONE]`，
//! 客户端据此区分正常结束与异常中断。
//! 客户端断开时 hyper 丢弃响应体，片段流随之被丢弃，上游连接即被释放。

use super::handlers::{BoxBody, BoxError};
use crate::error::GatewayError;
use crate::metrics;
use crate::providers::FragmentStream;
use futures_util::{Stream, StreamExt};
use http_body_util::{BodyExt, StreamBody};
use hyper::body::{Bytes, Frame};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

/// 格式化 SSE 数据块
pub fn format_sse_chunk<T: Serialize>(chunk: &T) -> String {
    let json = serde_json::to_string(chunk).unwrap_or_default();
    format!("data: {}\n\n", json)
}

/// 格式化 SSE 结束标记
pub fn format_sse_done() -> String {
    "data: [DONE]\n\n".to_string()
}

/// 格式化 SSE 错误帧
pub fn format_sse_error(err: &GatewayError) -> String {
    let body = json!({
        "error": {
            "message": err.to_string(),
            "status": err.status_code().as_u16(),
        }
    });
    format!("event: error\ndata: {}\n\n", body)
}

/// 按片段顺序逐帧输出
pub fn sse_frames(mut fragments: FragmentStream<Value>) -> impl Stream<Item = Bytes> + Send {
    async_stream::stream! {
        let mut count = 0usize;
        loop {
            match fragments.next().await {
                Some(Ok(fragment)) => {
                    count += 1;
                    yield Bytes::from(format_sse_chunk(&fragment));
                }
                Some(Err(e)) => {
                    warn!("流式响应在第 {} 个片段后中断: {}", count, e);
                    metrics::global_metrics().record_stream_error();
                    yield Bytes::from(format_sse_error(&e));
                    break;
                }
                None => {
                    debug!("流式响应完成，共 {} 个片段", count);
                    yield Bytes::from(format_sse_done());
                    break;
                }
            }
        }
    }
}

/// 构建流式响应体
pub fn stream(fragments: FragmentStream<Value>) -> BoxBody {
    let frames = sse_frames(fragments).map(|bytes| Ok::<_, BoxError>(Frame::data(bytes)));
    StreamBody::new(frames).boxed_unsync()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    fn fragments(items: Vec<crate::Result<Value>>) -> FragmentStream<Value> {
        Box::pin(stream::iter(items))
    }

    fn text(frames: Vec<Bytes>) -> Vec<String> {
        frames
            .into_iter()
            .map(|b| String::from_utf8(b.to_vec()).unwrap())
            .collect()
    }

    #[test]
    fn test_format_sse_chunk() {
        let sse = format_sse_chunk(&json!({"content": "Hello"}));
        assert_eq!(sse, "data: {\"content\":\"Hello\"}\n\n");
    }

    #[test]
    fn test_format_sse_done() {
        assert_eq!(format_sse_done(), "data: [DONE]\n\n");
    }

    #[tokio::test]
    async fn test_order_preserved_and_terminated() {
        let frames: Vec<Bytes> = sse_frames(fragments(vec![
            Ok(json!("a")),
            Ok(json!("b")),
            Ok(json!("c")),
        ]))
        .collect()
        .await;

        assert_eq!(
            text(frames),
            vec!["data: \"a\"\n\n", "data: \"b\"\n\n", "data: \"c\"\n\n", "data: [DONE]\n\n"]
        );
    }

    #[tokio::test]
    async fn test_error_is_not_a_clean_end() {
        let frames = text(
            sse_frames(fragments(vec![
                Ok(json!("a")),
                Err(GatewayError::upstream(503, "provider went away")),
                Ok(json!("never sent")),
            ]))
            .collect()
            .await,
        );

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], "data: \"a\"\n\n");
        assert!(frames[1].starts_with("event: error\n"));
        assert!(frames[1].contains("provider went away"));
        assert!(frames.iter().all(|f| !f.contains("[DONE]")));
    }

    /// 记录被拉取次数，并在丢弃时置位的片段源
    struct TrackedSource {
        pulled: Arc<AtomicUsize>,
        released: Arc<AtomicBool>,
    }

    impl Drop for TrackedSource {
        fn drop(&mut self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_drop_stops_pulling_and_releases_source() {
        let pulled = Arc::new(AtomicUsize::new(0));
        let released = Arc::new(AtomicBool::new(false));
        let source = TrackedSource {
            pulled: pulled.clone(),
            released: released.clone(),
        };

        // 无限片段源：只有在被拉取时才产生下一个
        let infinite = stream::unfold(source, |source| async move {
            let n = source.pulled.fetch_add(1, Ordering::SeqCst);
            Some((Ok::<_, GatewayError>(json!(n)), source))
        });

        let mut frames = Box::pin(sse_frames(Box::pin(infinite)));
        let first = frames.next().await.unwrap();
        assert_eq!(first, Bytes::from("data: 0\n\n"));
        assert_eq!(pulled.load(Ordering::SeqCst), 1);
        assert!(!released.load(Ordering::SeqCst));

        drop(frames);
        assert!(released.load(Ordering::SeqCst));
        assert_eq!(pulled.load(Ordering::SeqCst), 1);
    }
}
