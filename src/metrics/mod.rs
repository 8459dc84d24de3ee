use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// 简单的指标收集器
#[derive(Debug, Default)]
pub struct Metrics {
    invocations_total: AtomicU64,
    invocations_failed: AtomicU64,
    streaming_invocations: AtomicU64,
    stream_errors: AtomicU64,
    config_reloads: AtomicU64,
    config_reload_failures: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录成功的同步调用
    pub fn record_success(&self) {
        self.invocations_total.fetch_add(1, Ordering::Relaxed);
    }

    /// 记录失败的调用
    pub fn record_failure(&self) {
        self.invocations_total.fetch_add(1, Ordering::Relaxed);
        self.invocations_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// 记录开始的流式调用
    pub fn record_stream(&self) {
        self.invocations_total.fetch_add(1, Ordering::Relaxed);
        self.streaming_invocations.fetch_add(1, Ordering::Relaxed);
    }

    /// 记录中途出错的流
    pub fn record_stream_error(&self) {
        self.stream_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reload(&self, ok: bool) {
        self.config_reloads.fetch_add(1, Ordering::Relaxed);
        if !ok {
            self.config_reload_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// 导出 Prometheus 格式
    pub fn export_prometheus(&self) -> String {
        let counters = [
            (
                "deploygate_invocations_total",
                "Endpoint invocations",
                &self.invocations_total,
            ),
            (
                "deploygate_invocations_failed",
                "Invocations that returned an error",
                &self.invocations_failed,
            ),
            (
                "deploygate_streaming_invocations",
                "Invocations answered with a stream",
                &self.streaming_invocations,
            ),
            (
                "deploygate_stream_errors",
                "Streams terminated by a provider error",
                &self.stream_errors,
            ),
            (
                "deploygate_config_reloads",
                "Configuration reload attempts",
                &self.config_reloads,
            ),
            (
                "deploygate_config_reload_failures",
                "Configuration reloads rejected",
                &self.config_reload_failures,
            ),
        ];

        counters
            .iter()
            .map(|(name, help, value)| {
                format!(
                    "# HELP {name} {help}\n# TYPE {name} counter\n{name} {}\n",
                    value.load(Ordering::Relaxed)
                )
            })
            .collect()
    }
}

/// 获取全局指标实例
pub fn global_metrics() -> &'static Arc<Metrics> {
    use once_cell::sync::Lazy;
    static METRICS: Lazy<Arc<Metrics>> = Lazy::new(|| Arc::new(Metrics::new()));
    &METRICS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_record() {
        let metrics = Metrics::new();

        metrics.record_success();
        metrics.record_stream();
        metrics.record_failure();
        metrics.record_stream_error();

        assert_eq!(metrics.invocations_total.load(Ordering::Relaxed), 3);
        assert_eq!(metrics.invocations_failed.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.streaming_invocations.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.stream_errors.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_export_prometheus() {
        let metrics = Metrics::new();
        metrics.record_success();
        metrics.record_failure();
        metrics.record_reload(false);

        let output = metrics.export_prometheus();
        assert!(output.contains("deploygate_invocations_total 2\n"));
        assert!(output.contains("deploygate_invocations_failed 1\n"));
        assert!(output.contains("deploygate_config_reload_failures 1\n"));
        assert!(output.contains("# TYPE deploygate_stream_errors counter"));
    }
}
