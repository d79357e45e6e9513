//! Prometheus metrics for routed traffic

use anyhow::Result;
use prometheus::{CounterVec, HistogramVec, Opts, Registry, TextEncoder};

/// Counters and latency for the gateway, exported in Prometheus text format
/// at `GET /metrics`.
pub struct GatewayMetrics {
    pub requests_total: CounterVec,
    pub responses_total: CounterVec,
    pub request_duration_seconds: HistogramVec,
    registry: Registry,
}

impl GatewayMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let requests_total = CounterVec::new(
            Opts::new("gateway_requests_total", "Requests routed by the gateway"),
            &["method", "service"],
        )?;

        let responses_total = CounterVec::new(
            Opts::new(
                "gateway_responses_total",
                "Gateway responses by status code",
            ),
            &["status"],
        )?;

        let request_duration_seconds = HistogramVec::new(
            Opts::new(
                "gateway_request_duration_seconds",
                "Gateway request latency in seconds",
            )
            .into(),
            &["service"],
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(responses_total.clone()))?;
        registry.register(Box::new(request_duration_seconds.clone()))?;

        Ok(Self {
            requests_total,
            responses_total,
            request_duration_seconds,
            registry,
        })
    }

    pub fn record_request(&self, method: &str, service: &str) {
        self.requests_total
            .with_label_values(&[method, service])
            .inc();
    }

    pub fn record_response(&self, status: u16, service: &str, elapsed_seconds: f64) {
        self.responses_total
            .with_label_values(&[&status.to_string()])
            .inc();
        self.request_duration_seconds
            .with_label_values(&[service])
            .observe(elapsed_seconds);
    }

    /// All metrics in Prometheus text format.
    pub fn gather(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        Ok(encoder.encode_to_string(&families)?)
    }
}
