//! Prometheus metrics exposed on `/metrics`

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

pub struct Metrics {
    registry: Registry,
    pub uploads_total: IntCounter,
    /// Labelled by `outcome`: `ok` or an error kind
    pub queries_total: IntCounterVec,
    pub query_duration_seconds: Histogram,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new_custom(Some("sqlask".to_string()), None)?;

        let uploads_total = IntCounter::new("uploads_total", "Datasets uploaded")?;
        let queries_total = IntCounterVec::new(
            Opts::new("queries_total", "Natural language queries by outcome"),
            &["outcome"],
        )?;
        let query_duration_seconds = Histogram::with_opts(
            HistogramOpts::new("query_duration_seconds", "End-to-end query latency")
                .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        )?;

        registry.register(Box::new(uploads_total.clone()))?;
        registry.register(Box::new(queries_total.clone()))?;
        registry.register(Box::new(query_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            uploads_total,
            queries_total,
            query_duration_seconds,
        })
    }

    pub fn record_query(&self, outcome: &str, seconds: f64) {
        self.queries_total.with_label_values(&[outcome]).inc();
        self.query_duration_seconds.observe(seconds);
    }

    /// Text exposition format
    pub fn render(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_recorded_series() {
        let metrics = Metrics::new().unwrap();
        metrics.uploads_total.inc();
        metrics.record_query("ok", 0.2);
        metrics.record_query("EXECUTION_FAILED", 0.1);

        let text = metrics.render().unwrap();
        assert!(text.contains("sqlask_uploads_total 1"));
        assert!(text.contains("sqlask_queries_total{outcome=\"ok\"} 1"));
        assert!(text.contains("sqlask_queries_total{outcome=\"EXECUTION_FAILED\"} 1"));
        assert!(text.contains("sqlask_query_duration_seconds_count 2"));
    }
}
