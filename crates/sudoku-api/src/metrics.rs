//! Prometheus registry behind `/metrics`.
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use sudoku_core::StageReport;

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    requests: IntCounterVec,
    stage_duration: HistogramVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests = IntCounterVec::new(
            Opts::new("sudoku_requests_total", "Upload requests by outcome"),
            &["outcome"],
        )?;
        let stage_duration = HistogramVec::new(
            HistogramOpts::new("sudoku_stage_duration_seconds", "Wall time of successful stage runs")
                .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
            &["stage"],
        )?;

        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(stage_duration.clone()))?;

        Ok(Self {
            registry,
            requests,
            stage_duration,
        })
    }

    /// `outcome` is `ok` or an error kind label.
    pub fn record_request(&self, outcome: &str) {
        self.requests.with_label_values(&[outcome]).inc();
    }

    pub fn record_stages(&self, reports: &[StageReport]) {
        for report in reports {
            self.stage_duration
                .with_label_values(&[report.id.as_str()])
                .observe(report.latency_ms as f64 / 1000.0);
        }
    }

    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_show_up_in_exposition() {
        let metrics = Metrics::new().unwrap();
        metrics.record_request("ok");
        metrics.record_request("timeout");
        metrics.record_stages(&[StageReport {
            id: "extract".into(),
            in_hash: String::new(),
            out_hash: String::new(),
            bytes_in: 1,
            bytes_out: 1,
            latency_ms: 120,
        }]);

        let text = metrics.encode().unwrap();
        assert!(text.contains(r#"sudoku_requests_total{outcome="ok"} 1"#));
        assert!(text.contains(r#"sudoku_requests_total{outcome="timeout"} 1"#));
        assert!(text.contains(r#"sudoku_stage_duration_seconds_count{stage="extract"} 1"#));
    }
}
