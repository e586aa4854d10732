//! Prometheus metrics exposed through the `metrics` tool

use std::time::Duration;

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};

/// Which front door a query came through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Pivot,
    NaturalLanguage,
}

impl QueryKind {
    fn as_str(&self) -> &'static str {
        match self {
            QueryKind::Pivot => "pivot",
            QueryKind::NaturalLanguage => "nl2sql",
        }
    }
}

pub struct Metrics {
    registry: Registry,
    queries: IntCounterVec,
    rejections: IntCounterVec,
    duration: HistogramVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let queries = IntCounterVec::new(
            Opts::new("cubeql_queries_total", "Queries handled, by front door and outcome"),
            &["kind", "outcome"],
        )?;
        let rejections = IntCounterVec::new(
            Opts::new("cubeql_guard_rejections_total", "Statements rejected by the safety gate"),
            &["rule"],
        )?;
        let duration = HistogramVec::new(
            HistogramOpts::new("cubeql_query_duration_seconds", "End-to-end query latency")
                .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0, 60.0]),
            &["kind"],
        )?;

        registry.register(Box::new(queries.clone()))?;
        registry.register(Box::new(rejections.clone()))?;
        registry.register(Box::new(duration.clone()))?;

        Ok(Self {
            registry,
            queries,
            rejections,
            duration,
        })
    }

    /// `outcome` is `ok` or an error kind
    pub fn observe_query(&self, kind: QueryKind, outcome: &str, elapsed: Duration) {
        self.queries.with_label_values(&[kind.as_str(), outcome]).inc();
        self.duration
            .with_label_values(&[kind.as_str()])
            .observe(elapsed.as_secs_f64());
    }

    pub fn record_rejection(&self, rule: &str) {
        self.rejections.with_label_values(&[rule]).inc();
    }

    /// Prometheus text exposition format
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
