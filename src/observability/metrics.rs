use prometheus::{
    Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub loads_created_total: IntCounter,
    pub status_transitions_total: IntCounterVec,
    pub location_samples_total: IntCounterVec,
    pub ws_connections: IntGauge,
    pub location_ingest_latency_seconds: HistogramVec,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let loads_created_total =
            IntCounter::new("loads_created_total", "Total loads created")
                .expect("valid loads_created_total metric");

        let status_transitions_total = IntCounterVec::new(
            Opts::new("status_transitions_total", "Load status transitions by target status"),
            &["to"],
        )
        .expect("valid status_transitions_total metric");

        let location_samples_total = IntCounterVec::new(
            Opts::new(
                "location_samples_total",
                "Driver location samples by ingestion source and outcome",
            ),
            &["source", "outcome"],
        )
        .expect("valid location_samples_total metric");

        let ws_connections = IntGauge::new("ws_connections", "Open websocket connections")
            .expect("valid ws_connections metric");

        let location_ingest_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "location_ingest_latency_seconds",
                "Latency of location ingestion in seconds",
            ),
            &["outcome"],
        )
        .expect("valid location_ingest_latency_seconds metric");

        registry
            .register(Box::new(loads_created_total.clone()))
            .expect("register loads_created_total");
        registry
            .register(Box::new(status_transitions_total.clone()))
            .expect("register status_transitions_total");
        registry
            .register(Box::new(location_samples_total.clone()))
            .expect("register location_samples_total");
        registry
            .register(Box::new(ws_connections.clone()))
            .expect("register ws_connections");
        registry
            .register(Box::new(location_ingest_latency_seconds.clone()))
            .expect("register location_ingest_latency_seconds");

        Self {
            registry,
            loads_created_total,
            status_transitions_total,
            location_samples_total,
            ws_connections,
            location_ingest_latency_seconds,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}
