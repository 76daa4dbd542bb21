use tracing_subscriber::EnvFilter;

/// Install the tracing subscriber, honouring `RUST_LOG` when set.
pub fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .compact()
        .init();
}

#[cfg(feature = "metrics-exporter")]
pub fn init_metrics(port: u16) {
    use metrics_exporter_prometheus::PrometheusBuilder;

    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .expect("prometheus exporter install");

    metrics::gauge!("tickfeed_up").set(1.0);
}

#[cfg(not(feature = "metrics-exporter"))]
pub fn init_metrics(_port: u16) { /* no-op */ }
