use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing::{info, warn};

use tickfeed_rs::config::FeedConfig;
use tickfeed_rs::instrument::{Instrument, InstrumentId};
use tickfeed_rs::market_data::adapters;
use tickfeed_rs::market_data::gateway::ExchangeGateway;
use tickfeed_rs::persist::postgres::PostgresSink;
use tickfeed_rs::telemetry;
use tickfeed_rs::transport::HttpTransport;

#[derive(Debug, Parser)]
#[command(name = "tickfeed", about = "Normalized REST market-data feed recorder")]
struct Cli {
    /// Path to the feed configuration file.
    #[arg(short, long, default_value = "tickfeed")]
    config: String,

    /// Prometheus exporter port (only with the metrics-exporter feature).
    #[arg(long, default_value_t = 9000)]
    metrics_port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok(); // load .env
    let cli = Cli::parse();

    telemetry::init_tracing("tickfeed_rs=info,info");
    telemetry::init_metrics(cli.metrics_port);

    let cfg = FeedConfig::load(Some(&cli.config)).context("loading configuration")?;

    let sink = Arc::new(
        PostgresSink::connect(&cfg.database_url)
            .await
            .context("connecting to database")?,
    );
    let transport = Arc::new(HttpTransport::new(cfg.request_timeout())?);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut handles = Vec::new();
    for instmt_cfg in &cfg.instruments {
        let Some(adapter) = adapters::adapter_for(&instmt_cfg.exchange) else {
            warn!(
                exchange = %instmt_cfg.exchange,
                supported = ?adapters::supported_exchanges(),
                "no adapter for exchange, skipping instrument"
            );
            continue;
        };

        let instrument = Arc::new(Instrument::new(InstrumentId {
            exchange: instmt_cfg.exchange.clone(),
            name: instmt_cfg.name.clone(),
            code: instmt_cfg.code.clone(),
        }));
        let gateway = ExchangeGateway::new(
            adapter,
            transport.clone(),
            sink.clone(),
            cfg.poll(),
        );
        handles.extend(gateway.start(instrument, shutdown_rx.clone()));
    }
    drop(shutdown_rx);

    if handles.is_empty() {
        anyhow::bail!("no instruments started; check the instruments section of the config");
    }
    info!(workers = handles.len(), "feed running");

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    let _ = shutdown_tx.send(true);
    futures::future::join_all(handles).await;

    Ok(())
}
