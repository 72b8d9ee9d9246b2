//! mysqlscrape Binary Entry Point
//!
//! Runs the scrape engine on a fixed interval against one target and prints
//! every sample to stdout. Core functionality is provided by the
//! `mysqlscrape` library crate.

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use clap::Parser;
use mysqlscrape::{
    CancellationToken, Exporter, MetricSink, MySqlConnector, MySqlCustomQueries, Sample,
    ScraperRegistry,
    config::{ExporterConfig, parse_duration},
    sink::fq_name,
};
use tokio::time::MissedTickBehavior;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Configuration read when `--config` is not given and the file exists.
const DEFAULT_CONFIG_PATH: &str = "configs/config.yaml";

/// mysqlscrape - MySQL metrics scraper
#[derive(Parser, Debug)]
#[command(name = "mysqlscrape", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file [default: configs/config.yaml when present]
    #[arg(short, long, env = "MYSQLSCRAPE_CONFIG")]
    config: Option<String>,

    /// Target DSN (overrides config file)
    #[arg(long, env = "MYSQLSCRAPE_DSN")]
    dsn: Option<String>,

    /// Scrape interval, e.g. `30s` (overrides config file)
    #[arg(long, value_parser = parse_duration)]
    interval: Option<Duration>,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,

    /// Print samples as JSON lines
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr, samples to stdout
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,mysqlscrape=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = match cli.config.as_deref() {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path);
            ExporterConfig::read(path)?
        }
        None if Path::new(DEFAULT_CONFIG_PATH).is_file() => {
            tracing::info!("Loading configuration from: {}", DEFAULT_CONFIG_PATH);
            ExporterConfig::read(DEFAULT_CONFIG_PATH)?
        }
        None => {
            tracing::info!("No configuration file, using defaults");
            ExporterConfig::new("")
        }
    };

    // CLI > ENV > config file
    if let Some(dsn) = cli.dsn.as_deref() {
        config.set_dsn(dsn);
    }
    if let Some(interval) = cli.interval {
        config.scrape_interval = interval;
    }
    config.validate()?;

    let exporter = build_exporter(&config)?;
    tracing::info!(
        addr = %exporter.target(),
        interval = ?config.scrape_interval,
        timeout = ?config.scrape_timeout,
        "Scraping"
    );

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    let mut ticker = tokio::time::interval(config.scrape_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let samples = run_cycle(&exporter, &config, &shutdown).await;
        print_samples(&samples, cli.json)?;

        if cli.once {
            break;
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

fn build_exporter(
    config: &ExporterConfig,
) -> Result<Exporter<MySqlConnector>, Box<dyn std::error::Error>> {
    let scrapers = ScraperRegistry::builtin(&config.scrapers, &config.namespace)?;
    let connector = MySqlConnector::new().with_acquire_timeout(config.scrape_timeout);

    Ok(Exporter::builder(connector, config.dsn.as_str())
        .namespace(config.namespace.as_str())
        .lock_wait_timeout(config.lock_wait_timeout)
        .log_slow_filter(config.log_slow_filter)
        .scrapers(scrapers)
        .custom_queries(
            MySqlCustomQueries::new(config.namespace.as_str()),
            config.custom_queries.clone(),
        )
        .build())
}

/// Run one cycle bounded by `scrape_timeout` and append the `up` gauge.
async fn run_cycle(
    exporter: &Exporter<MySqlConnector>,
    config: &ExporterConfig,
    shutdown: &CancellationToken,
) -> Vec<Sample> {
    let token = shutdown.child_token();
    let (sink, receiver) = MetricSink::channel();

    let collect = exporter.collect_with(&token, sink);
    tokio::pin!(collect);

    let result = tokio::select! {
        result = &mut collect => result,
        _ = tokio::time::sleep(config.scrape_timeout) => {
            tracing::warn!(timeout = ?config.scrape_timeout, "Scrape cycle timed out, cancelling");
            token.cancel();
            collect.await
        }
    };

    let up = match &result {
        Ok(()) => 1.0,
        Err(e) => {
            tracing::warn!(error = %e, "Target down");
            0.0
        }
    };

    let mut samples = receiver.collect_all().await;
    samples.push(Sample::gauge(fq_name(&config.namespace, "", "up"), up));
    samples
}

fn print_samples(samples: &[Sample], json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let mut out = std::io::stdout().lock();
    for sample in samples {
        if json {
            writeln!(out, "{}", serde_json::to_string(sample)?)?;
        } else {
            writeln!(out, "{sample}")?;
        }
    }
    out.flush()?;
    Ok(())
}

/// Cancel `shutdown` on Ctrl+C or SIGTERM.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
    }

    shutdown.cancel();
}
