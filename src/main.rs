use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use autorec::{
    config::Config,
    engine::{ReportStore, RunEngine},
    models::Trigger,
    observability::AppObservability,
    receiver::ReceiverClient,
    rules::RuleStore,
    scheduler::{Scheduler, TokioClock},
    utils::circuit_breaker::{BreakerConfig, CircuitBreaker},
};

#[derive(Parser)]
#[command(name = "autorec")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Automated series-recording engine for Enigma2/OpenWebif receivers")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Data directory (overrides config file)
    #[arg(short = 'D', long, value_name = "DIR")]
    data_dir: Option<std::path::PathBuf>,

    /// Log level
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,

    /// Run a single pass, print the reports as JSON and exit
    #[arg(long)]
    run_once: bool,

    /// Restrict a --run-once pass to one rule id
    #[arg(long, value_name = "RULE_ID", requires = "run_once")]
    rule: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = Config::load_from_file(&cli.config)?;
    if let Some(data_dir) = cli.data_dir {
        config.storage.data_dir = data_dir;
    }
    std::fs::create_dir_all(&config.storage.data_dir).with_context(|| {
        format!(
            "failed to create data directory {}",
            config.storage.data_dir.display()
        )
    })?;

    let metrics = Arc::new(AppObservability::new());
    let cancel = CancellationToken::new();

    let gauge = metrics.circuit_state.clone();
    let breaker = Arc::new(
        CircuitBreaker::new(BreakerConfig {
            failure_threshold: config.circuitbreaker.failure_threshold,
            reset_timeout: config.circuitbreaker.reset_timeout_duration(),
            success_threshold: config.circuitbreaker.success_threshold,
        })
        .with_transition_hook(move |state| gauge.record(state.as_gauge(), &[])),
    );

    let receiver = Arc::new(ReceiverClient::new(
        config.receiver.clone(),
        breaker,
        metrics.clone(),
        cancel.child_token(),
    )?);
    let rules = Arc::new(RuleStore::load(&config.storage.data_dir)?);
    let reports = Arc::new(ReportStore::new(&config.storage.data_dir));

    let engine = Arc::new(RunEngine::new(
        rules,
        receiver,
        reports,
        config.engine.clone(),
        Arc::new(TokioClock),
    ));

    if cli.run_once {
        let reports = engine.run_once(Trigger::Manual, cli.rule).await?;
        println!("{}", serde_json::to_string_pretty(&reports)?);
        let failed = reports
            .iter()
            .any(|r| r.status == autorec::models::RunStatus::Failed);
        if failed {
            std::process::exit(1);
        }
        return Ok(());
    }

    info!(
        receiver = %config.receiver.base_url,
        data_dir = %config.storage.data_dir.display(),
        "autorec starting"
    );

    let scheduler = Arc::new(Scheduler::new(
        engine,
        &config.scheduler,
        Arc::new(TokioClock),
    ));

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for shutdown signal");
            return;
        }
        info!("shutdown signal received");
        shutdown.cancel();
    });

    scheduler.run(cancel).await;
    info!("autorec stopped");
    Ok(())
}
