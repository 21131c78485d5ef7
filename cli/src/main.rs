mod cli;
mod config;
mod env_guard;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing::info;

use cli::{Cli, Command, OutputFormat};
use config::AgentConfig;
use env_guard::{MetricsMode, PriceSource, SourceSelection, validate_env};

use cluster::MetricsSource;
use cluster::http::{HttpClusterClient, HttpMetricsSource};
use cluster::source::SyntheticMetricsSource;
use common::logger::init_tracing;
use drainer::{DrainerConfig, GuardedDrainer};
use inference::manifest::CloudId;
use inference::{InferenceEngine, LinearRuntimeLoader};
use market::PriceProvider;
use market::cloud::{CloudPriceProvider, HttpSpotFeed};
use market::scripted::{Scenario, ScriptedPriceProvider};
use reconciler::{Reconciler, ReconcilerConfig};
use router::{CapacityRouter, RouterConfig, ScalingGroupDriver, SystemClock, WeightedPoolDriver};

fn build_price_provider(
    cfg: &AgentConfig,
    source: &PriceSource,
) -> anyhow::Result<Arc<dyn PriceProvider>> {
    Ok(match source {
        PriceSource::Cloud => Arc::new(CloudPriceProvider::new(
            HttpSpotFeed::new(cfg.price_endpoint.clone()).context("price endpoint client")?,
        )),
        PriceSource::ScriptedFile(path) => Arc::new(ScriptedPriceProvider::new(
            Scenario::from_file(path).context("scripted price scenario file")?,
        )),
        PriceSource::ScriptedJson(raw) => Arc::new(ScriptedPriceProvider::new(
            Scenario::from_json(raw).context("scripted price scenario json")?,
        )),
    })
}

fn build_reconciler(
    cfg: &AgentConfig,
    dry_run: bool,
    selection: &SourceSelection,
) -> anyhow::Result<Arc<Reconciler>> {
    let price = build_price_provider(cfg, &selection.price)?;

    let metrics_source: Arc<dyn MetricsSource> = match selection.metrics {
        MetricsMode::Synthetic => Arc::new(SyntheticMetricsSource::new(cfg.synthetic.clone())),
        MetricsMode::Live => Arc::new(
            HttpMetricsSource::new(cfg.metrics_endpoint.clone()).context("metrics client")?,
        ),
    };

    let cloud: CloudId = cfg
        .cloud
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))
        .context("configured cloud")?;
    let engine = Arc::new(
        InferenceEngine::open(&cfg.manifest_path, cloud, dry_run, &LinearRuntimeLoader)
            .context("open model bundle")?,
    );

    let orchestrator = Arc::new(
        HttpClusterClient::new(cfg.orchestrator_endpoint.clone())
            .context("orchestrator client")?,
    );

    let mut router = CapacityRouter::new(
        RouterConfig {
            allowlist: cfg.pools.managed.clone(),
            cooldown: Duration::from_secs(cfg.pools.cooldown_secs),
            dry_run,
        },
        Arc::new(WeightedPoolDriver::with_weights(
            orchestrator.clone(),
            cfg.pools.spot_weight,
            cfg.pools.on_demand_weight,
        )),
        Arc::new(SystemClock),
    );
    for pool in &cfg.pools.scaling_group_pools {
        router =
            router.with_driver_override(pool, Arc::new(ScalingGroupDriver::new(orchestrator.clone())));
    }

    let drainer = Arc::new(GuardedDrainer::new(
        orchestrator.clone(),
        DrainerConfig::default(),
    ));

    let reconciler_cfg = ReconcilerConfig {
        tick_interval: Duration::from_secs(cfg.tick_interval_secs),
        tick_budget: Duration::from_secs(cfg.tick_budget_secs),
        dry_run,
        selection_mode: cfg.selection_mode,
        runtime_policy_path: cfg.runtime_policy_path.clone(),
        distributions_path: cfg.distributions_path.clone(),
        workload_defaults: cfg.workload,
        workload_overrides: cfg.workload_overrides.clone(),
        drain_grace: Duration::from_secs(cfg.drain.grace_secs),
        drain_force: cfg.drain.force,
        metrics_port: cfg.metrics_port,
    };

    let reconciler = Reconciler::new(
        reconciler_cfg,
        price,
        metrics_source,
        engine,
        Arc::new(router),
        drainer,
        orchestrator,
    )?;
    Ok(Arc::new(reconciler))
}

async fn run_controller(args: &Cli) -> anyhow::Result<()> {
    let selection = validate_env(args.dry_run)?;
    let cfg = AgentConfig::load(args.config.as_deref())?;
    let reconciler = build_reconciler(&cfg, args.dry_run, &selection)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    reconciler.run(shutdown_rx).await
}

/// One forced-dry-run tick, then dump the counter snapshot.
async fn run_metrics_dump(args: &Cli, output: OutputFormat) -> anyhow::Result<()> {
    let selection = validate_env(true)?;
    let cfg = AgentConfig::load(args.config.as_deref())?;
    let reconciler = build_reconciler(&cfg, true, &selection)?;

    reconciler.clone().tick().await?;
    let snapshot = reconciler.counters().snapshot();

    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&snapshot)?),
        OutputFormat::Table => {
            for (name, value) in snapshot.entries() {
                println!("{name:<36} {value}");
            }
            for (pool, gauge) in &snapshot.spot_ratios {
                println!(
                    "{:<36} {:.3} (target {:.3})",
                    format!("spot_ratio[{pool}]"),
                    gauge.current,
                    gauge.target
                );
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    let is_production = std::env::var("APP_ENV").unwrap_or_default() == "production";
    init_tracing(is_production, args.verbose);

    info!(dry_run = args.dry_run, "starting spotvortex");

    match &args.command {
        Command::Run => run_controller(&args).await,
        Command::Metrics { output } => run_metrics_dump(&args, *output).await,
    }
}
