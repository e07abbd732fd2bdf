//! Process entry point: wires configuration, storage, and the cooperative
//! scheduler together, and exposes a small CLI for one-off admin actions
//! alongside the long-running `serve` mode.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use signal_engine::config::EngineConfig;
use signal_engine::dispatch::{Dispatcher, LoggingDispatcher, NullDispatcher};
use signal_engine::dataset::BuildMode;
use signal_engine::features::{ActorFeatureBuilder, CorridorDirection, CorridorFeatureBuilder, MarketFeatureBuilder};
use signal_engine::learning::{LearningRun, NullReturnSource};
use signal_engine::outcome::Horizon;
use signal_engine::pipeline::EngineRun;
use signal_engine::ranking::Bucket;
use signal_engine::scheduler::{ExclusivityKey, Scheduler};
use signal_engine::snapshot::{ActorRegistry, ActorType, Window};
use signal_engine::store::{RankingStore, SignalStore, SqliteStore};
use signal_engine::transfer::{InMemoryTransferSource, Transfer, TransferSource};

#[derive(Parser)]
#[command(name = "signal-engine", about = "On-chain transfer/social signal pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler in the foreground until interrupted.
    Serve,
    /// Run one engine pass for a single window and exit.
    Trigger {
        #[arg(value_enum)]
        window: CliWindow,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum CliWindow {
    H1,
    H24,
    D7,
    D30,
}

impl From<CliWindow> for Window {
    fn from(w: CliWindow) -> Self {
        match w {
            CliWindow::H1 => Window::H1,
            CliWindow::H24 => Window::H24,
            CliWindow::D7 => Window::D7,
            CliWindow::D30 => Window::D30,
        }
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "signal_engine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// The chain-ingest adapter is an external collaborator (§2): a real
/// deployment wires a live `TransferSource` here. Absent one, the engine
/// still runs against an empty in-memory source so the scheduler, store, and
/// admin surface can be exercised end to end.
fn default_transfer_source() -> Arc<dyn TransferSource> {
    Arc::new(InMemoryTransferSource::new())
}

fn default_dispatcher() -> Arc<dyn Dispatcher> {
    match env::var("DISPATCH_MODE").as_deref() {
        Ok("log") => Arc::new(LoggingDispatcher),
        _ => Arc::new(NullDispatcher),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = EngineConfig::from_env();

    info!(db = %config.database_path, "signal engine starting");

    let store = Arc::new(SqliteStore::new(&config.database_path).context("opening signal store")?);
    let source = default_transfer_source();
    let dispatcher = default_dispatcher();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Trigger { window } => {
            let window: Window = window.into();
            let run = EngineRun::new(store.as_ref(), dispatcher.as_ref(), &config);
            let registry = ActorRegistry::new();
            let (record, outcome) = run
                .run(source.as_ref(), "eth", window, &registry, Utc::now())
                .await?;
            store.write_run_record(&record)?;
            info!(
                window = %window,
                created = outcome.created,
                updated = outcome.updated,
                archived = outcome.archived,
                "trigger run complete"
            );
        }
        Command::Serve => serve(config, store, source, dispatcher).await?,
    }

    Ok(())
}

async fn serve(
    config: EngineConfig,
    store: Arc<SqliteStore>,
    source: Arc<dyn TransferSource>,
    dispatcher: Arc<dyn Dispatcher>,
) -> Result<()> {
    let config = Arc::new(config);
    let mut scheduler = Scheduler::new();

    for window in [Window::H1, Window::H24, Window::D7, Window::D30] {
        let store = store.clone();
        let source = source.clone();
        let dispatcher = dispatcher.clone();
        let config = config.clone();
        let period = period_for(window);
        scheduler.register(
            format!("engine_run:{}", window.as_str()),
            ExclusivityKey::window("engine_run", window),
            period,
            config.call_timeout,
            Arc::new(move || {
                let store = store.clone();
                let source = source.clone();
                let dispatcher = dispatcher.clone();
                let config = config.clone();
                Box::pin(async move {
                    let run = EngineRun::new(store.as_ref(), dispatcher.as_ref(), config.as_ref());
                    let registry = ActorRegistry::new();
                    let (record, _outcome) = run
                        .run(source.as_ref(), "eth", window, &registry, Utc::now())
                        .await?;
                    store.write_run_record(&record)?;
                    Ok(())
                })
            }),
        );
    }

    // FeatureBuilder.actor: 15 min bucket, per-network mutex (§5). Feature
    // builders are pure functions with no dedicated store in §6, so this
    // pass logs a refresh summary the way the teacher's other background
    // loops report progress without a persisted sink.
    {
        let source = source.clone();
        scheduler.register(
            "feature_builder:actor",
            ExclusivityKey::network("feature_builder_actor", "eth"),
            Duration::from_secs(15 * 60),
            config.call_timeout,
            Arc::new(move || {
                let source = source.clone();
                Box::pin(async move {
                    let now = Utc::now();
                    let transfers = source
                        .list("eth", now - chrono::Duration::minutes(15), now)
                        .await?;
                    let features =
                        ActorFeatureBuilder::build("eth", now, &transfers, |_| ActorType::Trader);
                    info!(network = "eth", actors = features.len(), "actor features refreshed");
                    Ok(())
                })
            }),
        );
    }

    // FeatureBuilder.market: 5 min bucket, per-network mutex.
    {
        let source = source.clone();
        scheduler.register(
            "feature_builder:market",
            ExclusivityKey::network("feature_builder_market", "eth"),
            Duration::from_secs(5 * 60),
            config.call_timeout,
            Arc::new(move || {
                let source = source.clone();
                Box::pin(async move {
                    let now = Utc::now();
                    let t5m = source.list("eth", now - chrono::Duration::minutes(5), now).await?;
                    let t1h = source.list("eth", now - chrono::Duration::hours(1), now).await?;
                    let t1d = source.list("eth", now - chrono::Duration::days(1), now).await?;
                    let mut actors: std::collections::HashSet<String> = std::collections::HashSet::new();
                    actors.extend(t1d.iter().map(|t| t.to.actor_id.clone()));
                    actors.extend(t1d.iter().map(|t| t.from.actor_id.clone()));

                    let flows_for = |actor_id: &str, ts: &[Transfer]| {
                        ts.iter().fold((0.0, 0.0), |(inflow, outflow), t| {
                            if t.to.actor_id == actor_id {
                                (inflow + t.amount_usd, outflow)
                            } else if t.from.actor_id == actor_id {
                                (inflow, outflow + t.amount_usd)
                            } else {
                                (inflow, outflow)
                            }
                        })
                    };

                    let mut spikes = 0usize;
                    for actor_id in &actors {
                        let features = MarketFeatureBuilder::build(
                            actor_id,
                            flows_for(actor_id, &t5m),
                            flows_for(actor_id, &t1h),
                            flows_for(actor_id, &t1d),
                            None,
                            now,
                            3.0,
                        );
                        if features.spike.is_some() {
                            spikes += 1;
                        }
                    }
                    info!(network = "eth", actors = actors.len(), spikes, "market features refreshed");
                    Ok(())
                })
            }),
        );
    }

    // FeatureBuilder.corridor: 1 h bucket, per-network mutex. Daily buckets
    // over a 7-day lookback; without a labeled actor registry wired here,
    // every address defaults to Trader->Trader/FromTo, same default the
    // unlabeled engine runs use.
    {
        let source = source.clone();
        scheduler.register(
            "feature_builder:corridor",
            ExclusivityKey::network("feature_builder_corridor", "eth"),
            Duration::from_secs(60 * 60),
            config.call_timeout,
            Arc::new(move || {
                let source = source.clone();
                Box::pin(async move {
                    let now = Utc::now();
                    let lookback_days = 7u32;
                    let mut daily_buckets = Vec::with_capacity(lookback_days as usize);
                    let mut active_days = 0u32;
                    for day in 0..lookback_days {
                        let day_end = now - chrono::Duration::days(day as i64);
                        let day_start = day_end - chrono::Duration::days(1);
                        let transfers = source.list("eth", day_start, day_end).await?;
                        if !transfers.is_empty() {
                            active_days += 1;
                        }
                        daily_buckets.push((lookback_days - day, transfers));
                    }
                    daily_buckets.reverse();

                    let features = CorridorFeatureBuilder::build(
                        ActorType::Trader,
                        ActorType::Trader,
                        CorridorDirection::FromTo,
                        &daily_buckets,
                        active_days,
                        lookback_days,
                        &std::collections::HashSet::new(),
                    );
                    info!(
                        network = "eth",
                        quality_score = features.quality_score,
                        persistence_days = features.persistence_days,
                        "corridor features refreshed"
                    );
                    Ok(())
                })
            }),
        );
    }

    // RankingEngine: global mutex, 5-15 min per §5's job table.
    {
        let store = store.clone();
        let config = config.clone();
        scheduler.register(
            "ranking_engine",
            ExclusivityKey::global("ranking_engine"),
            Duration::from_secs(10 * 60),
            config.call_timeout,
            Arc::new(move || {
                let store = store.clone();
                let config = config.clone();
                Box::pin(async move {
                    let mut active = std::collections::HashMap::new();
                    for window in [Window::H1, Window::H24, Window::D7, Window::D30] {
                        active.extend(store.find_active_by_window(window).await?);
                    }
                    let return_source = NullReturnSource;
                    let run = LearningRun::new(
                        store.as_ref(),
                        &return_source,
                        config.ranking_weights,
                        config.include_critical_drift,
                    );
                    run.rank("eth", &active, |_| None).await?;
                    Ok(())
                })
            }),
        );
    }

    // OutcomeTracker + DatasetBuilder: the spec's job table keeps these as
    // separate rows (per-horizon vs. global mutex), but building a dataset
    // sample needs the outcome resolved in the same pass, so this crate
    // folds them into one job per horizon under the stricter per-horizon
    // lock (see DESIGN.md).
    for horizon in [Horizon::OneDay, Horizon::SevenDay, Horizon::ThirtyDay] {
        let store = store.clone();
        let config = config.clone();
        scheduler.register(
            format!("outcome_dataset:{horizon:?}"),
            ExclusivityKey::horizon("outcome_dataset", horizon),
            Duration::from_secs(60 * 60),
            config.call_timeout,
            Arc::new(move || {
                let store = store.clone();
                let config = config.clone();
                Box::pin(async move {
                    let return_source = NullReturnSource;
                    let run = LearningRun::new(
                        store.as_ref(),
                        &return_source,
                        config.ranking_weights,
                        config.include_critical_drift,
                    );
                    // Snapshot granularity is per-window, not per-ranking; the
                    // most recent 24h snapshot stands in as the sample's
                    // snapshot reference for every entity in this pass.
                    let snapshot_id = store
                        .get_latest(Window::H24)
                        .await?
                        .map(|s| s.snapshot_id.0)
                        .unwrap_or_default();
                    for bucket in [Bucket::Buy, Bucket::Watch, Bucket::Sell] {
                        for ranking in store.read_by_bucket(bucket, 100).await? {
                            run.resolve_and_build_sample(
                                &snapshot_id,
                                &ranking.entity_addr,
                                &ranking.chain_id,
                                bucket,
                                horizon,
                                Utc::now(),
                                Vec::new(),
                                std::collections::HashMap::new(),
                                signal_engine::dataset::DriftLevel::Normal,
                                BuildMode::Incremental,
                                &|_| false,
                            )
                            .await?;
                        }
                    }
                    Ok(())
                })
            }),
        );
    }

    let cancel = scheduler.cancel_handle();
    let handles = scheduler.spawn_all();

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("shutdown signal received, draining in-flight runs");
    cancel.store(true, std::sync::atomic::Ordering::Relaxed);

    for handle in handles {
        if let Err(e) = handle.await {
            warn!(error = %e, "scheduler task join failed");
        }
    }

    Ok(())
}

/// Per-window run cadence. §5 bounds `SnapshotBuilder` to 15 minutes at most;
/// longer windows run less often since their underlying data moves slower.
fn period_for(window: Window) -> Duration {
    match window {
        Window::H1 => Duration::from_secs(5 * 60),
        Window::H24 => Duration::from_secs(15 * 60),
        Window::D7 => Duration::from_secs(60 * 60),
        Window::D30 => Duration::from_secs(6 * 60 * 60),
    }
}
