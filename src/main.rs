use arcade_rl::config::{AppConfig, RunMode};
use arcade_rl::infra::{
    CancellationFlag, CompositeObserver, CsvMetricsObserver, DefaultObserver, TrainingObserver,
};
use arcade_rl::rl::{ExperienceStore, MultiAgentCyclicOrchestrator, ParallelTrainingCoordinator};
use dotenv::dotenv;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("arcade_rl=debug,info"));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}

/// Set the flag on the first Ctrl-C; work stops at the next safe boundary
fn spawn_ctrl_c_handler(cancel: CancellationFlag) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received, stopping at the next safe boundary");
            cancel.cancel();
        }
    });
}

fn build_observer(config: &AppConfig) -> Box<dyn TrainingObserver> {
    match &config.metrics_dir {
        Some(dir) => Box::new(CompositeObserver::new(vec![
            Box::new(DefaultObserver),
            Box::new(CsvMetricsObserver::new(dir.clone())),
        ])),
        None => Box::new(DefaultObserver),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    init_logging();

    let config = AppConfig::from_env()?;
    tracing::info!("Mode: {:?}", config.mode);
    tracing::info!("- data dir: {}", config.data_dir.display());
    tracing::info!("- model dir: {}", config.model_dir.display());
    tracing::info!("- seed: {}", config.seed);

    let cancel = CancellationFlag::new();

    match config.mode {
        RunMode::Cyclic => {
            spawn_ctrl_c_handler(cancel.clone());
            let store = ExperienceStore::new(config.store_config()).into_shared();
            let observer = build_observer(&config);
            let episodes_per_cycle = config.episodes_per_cycle;
            let orchestrator_config = config.orchestrator_config();

            let report = tokio::task::spawn_blocking(move || {
                let mut orchestrator =
                    MultiAgentCyclicOrchestrator::with_store(orchestrator_config, observer, store);
                orchestrator.run_cyclic_training(&cancel, episodes_per_cycle)
            })
            .await?;
            tracing::info!(
                "Completed {} cycles ({:?})",
                report.cycles_completed,
                report.stop_reason
            );
        }
        RunMode::Parallel => {
            spawn_ctrl_c_handler(cancel.clone());
            let store = ExperienceStore::new(config.store_config()).into_shared();
            let coordinator = ParallelTrainingCoordinator::new(config.parallel_config(), store);
            let report = coordinator.run(&cancel).await?;
            if let Some(best) = report.best_environment() {
                tracing::info!(
                    "Best environment {}: avg reward {:.2}, final phase {}",
                    best.index,
                    best.average_reward,
                    best.final_phase.name()
                );
            }
        }
        RunMode::Export => {
            let store = ExperienceStore::new(config.store_config());
            let export = store.export_consolidated(&config.export_path)?;
            tracing::info!(
                "Consolidated {} episodes into {}",
                export.total_episodes,
                config.export_path.display()
            );
        }
    }

    Ok(())
}
