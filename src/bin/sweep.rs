use anyhow::Context;
use futures::stream::{self, StreamExt};
use portfolio_dfo::experiment::{run_experiment, ExperimentConfig};
use std::{fs::File, io::Write, time::Instant};
use tokio::task;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

// Same scenario, different disturbance probabilities.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let base = ExperimentConfig::load(std::env::args().nth(1))?;
    let probabilities = if base.sweep_probabilities.is_empty() {
        ExperimentConfig::default().sweep_probabilities
    } else {
        base.sweep_probabilities.clone()
    };
    let max_parallel_runs = base.max_parallel_runs;

    info!(runs = probabilities.len(), max_parallel_runs, "Starting sweep");
    let start = Instant::now();

    stream::iter(probabilities.into_iter().enumerate())
        .map(|(run, probability)| {
            let mut config = base.clone();
            config.dfo.disturbance_probability = probability;

            async move {
                let outcome = task::spawn_blocking(move || run_experiment(config))
                    .await
                    .context("Sweep run panicked")??;

                // offload blocking file I/O
                let filename = format!("dfo_result_run{}.json", run);
                let json = serde_json::to_string_pretty(&outcome)?;
                task::spawn_blocking(move || {
                    let mut f = File::create(&filename)?;
                    f.write_all(json.as_bytes())?;
                    Ok::<_, std::io::Error>(())
                })
                .await??;

                anyhow::Ok((probability, outcome))
            }
        })
        .buffer_unordered(max_parallel_runs)
        .for_each(|res| async {
            match res {
                Ok((probability, outcome)) => info!(
                    disturbance_probability = probability,
                    best_fitness = outcome.result.best_fitness,
                    assets_held = outcome.portfolio.number_of_assets(),
                    "Run finished"
                ),
                Err(e) => error!("Sweep run failed: {e:#}"),
            }
        })
        .await;

    info!(elapsed = ?start.elapsed(), "Sweep finished");
    Ok(())
}
