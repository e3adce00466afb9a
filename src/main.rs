use anyhow::Context;
use portfolio_dfo::experiment::{run_experiment, ExperimentConfig};
use std::{fs::File, io::Write, time::Instant};
use tracing::info;
use tracing_subscriber::EnvFilter;

const RESULT_FILE: &str = "dfo_result.json";

fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ExperimentConfig::load(std::env::args().nth(1))?;
    info!(objective = ?config.objective, "Starting experiment");

    let start = Instant::now();
    let outcome = run_experiment(config)?;
    info!(elapsed = ?start.elapsed(), "Experiment finished");

    println!(
        "Best fitness {:.6} after {} generations ({} evaluations)",
        outcome.result.best_fitness, outcome.result.generations, outcome.result.evaluations
    );
    print!("{}", outcome.portfolio);
    if let Some(final_value) = outcome.value_over_time.last() {
        println!("Final value: {:.2}", final_value);
    }

    let json = serde_json::to_string_pretty(&outcome)?;
    let mut file =
        File::create(RESULT_FILE).with_context(|| format!("Failed to create {}", RESULT_FILE))?;
    file.write_all(json.as_bytes())?;
    info!(path = RESULT_FILE, "Result written");

    Ok(())
}
