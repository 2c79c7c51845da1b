use std::{fs::File, path::Path, time::Instant};

use anyhow::Result;
use clap::Parser;
use dyn_bvh::{SimulationConfig, SimulationExecutor};
use log::{error, info, LevelFilter};
use options::Options;

mod options;

/// Initializes the program logging
///
/// # Arguments
/// * `filter` - The log level filter, i.e., the minimum log level to be logged.
fn initialize_logging(filter: LevelFilter) {
    let mut builder = pretty_env_logger::formatted_timed_builder();

    builder.filter_level(filter).init();
}

/// Loads a single scenario file.
///
/// # Arguments
/// * `path` - The path of the scenario file.
/// * `seed` - Optionally, a seed overriding the one of the scenario.
fn load_scenario(path: &Path, seed: Option<u64>) -> Result<SimulationConfig> {
    let file = File::open(path)?;
    let mut config = SimulationConfig::read(file)?;

    if config.name.is_empty() {
        config.name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
    }

    if let Some(seed) = seed {
        config.seed = seed;
        config.tree.seed = seed;
    }

    Ok(config)
}

/// Runs all scenarios matching the glob pattern and returns the number of failed ones.
///
/// # Arguments
/// * `options` - The program options.
fn run_program(options: Options) -> Result<usize> {
    let paths = match glob::glob(&options.config) {
        Ok(paths) => paths,
        Err(err) => {
            error!("Invalid scenario pattern: {:?}", err);
            return Err(err.into());
        }
    };

    let mut num_run = 0;
    let mut num_failed = 0;
    for entry in paths {
        let path = match entry {
            Ok(path) => path,
            Err(err) => {
                error!("Failed to read entry: {:?}", err);
                info!("Skipping entry...");
                continue;
            }
        };

        info!("Loading scenario '{}'...", path.display());
        num_run += 1;

        let config = match load_scenario(&path, options.seed) {
            Ok(config) => config,
            Err(err) => {
                error!("Failed to load scenario: {:?}", err);
                num_failed += 1;
                continue;
            }
        };

        let t = Instant::now();
        match SimulationExecutor::new(config).run() {
            Ok(report) => {
                info!("{}", report);
                info!(
                    "Finished scenario in {} ms",
                    t.elapsed().as_secs_f64() * 1e3f64
                );
            }
            Err(err) => {
                error!("Scenario failed: {:?}", err);
                num_failed += 1;
            }
        }
    }

    if num_run == 0 {
        anyhow::bail!("No scenario matches '{}'", options.config);
    }

    info!("Ran {} scenarios, {} failed", num_run, num_failed);

    Ok(num_failed)
}

fn main() {
    let options = Options::parse();
    initialize_logging(options.log_level.into());
    options.dump_to_log();

    match run_program(options) {
        Ok(0) => {
            info!("Program completed successfully");
        }
        Ok(num_failed) => {
            error!("{} scenarios failed", num_failed);
            std::process::exit(1);
        }
        Err(err) => {
            error!("Program failed: {:?}", err);
            std::process::exit(1);
        }
    }
}
