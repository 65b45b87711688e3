//! Command-line interface for hordesim

use clap::Parser;
use std::path::PathBuf;

/// Tick-driven horde defense simulator
#[derive(Parser, Debug)]
#[command(name = "hordesim")]
#[command(about = "Tick-driven horde defense simulator")]
#[command(version)]
pub struct Args {
    /// JSON scenario file to run
    #[arg(long, value_name = "SCENARIO_FILE")]
    pub scenario: PathBuf,

    /// Output path for the run log
    #[arg(long, value_name = "OUTPUT_PATH")]
    pub output: Option<PathBuf>,

    /// Maximum run duration in seconds (overrides the scenario)
    #[arg(long)]
    pub max_duration: Option<f32>,

    /// Random seed (overrides the scenario)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Unit catalog RON file (defaults to the built-in catalog)
    #[arg(long, value_name = "CATALOG_FILE")]
    pub catalog: Option<PathBuf>,
}

impl Args {
    /// Fold command-line overrides into a loaded scenario.
    pub fn apply_overrides(&self, config: &mut crate::headless::ScenarioConfig) {
        if let Some(output) = &self.output {
            config.output_path = Some(output.to_string_lossy().to_string());
        }
        if let Some(max_duration) = self.max_duration {
            config.max_duration_secs = max_duration;
        }
        if let Some(seed) = self.seed {
            config.random_seed = Some(seed);
        }
        if let Some(catalog) = &self.catalog {
            config.catalog_path = Some(catalog.to_string_lossy().to_string());
        }
    }
}

pub fn parse_args() -> Args {
    Args::parse()
}
