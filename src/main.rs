//! hordesim - headless horde defense simulator
//!
//! Loads a JSON scenario, runs it to completion and prints the result.

use bevy::log::Level;

use hordesim::cli;
use hordesim::headless::{run_headless_with_log, ScenarioConfig};

fn main() {
    let args = cli::parse_args();

    let mut config = match ScenarioConfig::load_from_file(&args.scenario) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load scenario: {}", e);
            std::process::exit(1);
        }
    };
    args.apply_overrides(&mut config);

    match run_headless_with_log(config, Level::INFO) {
        Ok(result) => {
            println!("Outcome: {:?} after {:.1}s", result.outcome, result.elapsed_secs);
            println!(
                "  Hostiles killed: {}, friendlies lost: {}, rewards: {}",
                result.hostiles_killed, result.friendlies_lost, result.rewards
            );
            println!("  Survivors: {}", result.survivors.len());
            if let Some(seed) = result.random_seed {
                println!("  Seed: {}", seed);
            }
        }
        Err(e) => {
            eprintln!("Headless run failed: {}", e);
            std::process::exit(1);
        }
    }
}
