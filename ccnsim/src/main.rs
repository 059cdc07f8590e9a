use std::{path::Path, process};

use anyhow::Result;
use clap::{Arg, ArgAction, Command};
use log::{error, info};

mod client;
mod config;
mod reporter;
mod scheduler;
mod simulation;
mod statistics;
mod topology;

use config::Config;
use reporter::Reporter;
use simulation::Simulation;

fn main() {
    let matches = Command::new("ccnsim")
        .version("0.1.0")
        .about("Chunk-level Content Centric Networking simulator")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("ccnsim.toml"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .help("Write the JSON report to FILE instead of stdout"),
        )
        .arg(
            Arg::new("seed")
                .long("seed")
                .value_name("N")
                .help("Override the configured random seed")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("dump-config")
                .long("dump-config")
                .help("Print the effective configuration and exit")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let config_path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("ccnsim.toml");
    let output = matches.get_one::<String>("output").map(Path::new);
    let seed = matches.get_one::<u64>("seed").copied();
    let dump_config = matches.get_flag("dump-config");

    if let Err(e) = run(config_path, output, seed, dump_config) {
        error!("{:#}", e);
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn run(
    config_path: &str,
    output: Option<&Path>,
    seed: Option<u64>,
    dump_config: bool,
) -> Result<()> {
    let mut config = Config::load(config_path)?;
    if let Some(seed) = seed {
        config.simulation.seed = seed;
    }

    init_logging(&config);

    if dump_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    info!("Starting ccnsim");
    info!("Config file: {}", config_path);
    info!("Seed: {}", config.simulation.seed);

    let mut simulation = Simulation::new(config)?;
    let report = simulation.run()?;

    match output {
        Some(path) => {
            Reporter::save(&report, path)?;
            Reporter::print_summary(&report);
        }
        None => println!("{}", Reporter::to_json(&report)?),
    }
    Ok(())
}

/// `RUST_LOG` wins over the configured level
fn init_logging(config: &Config) {
    let level = config.log_level().unwrap_or(log::LevelFilter::Info);
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}
