//! Raid simulation batch CLI.
//!
//! Run Monte Carlo batches for one or more scenarios and compare them.
//!
//! Usage:
//!   cargo run --bin simulate -- [OPTIONS]
//!
//! Examples:
//!   cargo run --bin simulate                         # Default: 1000 iterations
//!   cargo run --bin simulate -- -n 5000 -t 8        # 5000 iterations on 8 threads
//!   cargo run --bin simulate -- -f raids.json       # Compare scenarios from a file

use raidsim::logging;
use raidsim::simulator::{default_scenarios, load_scenarios, run_batch, BatchConfig, BatchReport};
use raidsim::SyntheticKernel;
use std::env;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::error;

struct CliOptions {
    threads: Option<String>,
    iterations: Option<String>,
    seed: u64,
    scenario_file: Option<PathBuf>,
    track_timeline: bool,
    json: bool,
    verbose: bool,
}

fn main() {
    let args: Vec<String> = env::args().collect();
    let options = parse_args(&args);
    logging::init(options.verbose);

    let mut config =
        match BatchConfig::from_raw(options.threads.as_deref(), options.iterations.as_deref()) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("error: {}", e);
                std::process::exit(2);
            }
        };
    config.track_timeline = options.track_timeline;

    let scenarios = match &options.scenario_file {
        Some(path) => match load_scenarios(path) {
            Ok(scenarios) => scenarios,
            Err(e) => {
                error!(path = %path.display(), error = %e, "could not load scenarios");
                std::process::exit(2);
            }
        },
        None => default_scenarios(options.seed),
    };

    println!("╔═══════════════════════════════════════════════════════════════╗");
    println!("║                  RAID SIMULATION BATCH                        ║");
    println!("╚═══════════════════════════════════════════════════════════════╝");
    println!();
    println!("Configuration:");
    println!("  Iterations:     {}", config.iterations);
    println!("  Threads:        {}", config.thread_budget);
    println!("  Scenarios:      {}", scenarios.len());
    println!("  Timeline:       {}", config.track_timeline);
    if options.scenario_file.is_none() {
        println!("  Seed:           {}", options.seed);
    }
    println!();

    let target = config.iterations;
    let result = run_batch(&config, scenarios, Arc::new(SyntheticKernel), move |progress| {
        eprint!(
            "\r  {:>7}/{} iterations   {:>9.1} dps",
            progress.iterations, target, progress.dps
        );
        let _ = std::io::stderr().flush();
    });
    eprintln!();

    let result = match result {
        Ok(result) => result,
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(1);
        }
    };

    let report = BatchReport::new(&result);
    println!("{}", report.to_text());

    if options.json {
        let filename = format!(
            "raid_report_{}.json",
            chrono::Utc::now().format("%Y%m%d_%H%M%S")
        );
        match std::fs::write(&filename, report.to_json()) {
            Ok(()) => println!("JSON report saved to: {}", filename),
            Err(e) => eprintln!("error: failed to write {}: {}", filename, e),
        }
    }
}

fn parse_args(args: &[String]) -> CliOptions {
    let mut options = CliOptions {
        threads: Some(
            std::thread::available_parallelism()
                .map_or(4, |n| n.get())
                .to_string(),
        ),
        iterations: Some("1000".to_string()),
        seed: 0,
        scenario_file: None,
        track_timeline: true,
        json: false,
        verbose: false,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-n" | "--iterations" => {
                options.iterations = args.get(i + 1).cloned();
                i += 1;
            }
            "-t" | "--threads" => {
                options.threads = args.get(i + 1).cloned();
                i += 1;
            }
            "-s" | "--seed" => {
                if i + 1 < args.len() {
                    options.seed = args[i + 1].parse().unwrap_or(0);
                    i += 1;
                }
            }
            "-f" | "--scenarios" => {
                options.scenario_file = args.get(i + 1).map(PathBuf::from);
                i += 1;
            }
            "--no-timeline" => {
                options.track_timeline = false;
            }
            "--json" => {
                options.json = true;
            }
            "-v" | "--verbose" => {
                options.verbose = true;
            }
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "--quick" => {
                options.iterations = Some(BatchConfig::quick().iterations.to_string());
            }
            _ => {}
        }
        i += 1;
    }

    options
}

fn print_help() {
    println!("Raid Simulation Batch");
    println!();
    println!("USAGE:");
    println!("    cargo run --bin simulate -- [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    -n, --iterations <N>  Iterations per scenario (default: 1000)");
    println!("    -t, --threads <T>     Executor thread budget (default: CPU count)");
    println!("    -s, --seed <S>        RNG seed for the built-in scenario");
    println!("    -f, --scenarios <F>   JSON file with an array of scenarios");
    println!("    --no-timeline         Skip the dps-over-time series");
    println!("    --json                Save JSON report");
    println!("    --quick               Quick batch (200 iterations)");
    println!("    -v, --verbose         Debug logging (RUST_LOG overrides)");
    println!("    -h, --help            Show this help");
    println!();
    println!("EXAMPLES:");
    println!("    cargo run --bin simulate                      # Default batch");
    println!("    cargo run --bin simulate -- -n 5000 -t 8     # Bigger batch");
    println!("    cargo run --bin simulate -- --seed 42        # Reproducible");
    println!("    cargo run --bin simulate -- -f raids.json    # Compare scenarios");
}
