//! DuoKV property-test runner.
//!
//! Runs named test scenarios against the engine and reports aggregate
//! statistics. Exit code 0 when everything passed, 1 on any failure.
//!
//! ```text
//! duokv --scenario wal_stress --seed 12345 --iterations 50
//! duokv --list
//! ```

use clap::Parser;
use duokv_testkit::{run_test, scenario, scenario_names, RunReport};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// DuoKV scenario and property-test runner.
#[derive(Parser)]
#[command(name = "duokv")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Root seed overriding the scenario default
    #[arg(short, long)]
    seed: Option<u64>,

    /// Iteration count overriding the scenario default
    #[arg(short, long)]
    iterations: Option<u32>,

    /// Run a single named test
    #[arg(short, long)]
    test: Option<String>,

    /// Run a named scenario (alias of --test)
    #[arg(long)]
    scenario: Option<String>,

    /// List available scenarios and exit
    #[arg(short, long)]
    list: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if cli.list {
        for name in scenario_names() {
            println!("{name}");
        }
        return ExitCode::SUCCESS;
    }

    let selected: Vec<&str> = match cli.test.as_deref().or(cli.scenario.as_deref()) {
        Some(name) => vec![name],
        None => scenario_names().to_vec(),
    };

    let mut all_passed = true;
    for name in selected {
        let Some(mut config) = scenario(name) else {
            eprintln!("unknown scenario: {name} (try --list)");
            return ExitCode::FAILURE;
        };
        if let Some(seed) = cli.seed {
            config = config.seed(seed);
        }
        if let Some(iterations) = cli.iterations {
            config = config.iterations(iterations);
        }

        let report = run_test(&config);
        print_report(&report);
        all_passed &= report.passed();
    }

    if all_passed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn print_report(report: &RunReport) {
    let status = if report.passed() { "PASS" } else { "FAIL" };
    println!("=== {} [{status}] (seed {})", report.name, report.seed);
    println!("{}", report.stats);
    if let Some(failure) = &report.failure {
        println!("{failure}");
        println!("re-run with: --scenario {} --seed {}", report.name, report.seed);
    }
    println!();
}
