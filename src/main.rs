use clap::{Parser, Subcommand};
use fieldtrack::app::App;
use fieldtrack::config::Config;
use fieldtrack::scheduler::CycleOutcome;
use serde::Serialize;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "fieldtrack")]
#[command(about = "Background location telemetry pipeline")]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = "fieldtrack.yaml")]
    config: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register the periodic job and run until interrupted
    Run,
    /// Run a single pipeline cycle
    Cycle,
    /// Upload the pending queue without taking a new fix
    Flush,
    /// Show last known position, queue size and last cycle
    Status,
    /// Drop every pending sample
    ClearPending,
    /// Validate the configuration file
    CheckConfig,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let config = match Config::from_file(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config {}: {}", cli.config, e);
            return ExitCode::FAILURE;
        }
    };

    if let Commands::CheckConfig = cli.command {
        println!(
            "Configuration is valid (sink {}, every {})",
            config.sink.endpoint,
            humantime::format_duration(config.schedule.interval)
        );
        return ExitCode::SUCCESS;
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };
    runtime.block_on(dispatch(cli.command, config))
}

async fn dispatch(command: Commands, config: Config) -> ExitCode {
    let app = match App::build(config) {
        Ok(app) => app,
        Err(e) => {
            eprintln!("Startup error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match command {
        Commands::Run => match app.run_until_interrupted().await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("Error: {}", e);
                ExitCode::FAILURE
            }
        },
        Commands::Cycle => {
            let report = app.job().run_cycle().await;
            print_yaml(&report);
            exit_for(report.outcome)
        }
        Commands::Flush => {
            let report = app.job().flush().await;
            print_yaml(&report);
            exit_for(report.outcome)
        }
        Commands::Status => match app.status() {
            Ok(status) => {
                print_yaml(&status);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Error reading state: {}", e);
                ExitCode::FAILURE
            }
        },
        Commands::ClearPending => match app.store().clear_pending() {
            Ok(n) => {
                println!("Dropped {} pending samples", n);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Error clearing queue: {}", e);
                ExitCode::FAILURE
            }
        },
        Commands::CheckConfig => ExitCode::SUCCESS,
    }
}

fn print_yaml<T: Serialize>(value: &T) {
    match serde_yaml::to_string(value) {
        Ok(s) => print!("{}", s),
        Err(e) => eprintln!("Error formatting output: {}", e),
    }
}

fn exit_for(outcome: CycleOutcome) -> ExitCode {
    match outcome {
        CycleOutcome::Success => ExitCode::SUCCESS,
        CycleOutcome::Retry => ExitCode::from(2),
    }
}
