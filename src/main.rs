//! serving-core command line entry point.
//!
//! ## Subcommands
//!
//! - `serving-core config [show|defaults]` - Print configuration as JSON
//! - `serving-core version` - Print version
//! - `serving-core help` - Print usage

use std::process::ExitCode;

use serving_core::config::{self, ServingConfig};

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("help");

    match command {
        "config" => {
            let subcommand = args.get(2).map(|s| s.as_str()).unwrap_or("show");
            let config = match subcommand {
                "show" => config::load(),
                "defaults" => ServingConfig::default(),
                _ => {
                    eprintln!("Unknown config subcommand: {}", subcommand);
                    print_usage();
                    return ExitCode::FAILURE;
                }
            };
            match serde_json::to_string_pretty(&config.effective_config()) {
                Ok(json) => {
                    println!("{}", json);
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("Failed to serialize configuration: {}", e);
                    ExitCode::FAILURE
                }
            }
        }
        "version" | "--version" | "-V" => {
            println!("serving-core {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        "help" | "--help" | "-h" => {
            print_usage();
            ExitCode::SUCCESS
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            ExitCode::FAILURE
        }
    }
}

fn print_usage() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        "serving-core v{}

USAGE:
    serving-core [COMMAND]

COMMANDS:
    config show      Show effective configuration (from SERVING_CORE_* env)
    config defaults  Show default configuration
    version          Show version information
    help             Show this help message",
        version
    );
}
