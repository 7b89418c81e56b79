mod activity;
mod channels;
mod commands;
mod config;
mod core;
mod economy;
mod error;
mod heartbeat;
mod persist;
mod recurrence;
mod scheduler;
mod store;
mod traits;
mod types;
mod watchers;

#[cfg(test)]
mod testing;

use std::path::Path;

use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() > 1 {
        match args[1].as_str() {
            "--version" | "-V" => {
                println!("steward {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" => {
                println!("steward {}", env!("CARGO_PKG_VERSION"));
                println!("{}\n", env!("CARGO_PKG_DESCRIPTION"));
                println!("Usage: steward\n");
                println!("Configuration is read from config.toml (all keys optional);");
                println!("ROLE_HEAD, ROLE_KIDS and DATA_PATH override it from the environment.");
                println!("\nOptions:");
                println!("  -h, --help       Print help");
                println!("  -V, --version    Print version");
                return Ok(());
            }
            other => {
                eprintln!("Unknown argument: '{}'. See --help.", other);
                std::process::exit(1);
            }
        }
    }

    let config = config::AppConfig::load(Path::new("config.toml"))?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(crate::core::run_standalone(config))
}
