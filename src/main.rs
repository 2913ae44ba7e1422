mod careplan;
mod config;
mod core;
mod detect;
mod extract;
mod fusion;
mod gate;
mod llm;
mod memory;
mod orchestrator;
mod providers;
mod scheduler;
mod state;
mod traits;
mod types;

#[cfg(test)]
mod testing;

use std::path::PathBuf;

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
    let command = args.get(1).map(|s| s.as_str());

    match command {
        Some("--version") | Some("-V") => {
            println!("caremind {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Some("--help") | Some("-h") | None => {
            println!("caremind {}", env!("CARGO_PKG_VERSION"));
            println!("{}\n", env!("CARGO_PKG_DESCRIPTION"));
            println!("Usage: caremind <COMMAND>\n");
            println!("Commands:");
            println!("  chat <username>                Chat as an enrolled person");
            println!("  enroll <username> <full name>  Enroll a person");
            println!("\nOptions:");
            println!("  -h, --help       Print help");
            println!("  -V, --version    Print version");
            return Ok(());
        }
        _ => {}
    }

    let config_path = PathBuf::from("config.toml");
    let config = config::AppConfig::load(&config_path)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    match command {
        Some("chat") => {
            let username = args.get(2).map(|s| s.as_str()).unwrap_or_else(|| {
                eprintln!("Usage: caremind chat <username>");
                std::process::exit(1);
            });
            runtime.block_on(core::run_chat(config, username))
        }
        Some("enroll") => {
            if args.len() < 4 {
                eprintln!("Usage: caremind enroll <username> <full name>");
                std::process::exit(1);
            }
            let username = &args[2];
            let full_name = args[3..].join(" ");
            runtime.block_on(core::run_enroll(config, username, &full_name))
        }
        Some(other) => {
            eprintln!("Unknown command: '{}'. Use chat or enroll.", other);
            std::process::exit(1);
        }
        None => unreachable!(),
    }
}
