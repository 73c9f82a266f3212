//! # Main: CLI Entry Point
//!
//! Subcommands:
//!
//! - `serve`: the HTTP API (needs `DATABASE_URL`).
//! - `split`: split a SQL script into statements, optionally classifying each
//!   as DDL for the migration log. Offline; no database involved.
//! - `encrypt-connection`: produce the stored `ivHex:cipherHex` form of a
//!   connection string using `CONNECTION_ENCRYPTION_KEY`.
//!
//! Logging goes to stderr; `LOG_FORMAT=json` switches to JSON lines and
//! `RUST_LOG` sets the filter (default `info`).

mod cli;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "pgpilot", about = "Autonomous PostgreSQL agent service")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        /// Listen port
        #[arg(long, env = "PORT", default_value_t = 8080)]
        port: u16,
    },
    /// Split a SQL script into statements ("-" reads stdin)
    Split {
        file: PathBuf,
        /// Classify each statement (DDL type, object type, name)
        #[arg(long)]
        classify: bool,
        /// Print JSON instead of annotated SQL
        #[arg(long)]
        json: bool,
    },
    /// Encrypt a connection string for storage ("-" or omitted reads stdin)
    EncryptConnection {
        connection_string: Option<String>,
        /// 64-hex-char AES-256 key
        #[arg(long, env = "CONNECTION_ENCRYPTION_KEY", hide_env_values = true)]
        key: Option<String>,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    }
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    init_logging();

    let cli = Cli::parse();
    match cli.command {
        Commands::Serve { port } => {
            let config = pgpilot::config::AppConfig::from_env();
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(pgpilot::api::run(port, config))
        }
        Commands::Split { file, classify, json } => cli::run_split(&file, classify, json),
        Commands::EncryptConnection { connection_string, key } => {
            cli::run_encrypt(connection_string.as_deref(), key.as_deref())
        }
    }
}
