use clap::{Parser, Subcommand};

/// Runs the exchange's HTTP API.
#[derive(Parser)]
#[command(name = "exchange-core")]
#[command(version, about = "A central-limit order-book exchange service")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server.
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
        #[arg(long, default_value = "trade_store")]
        store_path: String,
        #[arg(long, default_value = "info")]
        log_level: String,
    },
}
