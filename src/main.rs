use anyhow::Result;
use clap::{Parser, Subcommand};
use redisbloom::protocol::Request;
use redisbloom::{config, Client};
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "redisbloom")]
#[command(version, about = "Pooled client for RedisBloom servers", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path (falls back to REDISBLOOM_* environment variables)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Override the address list from config
    #[arg(long, global = true)]
    addr: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Ping the server through the pool
    Ping {
        /// Number of pings to send
        #[arg(long, default_value = "1")]
        count: usize,
    },

    /// Send a raw command and print the reply
    Exec {
        /// Command name, e.g. BF.EXISTS
        command: String,

        /// Command arguments
        args: Vec<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    let mut config = match (&cli.addr, &cli.config) {
        (Some(addr), None) => config::ClientConfig::new(addr.clone()),
        _ => config::load_config(cli.config.as_deref())?,
    };
    if let Some(addr) = cli.addr {
        config.addr = addr;
    }

    let client = Client::from_config(&config)?;

    let result = run(&client, cli.command).await;
    // The command's own outcome wins over a shutdown failure
    if let Err(e) = client.close().await {
        warn!(error = %e, "Failed to close pool");
    }
    result
}

async fn run(client: &Client, command: Commands) -> Result<()> {
    match command {
        Commands::Ping { count } => {
            for i in 0..count {
                let start = Instant::now();
                client.ping().await?;
                info!(seq = i + 1, latency_us = start.elapsed().as_micros() as u64, "PONG");
            }
        }
        Commands::Exec { command, args } => {
            let request = Request::cmd(&command).args(args);
            let reply = client.execute(&request).await?;
            println!("{}", reply);
        }
    }

    Ok(())
}
