//! CLI for datastream
//!
//! Subcommands:
//! - `server`: run the ingestion, the WebSocket relay and the admin HTTP API
//! - `token`: mint a signed operator token with the configured secret

use std::sync::Arc;

use clap::Parser;
use datastream::auth::{JwtVerifier, issue_token};
use datastream::broker::MemoryBroker;
use datastream::config::{Settings, load_config};
use datastream::http::{AppState, start_http_server};
use datastream::ingest::Ingestion;
use datastream::relay::Relay;
use datastream::transport::start_websocket_server;
use datastream::utils::logging;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "datastream")]
enum Command {
    /// Start the relay and the admin API
    Server,
    /// Print a signed token for local use
    Token {
        /// Subject of the token
        #[arg(long, default_value = "operator")]
        subject: String,
        /// Comma separated roles
        #[arg(long, value_delimiter = ',', default_value = "Administrator")]
        roles: Vec<String>,
        /// Hours until the token expires
        #[arg(long, default_value_t = 24, value_parser = clap::value_parser!(i64).range(1..))]
        hours: i64,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cmd = Command::parse();

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            logging::init("info");
            error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };
    logging::init(&config.log.level);

    let result = match cmd {
        Command::Server => run_server(config).await,
        Command::Token {
            subject,
            roles,
            hours,
        } => print_token(&config, &subject, &roles, hours),
    };

    if let Err(e) = result {
        error!("{e}");
        std::process::exit(1);
    }
}

async fn run_server(config: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let verifier = Arc::new(JwtVerifier::new(&config.auth));
    let relay = Arc::new(Relay::new(
        config.relay.max_message_count,
        verifier.clone(),
    ));

    let broker = MemoryBroker::from_settings(&config.broker);
    info!(url = %broker.url(), "using in-process broker");
    let ingestion = Arc::new(Ingestion::new(
        Arc::new(broker),
        relay.clone(),
        config.broker.internal_topic_prefix.clone(),
    ));

    // start consuming whatever already exists
    if let Err(e) = ingestion.list_topics().await {
        error!("initial topic discovery failed: {e}");
    }

    let state = AppState {
        ingestion,
        verifier,
    };

    tokio::select! {
        res = start_websocket_server(config.ws_addr(), relay.clone(), config.relay.send_queue_capacity) => {
            error!("WebSocket server exited unexpectedly.");
            res?;
        }
        res = start_http_server(config.http_addr(), state) => {
            error!("HTTP server exited unexpectedly.");
            res?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Exiting gracefully.");
        }
    }

    relay.shutdown();
    Ok(())
}

fn print_token(
    config: &Settings,
    subject: &str,
    roles: &[String],
    hours: i64,
) -> Result<(), Box<dyn std::error::Error>> {
    let issuer = config.auth.valid_issuers.first().map(String::as_str);
    let token = issue_token(
        config.auth.secret.as_bytes(),
        subject,
        roles,
        issuer,
        chrono::Duration::hours(hours),
    )?;
    println!("{token}");
    Ok(())
}
