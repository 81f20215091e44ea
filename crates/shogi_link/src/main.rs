//! Shogi Link - Unified CLI
//!
//! Session server, session management commands, a terminal game client and
//! a one-shot engine query.

#![warn(missing_docs)]

mod cli;
mod play;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Command};
use shogi_link::{
    Difficulty, EngineAdapter, HttpSessionClient, LinkConfig, SessionApi, SessionStore,
};
use std::path::PathBuf;
use tracing::{info, instrument};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            config,
            host,
            port,
            dev,
        } => run_server(config, host, port, dev).await,
        Command::Create { server_url } => {
            init_console_tracing("warn");
            let token = client_for(server_url)?.create().await?;
            println!("{token}");
            Ok(())
        }
        Command::Join { token, server_url } => {
            init_console_tracing("warn");
            client_for(server_url)?.join(&token).await?;
            println!("Joined {token}");
            Ok(())
        }
        Command::Status { token, server_url } => {
            init_console_tracing("warn");
            let status = client_for(server_url)?.status(&token).await?;
            println!("{status}");
            Ok(())
        }
        Command::Cancel { token, server_url } => {
            init_console_tracing("warn");
            client_for(server_url)?.cancel(&token).await?;
            println!("Cancelled {token}");
            Ok(())
        }
        Command::Play {
            mode,
            token,
            side,
            difficulty,
            server_url,
            config,
        } => {
            play::run_play(play::PlayOptions {
                mode,
                token,
                side: side.into(),
                difficulty,
                server_url,
                config,
            })
            .await
        }
        Command::Bestmove { sfen, difficulty } => run_bestmove(sfen, difficulty).await,
    }
}

fn init_console_tracing(default_filter: &str) {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// HTTP client for `server_url`, falling back to the configured URL.
fn client_for(server_url: Option<String>) -> Result<HttpSessionClient> {
    let url = match server_url {
        Some(url) => url,
        None => LinkConfig::load(None)?.server_url().clone(),
    };
    Ok(HttpSessionClient::new(url)?)
}

/// Run the session server
#[instrument(skip_all, fields(config_path = %config.display()))]
async fn run_server(
    config: PathBuf,
    host: Option<String>,
    port: Option<u16>,
    dev: bool,
) -> Result<()> {
    init_console_tracing("info,shogi_link=debug,tower_http=debug");

    let mut config = LinkConfig::load(Some(config.as_path()))?;
    if let Some(host) = host {
        config = config.with_host(host);
    }
    if let Some(port) = port {
        config = config.with_port(port);
    }
    if dev {
        config = config.with_dev_mode(true);
    }

    info!(host = %config.host(), port = config.port(), "Starting Shogi Link session server");
    let store = SessionStore::with_policy(config.eviction_policy());
    shogi_link::serve(store, &config).await?;
    Ok(())
}

/// Print the engine's choice for one position
#[instrument]
async fn run_bestmove(sfen: String, difficulty: Difficulty) -> Result<()> {
    init_console_tracing("warn");

    let engine = EngineAdapter::standard();
    engine.set_difficulty(difficulty);
    engine.initialize().await?;
    match engine.request_best_move(&sfen).await? {
        Some(action) => println!("bestmove {}", action.to_usi()),
        None => println!("bestmove resign"),
    }
    engine.shutdown();
    Ok(())
}
