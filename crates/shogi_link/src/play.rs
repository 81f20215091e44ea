//! Terminal front-end: reads line commands, prints driver notices.

use crate::cli::PlayMode;
use anyhow::{Result, anyhow, bail};
use shogi_link::{
    Command, Control, Difficulty, DriverNotice, EngineAdapter, GameDriver, GameEvent,
    HttpSessionClient, LinkConfig, SessionApi, SessionStatus, TurnMachine,
};
use shogi_rules::{GameStatus, PieceKind, Side, Square, StandardRules};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};

const HELP: &str = "\
Commands:
  7g            click a square (select, move, deselect)
  hand P        select a piece in hand (P L N S G B R)
  yes | no      answer the promotion question
  usi 7g7f      play a move in USI notation
  sfen          print the current position
  reset         start over (offline only)
  quit          leave";

/// Everything `play` needs from the command line.
#[derive(Debug)]
pub struct PlayOptions {
    /// Seating.
    pub mode: PlayMode,
    /// Token to join.
    pub token: Option<String>,
    /// Human side against the engine.
    pub side: Side,
    /// Engine strength override.
    pub difficulty: Option<Difficulty>,
    /// Session server override.
    pub server_url: Option<String>,
    /// Config file.
    pub config: PathBuf,
}

fn init_file_tracing() -> Result<()> {
    let log_file = std::fs::File::create("shogi_link_play.log")?;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,shogi_link=debug")),
        )
        .with_writer(Arc::new(log_file))
        .with_ansi(false)
        .try_init();
    Ok(())
}

/// Runs one game at the terminal until `quit` or end of input.
#[instrument(skip_all, fields(mode = ?options.mode))]
pub async fn run_play(options: PlayOptions) -> Result<()> {
    init_file_tracing()?;
    let config = LinkConfig::load(Some(options.config.as_path()))?;
    let (notice_tx, notice_rx) = mpsc::unbounded_channel();

    let driver = match options.mode {
        PlayMode::Solo => {
            GameDriver::new(TurnMachine::new(StandardRules::new(), Control::HotSeat), notice_tx)
        }
        PlayMode::Ai => {
            let engine = Arc::new(EngineAdapter::standard());
            engine.set_difficulty(options.difficulty.unwrap_or(*config.difficulty()));
            engine_driver(engine, options.side, notice_tx).await
        }
        PlayMode::Host | PlayMode::Join => {
            let url = options
                .server_url
                .clone()
                .unwrap_or_else(|| config.server_url().clone());
            let client = HttpSessionClient::new(url)?;
            let (token, own) = if options.mode == PlayMode::Host {
                let token = client.create().await?;
                println!("Share this code: {token}");
                wait_for_opponent(&client, &token, config.poll_interval()).await?;
                (token, Side::Black)
            } else {
                let token = options
                    .token
                    .clone()
                    .ok_or_else(|| anyhow!("--token is required to join"))?;
                client.join(&token).await?;
                (token, Side::White)
            };
            println!("Game on. You play {own}.");
            GameDriver::new(
                TurnMachine::new(StandardRules::new(), Control::Side(own)),
                notice_tx,
            )
            .with_session(Arc::new(client), token, own)
        }
    };

    let _poller = driver.start_polling(config.poll_interval());
    let events = driver.sender();
    let driver_task = tokio::spawn(driver.run());
    let printer = tokio::spawn(print_notices(notice_rx));

    println!("{HELP}");
    let _ = events.send(GameEvent::Input(Command::Show));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "quit" | "exit") {
            break;
        }
        if line == "help" {
            println!("{HELP}");
            continue;
        }
        match parse_command(line) {
            Ok(command) => {
                if events.send(GameEvent::Input(command)).is_err() {
                    warn!("Driver stopped, leaving");
                    break;
                }
            }
            Err(e) => println!("? {e}"),
        }
    }

    let _ = events.send(GameEvent::Shutdown);
    drop(events);
    let machine = driver_task.await?;
    info!(moves = machine.history().len(), "Game closed");
    printer.abort();
    Ok(())
}

/// Seats the engine opposite `human`, or falls back to a hot-seat game when
/// it will not start.
async fn engine_driver(
    engine: Arc<EngineAdapter>,
    human: Side,
    notices: mpsc::UnboundedSender<DriverNotice>,
) -> GameDriver<StandardRules> {
    match engine.initialize().await {
        Ok(()) => {
            println!("You play {human}; engine difficulty {}", engine.difficulty());
            GameDriver::new(
                TurnMachine::new(StandardRules::new(), Control::Side(human)),
                notices,
            )
            .with_engine(engine, human.opponent())
        }
        Err(e) => {
            warn!(error = %e, "Engine unavailable, playing hot-seat");
            println!("! {e}; both sides are played here");
            GameDriver::new(TurnMachine::new(StandardRules::new(), Control::HotSeat), notices)
        }
    }
}

/// Polls `token` until a second player has joined. Ctrl-C cancels the session.
async fn wait_for_opponent(client: &HttpSessionClient, token: &str, every: Duration) -> Result<()> {
    println!("Waiting for an opponent (Ctrl-C to cancel)...");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                if let Err(e) = client.cancel(token).await {
                    warn!(error = %e, "Cancel failed");
                }
                bail!("Cancelled while waiting for an opponent");
            }
            _ = tokio::time::sleep(every) => {}
        }
        match client.status(token).await? {
            SessionStatus::Waiting => continue,
            SessionStatus::Active => return Ok(()),
            SessionStatus::Ended => bail!("Session ended before it started"),
        }
    }
}

/// Reads one input line.
fn parse_command(line: &str) -> Result<Command> {
    let mut words = line.split_whitespace();
    let head = words.next().unwrap_or_default();
    let arg = words.next();
    let command = match (head, arg) {
        ("yes" | "y", None) => Command::Promote(true),
        ("no" | "n", None) => Command::Promote(false),
        ("sfen", None) => Command::Show,
        ("reset", None) => Command::Reset,
        ("usi", Some(text)) => Command::Usi(text.to_string()),
        ("hand", Some(letter)) => {
            let mut chars = letter.chars();
            let kind = match (chars.next(), chars.next()) {
                (Some(c), None) => PieceKind::from_letter(c),
                _ => None,
            }
            .filter(|kind| *kind != PieceKind::King)
            .ok_or_else(|| anyhow!("unknown hand piece {letter}"))?;
            Command::Hand(kind)
        }
        (square, None) => Command::Click(square.parse::<Square>()?),
        _ => bail!("unrecognized command, type help"),
    };
    Ok(command)
}

fn describe(status: GameStatus) -> String {
    match status {
        GameStatus::Checkmate { winner } => format!("Checkmate, {winner} wins"),
        GameStatus::Resigned { winner } => format!("Resignation, {winner} wins"),
        GameStatus::Draw => "Draw by repetition".to_string(),
        GameStatus::Playing => "Playing".to_string(),
    }
}

async fn print_notices(mut notices: mpsc::UnboundedReceiver<DriverNotice>) {
    while let Some(notice) = notices.recv().await {
        match notice {
            DriverNotice::PositionChanged(sfen) => println!("position {sfen}"),
            DriverNotice::Targets(targets) => {
                let moves: Vec<String> = targets.iter().map(|a| a.to_usi()).collect();
                println!("targets {}", moves.join(" "));
            }
            DriverNotice::AwaitingPromotion => println!("Promote? (yes/no)"),
            DriverNotice::Alert(message) => println!("! {message}"),
            DriverNotice::GameOver(status) => println!("Game over: {}", describe(status)),
        }
    }
}
