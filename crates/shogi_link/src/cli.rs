//! Command-line interface for shogi_link.

use clap::{Parser, Subcommand, ValueEnum};
use shogi_link::Difficulty;
use std::path::PathBuf;

/// Shogi Link - turn-authoritative shogi over a shared session token
#[derive(Parser, Debug)]
#[command(name = "shogi_link")]
#[command(about = "Networked shogi sessions with a local search engine", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Which seats a `play` session fills locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PlayMode {
    /// Both sides at this terminal
    Solo,
    /// You against the search engine
    Ai,
    /// Create a session and play Black
    Host,
    /// Join a session and play White
    Join,
}

/// Side choice on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SideArg {
    /// First to move
    Black,
    /// Second to move
    White,
}

impl From<SideArg> for shogi_rules::Side {
    fn from(side: SideArg) -> Self {
        match side {
            SideArg::Black => shogi_rules::Side::Black,
            SideArg::White => shogi_rules::Side::White,
        }
    }
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the session server
    Serve {
        /// Path to a TOML config file
        #[arg(short, long, default_value = "shogi_link.toml")]
        config: PathBuf,

        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to (overrides config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Accept requests from any browser origin
        #[arg(long)]
        dev: bool,
    },

    /// Create a session and print its token
    Create {
        /// Session server URL
        #[arg(long)]
        server_url: Option<String>,
    },

    /// Join a waiting session
    Join {
        /// Session token
        token: String,

        /// Session server URL
        #[arg(long)]
        server_url: Option<String>,
    },

    /// Print a session's status
    Status {
        /// Session token
        token: String,

        /// Session server URL
        #[arg(long)]
        server_url: Option<String>,
    },

    /// Remove a session
    Cancel {
        /// Session token
        token: String,

        /// Session server URL
        #[arg(long)]
        server_url: Option<String>,
    },

    /// Play a game at the terminal
    Play {
        /// Who sits where
        #[arg(short, long, value_enum, default_value = "solo")]
        mode: PlayMode,

        /// Session token (join mode)
        #[arg(long)]
        token: Option<String>,

        /// Your side against the engine (ai mode)
        #[arg(long, value_enum, default_value = "black")]
        side: SideArg,

        /// Engine strength (ai mode)
        #[arg(long, value_enum)]
        difficulty: Option<Difficulty>,

        /// Session server URL (host and join modes)
        #[arg(long)]
        server_url: Option<String>,

        /// Path to a TOML config file
        #[arg(short, long, default_value = "shogi_link.toml")]
        config: PathBuf,
    },

    /// Print the engine's move for a position
    Bestmove {
        /// Position in SFEN
        #[arg(long, default_value = shogi_rules::INITIAL_SFEN)]
        sfen: String,

        /// Engine strength
        #[arg(long, value_enum, default_value = "medium")]
        difficulty: Difficulty,
    },
}
