//! etc-node - Ethereum Classic node
//!
//! Single binary with subcommands:
//!   etc-node                    - prepare the data directory, print status (default)
//!   etc-node dump <blocks>      - dump account state
//!   etc-node dump-chain-config  - export a built-in chain configuration
//!   etc-node account list|new   - manage keys
//!   etc-node version            - print version information

mod commands;

use std::io::IsTerminal;

use etc_node::cli::{self, ParseExit};
use etc_node::NodeError;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Verbosity used when neither `--verbosity` nor `RUST_LOG` is set
const DEFAULT_VERBOSITY: u8 = 3;

fn main() {
    let cli = match cli::parse_from(std::env::args_os()) {
        Ok(cli) => cli,
        Err(ParseExit::Display(text)) => {
            print!("{text}");
            return;
        }
        Err(ParseExit::Error(e)) => exit_with(&e),
    };

    if let Err(e) = init_logging(cli.global.verbosity) {
        eprintln!("Fatal: {e}");
        std::process::exit(1);
    }

    if let Err(e) = commands::run(cli) {
        exit_with(&e);
    }
}

fn exit_with(err: &NodeError) -> ! {
    match err {
        NodeError::Command { message, usage } => {
            println!("{message}");
            println!();
            print!("{usage}");
        }
        NodeError::Flag(message) => eprintln!("{message}"),
        other => eprintln!("Fatal: {other}"),
    }
    std::process::exit(err.exit_code());
}

fn init_logging(verbosity: Option<u8>) -> anyhow::Result<()> {
    let level = match verbosity.unwrap_or(DEFAULT_VERBOSITY) {
        0 => "off",
        1 => "error",
        2 => "warn",
        3 => "info",
        4 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
