//! Command-line flags and commands.
//!
//! Every long flag has a dashed spelling and the historical undashed one
//! (`--data-dir` / `--datadir`). Parse failures are sorted into flag errors
//! (exit 1, no usage) and command errors (exit 3, usage printed) before any
//! filesystem access happens.

use clap::error::{ContextKind, ContextValue, ErrorKind};
use clap::{Args, CommandFactory, Parser, Subcommand};
use std::ffi::OsString;
use std::path::PathBuf;

use crate::error::NodeError;

/// Top-level command line
#[derive(Parser, Debug)]
#[command(name = "etc-node")]
#[command(about = "Ethereum Classic node")]
#[command(version)]
pub struct Cli {
    /// Global flags
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Command to run; `status` when omitted
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Flags accepted before or after any command
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Base data directory
    #[arg(long = "data-dir", visible_alias = "datadir", value_name = "DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Keystore directory (default: <chain dir>/keystore)
    #[arg(long = "key-store", visible_alias = "keystore", value_name = "DIR", global = true)]
    pub key_store: Option<PathBuf>,

    /// Chain to run: mainnet, morden, or a custom chain name
    #[arg(long, value_name = "NAME", global = true)]
    pub chain: Option<String>,

    /// Use the Morden test network
    #[arg(long, global = true)]
    pub testnet: bool,

    /// External chain configuration file (JSON)
    #[arg(long = "chain-config", visible_alias = "chainconfig", value_name = "FILE", global = true)]
    pub chain_config: Option<PathBuf>,

    /// Disable peer discovery
    #[arg(long = "no-discover", visible_alias = "nodiscover", global = true)]
    pub no_discover: bool,

    /// Disable the IPC endpoint
    #[arg(long = "ipc-disable", visible_alias = "ipcdisable", global = true)]
    pub ipc_disable: bool,

    /// IPC endpoint file name or path
    #[arg(long = "ipc-path", visible_alias = "ipcpath", value_name = "PATH", global = true)]
    pub ipc_path: Option<String>,

    /// Database cache in MB (minimum 16)
    #[arg(long, value_name = "MB", global = true)]
    pub cache: Option<u64>,

    /// Cheaper key derivation (less secure, faster)
    #[arg(long = "light-kdf", visible_alias = "lightkdf", global = true)]
    pub light_kdf: bool,

    /// Enable mining
    #[arg(long, global = true)]
    pub mine: bool,

    /// Developer mode: seeded accounts and genesis on Morden settings
    #[arg(long, global = true)]
    pub dev: bool,

    /// TOML application config file
    #[arg(long = "app-config", visible_alias = "appconfig", value_name = "FILE", global = true)]
    pub app_config: Option<PathBuf>,

    /// Log verbosity: 0=silent 1=error 2=warn 3=info 4=debug 5=trace
    #[arg(long, value_name = "LEVEL", value_parser = clap::value_parser!(u8).range(0..=5), global = true)]
    pub verbosity: Option<u8>,

    /// File whose first line is the password for new accounts
    #[arg(long, value_name = "FILE", global = true)]
    pub password: Option<PathBuf>,
}

/// Commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Prepare the data directory and print node status
    Status,

    /// Dump account state at one or more blocks
    Dump {
        /// Comma-separated block numbers or hashes
        blocks: Option<String>,
        /// Comma-separated addresses to restrict the dump to
        addresses: Option<String>,
    },

    /// Write the built-in chain configuration to a JSON file
    #[command(name = "dump-chain-config", visible_alias = "dumpchainconfig")]
    DumpChainConfig {
        /// Output file
        file: Option<PathBuf>,
    },

    /// Manage accounts
    #[command(subcommand)]
    Account(AccountCommand),

    /// Print version information
    Version,
}

/// Account commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum AccountCommand {
    /// List accounts in the keystore
    List,
    /// Create a new account
    New,
}

/// How parsing ended when it did not produce a [`Cli`]
#[derive(Debug)]
pub enum ParseExit {
    /// Help or version output requested
    Display(String),
    /// A flag or command error
    Error(NodeError),
}

/// Parse a command line.
pub fn parse_from<I, T>(args: I) -> Result<Cli, ParseExit>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    Cli::try_parse_from(args).map_err(classify)
}

/// Rendered top-level usage
#[must_use]
pub fn usage() -> String {
    Cli::command().render_help().to_string()
}

fn context_string(err: &clap::Error, kind: ContextKind) -> Option<String> {
    match err.get(kind)? {
        ContextValue::String(s) => Some(s.clone()),
        ContextValue::Strings(v) => v.first().cloned(),
        _ => None,
    }
}

fn first_line(err: &clap::Error) -> String {
    let rendered = err.render().to_string();
    let line = rendered.lines().next().unwrap_or_default();
    line.strip_prefix("error: ").unwrap_or(line).to_string()
}

fn classify(err: clap::Error) -> ParseExit {
    match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
            ParseExit::Display(err.render().to_string())
        }
        ErrorKind::InvalidSubcommand => {
            let name = context_string(&err, ContextKind::InvalidSubcommand).unwrap_or_default();
            ParseExit::Error(NodeError::command(&name))
        }
        ErrorKind::UnknownArgument => {
            let arg = context_string(&err, ContextKind::InvalidArg).unwrap_or_default();
            if arg.starts_with('-') {
                ParseExit::Error(NodeError::Flag(format!(
                    "flag provided but not defined: {arg}"
                )))
            } else {
                ParseExit::Error(NodeError::command(&arg))
            }
        }
        ErrorKind::MissingSubcommand | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
            ParseExit::Error(NodeError::Command {
                message: first_line(&err),
                usage: err.render().to_string(),
            })
        }
        _ => ParseExit::Error(NodeError::Flag(first_line(&err))),
    }
}
