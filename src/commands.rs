//! Command implementations for the `etc-node` binary.

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use etc_node::accounts::read_password_file;
use etc_node::chain::{resolve_chain, ChainRequest};
use etc_node::cli::{AccountCommand, Cli, Command, GlobalArgs};
use etc_node::node::{parse_addresses, parse_block_selectors};
use etc_node::{Node, NodeConfig, NodeError, PreparedNode};
use tracing::{info, warn};

/// Dispatch a parsed command line.
pub fn run(cli: Cli) -> Result<(), NodeError> {
    match cli.command.unwrap_or(Command::Status) {
        Command::Status => status(&cli.global),
        Command::Dump { blocks, addresses } => dump(&cli.global, blocks, addresses),
        Command::DumpChainConfig { file } => dump_chain_config(&cli.global, file),
        Command::Account(AccountCommand::List) => account_list(&cli.global),
        Command::Account(AccountCommand::New) => account_new(&cli.global),
        Command::Version => {
            version();
            Ok(())
        }
    }
}

fn status(args: &GlobalArgs) -> Result<(), NodeError> {
    let node = Node::start(NodeConfig::resolve(args)?)?;
    println!("{}", node.status()?);
    node.shutdown()
}

fn dump(
    args: &GlobalArgs,
    blocks: Option<String>,
    addresses: Option<String>,
) -> Result<(), NodeError> {
    let selectors = parse_block_selectors(blocks.as_deref().unwrap_or_default())?;
    if selectors.is_empty() {
        return Err(NodeError::InvalidArgument(
            "dump needs at least one block number or hash".to_string(),
        ));
    }
    let filter = parse_addresses(addresses.as_deref().unwrap_or_default())?;

    let node = Node::start(NodeConfig::resolve(args)?)?;
    let dumps = node.dump(&selectors, &filter)?;
    let json = match dumps.as_slice() {
        [single] => serde_json::to_string_pretty(single),
        many => serde_json::to_string_pretty(many),
    }
    .map_err(|e| NodeError::InvalidArgument(e.to_string()))?;
    println!("{json}");
    node.shutdown()
}

fn dump_chain_config(args: &GlobalArgs, file: Option<PathBuf>) -> Result<(), NodeError> {
    let chain = resolve_chain(ChainRequest {
        chain: args.chain.as_deref(),
        testnet: args.testnet,
        dev: args.dev,
        descriptor_path: None,
    })?;
    if args.chain_config.is_some() || !chain.identity.is_builtin() {
        return Err(NodeError::InvalidArgument(
            "dump-chain-config only exports the built-in chains (mainnet or morden)".to_string(),
        ));
    }

    let path = match file {
        Some(p) if !p.as_os_str().is_empty() && p.file_name().is_some() => p,
        _ => {
            return Err(NodeError::InvalidArgument(
                "dump-chain-config needs an output file path".to_string(),
            ))
        }
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if !parent.exists() {
            warn!(dir = %parent.display(), "Directory does not exist yet, creating it");
            fs::create_dir_all(parent).map_err(|e| NodeError::io(parent, e))?;
        }
    }

    let json = chain
        .descriptor
        .to_json()
        .map_err(|e| NodeError::InvalidArgument(e.to_string()))?;
    fs::write(&path, json).map_err(|e| NodeError::io(&path, e))?;
    info!(chain = %chain.identity, file = %path.display(), "Wrote chain configuration");
    Ok(())
}

fn account_list(args: &GlobalArgs) -> Result<(), NodeError> {
    let node = PreparedNode::prepare(NodeConfig::resolve(args)?)?;
    for (index, account) in node.keystore().accounts()?.iter().enumerate() {
        println!(
            "Account #{index}: {{{}}} {}",
            hex::encode(account.address.as_bytes()),
            account.file.display()
        );
    }
    Ok(())
}

fn account_new(args: &GlobalArgs) -> Result<(), NodeError> {
    let node = PreparedNode::prepare(NodeConfig::resolve(args)?)?;
    let password = match &node.config().password_file {
        Some(path) => read_password_file(path)?,
        None => prompt_password()?,
    };
    let account = node.keystore().new_account(&password)?;
    println!("Address: {{{}}}", hex::encode(account.address.as_bytes()));
    Ok(())
}

fn prompt_password() -> Result<String, NodeError> {
    eprint!("Passphrase: ");
    io::stderr()
        .flush()
        .map_err(|e| NodeError::io("stderr", e))?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .map_err(|e| NodeError::io("stdin", e))?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn version() {
    println!("{}", etc_node::CLIENT_NAME);
    println!("Version: {}", etc_node::VERSION);
    println!("OS: {}", std::env::consts::OS);
    println!("Architecture: {}", std::env::consts::ARCH);
}
