//! Developer mode account and genesis seeding.
//!
//! On first start the keystore gets ten accounts with an empty password,
//! each funded in a dev genesis. The chain directory ends up with:
//!
//! - `chain.json`: the chain descriptor, including `dev_genesis.json`
//! - `dev_genesis.json`: the genesis block, pointing at the alloc CSV
//! - `dev_genesis_alloc.csv`: one row per dev account
//!
//! `chain.json` is written only once so local edits survive restarts; the
//! other two are rewritten every time from the keystore contents.

use crate::accounts::{Account, KeyStore};
use crate::chain::descriptor::format_allocation_csv;
use crate::chain::{AllocationEntry, ChainDescriptor, GenesisDump};
use crate::config::NodeConfig;
use crate::error::NodeError;
use alloy_primitives::U256;
use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Chain descriptor file written in dev mode
pub const CHAIN_FILE: &str = "chain.json";
/// Dev genesis file
pub const GENESIS_FILE: &str = "dev_genesis.json";
/// Dev allocation CSV
pub const ALLOC_FILE: &str = "dev_genesis_alloc.csv";
/// Accounts created on first start
pub const DEV_ACCOUNT_COUNT: usize = 10;
/// Balance of every dev account, in wei (10^31)
pub const DEV_BALANCE: U256 = U256::from_limbs([0xc091_4b26_8000_0000, 0x7e_37be_2022, 0, 0]);

#[derive(Serialize)]
struct GenesisWrapper<'a> {
    genesis: &'a GenesisDump,
}

/// What seeding produced
#[derive(Debug)]
pub struct DevBootstrap {
    /// Config with the dev descriptor and automine set
    pub config: NodeConfig,
    /// Funded accounts
    pub accounts: Vec<Account>,
    /// Whether accounts were created in this run
    pub created_accounts: bool,
    /// Whether `chain.json` was written in this run
    pub wrote_descriptor: bool,
}

/// Seed dev accounts and genesis in the config's chain directory.
pub fn bootstrap(config: NodeConfig, keystore: &KeyStore) -> Result<DevBootstrap, NodeError> {
    let chain_dir = config.chain_dir();

    let mut accounts = keystore.accounts()?;
    let created_accounts = accounts.is_empty();
    if created_accounts {
        warn!("No existing dev accounts found, creating {}", DEV_ACCOUNT_COUNT);
        for _ in 0..DEV_ACCOUNT_COUNT {
            let account = keystore.new_account("")?;
            warn!(address = %account.address, file = %account.file.display(), "Created dev account");
            accounts.push(account);
        }
    } else {
        warn!("Found existing keyfiles, using:");
        for account in &accounts {
            warn!(address = %account.address, file = %account.file.display(), "Dev account");
        }
    }

    let entries: Vec<AllocationEntry> = accounts
        .iter()
        .map(|a| AllocationEntry {
            address: a.address,
            balance: DEV_BALANCE,
        })
        .collect();
    write_file(&chain_dir.join(ALLOC_FILE), format_allocation_csv(&entries).as_bytes())?;

    let mut template = config.chain.descriptor.clone();
    let mut genesis = template.genesis.take().unwrap_or_default();
    genesis.alloc.clear();
    genesis.alloc_file = ALLOC_FILE.to_string();
    template.include = vec![GENESIS_FILE.to_string()];

    let chain_file = chain_dir.join(CHAIN_FILE);
    let wrote_descriptor = !chain_file.exists();
    if wrote_descriptor {
        write_json(&chain_file, &template)?;
    }
    write_json(
        &chain_dir.join(GENESIS_FILE),
        &GenesisWrapper { genesis: &genesis },
    )?;

    let descriptor = if wrote_descriptor {
        // What we just wrote, without reading it back.
        genesis.alloc_file.clear();
        genesis.set_allocation(&entries);
        template.include.clear();
        template.genesis = Some(genesis);
        template.validate()?;
        template
    } else {
        ChainDescriptor::from_file(&chain_file)?
    };

    info!(
        accounts = accounts.len(),
        chain_dir = %chain_dir.display(),
        "Dev genesis ready, automine enabled"
    );
    Ok(DevBootstrap {
        config: config.with_dev_genesis(descriptor),
        accounts,
        created_accounts,
        wrote_descriptor,
    })
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), NodeError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| NodeError::io(path, std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
    write_file(path, json.as_bytes())
}

fn write_file(path: &Path, contents: &[u8]) -> Result<(), NodeError> {
    fs::write(path, contents).map_err(|e| NodeError::io(path, e))
}
