//! Node startup: data directory, keys and chain database.

use crate::accounts::KeyStore;
use crate::config::NodeConfig;
use crate::datadir::layout::{CHAINDATA_DIR, NODEKEY_FILE};
use crate::datadir::lock::NODE_LOCK_FILE;
use crate::datadir::{DataDirMigrator, DirLock, MigrationReport};
use crate::devmode;
use crate::error::NodeError;
use crate::store::{detect_format, ChainStore, DatabaseFormat, StateDump, StoredBlock};
use crate::types::Address;
use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use zeroize::Zeroizing;

/// A node whose chain directory is established and locked.
///
/// The chain database is not opened; account commands only need this much.
#[derive(Debug)]
pub struct PreparedNode {
    config: NodeConfig,
    report: MigrationReport,
    keystore: KeyStore,
    _lock: DirLock,
}

impl PreparedNode {
    /// Migrate or initialize the data directory, lock it and seed dev mode.
    pub fn prepare(config: NodeConfig) -> Result<Self, NodeError> {
        info!(
            chain = %config.chain.identity,
            network = config.chain.network_id(),
            "Preparing data directory"
        );
        let report =
            DataDirMigrator::new(&config.data_dir, config.genuine_data.clone()).run(&config.chain)?;

        let chain_dir = config.chain_dir();
        let lock = DirLock::acquire(&chain_dir.join(NODE_LOCK_FILE))?;
        ensure_nodekey(&chain_dir)?;

        let keystore = KeyStore::open(&config.keystore_dir(), config.kdf())?;
        let config = if config.dev {
            devmode::bootstrap(config, &keystore)?.config
        } else {
            config
        };

        Ok(Self {
            config,
            report,
            keystore,
            _lock: lock,
        })
    }

    /// Effective configuration
    #[must_use]
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// What the migrator did
    #[must_use]
    pub fn report(&self) -> &MigrationReport {
        &self.report
    }

    /// Account keystore
    #[must_use]
    pub fn keystore(&self) -> &KeyStore {
        &self.keystore
    }
}

/// A started node with its chain database.
#[derive(Debug)]
pub struct Node {
    prepared: PreparedNode,
    store: Option<ChainStore>,
    genesis: Option<StoredBlock>,
}

impl Node {
    /// Run the full startup sequence.
    pub fn start(config: NodeConfig) -> Result<Self, NodeError> {
        let prepared = PreparedNode::prepare(config)?;
        let config = prepared.config();
        let chaindata = config.chain_dir().join(CHAINDATA_DIR);

        let (store, genesis) = if detect_format(&chaindata) == DatabaseFormat::LevelDb {
            info!(
                path = %chaindata.display(),
                "Existing LevelDB chain database found, leaving it in place"
            );
            (None, None)
        } else {
            let store = ChainStore::open(&chaindata, config.cache_mb)?;
            let genesis = if config.dev {
                store.replace_genesis(&config.chain.descriptor)?
            } else {
                store.init_genesis(&config.chain.descriptor)?
            };
            (Some(store), Some(genesis))
        };

        info!(chain_dir = %config.chain_dir().display(), "Node initialized");
        Ok(Self {
            prepared,
            store,
            genesis,
        })
    }

    /// Effective configuration
    #[must_use]
    pub fn config(&self) -> &NodeConfig {
        self.prepared.config()
    }

    /// Close the chain database, then release the chain directory.
    pub fn shutdown(self) -> Result<(), NodeError> {
        if let Some(store) = self.store {
            store.close()?;
        }
        drop(self.prepared);
        Ok(())
    }

    /// Chain database, unless a legacy database was kept
    #[must_use]
    pub fn store(&self) -> Option<&ChainStore> {
        self.store.as_ref()
    }

    /// Summary for the `status` command
    pub fn status(&self) -> Result<NodeStatus, NodeError> {
        let config = self.config();
        Ok(NodeStatus {
            chain: config.chain.dir_name().to_string(),
            chain_name: config.chain.descriptor.name.clone(),
            network_id: config.chain.network_id(),
            chain_dir: config.chain_dir(),
            ipc_endpoint: config.ipc_endpoint(),
            migration: self.prepared.report().to_string(),
            accounts: self.prepared.keystore().accounts()?.len(),
            genesis: self.genesis.as_ref().map(|g| g.hash.clone()),
            mining: config.mine,
            automine: config.automine,
            discovery: !config.no_discover,
        })
    }

    /// Dump state at each selected block.
    pub fn dump(
        &self,
        selectors: &[BlockSelector],
        filter: &[Address],
    ) -> Result<Vec<StateDump>, NodeError> {
        let store = self.store.as_ref().ok_or_else(|| {
            NodeError::InvalidArgument(
                "chain database is in the legacy format and cannot be dumped".to_string(),
            )
        })?;
        selectors
            .iter()
            .map(|selector| -> Result<StateDump, NodeError> {
                let block = match selector {
                    BlockSelector::Number(n) => store.block_by_number(*n)?,
                    BlockSelector::Hash(h) => store.block_by_hash(h)?,
                }
                .ok_or_else(|| NodeError::InvalidArgument(format!("block not found: {selector}")))?;
                Ok(store.dump(&block, filter)?)
            })
            .collect()
    }
}

/// Node status
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeStatus {
    /// Chain identity
    pub chain: String,
    /// Human readable chain name
    pub chain_name: String,
    /// Network id
    pub network_id: u64,
    /// Chain directory
    pub chain_dir: PathBuf,
    /// IPC endpoint
    pub ipc_endpoint: Option<PathBuf>,
    /// Migration summary
    pub migration: String,
    /// Number of accounts
    pub accounts: usize,
    /// Genesis hash, if the database is managed here
    pub genesis: Option<String>,
    /// Mining enabled
    pub mining: bool,
    /// Automine enabled
    pub automine: bool,
    /// Peer discovery enabled
    pub discovery: bool,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Chain:      {} ({})", self.chain, self.chain_name)?;
        writeln!(f, "Network:    {}", self.network_id)?;
        writeln!(f, "Chain dir:  {}", self.chain_dir.display())?;
        match &self.ipc_endpoint {
            Some(path) => writeln!(f, "IPC:        {}", path.display())?,
            None => writeln!(f, "IPC:        disabled")?,
        }
        writeln!(f, "Migration:  {}", self.migration)?;
        writeln!(f, "Accounts:   {}", self.accounts)?;
        match &self.genesis {
            Some(hash) => writeln!(f, "Genesis:    {hash}")?,
            None => writeln!(f, "Genesis:    legacy database")?,
        }
        writeln!(
            f,
            "Mining:     {}{}",
            if self.mining { "on" } else { "off" },
            if self.automine { " (automine)" } else { "" }
        )?;
        write!(
            f,
            "Discovery:  {}",
            if self.discovery { "on" } else { "off" }
        )
    }
}

/// A block named on the command line
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BlockSelector {
    /// By number
    Number(u64),
    /// By hash
    Hash([u8; 32]),
}

impl fmt::Display for BlockSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Hash(h) => write!(f, "0x{}", hex::encode(h)),
        }
    }
}

/// Parse a comma-separated list of block numbers and `0x` hashes.
pub fn parse_block_selectors(list: &str) -> Result<Vec<BlockSelector>, NodeError> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| -> Result<BlockSelector, NodeError> {
            if let Some(digits) = s.strip_prefix("0x") {
                let mut hash = [0u8; 32];
                hex::decode_to_slice(digits, &mut hash).map_err(|e| {
                    NodeError::InvalidArgument(format!("invalid block hash {s:?}: {e}"))
                })?;
                Ok(BlockSelector::Hash(hash))
            } else {
                s.parse::<u64>().map(BlockSelector::Number).map_err(|e| {
                    NodeError::InvalidArgument(format!("invalid block number {s:?}: {e}"))
                })
            }
        })
        .collect()
}

/// Parse a comma-separated list of addresses.
pub fn parse_addresses(list: &str) -> Result<Vec<Address>, NodeError> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            Address::from_hex(s)
                .map_err(|e| NodeError::InvalidArgument(format!("invalid address {s:?}: {e}")))
        })
        .collect()
}

/// Create the node identity key if the chain directory has none.
fn ensure_nodekey(chain_dir: &Path) -> Result<(), NodeError> {
    let path = chain_dir.join(NODEKEY_FILE);
    if path.exists() {
        return Ok(());
    }
    let mut key = Zeroizing::new([0u8; 32]);
    OsRng.fill_bytes(&mut key[..]);
    let encoded = Zeroizing::new(hex::encode(&key[..]));
    fs::write(&path, encoded.as_bytes()).map_err(|e| NodeError::io(&path, e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o600))
            .map_err(|e| NodeError::io(&path, e))?;
    }
    info!(path = %path.display(), "Generated node key");
    Ok(())
}
