//! Chain database.
//!
//! A freshly initialized chain directory gets a sled database in
//! `chaindata` holding the genesis block and its account state. A
//! `chaindata` directory written by the legacy LevelDB engine is recognized
//! and left as it is.

use crate::chain::{AllocationEntry, ChainDescriptor, DescriptorError};
use crate::types::{keccak256, Address};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use sled::Tree;
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Smallest cache the database is ever given
pub const MIN_CACHE_MB: u64 = 16;

const BLOCKS_TREE: &str = "blocks";
const HASHES_TREE: &str = "hashes";
const STATE_TREE: &str = "state";

/// File sled keeps locked while a database is open
const SLED_LOCK_FILE: &str = "db";
const CLOSE_ATTEMPTS: u32 = 500;
const CLOSE_POLL: Duration = Duration::from_millis(10);

/// What is inside a `chaindata` directory
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DatabaseFormat {
    /// Missing or empty
    Empty,
    /// A database this node manages
    Native,
    /// A LevelDB database from the legacy engine
    LevelDb,
}

/// Look at `path` without opening anything
#[must_use]
pub fn detect_format(path: &Path) -> DatabaseFormat {
    if path.join("conf").is_file() {
        DatabaseFormat::Native
    } else if path.join("CURRENT").is_file() {
        DatabaseFormat::LevelDb
    } else {
        DatabaseFormat::Empty
    }
}

/// A block as stored
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredBlock {
    /// Block number
    pub number: u64,
    /// Block hash
    pub hash: String,
    /// Parent hash
    #[serde(rename = "parentHash")]
    pub parent_hash: String,
    /// State root
    #[serde(rename = "stateRoot")]
    pub state_root: String,
    /// Coinbase
    pub coinbase: Address,
    /// Difficulty
    pub difficulty: String,
    /// Gas limit
    #[serde(rename = "gasLimit")]
    pub gas_limit: String,
    /// Timestamp
    pub timestamp: String,
    /// Extra data
    #[serde(rename = "extraData")]
    pub extra_data: String,
    /// Nonce
    pub nonce: String,
}

/// Account entry in a state dump
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DumpAccount {
    /// Balance in wei, decimal
    pub balance: String,
    /// Account nonce
    pub nonce: u64,
}

/// Account state at a block
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateDump {
    /// State root
    pub root: String,
    /// Accounts keyed by address (hex, no prefix)
    pub accounts: BTreeMap<String, DumpAccount>,
}

/// Handle to the chain database.
#[derive(Debug)]
pub struct ChainStore {
    db: sled::Db,
    blocks: Tree,
    hashes: Tree,
    state: Tree,
    path: PathBuf,
}

impl ChainStore {
    /// Open or create the database at `path` with a cache of `cache_mb`.
    pub fn open(path: &Path, cache_mb: u64) -> Result<Self, StoreError> {
        if detect_format(path) == DatabaseFormat::LevelDb {
            return Err(StoreError::LegacyFormat(path.to_path_buf()));
        }
        let cache_mb = cache_mb.max(MIN_CACHE_MB);
        info!("Allotted {}MB cache to {}", cache_mb, path.display());

        let db = sled::Config::new()
            .path(path)
            .cache_capacity(cache_mb * 1024 * 1024)
            .open()?;
        Ok(Self {
            blocks: db.open_tree(BLOCKS_TREE)?,
            hashes: db.open_tree(HASHES_TREE)?,
            state: db.open_tree(STATE_TREE)?,
            db,
            path: path.to_path_buf(),
        })
    }

    /// Database directory
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the genesis block of `descriptor` unless one is already there.
    ///
    /// An existing genesis block must match the descriptor.
    pub fn init_genesis(&self, descriptor: &ChainDescriptor) -> Result<StoredBlock, StoreError> {
        let genesis = Genesis::build(descriptor)?;

        if let Some(existing) = self.block_by_number(0)? {
            if existing.hash != genesis.block.hash {
                return Err(StoreError::GenesisMismatch {
                    stored: existing.hash,
                    configured: genesis.block.hash,
                });
            }
            debug!(hash = %existing.hash, "Genesis block already present");
            return Ok(existing);
        }
        self.write_genesis(&genesis)
    }

    /// Drop whatever chain is stored and write the genesis of `descriptor`.
    ///
    /// Used for developer chains, whose genesis follows the keystore.
    pub fn replace_genesis(&self, descriptor: &ChainDescriptor) -> Result<StoredBlock, StoreError> {
        let genesis = Genesis::build(descriptor)?;
        if let Some(existing) = self.block_by_number(0)? {
            if existing.hash == genesis.block.hash {
                return Ok(existing);
            }
            warn!(
                stored = %existing.hash,
                configured = %genesis.block.hash,
                "Replacing stored genesis block"
            );
        }
        self.blocks.clear()?;
        self.hashes.clear()?;
        self.state.clear()?;
        self.write_genesis(&genesis)
    }

    fn write_genesis(&self, genesis: &Genesis) -> Result<StoredBlock, StoreError> {
        for entry in &genesis.alloc {
            let account = DumpAccount {
                balance: entry.balance.to_string(),
                nonce: genesis.starting_nonce,
            };
            self.state
                .insert(entry.address.as_bytes(), serde_json::to_vec(&account)?)?;
        }
        self.blocks
            .insert(0u64.to_be_bytes(), serde_json::to_vec(&genesis.block)?)?;
        self.hashes
            .insert(genesis.hash, 0u64.to_be_bytes().to_vec())?;
        self.db.flush()?;

        info!(
            hash = %genesis.block.hash,
            accounts = genesis.alloc.len(),
            "Wrote genesis block"
        );
        Ok(genesis.block.clone())
    }

    /// Flush and close the database, returning once its directory lock is
    /// released so the same path can be opened again right away.
    pub fn close(self) -> Result<(), StoreError> {
        self.db.flush()?;
        let Self {
            db,
            blocks,
            hashes,
            state,
            path,
        } = self;
        drop((blocks, hashes, state));
        drop(db);
        wait_for_release(&path.join(SLED_LOCK_FILE))
    }

    /// Block at `number`
    pub fn block_by_number(&self, number: u64) -> Result<Option<StoredBlock>, StoreError> {
        self.blocks
            .get(number.to_be_bytes())?
            .map(|raw| serde_json::from_slice(&raw).map_err(StoreError::from))
            .transpose()
    }

    /// Block with `hash`
    pub fn block_by_hash(&self, hash: &[u8; 32]) -> Result<Option<StoredBlock>, StoreError> {
        let Some(raw) = self.hashes.get(hash)? else {
            return Ok(None);
        };
        let number = <[u8; 8]>::try_from(&raw[..])
            .map_err(|_| StoreError::Corrupt(format!("hash index entry of {} bytes", raw.len())))?;
        self.block_by_number(u64::from_be_bytes(number))
    }

    /// Account state at `block`, optionally restricted to `filter`.
    ///
    /// Only the genesis state is held here, so every block dumps the state
    /// its root commits to.
    pub fn dump(&self, block: &StoredBlock, filter: &[Address]) -> Result<StateDump, StoreError> {
        let mut accounts = BTreeMap::new();
        for item in self.state.iter() {
            let (key, value) = item?;
            let address = <[u8; 20]>::try_from(&key[..])
                .map_err(|_| StoreError::Corrupt(format!("state key of {} bytes", key.len())))?;
            let address = Address::from_bytes(address);
            if !filter.is_empty() && !filter.contains(&address) {
                continue;
            }
            let account: DumpAccount = serde_json::from_slice(&value)?;
            accounts.insert(hex::encode(address.as_bytes()), account);
        }
        Ok(StateDump {
            root: block.state_root.clone(),
            accounts,
        })
    }
}

/// Genesis block and state derived from a descriptor
struct Genesis {
    block: StoredBlock,
    hash: [u8; 32],
    alloc: Vec<AllocationEntry>,
    starting_nonce: u64,
}

impl Genesis {
    fn build(descriptor: &ChainDescriptor) -> Result<Self, StoreError> {
        let genesis = descriptor
            .genesis
            .as_ref()
            .ok_or_else(|| DescriptorError::invalid("genesis", "missing genesis block"))?;
        let header = genesis.header()?;
        let alloc = genesis.allocation()?;
        let starting_nonce = descriptor.state.as_ref().map_or(0, |s| s.starting_nonce);

        let mut root_input = Vec::with_capacity(alloc.len() * 52);
        for entry in &alloc {
            root_input.extend_from_slice(entry.address.as_bytes());
            root_input.extend_from_slice(&entry.balance.to_be_bytes::<32>());
        }
        let state_root = keccak256(&root_input);
        let hash = header.hash(&state_root);

        let block = StoredBlock {
            number: 0,
            hash: hex_prefixed(&hash),
            parent_hash: hex_prefixed(&header.parent_hash),
            state_root: hex_prefixed(&state_root),
            coinbase: header.coinbase,
            difficulty: hex_prefixed(&header.difficulty),
            gas_limit: hex_prefixed(&header.gas_limit),
            timestamp: hex_prefixed(&header.timestamp),
            extra_data: hex_prefixed(&header.extra_data),
            nonce: hex_prefixed(&header.nonce),
        };
        Ok(Self {
            block,
            hash,
            alloc,
            starting_nonce,
        })
    }
}

/// Wait until nothing holds the exclusive lock on `lock_file`.
///
/// sled lets go of its lock from a background thread after the last handle
/// is dropped.
fn wait_for_release(lock_file: &Path) -> Result<(), StoreError> {
    let file = match OpenOptions::new().read(true).write(true).open(lock_file) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(StoreError::Io(e)),
    };
    for _ in 0..CLOSE_ATTEMPTS {
        if file.try_lock_exclusive().is_ok() {
            file.unlock().map_err(StoreError::Io)?;
            return Ok(());
        }
        thread::sleep(CLOSE_POLL);
    }
    Err(StoreError::StillOpen(lock_file.to_path_buf()))
}

fn hex_prefixed(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Chain database errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database engine error
    #[error("database error: {0}")]
    Sled(#[from] sled::Error),
    /// The directory holds a legacy LevelDB database
    #[error("{0} holds a legacy LevelDB database")]
    LegacyFormat(PathBuf),
    /// Stored genesis differs from the configured one
    #[error("database already contains genesis {stored}, configuration wants {configured}")]
    GenesisMismatch {
        /// Hash in the database
        stored: String,
        /// Hash from the descriptor
        configured: String,
    },
    /// Unreadable record
    #[error("corrupt database record: {0}")]
    Corrupt(String),
    /// Database file access failed
    #[error("database IO error: {0}")]
    Io(#[source] io::Error),
    /// The database was still locked after closing
    #[error("database {0} is still locked after closing")]
    StillOpen(PathBuf),
    /// Record encoding error
    #[error("record encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
    /// Genesis could not be built from the descriptor
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{defaults, AllocationEntry, ChainIdentity};
    use alloy_primitives::U256;

    fn descriptor_with_alloc() -> ChainDescriptor {
        let mut descriptor = defaults::builtin(&ChainIdentity::Morden).unwrap();
        let genesis = descriptor.genesis.as_mut().unwrap();
        genesis.set_allocation(&[
            AllocationEntry {
                address: Address::from_bytes([1u8; 20]),
                balance: U256::from(100u64),
            },
            AllocationEntry {
                address: Address::from_bytes([2u8; 20]),
                balance: U256::from(200u64),
            },
        ]);
        descriptor
    }

    #[test]
    fn test_genesis_is_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChainStore::open(&dir.path().join("chaindata"), 16).unwrap();
        let descriptor = descriptor_with_alloc();

        let first = store.init_genesis(&descriptor).unwrap();
        let second = store.init_genesis(&descriptor).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.number, 0);
        assert!(first.hash.starts_with("0x"));
        assert_eq!(first.hash.len(), 66);
    }

    #[test]
    fn test_lookup_by_hash() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChainStore::open(&dir.path().join("chaindata"), 16).unwrap();
        let genesis = store.init_genesis(&descriptor_with_alloc()).unwrap();

        let mut hash = [0u8; 32];
        hex::decode_to_slice(&genesis.hash[2..], &mut hash).unwrap();
        assert_eq!(store.block_by_hash(&hash).unwrap(), Some(genesis));
        assert_eq!(store.block_by_hash(&[0u8; 32]).unwrap(), None);
        assert_eq!(store.block_by_number(1).unwrap(), None);
    }

    #[test]
    fn test_dump_with_and_without_filter() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChainStore::open(&dir.path().join("chaindata"), 16).unwrap();
        let genesis = store.init_genesis(&descriptor_with_alloc()).unwrap();

        let all = store.dump(&genesis, &[]).unwrap();
        assert_eq!(all.accounts.len(), 2);
        assert_eq!(all.root, genesis.state_root);
        assert_eq!(all.accounts[&hex::encode([2u8; 20])].balance, "200");
        assert_eq!(all.accounts[&hex::encode([2u8; 20])].nonce, 1_048_576);

        let one = store
            .dump(&genesis, &[Address::from_bytes([1u8; 20])])
            .unwrap();
        assert_eq!(one.accounts.len(), 1);
    }

    #[test]
    fn test_different_genesis_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChainStore::open(&dir.path().join("chaindata"), 16).unwrap();
        store.init_genesis(&descriptor_with_alloc()).unwrap();
        let other = defaults::builtin(&ChainIdentity::Mainnet).unwrap();
        assert!(matches!(
            store.init_genesis(&other),
            Err(StoreError::GenesisMismatch { .. })
        ));
    }

    #[test]
    fn test_replace_genesis_drops_old_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChainStore::open(&dir.path().join("chaindata"), 16).unwrap();
        let old = store.init_genesis(&descriptor_with_alloc()).unwrap();

        let mut other = descriptor_with_alloc();
        other.genesis.as_mut().unwrap().set_allocation(&[AllocationEntry {
            address: Address::from_bytes([3u8; 20]),
            balance: U256::from(1u64) << 200,
        }]);
        let new = store.replace_genesis(&other).unwrap();
        assert_ne!(new.hash, old.hash);

        let mut old_hash = [0u8; 32];
        hex::decode_to_slice(&old.hash[2..], &mut old_hash).unwrap();
        assert_eq!(store.block_by_hash(&old_hash).unwrap(), None);

        let dump = store.dump(&new, &[]).unwrap();
        assert_eq!(dump.accounts.len(), 1);
        assert_eq!(
            dump.accounts[&hex::encode([3u8; 20])].balance,
            "1606938044258990275541962092341162602522202993782792835301376"
        );
        assert_eq!(store.init_genesis(&other).unwrap(), new);
        assert_eq!(store.replace_genesis(&other).unwrap(), new);
    }

    #[test]
    fn test_closed_store_reopens_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chaindata");
        for _ in 0..5 {
            let store = ChainStore::open(&path, 16).unwrap();
            store.init_genesis(&descriptor_with_alloc()).unwrap();
            store.close().unwrap();
        }
    }

    #[test]
    fn test_leveldb_is_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let chaindata = dir.path().join("chaindata");
        std::fs::create_dir(&chaindata).unwrap();
        std::fs::write(chaindata.join("CURRENT"), b"MANIFEST-000001\n").unwrap();
        assert_eq!(detect_format(&chaindata), DatabaseFormat::LevelDb);
        assert!(matches!(
            ChainStore::open(&chaindata, 128),
            Err(StoreError::LegacyFormat(_))
        ));
    }

    #[test]
    fn test_reopen_sees_native_format() {
        let dir = tempfile::tempdir().unwrap();
        let chaindata = dir.path().join("chaindata");
        {
            let store = ChainStore::open(&chaindata, 16).unwrap();
            store.init_genesis(&descriptor_with_alloc()).unwrap();
        }
        assert_eq!(detect_format(&chaindata), DatabaseFormat::Native);
        let store = ChainStore::open(&chaindata, 16).unwrap();
        assert!(store.block_by_number(0).unwrap().is_some());
    }
}
