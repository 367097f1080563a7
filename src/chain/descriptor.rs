//! External chain descriptor files.
//!
//! A descriptor is a JSON document naming a chain, its network id, its
//! genesis block and its fork schedule. Descriptors may split themselves
//! across files with `include`, and may load the genesis allocation from a
//! two-column CSV via `genesis.alloc_file`. Relative paths are resolved
//! against the file that names them.

use crate::types::{keccak256, Address, HexError, PrefixedHex};
use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Consensus engines a descriptor may select
pub const SUPPORTED_CONSENSUS: [&str; 2] = ["ethash", "ethash-test"];

const DEFAULT_CONSENSUS: &str = "ethash";
const MAX_INCLUDE_DEPTH: usize = 16;

/// A chain configuration loaded from disk or from the built-in defaults.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChainDescriptor {
    /// Deprecated spelling of `identity`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// Chain identity, used as the data subdirectory name
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub identity: String,
    /// Human readable chain name
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Account state parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<StateConfig>,
    /// Network id
    #[serde(default)]
    pub network: u64,
    /// Consensus engine name
    #[serde(default)]
    pub consensus: String,
    /// Genesis block
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genesis: Option<GenesisDump>,
    /// Fork schedule
    #[serde(
        default,
        rename = "chainConfig",
        skip_serializing_if = "Option::is_none"
    )]
    pub chain_config: Option<ForkSchedule>,
    /// Bootstrap node URLs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bootstrap: Vec<String>,
    /// Further descriptor files merged over this one
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<String>,
}

/// Account state parameters
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateConfig {
    /// Nonce newly created accounts start from
    #[serde(default, rename = "startingNonce")]
    pub starting_nonce: u64,
}

/// Genesis block as written in a descriptor.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisDump {
    /// 8-byte proof-of-work nonce
    #[serde(default)]
    pub nonce: PrefixedHex,
    /// Block timestamp
    #[serde(default)]
    pub timestamp: PrefixedHex,
    /// 32-byte parent hash
    #[serde(default, rename = "parentHash")]
    pub parent_hash: PrefixedHex,
    /// Extra data
    #[serde(default, rename = "extraData")]
    pub extra_data: PrefixedHex,
    /// Gas limit
    #[serde(default, rename = "gasLimit")]
    pub gas_limit: PrefixedHex,
    /// Difficulty
    #[serde(default)]
    pub difficulty: PrefixedHex,
    /// 32-byte mix hash
    #[serde(default)]
    pub mixhash: PrefixedHex,
    /// 20-byte coinbase
    #[serde(default)]
    pub coinbase: PrefixedHex,
    /// Pre-funded accounts, keyed by hex address
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub alloc: BTreeMap<String, GenesisAccount>,
    /// CSV file to read `alloc` from
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub alloc_file: String,
}

/// One pre-funded genesis account
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisAccount {
    /// Balance in wei, decimal
    pub balance: String,
}

/// Fork schedule of a chain
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ForkSchedule {
    /// Forks, ordered by activation block once loaded
    #[serde(default)]
    pub forks: Vec<Fork>,
    /// Blocks the client refuses to import
    #[serde(default, rename = "badHashes", skip_serializing_if = "Vec::is_empty")]
    pub bad_hashes: Vec<BadHash>,
}

/// A named fork
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Fork {
    /// Fork name
    pub name: String,
    /// Activation block
    pub block: u64,
    /// Hash the block at `block` must have, if any
    #[serde(
        default,
        rename = "requiredHash",
        skip_serializing_if = "PrefixedHex::is_empty"
    )]
    pub required_hash: PrefixedHex,
    /// Feature parameters. Interpreted by the state engine.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<Value>,
}

/// A block hash rejected at a given height
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadHash {
    /// Block number
    pub block: u64,
    /// Rejected hash
    pub hash: PrefixedHex,
}

/// A typed genesis allocation entry
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AllocationEntry {
    /// Funded account
    pub address: Address,
    /// Balance in wei
    pub balance: U256,
}

/// Decoded genesis header fields
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenesisHeader {
    /// Proof-of-work nonce
    pub nonce: [u8; 8],
    /// Timestamp bytes
    pub timestamp: Vec<u8>,
    /// Parent hash
    pub parent_hash: [u8; 32],
    /// Extra data
    pub extra_data: Vec<u8>,
    /// Gas limit bytes
    pub gas_limit: Vec<u8>,
    /// Difficulty bytes
    pub difficulty: Vec<u8>,
    /// Mix hash
    pub mix_hash: [u8; 32],
    /// Coinbase
    pub coinbase: Address,
}

impl GenesisHeader {
    /// Header hash over the length-prefixed fields and the state root
    #[must_use]
    pub fn hash(&self, state_root: &[u8; 32]) -> [u8; 32] {
        let mut buf = Vec::with_capacity(256);
        for field in [
            &self.parent_hash[..],
            self.coinbase.as_bytes(),
            state_root,
            &self.difficulty,
            &self.gas_limit,
            &self.timestamp,
            &self.extra_data,
            &self.mix_hash,
            &self.nonce,
        ] {
            buf.extend_from_slice(&(field.len() as u32).to_be_bytes());
            buf.extend_from_slice(field);
        }
        keccak256(&buf)
    }
}

impl GenesisDump {
    /// Decode the header fields, checking each field's length.
    pub fn header(&self) -> Result<GenesisHeader, DescriptorError> {
        let field = |name: &'static str| move |e: HexError| DescriptorError::invalid(name, e);
        let coinbase = self
            .coinbase
            .decode_fixed::<20>()
            .map_err(|e| DescriptorError::invalid("genesis.coinbase", format!("malformed coinbase: {e}")))?;
        Ok(GenesisHeader {
            nonce: self.nonce.decode_fixed().map_err(field("genesis.nonce"))?,
            timestamp: self.timestamp.to_bytes().map_err(field("genesis.timestamp"))?,
            parent_hash: self
                .parent_hash
                .decode_fixed()
                .map_err(field("genesis.parentHash"))?,
            extra_data: self.extra_data.to_bytes().map_err(field("genesis.extraData"))?,
            gas_limit: self.gas_limit.to_bytes().map_err(field("genesis.gasLimit"))?,
            difficulty: self.difficulty.to_bytes().map_err(field("genesis.difficulty"))?,
            mix_hash: self.mixhash.decode_fixed().map_err(field("genesis.mixhash"))?,
            coinbase: Address::from_bytes(coinbase),
        })
    }

    /// Typed view of `alloc`, sorted by address
    pub fn allocation(&self) -> Result<Vec<AllocationEntry>, DescriptorError> {
        let mut entries = self
            .alloc
            .iter()
            .map(|(addr, account)| parse_allocation(addr, &account.balance))
            .collect::<Result<Vec<_>, _>>()?;
        entries.sort_by_key(|e| e.address);
        Ok(entries)
    }

    /// Replace `alloc` with the given entries
    pub fn set_allocation(&mut self, entries: &[AllocationEntry]) {
        self.alloc = entries
            .iter()
            .map(|e| {
                (
                    e.address.to_hex(),
                    GenesisAccount {
                        balance: e.balance.to_string(),
                    },
                )
            })
            .collect();
    }
}

impl ChainDescriptor {
    /// Load, merge and validate a descriptor file.
    pub fn from_file(path: &Path) -> Result<Self, DescriptorError> {
        let mut merged = Value::Object(Map::new());
        let mut seen = HashSet::new();
        load_into(path, &mut merged, &mut seen, 0)?;

        let mut descriptor: Self =
            serde_json::from_value(merged).map_err(|e| DescriptorError::Parse {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        descriptor.include.clear();
        descriptor.load_alloc_file()?;
        descriptor.normalize();
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Parse a descriptor from a JSON string. Includes and alloc files are
    /// not followed.
    pub fn from_json(json: &str) -> Result<Self, DescriptorError> {
        let mut descriptor: Self =
            serde_json::from_str(json).map_err(|e| DescriptorError::Parse {
                path: PathBuf::new(),
                reason: e.to_string(),
            })?;
        descriptor.normalize();
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Serialize as pretty JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    fn load_alloc_file(&mut self) -> Result<(), DescriptorError> {
        let Some(genesis) = self.genesis.as_mut() else {
            return Ok(());
        };
        if genesis.alloc_file.is_empty() {
            return Ok(());
        }
        if !genesis.alloc.is_empty() {
            return Err(DescriptorError::invalid(
                "genesis.alloc_file",
                "alloc values already set, but alloc_file also provided",
            ));
        }
        let csv_path = PathBuf::from(&genesis.alloc_file);
        let entries = read_allocation_csv(&csv_path)?;
        genesis.set_allocation(&entries);
        genesis.alloc_file.clear();
        Ok(())
    }

    fn normalize(&mut self) {
        if self.identity.is_empty() && !self.id.is_empty() {
            self.identity = std::mem::take(&mut self.id);
        }
        self.id.clear();
        if self.consensus.is_empty() {
            self.consensus = DEFAULT_CONSENSUS.to_string();
        }
        if let Some(schedule) = self.chain_config.as_mut() {
            schedule.forks.sort_by_key(|f| f.block);
        }
    }

    /// Check every field the node needs before it touches the disk.
    pub fn validate(&self) -> Result<(), DescriptorError> {
        if self.network == 0 {
            return Err(DescriptorError::invalid("network", "must be a non-zero id"));
        }
        if !SUPPORTED_CONSENSUS.contains(&self.consensus.as_str()) {
            return Err(DescriptorError::invalid(
                "consensus",
                format!(
                    "unsupported engine {:?}, must be one of {}",
                    self.consensus,
                    SUPPORTED_CONSENSUS.join(", ")
                ),
            ));
        }

        let genesis = self
            .genesis
            .as_ref()
            .ok_or_else(|| DescriptorError::invalid("genesis", "missing genesis block"))?;
        if genesis.nonce.is_empty() {
            return Err(DescriptorError::invalid("genesis.nonce", "missing"));
        }
        if genesis.gas_limit.is_empty() {
            return Err(DescriptorError::invalid("genesis.gasLimit", "missing"));
        }
        if genesis.difficulty.is_empty() {
            return Err(DescriptorError::invalid("genesis.difficulty", "missing"));
        }
        genesis.header()?;
        genesis.allocation()?;

        let schedule = self
            .chain_config
            .as_ref()
            .ok_or_else(|| DescriptorError::invalid("chainConfig", "missing fork schedule"))?;
        if schedule.forks.is_empty() {
            return Err(DescriptorError::invalid("chainConfig.forks", "no forks defined"));
        }
        for fork in &schedule.forks {
            if !fork.required_hash.is_empty() {
                fork.required_hash
                    .decode_fixed::<32>()
                    .map_err(|e| DescriptorError::invalid("chainConfig.forks.requiredHash", e))?;
            }
        }
        Ok(())
    }

    /// Fork names in activation order
    #[must_use]
    pub fn fork_names(&self) -> Vec<&str> {
        self.chain_config
            .as_ref()
            .map(|s| s.forks.iter().map(|f| f.name.as_str()).collect())
            .unwrap_or_default()
    }
}

fn load_into(
    path: &Path,
    merged: &mut Value,
    seen: &mut HashSet<PathBuf>,
    depth: usize,
) -> Result<(), DescriptorError> {
    if depth > MAX_INCLUDE_DEPTH || !seen.insert(path.to_path_buf()) {
        return Err(DescriptorError::invalid(
            "include",
            format!("{} is included recursively", path.display()),
        ));
    }
    let metadata = fs::metadata(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => DescriptorError::NotFound(path.to_path_buf()),
        _ => DescriptorError::Io {
            path: path.to_path_buf(),
            source: e,
        },
    })?;
    if metadata.is_dir() {
        return Err(DescriptorError::IsDirectory(path.to_path_buf()));
    }
    let text = fs::read_to_string(path).map_err(|e| DescriptorError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut value: Value = serde_json::from_str(&text).map_err(|e| DescriptorError::Parse {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let Value::Object(object) = &mut value else {
        return Err(DescriptorError::Parse {
            path: path.to_path_buf(),
            reason: "top level must be a JSON object".to_string(),
        });
    };

    let includes: Vec<String> = match object.remove("include") {
        Some(v) => serde_json::from_value(v).map_err(|e| DescriptorError::Parse {
            path: path.to_path_buf(),
            reason: format!("include: {e}"),
        })?,
        None => Vec::new(),
    };

    // alloc_file is relative to the file naming it, so pin it before merging.
    if let Some(Value::Object(genesis)) = object.get_mut("genesis") {
        if let Some(Value::String(file)) = genesis.get_mut("alloc_file") {
            if !file.is_empty() {
                *file = resolve_path(file, path).to_string_lossy().into_owned();
            }
        }
    }

    merge(merged, value);

    for include in includes {
        load_into(&resolve_path(&include, path), merged, seen, depth + 1)?;
    }
    Ok(())
}

/// Resolve `reference` relative to the directory holding `origin`.
#[must_use]
pub fn resolve_path(reference: &str, origin: &Path) -> PathBuf {
    let candidate = Path::new(reference);
    if candidate.is_absolute() {
        return candidate.to_path_buf();
    }
    origin
        .parent()
        .map_or_else(|| candidate.to_path_buf(), |dir| dir.join(candidate))
}

/// Deep-merge `overlay` into `base`; objects merge, everything else replaces.
fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        merge(existing, value);
                    }
                    _ => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

fn parse_allocation(address: &str, balance: &str) -> Result<AllocationEntry, DescriptorError> {
    let parsed = Address::from_hex(address)
        .map_err(|e| DescriptorError::invalid("genesis.alloc", format!("{address}: {e}")))?;
    let digits = balance.trim();
    if digits.is_empty() {
        return Err(DescriptorError::invalid(
            "genesis.alloc",
            format!("{address}: balance is empty"),
        ));
    }
    let balance = U256::from_str_radix(digits, 10).map_err(|e| {
        DescriptorError::invalid("genesis.alloc", format!("{address}: balance {balance:?}: {e}"))
    })?;
    Ok(AllocationEntry {
        address: parsed,
        balance,
    })
}

/// Read a genesis allocation CSV: one `address,balance` row per account.
pub fn read_allocation_csv(path: &Path) -> Result<Vec<AllocationEntry>, DescriptorError> {
    let text = fs::read_to_string(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => DescriptorError::NotFound(path.to_path_buf()),
        _ => DescriptorError::Io {
            path: path.to_path_buf(),
            source: e,
        },
    })?;
    let mut entries = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let columns: Vec<&str> = line.split(',').map(|c| c.trim().trim_matches('"')).collect();
        if columns.len() != 2 {
            return Err(DescriptorError::invalid(
                "genesis.alloc_file",
                format!(
                    "{} line {}: expected 2 columns, got {}",
                    path.display(),
                    index + 1,
                    columns.len()
                ),
            ));
        }
        entries.push(parse_allocation(columns[0], columns[1])?);
    }
    Ok(entries)
}

/// Render entries in the format [`read_allocation_csv`] reads.
#[must_use]
pub fn format_allocation_csv(entries: &[AllocationEntry]) -> String {
    entries
        .iter()
        .map(|e| format!("\"{}\",\"{}\"\n", e.address.to_hex(), e.balance))
        .collect()
}

/// Descriptor loading and validation errors.
///
/// Every message starts with `invalid chain configuration` so users can
/// tell a rejected descriptor apart from a failed migration.
#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    /// The file does not exist
    #[error("invalid chain configuration: no file found at {0}")]
    NotFound(PathBuf),
    /// The path is a directory
    #[error("invalid chain configuration: {0} is a directory, not a file")]
    IsDirectory(PathBuf),
    /// The file could not be read
    #[error("invalid chain configuration: cannot read {path}: {source}")]
    Io {
        /// File
        path: PathBuf,
        /// Cause
        #[source]
        source: io::Error,
    },
    /// The file is not valid JSON for a descriptor
    #[error("invalid chain configuration: cannot parse {path:?}: {reason}")]
    Parse {
        /// File
        path: PathBuf,
        /// Parser message
        reason: String,
    },
    /// A field failed validation
    #[error("invalid chain configuration: {field}: {reason}")]
    Invalid {
        /// Field path
        field: &'static str,
        /// What is wrong
        reason: String,
    },
}

impl DescriptorError {
    pub(crate) fn invalid(field: &'static str, reason: impl ToString) -> Self {
        Self::Invalid {
            field,
            reason: reason.to_string(),
        }
    }
}
