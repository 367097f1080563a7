//! Classification of a base data directory.

use super::layout::{
    CHAINDATA_DIR, FOREIGN_DATA_DIR, KEYSTORE_DIR, LEGACY_DIRS, NODEKEY_FILE, STAGING_SUFFIX,
};
use crate::chain::identity::{MAINNET, MORDEN};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

/// What the base data directory contains.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LegacyClassification {
    /// Nothing there, or nothing the node recognizes
    Absent,
    /// Already laid out per chain
    Current,
    /// Top-level data written by this product, with a real chain database
    MigratableOwnSchema,
    /// Data written by a different product
    ForeignSchema,
    /// Top-level markers of this product but no usable chain database
    MigratableEmpty,
}

impl LegacyClassification {
    /// Only genuine legacy data is ever moved
    #[must_use]
    pub fn is_migratable(self) -> bool {
        self == Self::MigratableOwnSchema
    }

    /// Short description for logs and status output
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Absent => "absent",
            Self::Current => "current",
            Self::MigratableOwnSchema => "legacy",
            Self::ForeignSchema => "foreign",
            Self::MigratableEmpty => "legacy-empty",
        }
    }
}

impl fmt::Display for LegacyClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_required_files() -> Vec<String> {
    ["CURRENT", "LOCK", "LOG"].map(String::from).to_vec()
}

/// What a chain database must look like to count as real data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenuineDataPolicy {
    /// Files that must exist inside `chaindata`
    #[serde(default = "default_required_files")]
    pub required_chaindata_files: Vec<String>,
    /// Minimum total size of `chaindata`
    #[serde(default)]
    pub min_chaindata_bytes: u64,
}

impl Default for GenuineDataPolicy {
    fn default() -> Self {
        Self {
            required_chaindata_files: default_required_files(),
            min_chaindata_bytes: 0,
        }
    }
}

impl GenuineDataPolicy {
    /// Check a `chaindata` directory against the policy
    pub fn is_genuine(&self, chaindata: &Path) -> io::Result<bool> {
        if !chaindata.is_dir() {
            return Ok(false);
        }
        if !self
            .required_chaindata_files
            .iter()
            .all(|name| chaindata.join(name).is_file())
        {
            return Ok(false);
        }
        if self.min_chaindata_bytes == 0 {
            return Ok(true);
        }
        Ok(dir_size(chaindata)? >= self.min_chaindata_bytes)
    }
}

fn dir_size(dir: &Path) -> io::Result<u64> {
    let mut total = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let metadata = entry.metadata()?;
        total += if metadata.is_dir() {
            dir_size(&entry.path())?
        } else {
            metadata.len()
        };
    }
    Ok(total)
}

/// Inspects a base directory and decides what it holds.
///
/// Classification only reads; it never changes the directory.
#[derive(Clone, Debug, Default)]
pub struct LegacyLayoutDetector {
    policy: GenuineDataPolicy,
}

impl LegacyLayoutDetector {
    /// Create a detector with the given genuineness policy
    #[must_use]
    pub fn new(policy: GenuineDataPolicy) -> Self {
        Self { policy }
    }

    /// Classify `base`.
    pub fn classify(&self, base: &Path) -> io::Result<LegacyClassification> {
        let metadata = match fs::metadata(base) {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(LegacyClassification::Absent)
            }
            Err(e) => return Err(e),
        };
        if !metadata.is_dir() {
            return Ok(LegacyClassification::ForeignSchema);
        }

        if !chain_subdirs(base)?.is_empty() {
            return Ok(LegacyClassification::Current);
        }

        let chaindata = base.join(CHAINDATA_DIR);
        if chaindata.is_dir() {
            return Ok(if self.policy.is_genuine(&chaindata)? {
                LegacyClassification::MigratableOwnSchema
            } else {
                LegacyClassification::MigratableEmpty
            });
        }

        // A foreign install keeps its own keystore at the top level too, so
        // this has to be ruled out before looking at the remaining markers.
        if base.join(FOREIGN_DATA_DIR).is_dir() {
            return Ok(LegacyClassification::ForeignSchema);
        }

        let has_markers = LEGACY_DIRS.iter().any(|d| base.join(d).is_dir())
            || base.join(NODEKEY_FILE).is_file();
        Ok(if has_markers {
            LegacyClassification::MigratableEmpty
        } else {
            LegacyClassification::Absent
        })
    }
}

/// Names of the per-chain subdirectories under `base`.
pub fn chain_subdirs(base: &Path) -> io::Result<Vec<String>> {
    let mut found = Vec::new();
    for entry in fs::read_dir(base)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if name.starts_with('.')
            || name.ends_with(STAGING_SUFFIX)
            || name == FOREIGN_DATA_DIR
            || LEGACY_DIRS.contains(&name.as_str())
        {
            continue;
        }
        let path = entry.path();
        let is_chain = name == MAINNET
            || name == MORDEN
            || path.join(CHAINDATA_DIR).is_dir()
            || path.join(KEYSTORE_DIR).is_dir()
            || path.join(NODEKEY_FILE).is_file();
        if is_chain {
            found.push(name);
        }
    }
    found.sort();
    Ok(found)
}
