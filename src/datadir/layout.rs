//! Data directory locations and the names of things inside them.

use std::path::{Path, PathBuf};

/// Chain database directory
pub const CHAINDATA_DIR: &str = "chaindata";
/// Encrypted key files
pub const KEYSTORE_DIR: &str = "keystore";
/// Peer database
pub const NODES_DIR: &str = "nodes";
/// Dapp storage
pub const DAPP_DIR: &str = "dapp";
/// Node identity key
pub const NODEKEY_FILE: &str = "nodekey";
/// Default IPC endpoint name
pub const IPC_FILE: &str = "geth.ipc";
/// Subdirectory a different product keeps its chain data in
pub const FOREIGN_DATA_DIR: &str = "geth";

/// Directories a pre-per-chain installation kept at the top level
pub const LEGACY_DIRS: [&str; 4] = [DAPP_DIR, KEYSTORE_DIR, CHAINDATA_DIR, NODES_DIR];
/// Files a pre-per-chain installation kept at the top level
pub const LEGACY_FILES: [&str; 2] = [NODEKEY_FILE, IPC_FILE];

/// Suffix of a migration staging directory
pub const STAGING_SUFFIX: &str = ".migrating";

#[cfg(target_os = "macos")]
fn platform_bases() -> Option<(PathBuf, PathBuf)> {
    let library = dirs::home_dir()?.join("Library");
    Some((library.join("EthereumClassic"), library.join("Ethereum")))
}

#[cfg(windows)]
fn platform_bases() -> Option<(PathBuf, PathBuf)> {
    let roaming = dirs::data_dir()?;
    Some((roaming.join("EthereumClassic"), roaming.join("Ethereum")))
}

#[cfg(not(any(target_os = "macos", windows)))]
fn platform_bases() -> Option<(PathBuf, PathBuf)> {
    let home = dirs::home_dir()?;
    Some((home.join(".ethereum-classic"), home.join(".ethereum")))
}

/// Where the node keeps its data.
///
/// The OS-default base is always known (unless there is no home directory),
/// even when the user points the node elsewhere: legacy detection only ever
/// looks at the default, never at a user-chosen directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataDirSpec {
    default_base: PathBuf,
    legacy_brand_base: Option<PathBuf>,
    override_dir: Option<PathBuf>,
}

impl DataDirSpec {
    /// Resolve from the platform defaults and an optional `--data-dir`.
    pub fn resolve(override_dir: Option<PathBuf>) -> Result<Self, LayoutError> {
        match (platform_bases(), override_dir) {
            (Some((default_base, legacy)), override_dir) => Ok(Self {
                default_base,
                legacy_brand_base: Some(legacy),
                override_dir,
            }),
            (None, Some(dir)) => Ok(Self {
                default_base: dir.clone(),
                legacy_brand_base: None,
                override_dir: Some(dir),
            }),
            (None, None) => Err(LayoutError::NoHomeDirectory),
        }
    }

    /// Build from explicit locations
    #[must_use]
    pub fn from_parts(
        default_base: PathBuf,
        legacy_brand_base: Option<PathBuf>,
        override_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            default_base,
            legacy_brand_base,
            override_dir,
        }
    }

    /// Base directory the node runs in
    #[must_use]
    pub fn base(&self) -> &Path {
        self.override_dir.as_deref().unwrap_or(&self.default_base)
    }

    /// OS-default base directory
    #[must_use]
    pub fn default_base(&self) -> &Path {
        &self.default_base
    }

    /// Base directory of the pre-rename brand, if this platform had one
    #[must_use]
    pub fn legacy_brand_base(&self) -> Option<&Path> {
        self.legacy_brand_base.as_deref()
    }

    /// Whether `--data-dir` was given
    #[must_use]
    pub fn is_overridden(&self) -> bool {
        self.override_dir.is_some()
    }

    /// Directory of a chain under the active base
    #[must_use]
    pub fn chain_dir(&self, chain: &str) -> PathBuf {
        self.base().join(chain)
    }
}

/// Staging directory used while migrating into `chain`
#[must_use]
pub fn staging_dir(base: &Path, chain: &str) -> PathBuf {
    base.join(format!(".{chain}{STAGING_SUFFIX}"))
}

/// Lock file guarding a staging directory
#[must_use]
pub fn staging_lock(staging: &Path) -> PathBuf {
    let mut name = staging.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

/// Data directory location errors
#[derive(Debug, thiserror::Error)]
pub enum LayoutError {
    /// Neither a home directory nor `--data-dir`
    #[error("cannot determine a default data directory; set --data-dir")]
    NoHomeDirectory,
}
