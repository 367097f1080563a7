//! Resolved node configuration.
//!
//! [`NodeConfig`] is built once from flags, the chain resolver and the
//! optional app config file, and is not mutated afterwards: developer mode
//! and dev-genesis seeding produce new values instead.

pub mod app;

pub use app::{AppConfig, AppConfigError, APP_CONFIG_FILE};

use crate::accounts::KdfStrength;
use crate::chain::{resolve_chain, ChainDescriptor, ChainRequest, ResolvedChain};
use crate::cli::GlobalArgs;
use crate::datadir::layout::{IPC_FILE, KEYSTORE_DIR};
use crate::datadir::{DataDirSpec, GenuineDataPolicy};
use crate::error::NodeError;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default database cache in MB
pub const DEFAULT_CACHE_MB: u64 = 128;

/// IPC endpoint settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IpcConfig {
    /// `--ipc-disable`
    pub disabled: bool,
    /// Endpoint name or path
    pub path: String,
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            disabled: false,
            path: IPC_FILE.to_string(),
        }
    }
}

impl IpcConfig {
    /// Where the endpoint lives for a node running in `chain_dir`.
    ///
    /// A bare file name is placed in the chain directory; any other path is
    /// used as given.
    #[must_use]
    pub fn endpoint(&self, chain_dir: &Path) -> Option<PathBuf> {
        if self.disabled || self.path.is_empty() {
            return None;
        }
        #[cfg(windows)]
        let endpoint = {
            const PIPE_PREFIX: &str = r"\\.\pipe\";
            let _ = chain_dir;
            if self.path.starts_with(PIPE_PREFIX) {
                PathBuf::from(&self.path)
            } else {
                PathBuf::from(format!("{PIPE_PREFIX}{}", self.path))
            }
        };
        #[cfg(not(windows))]
        let endpoint = {
            let path = Path::new(&self.path);
            if path.file_name() == Some(path.as_os_str()) {
                chain_dir.join(path)
            } else {
                path.to_path_buf()
            }
        };
        Some(endpoint)
    }
}

/// Everything the node needs to know to start.
#[derive(Clone, Debug)]
pub struct NodeConfig {
    /// Data directory locations
    pub data_dir: DataDirSpec,
    /// Chain to run
    pub chain: ResolvedChain,
    /// `--key-store`
    pub keystore_override: Option<PathBuf>,
    /// IPC endpoint
    pub ipc: IpcConfig,
    /// Database cache in MB
    pub cache_mb: u64,
    /// Disable peer discovery
    pub no_discover: bool,
    /// Light key derivation
    pub light_kdf: bool,
    /// Mining requested
    pub mine: bool,
    /// Mine only when there are pending transactions
    pub automine: bool,
    /// Developer mode
    pub dev: bool,
    /// Password file for new accounts
    pub password_file: Option<PathBuf>,
    /// Legacy genuineness policy
    pub genuine_data: GenuineDataPolicy,
}

impl NodeConfig {
    /// Build the configuration from parsed flags.
    pub fn resolve(args: &GlobalArgs) -> Result<Self, NodeError> {
        let data_dir = DataDirSpec::resolve(args.data_dir.clone())?;
        let chain = resolve_chain(ChainRequest {
            chain: args.chain.as_deref(),
            testnet: args.testnet,
            dev: args.dev,
            descriptor_path: args.chain_config.as_deref(),
        })?;

        let app = match &args.app_config {
            Some(path) => AppConfig::load_from_file(path)?,
            None => AppConfig::load_optional(
                &data_dir.chain_dir(chain.dir_name()).join(APP_CONFIG_FILE),
            )?,
        };
        debug!(?app, "Application config");

        let config = Self {
            keystore_override: args.key_store.clone(),
            ipc: IpcConfig {
                disabled: args.ipc_disable,
                path: args
                    .ipc_path
                    .clone()
                    .or(app.ipc_path)
                    .unwrap_or_else(|| IPC_FILE.to_string()),
            },
            cache_mb: args.cache.or(app.cache).unwrap_or(DEFAULT_CACHE_MB),
            no_discover: args.no_discover || app.no_discover.unwrap_or(false),
            light_kdf: args.light_kdf || app.light_kdf.unwrap_or(false),
            mine: args.mine,
            automine: false,
            dev: args.dev,
            password_file: args.password.clone(),
            genuine_data: app.migration.unwrap_or_default(),
            data_dir,
            chain,
        };

        Ok(if config.dev {
            config.with_dev_overlay()
        } else {
            config
        })
    }

    /// Build directly from resolved parts with default settings
    #[must_use]
    pub fn new(data_dir: DataDirSpec, chain: ResolvedChain) -> Self {
        Self {
            data_dir,
            chain,
            keystore_override: None,
            ipc: IpcConfig::default(),
            cache_mb: DEFAULT_CACHE_MB,
            no_discover: false,
            light_kdf: false,
            mine: false,
            automine: false,
            dev: false,
            password_file: None,
            genuine_data: GenuineDataPolicy::default(),
        }
    }

    /// Developer mode settings: no discovery, light KDF, mining on.
    #[must_use]
    pub fn with_dev_overlay(self) -> Self {
        Self {
            no_discover: true,
            light_kdf: true,
            mine: true,
            dev: true,
            ..self
        }
    }

    /// Switch to a seeded dev descriptor and turn on automine
    #[must_use]
    pub fn with_dev_genesis(self, descriptor: ChainDescriptor) -> Self {
        Self {
            chain: self.chain.with_descriptor(descriptor),
            automine: true,
            ..self
        }
    }

    /// Directory of the active chain
    #[must_use]
    pub fn chain_dir(&self) -> PathBuf {
        self.data_dir.chain_dir(self.chain.dir_name())
    }

    /// Keystore directory
    #[must_use]
    pub fn keystore_dir(&self) -> PathBuf {
        self.keystore_override
            .clone()
            .unwrap_or_else(|| self.chain_dir().join(KEYSTORE_DIR))
    }

    /// Key derivation strength
    #[must_use]
    pub fn kdf(&self) -> KdfStrength {
        if self.light_kdf {
            KdfStrength::Light
        } else {
            KdfStrength::Standard
        }
    }

    /// IPC endpoint, if enabled
    #[must_use]
    pub fn ipc_endpoint(&self) -> Option<PathBuf> {
        self.ipc.endpoint(&self.chain_dir())
    }
}
