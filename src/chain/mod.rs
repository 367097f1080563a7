//! Chain identity resolution.
//!
//! Turns `--chain`, `--testnet`, `--dev` and `--chain-config` into one
//! [`ResolvedChain`]. Nothing here writes to disk; an invalid descriptor is
//! reported before the data directory is looked at.

pub mod defaults;
pub mod descriptor;
pub mod identity;

pub use descriptor::{
    AllocationEntry, ChainDescriptor, DescriptorError, ForkSchedule, GenesisDump, GenesisHeader,
};
pub use identity::{ChainIdentity, IdentityError};

use std::path::Path;
use tracing::{debug, info};

/// Chain-related inputs, already parsed from flags
#[derive(Clone, Copy, Debug, Default)]
pub struct ChainRequest<'a> {
    /// `--chain`
    pub chain: Option<&'a str>,
    /// `--testnet`
    pub testnet: bool,
    /// `--dev`
    pub dev: bool,
    /// `--chain-config`
    pub descriptor_path: Option<&'a Path>,
}

/// The chain the node will run, with its validated descriptor.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedChain {
    /// Chain identity
    pub identity: ChainIdentity,
    /// Validated descriptor
    pub descriptor: ChainDescriptor,
    /// Whether the descriptor came from a user-supplied file
    pub external: bool,
}

impl ResolvedChain {
    /// Name of the chain's subdirectory
    #[must_use]
    pub fn dir_name(&self) -> &str {
        self.identity.dir_name()
    }

    /// Legacy data is only ever adopted by a built-in chain
    #[must_use]
    pub fn migration_eligible(&self) -> bool {
        !self.external && self.identity.is_builtin()
    }

    /// Network id from the descriptor
    #[must_use]
    pub fn network_id(&self) -> u64 {
        self.descriptor.network
    }

    /// Replace the descriptor, keeping the identity
    #[must_use]
    pub fn with_descriptor(self, descriptor: ChainDescriptor) -> Self {
        Self { descriptor, ..self }
    }
}

/// Chain resolution errors
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    /// Bad `--chain` value
    #[error(transparent)]
    Identity(#[from] IdentityError),
    /// Flags that cannot be combined
    #[error("{0}")]
    Conflict(String),
    /// The descriptor failed to load or validate
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
}

/// Resolve the chain identity and descriptor.
pub fn resolve_chain(request: ChainRequest<'_>) -> Result<ResolvedChain, ChainError> {
    let from_flag = request.chain.map(ChainIdentity::parse).transpose()?;

    if request.testnet {
        if let Some(other) = from_flag.as_ref().filter(|id| **id != ChainIdentity::Morden) {
            return Err(ChainError::Conflict(format!(
                "invalid flags: --testnet cannot be combined with --chain {other}"
            )));
        }
    }

    let identity = match from_flag {
        Some(id) => id,
        None if request.testnet || request.dev => ChainIdentity::Morden,
        None => ChainIdentity::Mainnet,
    };

    let Some(path) = request.descriptor_path else {
        let descriptor = defaults::builtin(&identity)?;
        debug!(chain = %identity, "Using built-in chain configuration");
        return Ok(ResolvedChain {
            identity,
            descriptor,
            external: false,
        });
    };

    let descriptor = ChainDescriptor::from_file(path)?;
    let identity = if descriptor.identity.is_empty() {
        identity
    } else {
        ChainIdentity::parse(&descriptor.identity)
            .map_err(|e| DescriptorError::invalid("identity", e))?
    };
    info!(
        chain = %identity,
        name = %descriptor.name,
        file = %path.display(),
        "Loaded external chain configuration"
    );
    Ok(ResolvedChain {
        identity,
        descriptor,
        external: true,
    })
}
