//! Chain identities and their directory names.

use std::fmt;

/// Directory name of the main Ethereum Classic network
pub const MAINNET: &str = "mainnet";

/// Directory name of the Morden test network
pub const MORDEN: &str = "morden";

/// Network id of the main network
pub const MAINNET_NETWORK_ID: u64 = 1;

/// Network id of Morden
pub const MORDEN_NETWORK_ID: u64 = 2;

/// Which chain the node is running.
///
/// Identities with the same canonical name are the same chain: `main` and
/// `mainnet` both resolve to [`ChainIdentity::Mainnet`], `testnet` and
/// `morden` both resolve to [`ChainIdentity::Morden`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum ChainIdentity {
    /// The main network
    #[default]
    Mainnet,
    /// The Morden test network
    Morden,
    /// Any other chain, named by its data subdirectory
    Custom(String),
}

impl ChainIdentity {
    /// Parse a user-provided chain name.
    pub fn parse(name: &str) -> Result<Self, IdentityError> {
        match name {
            "" => Err(IdentityError::Empty),
            "mainnet" | "main" => Ok(Self::Mainnet),
            "morden" | "testnet" => Ok(Self::Morden),
            other => {
                if other.starts_with('.')
                    || other.contains(['/', '\\'])
                    || other.chars().any(char::is_control)
                {
                    return Err(IdentityError::InvalidName(other.to_string()));
                }
                Ok(Self::Custom(other.to_string()))
            }
        }
    }

    /// Canonical name, also the chain's subdirectory under the base data dir
    #[must_use]
    pub fn dir_name(&self) -> &str {
        match self {
            Self::Mainnet => MAINNET,
            Self::Morden => MORDEN,
            Self::Custom(name) => name,
        }
    }

    /// True for the chains this client ships descriptors for
    #[must_use]
    pub fn is_builtin(&self) -> bool {
        !matches!(self, Self::Custom(_))
    }

    /// Network id for the built-in chains
    #[must_use]
    pub fn network_id(&self) -> Option<u64> {
        match self {
            Self::Mainnet => Some(MAINNET_NETWORK_ID),
            Self::Morden => Some(MORDEN_NETWORK_ID),
            Self::Custom(_) => None,
        }
    }
}

impl fmt::Display for ChainIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Chain name errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    /// Empty `--chain` value
    #[error("invalid chain name: must not be empty")]
    Empty,
    /// The name cannot be used as a directory name
    #[error("invalid chain name {0:?}: must be a plain directory name")]
    InvalidName(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aliases_collapse() {
        assert_eq!(ChainIdentity::parse("main"), Ok(ChainIdentity::Mainnet));
        assert_eq!(ChainIdentity::parse("mainnet"), Ok(ChainIdentity::Mainnet));
        assert_eq!(ChainIdentity::parse("testnet"), Ok(ChainIdentity::Morden));
        assert_eq!(ChainIdentity::parse("morden"), Ok(ChainIdentity::Morden));
    }

    #[test]
    fn test_custom_chain() {
        let id = ChainIdentity::parse("kitty").unwrap();
        assert_eq!(id.dir_name(), "kitty");
        assert!(!id.is_builtin());
        assert_eq!(id.network_id(), None);
    }

    #[test]
    fn test_builtin_network_ids() {
        assert_eq!(ChainIdentity::Mainnet.network_id(), Some(1));
        assert_eq!(ChainIdentity::Morden.network_id(), Some(2));
    }

    #[test]
    fn test_rejects_names_that_escape_the_base() {
        assert_eq!(ChainIdentity::parse(""), Err(IdentityError::Empty));
        for bad in ["../etc", "a/b", ".hidden", "a\\b"] {
            assert!(matches!(
                ChainIdentity::parse(bad),
                Err(IdentityError::InvalidName(_))
            ));
        }
    }
}
