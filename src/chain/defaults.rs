//! Built-in chain descriptors.

use super::descriptor::{ChainDescriptor, DescriptorError};
use super::identity::ChainIdentity;

const MAINNET_JSON: &str = include_str!("defaults/mainnet.json");
const MORDEN_JSON: &str = include_str!("defaults/morden.json");

/// Descriptor the client ships for `identity`.
///
/// Custom chains without a descriptor file get the Morden template under
/// their own name.
pub fn builtin(identity: &ChainIdentity) -> Result<ChainDescriptor, DescriptorError> {
    match identity {
        ChainIdentity::Mainnet => ChainDescriptor::from_json(MAINNET_JSON),
        ChainIdentity::Morden => ChainDescriptor::from_json(MORDEN_JSON),
        ChainIdentity::Custom(name) => {
            let mut descriptor = ChainDescriptor::from_json(MORDEN_JSON)?;
            descriptor.identity.clone_from(name);
            descriptor.name.clone_from(name);
            Ok(descriptor)
        }
    }
}
