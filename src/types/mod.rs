//! Primitive types shared by the chain, keystore and store modules.

pub mod address;
pub mod prefixed_hex;

pub use address::{keccak256, Address, AddressError};
pub use prefixed_hex::{HexError, PrefixedHex};
