//! # `etc-node`
//!
//! Startup core of an Ethereum Classic node: everything that has to be
//! decided before any blockchain data is touched.
//!
//! ## Startup sequence
//!
//! 1. Flags are parsed and normalized ([`cli`]).
//! 2. The chain identity and, optionally, an external chain descriptor are
//!    resolved and validated ([`chain`]).
//! 3. The OS-default base data directory is classified ([`datadir::detect`]).
//! 4. Legacy contents are migrated into the per-chain layout, or a fresh
//!    chain directory is initialized ([`datadir::migrate`]).
//! 5. In developer mode, accounts and a dev genesis are seeded ([`devmode`]).
//!
//! Each step runs only after the previous one succeeded; a failure in an
//! earlier step leaves the filesystem untouched.

#![forbid(unsafe_code)]
#![deny(clippy::all, rust_2018_idioms)]
#![warn(clippy::pedantic, clippy::nursery, missing_docs)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    // Intentional numeric casts - byte sizes and cache sizes are bounded
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    // Const fn not always beneficial for complex types
    clippy::missing_const_for_fn,
    // must_use on every fn is excessive
    clippy::must_use_candidate,
    // Pass by value is fine for small config values
    clippy::needless_pass_by_value,
    // Field naming matches on-disk terminology
    clippy::struct_field_names,
    // Match arms with same body are sometimes clearer separate
    clippy::match_same_arms
)]

pub mod accounts;
pub mod chain;
pub mod cli;
pub mod config;
pub mod datadir;
pub mod devmode;
pub mod error;
pub mod node;
pub mod store;
pub mod types;

pub use chain::{resolve_chain, ChainDescriptor, ChainIdentity, ChainRequest, ResolvedChain};
pub use config::NodeConfig;
pub use datadir::{DataDirMigrator, DataDirSpec, LegacyClassification, LegacyLayoutDetector};
pub use error::NodeError;
pub use node::{Node, PreparedNode};
pub use types::{Address, AddressError};

/// Client version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Client name, as shown in usage and status output
pub const CLIENT_NAME: &str = "etc-node";
