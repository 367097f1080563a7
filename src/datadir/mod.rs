//! Data directory layout, legacy detection and migration.

pub mod detect;
pub mod layout;
pub mod lock;
pub mod migrate;

pub use detect::{GenuineDataPolicy, LegacyClassification, LegacyLayoutDetector};
pub use layout::{DataDirSpec, LayoutError};
pub use lock::{DirLock, LockError};
pub use migrate::{DataDirMigrator, MigrationError, MigrationOutcome, MigrationReport, SkipReason};
