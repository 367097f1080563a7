//! Migration of legacy top-level data into the per-chain layout.
//!
//! Legacy entries are first renamed into a hidden staging directory next to
//! the target, and the staging directory is renamed onto the target in one
//! step. A failure part way rolls every moved entry back, and a staging
//! directory left behind by a crash is rolled back on the next start.

use super::detect::{GenuineDataPolicy, LegacyClassification, LegacyLayoutDetector};
use super::layout::{staging_dir, staging_lock, DataDirSpec, LEGACY_DIRS, LEGACY_FILES, STAGING_SUFFIX};
use super::lock::{DirLock, LockError};
use crate::chain::ResolvedChain;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Why nothing was moved
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// `--data-dir` was given
    DataDirOverride,
    /// No data at the default location
    NothingFound,
    /// The default location is already per-chain
    AlreadyCurrent,
    /// The default location belongs to another product
    ForeignLayout,
    /// Legacy markers without a usable chain database
    EmptyLegacy,
    /// A custom chain or an external descriptor never adopts legacy data
    NotEligible,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::DataDirOverride => "data directory set explicitly",
            Self::NothingFound => "no existing data",
            Self::AlreadyCurrent => "already per-chain",
            Self::ForeignLayout => "data belongs to another client",
            Self::EmptyLegacy => "legacy data has no chain database",
            Self::NotEligible => "chain cannot adopt legacy data",
        })
    }
}

/// What the migrator did
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// Legacy entries were moved into the chain directory
    Migrated {
        /// Names of the entries moved
        moved: Vec<String>,
    },
    /// Nothing was moved; the chain directory was created if missing
    Skipped(SkipReason),
}

/// Result of [`DataDirMigrator::run`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MigrationReport {
    /// Classification of the default base directory
    pub classification: LegacyClassification,
    /// Whether a pre-rename brand directory was adopted
    pub brand_renamed: bool,
    /// What happened
    pub outcome: MigrationOutcome,
    /// The chain directory the node will use
    pub chain_dir: PathBuf,
}

impl MigrationReport {
    /// True when legacy entries were moved
    #[must_use]
    pub fn migrated(&self) -> bool {
        matches!(self.outcome, MigrationOutcome::Migrated { .. })
    }
}

impl fmt::Display for MigrationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            MigrationOutcome::Migrated { moved } => {
                write!(f, "migrated {} legacy entries ({})", moved.len(), moved.join(", "))
            }
            MigrationOutcome::Skipped(reason) => write!(f, "skipped: {reason}"),
        }?;
        if self.brand_renamed {
            f.write_str(", adopted legacy brand directory")?;
        }
        Ok(())
    }
}

/// Moves legacy data into place, or initializes a fresh chain directory.
#[derive(Debug)]
pub struct DataDirMigrator<'a> {
    spec: &'a DataDirSpec,
    detector: LegacyLayoutDetector,
}

impl<'a> DataDirMigrator<'a> {
    /// Create a migrator for `spec`
    #[must_use]
    pub fn new(spec: &'a DataDirSpec, policy: GenuineDataPolicy) -> Self {
        Self {
            spec,
            detector: LegacyLayoutDetector::new(policy),
        }
    }

    /// Establish the chain directory for `chain`.
    pub fn run(&self, chain: &ResolvedChain) -> Result<MigrationReport, MigrationError> {
        let default_base = self.spec.default_base();
        let chain_dir = self.spec.chain_dir(chain.dir_name());

        if self.spec.is_overridden() {
            // Only reported; the default base is never touched here.
            let classification = self.classify(default_base).unwrap_or_else(|e| {
                debug!(default = %default_base.display(), error = %e, "Default data directory unreadable");
                LegacyClassification::Absent
            });
            debug!(default = %default_base.display(), %classification, "Data directory overridden, not migrating");
            ensure_chain_dir(&chain_dir)?;
            return Ok(MigrationReport {
                classification,
                brand_renamed: false,
                outcome: MigrationOutcome::Skipped(SkipReason::DataDirOverride),
                chain_dir,
            });
        }

        recover_interrupted(default_base)?;
        let brand_renamed = self.adopt_legacy_brand(chain)?;
        let classification = self.classify(default_base)?;

        let skip = match classification {
            LegacyClassification::Absent => Some(SkipReason::NothingFound),
            LegacyClassification::Current => Some(SkipReason::AlreadyCurrent),
            LegacyClassification::ForeignSchema => Some(SkipReason::ForeignLayout),
            LegacyClassification::MigratableEmpty => Some(SkipReason::EmptyLegacy),
            LegacyClassification::MigratableOwnSchema if !chain.migration_eligible() => {
                Some(SkipReason::NotEligible)
            }
            LegacyClassification::MigratableOwnSchema => None,
        };

        let outcome = match skip {
            Some(reason) => {
                debug!(base = %default_base.display(), %classification, %reason, "No migration");
                ensure_chain_dir(&chain_dir)?;
                MigrationOutcome::Skipped(reason)
            }
            None => {
                let moved = migrate_into(default_base, chain.dir_name(), rename)?;
                info!(
                    from = %default_base.display(),
                    to = %chain_dir.display(),
                    entries = moved.len(),
                    "Migrated existing data directory into chain subdirectory"
                );
                MigrationOutcome::Migrated { moved }
            }
        };

        Ok(MigrationReport {
            classification,
            brand_renamed,
            outcome,
            chain_dir,
        })
    }

    fn classify(&self, base: &Path) -> Result<LegacyClassification, MigrationError> {
        self.detector
            .classify(base)
            .map_err(|source| MigrationError::Io {
                path: base.to_path_buf(),
                source,
            })
    }

    /// Rename the pre-rebrand base directory to the current one when only
    /// the old one exists and it holds this product's data.
    fn adopt_legacy_brand(&self, chain: &ResolvedChain) -> Result<bool, MigrationError> {
        let Some(old) = self.spec.legacy_brand_base() else {
            return Ok(false);
        };
        let new = self.spec.default_base();
        if new.exists() || !chain.migration_eligible() {
            return Ok(false);
        }
        if !self.classify(old)?.is_migratable() {
            return Ok(false);
        }
        if let Some(parent) = new.parent() {
            fs::create_dir_all(parent).map_err(|source| MigrationError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::rename(old, new).map_err(|source| MigrationError::BrandRename {
            from: old.to_path_buf(),
            to: new.to_path_buf(),
            source,
        })?;
        warn!(
            from = %old.display(),
            to = %new.display(),
            "Moved existing data directory to the Ethereum Classic location"
        );
        Ok(true)
    }
}

fn rename(from: &Path, to: &Path) -> io::Result<()> {
    fs::rename(from, to)
}

fn ensure_chain_dir(chain_dir: &Path) -> Result<(), MigrationError> {
    if chain_dir.exists() && !chain_dir.is_dir() {
        return Err(MigrationError::Conflict(chain_dir.to_path_buf()));
    }
    fs::create_dir_all(chain_dir).map_err(|source| MigrationError::Io {
        path: chain_dir.to_path_buf(),
        source,
    })
}

/// Move every legacy entry of `base` into `base/<chain>`, all or nothing.
///
/// `rename` is the primitive used for every move.
fn migrate_into<F>(base: &Path, chain: &str, mut rename: F) -> Result<Vec<String>, MigrationError>
where
    F: FnMut(&Path, &Path) -> io::Result<()>,
{
    let target = base.join(chain);
    if target.exists() {
        return Err(MigrationError::Conflict(target));
    }

    let staging = staging_dir(base, chain);
    let lock_path = staging_lock(&staging);
    let lock = DirLock::acquire(&lock_path)?;
    if let Err(source) = fs::create_dir(&staging) {
        drop(lock);
        let _ = fs::remove_file(&lock_path);
        return Err(MigrationError::Io {
            path: staging,
            source,
        });
    }

    let present = LEGACY_DIRS
        .iter()
        .filter(|name| base.join(name).is_dir())
        .chain(LEGACY_FILES.iter().filter(|name| base.join(name).is_file()));

    let mut moved: Vec<String> = Vec::new();
    for name in present {
        if let Err(source) = rename(&base.join(name), &staging.join(name)) {
            roll_back(base, &staging, &moved);
            drop(lock);
            let _ = fs::remove_file(&lock_path);
            return Err(MigrationError::Move {
                name: (*name).to_string(),
                target,
                source,
            });
        }
        debug!(entry = %name, "Staged legacy entry");
        moved.push((*name).to_string());
    }

    if let Err(source) = rename(&staging, &target) {
        roll_back(base, &staging, &moved);
        drop(lock);
        let _ = fs::remove_file(&lock_path);
        return Err(MigrationError::Move {
            name: staging.display().to_string(),
            target,
            source,
        });
    }

    drop(lock);
    let _ = fs::remove_file(&lock_path);
    Ok(moved)
}

/// Move staged entries back to `base` and remove the staging directory.
fn roll_back(base: &Path, staging: &Path, moved: &[String]) {
    for name in moved.iter().rev() {
        let original = base.join(name);
        if original.exists() {
            warn!(entry = %name, "Not restoring staged entry, original location is occupied");
            continue;
        }
        if let Err(e) = fs::rename(staging.join(name), &original) {
            warn!(entry = %name, error = %e, "Failed to restore staged entry");
        }
    }
    if let Err(e) = fs::remove_dir(staging) {
        warn!(staging = %staging.display(), error = %e, "Staging directory left behind");
    }
}

/// Roll back staging directories an interrupted migration left in `base`.
fn recover_interrupted(base: &Path) -> Result<(), MigrationError> {
    let entries = match fs::read_dir(base) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(source) => {
            return Err(MigrationError::Io {
                path: base.to_path_buf(),
                source,
            })
        }
    };

    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        let is_staging =
            name.starts_with('.') && name.ends_with(STAGING_SUFFIX) && entry.path().is_dir();
        if !is_staging {
            continue;
        }
        let staging = entry.path();
        let lock_path = staging_lock(&staging);
        let lock = match DirLock::acquire(&lock_path) {
            Ok(lock) => lock,
            Err(LockError::InUse(_)) => return Err(MigrationError::InProgress(staging)),
            Err(e) => return Err(e.into()),
        };

        let staged: Vec<String> = fs::read_dir(&staging)
            .map_err(|source| MigrationError::Io {
                path: staging.clone(),
                source,
            })?
            .flatten()
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        warn!(
            staging = %staging.display(),
            entries = staged.len(),
            "Rolling back interrupted migration"
        );
        roll_back(base, &staging, &staged);
        drop(lock);
        let _ = fs::remove_file(&lock_path);
    }
    Ok(())
}

/// Migration errors
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    /// A legacy entry could not be moved; everything was rolled back
    #[error("failed to move legacy {name} into {target}: {source}")]
    Move {
        /// Entry name
        name: String,
        /// Destination chain directory
        target: PathBuf,
        /// Cause
        #[source]
        source: io::Error,
    },
    /// The pre-rebrand directory could not be renamed
    #[error("failed to move data directory {from} to {to}: {source}")]
    BrandRename {
        /// Old base
        from: PathBuf,
        /// New base
        to: PathBuf,
        /// Cause
        #[source]
        source: io::Error,
    },
    /// The chain directory path is taken by something else
    #[error("{0} already exists and is not a usable chain directory")]
    Conflict(PathBuf),
    /// Another process is migrating right now
    #[error("migration already in progress at {0}")]
    InProgress(PathBuf),
    /// Lock failure
    #[error(transparent)]
    Lock(#[from] LockError),
    /// Filesystem failure outside a move
    #[error("data directory error at {path}: {source}")]
    Io {
        /// Path involved
        path: PathBuf,
        /// Cause
        #[source]
        source: io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{resolve_chain, ChainRequest};
    use std::collections::BTreeSet;

    fn seed_legacy(base: &Path) {
        let chaindata = base.join("chaindata");
        fs::create_dir_all(&chaindata).unwrap();
        for name in ["CURRENT", "LOCK", "LOG", "000001.ldb"] {
            fs::write(chaindata.join(name), name.as_bytes()).unwrap();
        }
        fs::create_dir(base.join("keystore")).unwrap();
        fs::write(base.join("keystore/UTC--key"), b"{}").unwrap();
        fs::create_dir(base.join("nodes")).unwrap();
        fs::create_dir(base.join("dapp")).unwrap();
        fs::write(base.join("nodekey"), b"abcd").unwrap();
    }

    fn listing(dir: &Path) -> BTreeSet<String> {
        fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect()
    }

    fn chain(name: Option<&str>) -> ResolvedChain {
        resolve_chain(ChainRequest {
            chain: name,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_legacy_moves_into_mainnet() {
        let home = tempfile::tempdir().unwrap();
        let base = home.path().join("classic");
        seed_legacy(&base);
        let spec = DataDirSpec::from_parts(base.clone(), None, None);

        let report = DataDirMigrator::new(&spec, GenuineDataPolicy::default())
            .run(&chain(None))
            .unwrap();

        assert!(report.migrated());
        assert_eq!(report.classification, LegacyClassification::MigratableOwnSchema);
        assert_eq!(listing(&base), BTreeSet::from(["mainnet".to_string()]));
        assert_eq!(
            fs::read(base.join("mainnet/chaindata/000001.ldb")).unwrap(),
            b"000001.ldb"
        );
        assert_eq!(fs::read(base.join("mainnet/nodekey")).unwrap(), b"abcd");
    }

    #[test]
    fn test_second_run_is_a_no_op() {
        let home = tempfile::tempdir().unwrap();
        let base = home.path().join("classic");
        seed_legacy(&base);
        let spec = DataDirSpec::from_parts(base.clone(), None, None);
        let migrator = DataDirMigrator::new(&spec, GenuineDataPolicy::default());

        migrator.run(&chain(None)).unwrap();
        let before = listing(&base.join("mainnet"));
        let report = migrator.run(&chain(None)).unwrap();
        assert_eq!(report.outcome, MigrationOutcome::Skipped(SkipReason::AlreadyCurrent));
        assert_eq!(listing(&base.join("mainnet")), before);
    }

    #[test]
    fn test_custom_chain_leaves_legacy_alone() {
        let home = tempfile::tempdir().unwrap();
        let base = home.path().join("classic");
        seed_legacy(&base);
        let spec = DataDirSpec::from_parts(base.clone(), None, None);

        let report = DataDirMigrator::new(&spec, GenuineDataPolicy::default())
            .run(&chain(Some("kitty")))
            .unwrap();

        assert_eq!(report.outcome, MigrationOutcome::Skipped(SkipReason::NotEligible));
        assert!(base.join("chaindata/CURRENT").is_file());
        assert!(base.join("kitty").is_dir());
    }

    #[test]
    fn test_override_never_touches_default_base() {
        let home = tempfile::tempdir().unwrap();
        let base = home.path().join("classic");
        let custom = home.path().join("custom");
        seed_legacy(&base);
        let before = listing(&base);
        let spec = DataDirSpec::from_parts(base.clone(), None, Some(custom.clone()));

        let report = DataDirMigrator::new(&spec, GenuineDataPolicy::default())
            .run(&chain(None))
            .unwrap();

        assert_eq!(report.outcome, MigrationOutcome::Skipped(SkipReason::DataDirOverride));
        assert_eq!(listing(&base), before);
        assert!(custom.join("mainnet").is_dir());
    }

    #[test]
    fn test_override_ignores_unreadable_default_base() {
        let home = tempfile::tempdir().unwrap();
        // Resolving a path through a regular file fails with ENOTDIR.
        let blocker = home.path().join("blocker");
        fs::write(&blocker, b"").unwrap();
        let base = blocker.join("classic");
        let custom = home.path().join("custom");
        let spec = DataDirSpec::from_parts(base, None, Some(custom.clone()));

        let report = DataDirMigrator::new(&spec, GenuineDataPolicy::default())
            .run(&chain(None))
            .unwrap();

        assert_eq!(report.classification, LegacyClassification::Absent);
        assert_eq!(report.outcome, MigrationOutcome::Skipped(SkipReason::DataDirOverride));
        assert!(custom.join("mainnet").is_dir());
    }

    #[test]
    fn test_unreadable_default_base_fails_without_override() {
        let home = tempfile::tempdir().unwrap();
        let blocker = home.path().join("blocker");
        fs::write(&blocker, b"").unwrap();
        let spec = DataDirSpec::from_parts(blocker.join("classic"), None, None);

        let err = DataDirMigrator::new(&spec, GenuineDataPolicy::default())
            .run(&chain(None))
            .unwrap_err();
        assert!(matches!(err, MigrationError::Io { .. }));
    }

    #[test]
    fn test_empty_legacy_gets_fresh_chain_dir() {
        let home = tempfile::tempdir().unwrap();
        let base = home.path().join("classic");
        fs::create_dir_all(base.join("chaindata")).unwrap();
        fs::create_dir_all(base.join("keystore")).unwrap();
        let spec = DataDirSpec::from_parts(base.clone(), None, None);

        let report = DataDirMigrator::new(&spec, GenuineDataPolicy::default())
            .run(&chain(None))
            .unwrap();

        assert_eq!(report.outcome, MigrationOutcome::Skipped(SkipReason::EmptyLegacy));
        assert!(base.join("chaindata").is_dir());
        assert!(base.join("keystore").is_dir());
        assert!(base.join("mainnet").is_dir());
    }

    #[test]
    fn test_failed_move_rolls_back() {
        let home = tempfile::tempdir().unwrap();
        let base = home.path().join("classic");
        seed_legacy(&base);
        let before = listing(&base);

        let mut calls = 0;
        let err = migrate_into(&base, "mainnet", |from, to| {
            calls += 1;
            if calls == 3 {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
            }
            fs::rename(from, to)
        })
        .unwrap_err();

        assert!(matches!(err, MigrationError::Move { .. }));
        assert_eq!(listing(&base), before);
        assert_eq!(fs::read(base.join("nodekey")).unwrap(), b"abcd");
    }

    #[test]
    fn test_failed_staging_creation_releases_lock_file() {
        let home = tempfile::tempdir().unwrap();
        let base = home.path().join("classic");
        seed_legacy(&base);
        let staging = staging_dir(&base, "mainnet");
        fs::write(&staging, b"in the way").unwrap();

        let err = migrate_into(&base, "mainnet", rename).unwrap_err();

        assert!(matches!(err, MigrationError::Io { .. }));
        assert!(!staging_lock(&staging).exists());
        assert!(base.join("chaindata/CURRENT").is_file());
    }

    #[test]
    fn test_interrupted_staging_is_rolled_back() {
        let home = tempfile::tempdir().unwrap();
        let base = home.path().join("classic");
        seed_legacy(&base);
        let staging = staging_dir(&base, "mainnet");
        fs::create_dir(&staging).unwrap();
        fs::rename(base.join("chaindata"), staging.join("chaindata")).unwrap();
        fs::rename(base.join("nodekey"), staging.join("nodekey")).unwrap();

        recover_interrupted(&base).unwrap();

        assert!(!staging.exists());
        assert!(base.join("chaindata/CURRENT").is_file());
        assert!(base.join("nodekey").is_file());
    }

    #[test]
    fn test_held_staging_lock_blocks_recovery() {
        let home = tempfile::tempdir().unwrap();
        let base = home.path().join("classic");
        seed_legacy(&base);
        let staging = staging_dir(&base, "mainnet");
        fs::create_dir(&staging).unwrap();
        let _held = DirLock::acquire(&staging_lock(&staging)).unwrap();

        let err = recover_interrupted(&base).unwrap_err();
        assert!(matches!(err, MigrationError::InProgress(_)));
        assert!(staging.exists());
    }

    #[test]
    fn test_brand_rename_then_migrate() {
        let home = tempfile::tempdir().unwrap();
        let old = home.path().join("old-brand");
        let base = home.path().join("classic");
        seed_legacy(&old);
        let spec = DataDirSpec::from_parts(base.clone(), Some(old.clone()), None);

        let report = DataDirMigrator::new(&spec, GenuineDataPolicy::default())
            .run(&chain(None))
            .unwrap();

        assert!(report.brand_renamed);
        assert!(report.migrated());
        assert!(!old.exists());
        assert!(base.join("mainnet/chaindata/CURRENT").is_file());
    }

    #[test]
    fn test_foreign_old_brand_is_left_alone() {
        let home = tempfile::tempdir().unwrap();
        let old = home.path().join("old-brand");
        let base = home.path().join("classic");
        fs::create_dir_all(old.join("geth/chaindata")).unwrap();
        fs::write(old.join("geth.ipc"), b"").unwrap();
        let spec = DataDirSpec::from_parts(base.clone(), Some(old.clone()), None);

        let report = DataDirMigrator::new(&spec, GenuineDataPolicy::default())
            .run(&chain(None))
            .unwrap();

        assert!(!report.brand_renamed);
        assert!(old.join("geth/chaindata").is_dir());
        assert!(base.join("mainnet").is_dir());
    }

    #[test]
    fn test_file_in_place_of_chain_dir_is_a_conflict() {
        let home = tempfile::tempdir().unwrap();
        let base = home.path().join("classic");
        fs::create_dir_all(&base).unwrap();
        fs::write(base.join("kitty"), b"not a dir").unwrap();
        let spec = DataDirSpec::from_parts(base, None, None);

        let err = DataDirMigrator::new(&spec, GenuineDataPolicy::default())
            .run(&chain(Some("kitty")))
            .unwrap_err();
        assert!(matches!(err, MigrationError::Conflict(_)));
    }
}
