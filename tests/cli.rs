//! End-to-end tests for the `etc-node` binary.
//!
//! Every test points `HOME` at a fresh temporary directory so the default
//! data directory resolves to `<tmp>/.ethereum-classic` and the legacy brand
//! location to `<tmp>/.ethereum`.
#![cfg(all(unix, not(target_os = "macos")))]

use assert_cmd::Command;
use predicates::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn node(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("etc-node").unwrap();
    cmd.env("HOME", home).env_remove("RUST_LOG");
    cmd
}

fn base(home: &Path) -> PathBuf {
    home.join(".ethereum-classic")
}

/// A legacy flat layout whose chaindata looks like a real database
fn genuine_legacy(base: &Path) {
    let chaindata = base.join("chaindata");
    fs::create_dir_all(&chaindata).unwrap();
    for name in ["CURRENT", "LOCK", "LOG", "000001.ldb"] {
        fs::write(chaindata.join(name), b"leveldb").unwrap();
    }
    fs::create_dir_all(base.join("keystore")).unwrap();
    fs::write(base.join("keystore").join("UTC--legacy"), b"{}").unwrap();
    fs::write(base.join("nodekey"), b"legacy-nodekey").unwrap();
}

/// Every file under `dir` with its contents, keyed by relative path
fn snapshot(dir: &Path) -> BTreeMap<PathBuf, Option<Vec<u8>>> {
    let mut entries = BTreeMap::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in fs::read_dir(&current).unwrap() {
            let path = entry.unwrap().path();
            let relative = path.strip_prefix(dir).unwrap().to_path_buf();
            if path.is_dir() {
                entries.insert(relative, None);
                pending.push(path);
            } else {
                entries.insert(relative, Some(fs::read(&path).unwrap()));
            }
        }
    }
    entries
}

fn chain_config_with(home: &Path, edit: impl FnOnce(&mut serde_json::Value)) -> PathBuf {
    let exported = home.join("exported.json");
    node(home)
        .args(["dump-chain-config"])
        .arg(&exported)
        .assert()
        .success();
    let mut value: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&exported).unwrap()).unwrap();
    edit(&mut value);
    let path = home.join("custom.json");
    fs::write(&path, serde_json::to_string_pretty(&value).unwrap()).unwrap();
    path
}

mod argument_errors {
    use super::*;

    #[test]
    fn unknown_flag_exits_with_one() {
        let home = TempDir::new().unwrap();
        node(home.path())
            .arg("--no-such-flag")
            .assert()
            .code(1)
            .stdout(predicate::str::is_empty())
            .stderr(predicate::str::contains("flag provided but not defined"));
        assert!(!base(home.path()).exists());
    }

    #[test]
    fn unknown_command_exits_with_three() {
        let home = TempDir::new().unwrap();
        node(home.path())
            .arg("frobnicate")
            .assert()
            .code(3)
            .stdout(predicate::str::contains("Invalid command: \"frobnicate\""));
        assert!(!base(home.path()).exists());
    }

    #[test]
    fn help_succeeds() {
        let home = TempDir::new().unwrap();
        node(home.path())
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("dump-chain-config"));
    }

    #[test]
    fn testnet_conflicts_with_another_chain() {
        let home = TempDir::new().unwrap();
        node(home.path())
            .args(["--testnet", "--chain", "kitty"])
            .assert()
            .code(1);
        assert!(!base(home.path()).exists());
    }
}

mod migration {
    use super::*;

    #[test]
    fn genuine_legacy_moves_into_mainnet() {
        let home = TempDir::new().unwrap();
        let base = base(home.path());
        genuine_legacy(&base);

        node(home.path()).assert().success();

        let mainnet = base.join("mainnet");
        assert!(mainnet.join("chaindata").join("CURRENT").is_file());
        assert!(mainnet.join("keystore").join("UTC--legacy").is_file());
        assert_eq!(fs::read(mainnet.join("nodekey")).unwrap(), b"legacy-nodekey");
        assert!(!base.join("chaindata").exists());
        assert!(!base.join("keystore").exists());
        assert!(!base.join("nodekey").exists());
    }

    #[test]
    fn testnet_flag_moves_into_morden() {
        let home = TempDir::new().unwrap();
        let base = base(home.path());
        genuine_legacy(&base);

        node(home.path()).arg("--testnet").assert().success();

        assert!(base.join("morden").join("chaindata").join("CURRENT").is_file());
        assert!(!base.join("mainnet").exists());
        assert!(!base.join("chaindata").exists());
    }

    #[test]
    fn custom_chain_leaves_legacy_alone() {
        let home = TempDir::new().unwrap();
        let base = base(home.path());
        genuine_legacy(&base);

        node(home.path()).args(["--chain", "kitty"]).assert().success();

        assert!(base.join("kitty").is_dir());
        assert!(base.join("chaindata").join("CURRENT").is_file());
        assert!(base.join("nodekey").is_file());
        assert!(!base.join("mainnet").exists());
    }

    #[test]
    fn empty_legacy_is_left_and_mainnet_starts_fresh() {
        let home = TempDir::new().unwrap();
        let base = base(home.path());
        fs::create_dir_all(base.join("chaindata")).unwrap();
        fs::create_dir_all(base.join("keystore")).unwrap();

        node(home.path()).assert().success();

        assert!(base.join("chaindata").is_dir());
        assert!(base.join("keystore").is_dir());
        assert!(base.join("mainnet").join("chaindata").is_dir());
    }

    #[test]
    fn bare_nodekey_legacy_is_left_and_mainnet_starts_fresh() {
        let home = TempDir::new().unwrap();
        let base = base(home.path());
        fs::create_dir_all(base.join("chaindata")).unwrap();
        fs::write(base.join("nodekey"), b"legacy-nodekey").unwrap();
        let before = snapshot(&base);

        node(home.path()).assert().success();

        let mut after = snapshot(&base);
        after.retain(|path, _| !path.starts_with("mainnet"));
        assert_eq!(after, before);
        let chaindata = base.join("mainnet").join("chaindata");
        assert!(fs::read_dir(&chaindata).unwrap().next().is_some());
        assert_ne!(
            fs::read(base.join("mainnet").join("nodekey")).unwrap(),
            b"legacy-nodekey"
        );
    }

    #[test]
    fn foreign_install_is_not_touched() {
        let home = TempDir::new().unwrap();
        let foreign = home.path().join(".ethereum");
        fs::create_dir_all(foreign.join("geth").join("chaindata")).unwrap();
        fs::create_dir_all(foreign.join("keystore")).unwrap();

        node(home.path()).assert().success();

        assert!(foreign.join("geth").join("chaindata").is_dir());
        assert!(foreign.join("keystore").is_dir());
        assert!(base(home.path()).join("mainnet").is_dir());
    }

    #[test]
    fn old_brand_directory_is_adopted() {
        let home = TempDir::new().unwrap();
        let old = home.path().join(".ethereum");
        genuine_legacy(&old);

        node(home.path()).assert().success();

        assert!(!old.exists());
        let mainnet = base(home.path()).join("mainnet");
        assert!(mainnet.join("chaindata").join("CURRENT").is_file());
        assert!(mainnet.join("keystore").join("UTC--legacy").is_file());
    }

    #[test]
    fn second_start_is_a_no_op() {
        let home = TempDir::new().unwrap();
        let base = base(home.path());
        genuine_legacy(&base);

        node(home.path()).assert().success();
        node(home.path()).assert().success();

        assert!(base.join("mainnet").join("chaindata").join("CURRENT").is_file());
        assert!(!base.join("mainnet").join("mainnet").exists());
    }
}

mod data_dir_override {
    use super::*;

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn both_spellings_behave_the_same() {
        let home = TempDir::new().unwrap();
        let a = home.path().join("a");
        let b = home.path().join("b");

        node(home.path()).arg("--data-dir").arg(&a).assert().success();
        node(home.path()).arg("--datadir").arg(&b).assert().success();

        assert_eq!(entries(&a), entries(&b));
        assert_eq!(entries(&a.join("mainnet")), entries(&b.join("mainnet")));
        assert!(!base(home.path()).exists());
    }

    #[test]
    fn override_never_migrates_the_default() {
        let home = TempDir::new().unwrap();
        let base = base(home.path());
        genuine_legacy(&base);
        let custom = home.path().join("custom");

        node(home.path()).arg("--datadir").arg(&custom).assert().success();

        assert!(base.join("chaindata").join("CURRENT").is_file());
        assert!(!base.join("mainnet").exists());
        assert!(custom.join("mainnet").is_dir());
    }
}

mod chain_config {
    use super::*;

    #[test]
    fn dump_chain_config_writes_the_builtin_descriptor() {
        let home = TempDir::new().unwrap();
        let out = home.path().join("nested").join("mainnet.json");

        node(home.path())
            .arg("dump-chain-config")
            .arg(&out)
            .assert()
            .success();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(value["network"], 1);
        assert!(!base(home.path()).exists());
    }

    #[test]
    fn invalid_descriptor_fails_before_touching_disk() {
        let home = TempDir::new().unwrap();
        let path = chain_config_with(home.path(), |v| {
            v["genesis"]["coinbase"] = serde_json::json!("0xnothex");
        });

        node(home.path())
            .arg("--chain-config")
            .arg(&path)
            .assert()
            .code(1)
            .stderr(predicate::str::contains("invalid chain configuration"));
        assert!(!base(home.path()).exists());
    }

    #[test]
    fn invalid_descriptor_leaves_legacy_untouched() {
        let home = TempDir::new().unwrap();
        let path = chain_config_with(home.path(), |v| {
            v["genesis"]["coinbase"] = serde_json::json!("0xnothex");
        });
        let base = base(home.path());
        genuine_legacy(&base);
        let before = snapshot(&base);

        node(home.path())
            .arg("--chain-config")
            .arg(&path)
            .assert()
            .code(1)
            .stderr(predicate::str::contains("invalid chain configuration"));

        assert_eq!(snapshot(&base), before);
    }

    #[test]
    fn descriptor_identity_picks_the_directory() {
        let home = TempDir::new().unwrap();
        let path = chain_config_with(home.path(), |v| {
            v["identity"] = serde_json::json!("private");
        });
        genuine_legacy(&base(home.path()));

        node(home.path())
            .arg("--chainconfig")
            .arg(&path)
            .assert()
            .success();

        assert!(base(home.path()).join("private").is_dir());
        assert!(base(home.path()).join("chaindata").is_dir());
    }

    #[test]
    fn missing_descriptor_file_is_reported() {
        let home = TempDir::new().unwrap();
        node(home.path())
            .args(["--chain-config", "/definitely/not/here.json"])
            .assert()
            .code(1)
            .stderr(predicate::str::contains("invalid chain configuration"));
    }
}

mod commands {
    use super::*;

    #[test]
    fn status_reports_chain_and_network() {
        let home = TempDir::new().unwrap();
        node(home.path())
            .arg("--testnet")
            .assert()
            .success()
            .stdout(predicate::str::contains("morden"))
            .stdout(predicate::str::contains("Network:    2"));
    }

    #[test]
    fn cache_size_is_logged() {
        let home = TempDir::new().unwrap();
        node(home.path())
            .args(["--cache", "32"])
            .assert()
            .success()
            .stderr(predicate::str::contains("Allotted 32MB cache"));
    }

    #[test]
    fn dump_without_blocks_is_rejected() {
        let home = TempDir::new().unwrap();
        node(home.path())
            .arg("dump")
            .assert()
            .code(1)
            .stderr(predicate::str::contains("invalid argument"));
        assert!(!base(home.path()).exists());
    }

    #[test]
    fn dump_genesis_prints_state() {
        let home = TempDir::new().unwrap();
        node(home.path())
            .args(["dump", "0"])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"root\""));
    }

    #[test]
    fn version_prints_client_name() {
        let home = TempDir::new().unwrap();
        node(home.path())
            .arg("version")
            .assert()
            .success()
            .stdout(predicate::str::contains("etc-node"))
            .stdout(predicate::str::contains("Version:"));
    }

    #[test]
    fn account_new_then_list() {
        let home = TempDir::new().unwrap();
        let password = home.path().join("password.txt");
        fs::write(&password, "secret\n").unwrap();

        node(home.path())
            .args(["--light-kdf", "--password"])
            .arg(&password)
            .args(["account", "new"])
            .assert()
            .success()
            .stdout(predicate::str::starts_with("Address: {"));

        node(home.path())
            .args(["account", "list"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Account #0: {"));
    }
}

mod dev_mode {
    use super::*;

    fn keyfiles(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .filter(|n| n.starts_with("UTC--"))
            .collect();
        names.sort();
        names
    }

    #[test]
    fn first_start_seeds_accounts_and_genesis() {
        let home = TempDir::new().unwrap();
        node(home.path())
            .arg("--dev")
            .assert()
            .success()
            .stdout(predicate::str::contains("automine"));

        let morden = base(home.path()).join("morden");
        assert_eq!(keyfiles(&morden.join("keystore")).len(), 10);
        let csv = fs::read_to_string(morden.join("dev_genesis_alloc.csv")).unwrap();
        assert_eq!(csv.lines().count(), 10);
        assert!(morden.join("chain.json").is_file());
        assert!(morden.join("dev_genesis.json").is_file());
    }

    #[test]
    fn restart_keeps_accounts_and_chain_file() {
        let home = TempDir::new().unwrap();
        node(home.path()).arg("--dev").assert().success();

        let morden = base(home.path()).join("morden");
        let accounts = keyfiles(&morden.join("keystore"));
        let chain_json = fs::read(morden.join("chain.json")).unwrap();

        node(home.path()).arg("--dev").assert().success();

        assert_eq!(keyfiles(&morden.join("keystore")), accounts);
        assert_eq!(fs::read(morden.join("chain.json")).unwrap(), chain_json);
    }
}
