//! Account keystore.
//!
//! Each account is one JSON key file in the keystore directory, named
//! `UTC--<created>--<address>` so a plain directory listing is also the
//! creation order. Secret keys are encrypted with a keystream keyed by an
//! scrypt-derived password key; `light` scrypt parameters trade strength
//! for speed and are what developer mode uses.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::types::{keccak256, Address};

/// Current key file format version
const KEYFILE_VERSION: u8 = 3;

/// scrypt `log2(N)` with standard strength
pub const STANDARD_SCRYPT_LOG_N: u8 = 18;
/// scrypt parallelism with standard strength
pub const STANDARD_SCRYPT_P: u32 = 1;

/// scrypt `log2(N)` with `--light-kdf`
pub const LIGHT_SCRYPT_LOG_N: u8 = 12;
/// scrypt parallelism with `--light-kdf`
pub const LIGHT_SCRYPT_P: u32 = 6;

const SCRYPT_R: u32 = 8;
const SCRYPT_DKLEN: usize = 32;

const KDF_NAME: &str = "scrypt";
const CIPHER_NAME: &str = "blake3-xof";
const KEYSTREAM_CONTEXT: &[u8] = b"etc-node keystore keystream";

/// How expensive password key derivation is
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum KdfStrength {
    /// Default strength
    #[default]
    Standard,
    /// Cheap derivation for development
    Light,
}

impl KdfStrength {
    /// scrypt `(log2(N), p)`
    #[must_use]
    pub const fn scrypt_cost(self) -> (u8, u32) {
        match self {
            Self::Standard => (STANDARD_SCRYPT_LOG_N, STANDARD_SCRYPT_P),
            Self::Light => (LIGHT_SCRYPT_LOG_N, LIGHT_SCRYPT_P),
        }
    }
}

/// Key file format
#[derive(Serialize, Deserialize)]
struct KeyFile {
    /// Account address (hex, no prefix)
    address: String,
    /// Encrypted secret key
    crypto: CryptoSection,
    /// Random file id (hex)
    id: String,
    /// Format version
    version: u8,
}

#[derive(Serialize, Deserialize)]
struct CryptoSection {
    cipher: String,
    ciphertext: String,
    kdf: String,
    kdfparams: KdfParams,
    mac: String,
}

#[derive(Serialize, Deserialize)]
struct KdfParams {
    n: u64,
    r: u32,
    p: u32,
    dklen: usize,
    salt: String,
}

/// An account on disk (no secret material)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Account {
    /// Account address
    pub address: Address,
    /// Key file
    pub file: PathBuf,
}

/// Directory of encrypted key files.
#[derive(Clone, Debug)]
pub struct KeyStore {
    dir: PathBuf,
    kdf: KdfStrength,
}

impl KeyStore {
    /// Open (creating if needed) the keystore at `dir`.
    pub fn open(dir: &Path, kdf: KdfStrength) -> Result<Self, KeystoreError> {
        fs::create_dir_all(dir).map_err(|e| KeystoreError::io(dir, e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(dir, fs::Permissions::from_mode(0o700))
                .map_err(|e| KeystoreError::io(dir, e))?;
        }
        Ok(Self {
            dir: dir.to_path_buf(),
            kdf,
        })
    }

    /// Keystore directory
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// All accounts, oldest first.
    ///
    /// Hidden files, directories and files that are not key files are
    /// skipped.
    pub fn accounts(&self) -> Result<Vec<Account>, KeystoreError> {
        let mut accounts = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(|e| KeystoreError::io(&self.dir, e))? {
            let entry = entry.map_err(|e| KeystoreError::io(&self.dir, e))?;
            let path = entry.path();
            let hidden = entry.file_name().to_string_lossy().starts_with('.');
            if hidden || !path.is_file() {
                continue;
            }
            let Ok(contents) = fs::read_to_string(&path) else {
                continue;
            };
            let Ok(key_file) = serde_json::from_str::<KeyFile>(&contents) else {
                tracing::debug!(file = %path.display(), "Skipping non-key file in keystore");
                continue;
            };
            let address = Address::from_hex(&key_file.address).map_err(|e| {
                KeystoreError::Malformed {
                    path: path.clone(),
                    reason: e.to_string(),
                }
            })?;
            accounts.push(Account {
                address,
                file: path,
            });
        }
        accounts.sort_by(|a, b| a.file.cmp(&b.file));
        Ok(accounts)
    }

    /// Generate a key, encrypt it with `password` and write its key file.
    pub fn new_account(&self, password: &str) -> Result<Account, KeystoreError> {
        let signing_key = SigningKey::generate(&mut OsRng);
        let address = Address::from_public_key(signing_key.verifying_key().as_bytes());
        let secret = Zeroizing::new(signing_key.to_bytes());

        let mut salt = [0u8; 32];
        OsRng.fill_bytes(&mut salt);
        let mut id = [0u8; 16];
        OsRng.fill_bytes(&mut id);

        let (log_n, p) = self.kdf.scrypt_cost();
        let derived = derive_key(password, &salt, log_n, SCRYPT_R, p)?;
        let ciphertext = apply_keystream(&derived, &secret[..]);
        let mac = keccak256(&[&derived[16..], &ciphertext[..]].concat());

        let key_file = KeyFile {
            address: hex::encode(address.as_bytes()),
            crypto: CryptoSection {
                cipher: CIPHER_NAME.to_string(),
                ciphertext: hex::encode(&ciphertext),
                kdf: KDF_NAME.to_string(),
                kdfparams: KdfParams {
                    n: 1 << log_n,
                    r: SCRYPT_R,
                    p,
                    dklen: SCRYPT_DKLEN,
                    salt: hex::encode(salt),
                },
                mac: hex::encode(mac),
            },
            id: hex::encode(id),
            version: KEYFILE_VERSION,
        };

        let json = serde_json::to_string_pretty(&key_file)
            .map_err(|e| KeystoreError::Serialization(e.to_string()))?;
        let name = format!(
            "UTC--{}--{}",
            Utc::now().format("%Y-%m-%dT%H-%M-%S%.9fZ"),
            hex::encode(address.as_bytes())
        );
        let path = self.dir.join(name);
        write_private(&path, json.as_bytes())?;

        Ok(Account {
            address,
            file: path,
        })
    }

    /// Decrypt an account's key with `password`.
    pub fn unlock(&self, account: &Account, password: &str) -> Result<SigningKey, KeystoreError> {
        let malformed = |reason: String| KeystoreError::Malformed {
            path: account.file.clone(),
            reason,
        };
        let contents =
            fs::read_to_string(&account.file).map_err(|e| KeystoreError::io(&account.file, e))?;
        let key_file: KeyFile =
            serde_json::from_str(&contents).map_err(|e| malformed(e.to_string()))?;
        if key_file.version != KEYFILE_VERSION {
            return Err(KeystoreError::UnsupportedVersion(key_file.version));
        }
        let crypto = &key_file.crypto;
        if crypto.kdf != KDF_NAME || crypto.cipher != CIPHER_NAME {
            return Err(malformed(format!("unsupported {}/{}", crypto.kdf, crypto.cipher)));
        }
        let salt = hex::decode(&crypto.kdfparams.salt).map_err(|e| malformed(e.to_string()))?;
        let ciphertext = hex::decode(&crypto.ciphertext).map_err(|e| malformed(e.to_string()))?;
        let mac = hex::decode(&crypto.mac).map_err(|e| malformed(e.to_string()))?;

        let params = &crypto.kdfparams;
        if params.n < 2 || !params.n.is_power_of_two() {
            return Err(malformed(format!("scrypt n {} is not a power of two", params.n)));
        }
        if params.dklen != SCRYPT_DKLEN {
            return Err(malformed(format!("scrypt dklen {} is unsupported", params.dklen)));
        }
        // trailing_zeros of a u64 power of two always fits in a u8
        let log_n = params.n.trailing_zeros() as u8;
        let derived = derive_key(password, &salt, log_n, params.r, params.p)?;
        if keccak256(&[&derived[16..], &ciphertext[..]].concat())[..] != mac[..] {
            return Err(KeystoreError::WrongPassword);
        }

        let plain = Zeroizing::new(apply_keystream(&derived, &ciphertext));
        let secret: [u8; 32] = plain[..]
            .try_into()
            .map_err(|_| malformed(format!("secret key is {} bytes", plain.len())))?;
        let secret = Zeroizing::new(secret);
        let signing_key = SigningKey::from_bytes(&secret);
        if Address::from_public_key(signing_key.verifying_key().as_bytes()) != account.address {
            return Err(malformed("address does not match key".to_string()));
        }
        Ok(signing_key)
    }
}

fn derive_key(
    password: &str,
    salt: &[u8],
    log_n: u8,
    r: u32,
    p: u32,
) -> Result<Zeroizing<[u8; SCRYPT_DKLEN]>, KeystoreError> {
    let params = scrypt::Params::new(log_n, r, p, SCRYPT_DKLEN)
        .map_err(|e| KeystoreError::Kdf(e.to_string()))?;
    let mut derived = Zeroizing::new([0u8; SCRYPT_DKLEN]);
    scrypt::scrypt(password.as_bytes(), salt, &params, &mut derived[..])
        .map_err(|e| KeystoreError::Kdf(e.to_string()))?;
    Ok(derived)
}

fn apply_keystream(key: &[u8; 32], data: &[u8]) -> Vec<u8> {
    let mut stream = vec![0u8; data.len()];
    blake3::Hasher::new_keyed(key)
        .update(KEYSTREAM_CONTEXT)
        .finalize_xof()
        .fill(&mut stream);
    data.iter().zip(stream).map(|(d, k)| d ^ k).collect()
}

fn write_private(path: &Path, contents: &[u8]) -> Result<(), KeystoreError> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path).map_err(|e| KeystoreError::io(path, e))?;
    file.write_all(contents)
        .map_err(|e| KeystoreError::io(path, e))
}

/// Read a password file: the first line, without its line ending.
pub fn read_password_file(path: &Path) -> Result<String, KeystoreError> {
    let contents = fs::read_to_string(path).map_err(|e| KeystoreError::io(path, e))?;
    Ok(contents.lines().next().unwrap_or_default().to_string())
}

/// Keystore errors
#[derive(Debug, thiserror::Error)]
pub enum KeystoreError {
    /// IO error
    #[error("keystore IO error at {path}: {source}")]
    Io {
        /// Path involved
        path: PathBuf,
        /// Cause
        #[source]
        source: std::io::Error,
    },
    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),
    /// A key file that cannot be read
    #[error("malformed key file {path}: {reason}")]
    Malformed {
        /// Key file
        path: PathBuf,
        /// What is wrong
        reason: String,
    },
    /// Unsupported key file version
    #[error("unsupported key file version: {0}")]
    UnsupportedVersion(u8),
    /// MAC mismatch
    #[error("could not decrypt key with given password")]
    WrongPassword,
    /// Key derivation parameters were rejected
    #[error("key derivation failed: {0}")]
    Kdf(String),
}

impl KeystoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
