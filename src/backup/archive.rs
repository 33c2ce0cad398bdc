//! Encrypted archive envelope.
//!
//! ```text
//! offset  size  field
//! 0       6     magic "CFGBAK"
//! 6       2     format version (u16 BE)
//! 8       4     argon2 memory cost in KiB (u32 BE)
//! 12      4     argon2 iterations (u32 BE)
//! 16      16    salt
//! 32      12    nonce
//! 44      ..    ChaCha20-Poly1305 ciphertext of the JSON snapshot
//! ```
//!
//! The whole header is authenticated as associated data, so a flipped
//! header byte fails exactly like a wrong password.

use std::time::{SystemTime, UNIX_EPOCH};

use argon2::{Algorithm, Argon2, Params, Version};
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroizing;

use crate::store::NamespaceDump;

pub const MAGIC: &[u8; 6] = b"CFGBAK";
pub const FORMAT_VERSION: u16 = 1;

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const HEADER_LEN: usize = 16 + SALT_LEN + NONCE_LEN;

/// Upper bounds accepted from an archive header.
pub const MAX_MEMORY_KIB: u32 = 256 * 1024;
pub const MAX_ITERATIONS: u32 = 16;
/// Argon2 lower bound for one lane.
pub const MIN_MEMORY_KIB: u32 = 8;

/// Errors opening or sealing an archive.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive is corrupt: {0}")]
    Corrupt(String),

    /// Wrong password or modified archive; the two are indistinguishable.
    #[error("archive authentication failed (wrong password or tampered file)")]
    Authentication,

    #[error("unsupported archive version {0}")]
    UnsupportedVersion(u16),

    /// A namespace or file entry that must not be restored.
    #[error("unsafe archive entry `{0}`")]
    UnsafeEntry(String),

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),
}

pub type ArchiveResult<T> = Result<T, ArchiveError>;

/// Argon2id cost parameters written into the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    pub memory_kib: u32,
    pub iterations: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: 19 * 1024,
            iterations: 2,
        }
    }
}

/// One file of a backed-up directory tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Logical path, e.g. `/store/scripts/ovmsmain.js`.
    pub path: String,
    pub contents: Vec<u8>,
}

/// Decrypted archive payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u16,
    /// Seconds since the Unix epoch.
    pub created_at: u64,
    pub namespaces: NamespaceDump,
    pub files: Vec<FileEntry>,
}

impl Snapshot {
    pub fn new(namespaces: NamespaceDump, files: Vec<FileEntry>) -> Self {
        Self {
            version: FORMAT_VERSION,
            created_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default(),
            namespaces,
            files,
        }
    }
}

/// Encrypt a snapshot under `password`.
pub fn seal(snapshot: &Snapshot, password: &str, kdf: KdfParams) -> ArchiveResult<Vec<u8>> {
    let mut salt = [0u8; SALT_LEN];
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut salt);
    OsRng.fill_bytes(&mut nonce);

    let mut header = Vec::with_capacity(HEADER_LEN);
    header.extend_from_slice(MAGIC);
    header.extend_from_slice(&FORMAT_VERSION.to_be_bytes());
    header.extend_from_slice(&kdf.memory_kib.to_be_bytes());
    header.extend_from_slice(&kdf.iterations.to_be_bytes());
    header.extend_from_slice(&salt);
    header.extend_from_slice(&nonce);

    let plaintext = Zeroizing::new(
        serde_json::to_vec(snapshot).map_err(|e| ArchiveError::Corrupt(e.to_string()))?,
    );
    let key = derive_key(password, &salt, kdf)?;
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_slice()));
    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: plaintext.as_slice(),
                aad: &header,
            },
        )
        .map_err(|_| ArchiveError::Corrupt("encryption failed".into()))?;

    let mut out = header;
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt and decode an archive. Nothing outside the returned value is touched.
pub fn open(bytes: &[u8], password: &str) -> ArchiveResult<Snapshot> {
    if bytes.len() < HEADER_LEN || &bytes[..MAGIC.len()] != MAGIC {
        return Err(ArchiveError::Corrupt("not a backup archive".into()));
    }
    let version = u16::from_be_bytes([bytes[6], bytes[7]]);
    if version != FORMAT_VERSION {
        return Err(ArchiveError::UnsupportedVersion(version));
    }
    let kdf = KdfParams {
        memory_kib: read_u32(&bytes[8..12]),
        iterations: read_u32(&bytes[12..16]),
    };
    if kdf.memory_kib > MAX_MEMORY_KIB || kdf.iterations == 0 || kdf.iterations > MAX_ITERATIONS {
        return Err(ArchiveError::Corrupt("key derivation parameters out of range".into()));
    }
    let (header, ciphertext) = bytes.split_at(HEADER_LEN);
    let salt = &header[16..16 + SALT_LEN];
    let nonce = &header[16 + SALT_LEN..];

    let key = derive_key(password, salt, kdf)?;
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_slice()));
    let plaintext = Zeroizing::new(
        cipher
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: ciphertext,
                    aad: header,
                },
            )
            .map_err(|_| ArchiveError::Authentication)?,
    );

    let snapshot: Snapshot = serde_json::from_slice(plaintext.as_slice())
        .map_err(|e| ArchiveError::Corrupt(e.to_string()))?;
    if snapshot.version != FORMAT_VERSION {
        return Err(ArchiveError::UnsupportedVersion(snapshot.version));
    }
    Ok(snapshot)
}

fn derive_key(password: &str, salt: &[u8], kdf: KdfParams) -> ArchiveResult<Zeroizing<[u8; 32]>> {
    let params = Params::new(kdf.memory_kib, kdf.iterations, 1, Some(32))
        .map_err(|e| ArchiveError::KeyDerivation(e.to_string()))?;
    let argon = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
    let mut key = Zeroizing::new([0u8; 32]);
    argon
        .hash_password_into(password.as_bytes(), salt, key.as_mut_slice())
        .map_err(|e| ArchiveError::KeyDerivation(e.to_string()))?;
    Ok(key)
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(bytes);
    u32::from_be_bytes(buf)
}
