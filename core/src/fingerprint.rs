use crate::listing::FileListing;
use crate::Result;
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

const READ_CHUNK_SIZE: usize = 4096;

/// Hex SHA-256 digest identifying the contents of a file tree.
///
/// Depends only on the relative paths and file bytes, never on where the tree
/// lives, on metadata, or on listing order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Wraps an already computed digest.
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if `key` embeds this fingerprint.
    pub fn is_in(&self, key: &str) -> bool {
        key.contains(&self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hashes the listed files under `base_dir`.
///
/// For each path in sorted order, the path text and the hex digest of the
/// file's bytes are fed into one running hash. Using the digest text instead
/// of raw bytes keeps a single file holding another tree's names and contents
/// from colliding with that tree.
pub fn fingerprint(base_dir: &Path, listing: &FileListing) -> Result<Fingerprint> {
    let mut paths: Vec<&str> = listing.iter().collect();
    paths.sort_unstable();

    let mut tree_hash = Sha256::new();
    for rel_path in paths {
        let file_hash = hash_file(&base_dir.join(rel_path))?;
        tree_hash.update(rel_path.as_bytes());
        tree_hash.update(file_hash.as_bytes());
    }

    Ok(Fingerprint(hex::encode(tree_hash.finalize())))
}

fn hash_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; READ_CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
