use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{Result, VaultError};

/// Content-addressed ciphertext store rooted at `blobs/sha256/`. Strictly
/// additive: no enumeration, no delete, no rename.
#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn path_for(&self, hash: &str) -> Result<PathBuf> {
        if hash.len() < 3 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(VaultError::CorruptStore(format!("malformed blob hash '{hash}'")));
        }
        let (shard, rest) = hash.split_at(2);
        Ok(self.root.join(shard).join(format!("{rest}.enc")))
    }

    /// Writes `ciphertext` under its content address and returns the hex hash.
    /// A write of bytes already present is a cheap no-op.
    ///
    /// # Errors
    /// Returns [`VaultError::IoError`] on filesystem failure.
    pub fn put(&self, ciphertext: &[u8]) -> Result<String> {
        let hash = hex::encode(Sha256::digest(ciphertext));
        let dest = self.path_for(&hash)?;
        if dest.exists() {
            debug!(hash = %hash, "blob already present, skipping write");
            return Ok(hash);
        }
        let dir = dest
            .parent()
            .ok_or_else(|| VaultError::IoError("blob path has no parent".into()))?;
        fs::create_dir_all(dir)?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        {
            use std::io::Write;
            tmp.write_all(ciphertext)?;
            tmp.flush()?;
        }
        tmp.persist(&dest).map_err(|e| VaultError::IoError(e.to_string()))?;
        debug!(hash = %hash, bytes = ciphertext.len(), "wrote blob");
        Ok(hash)
    }

    /// Reads back the ciphertext stored at `hash`.
    ///
    /// # Errors
    /// Returns [`VaultError::NotFound`] if no blob exists at that address,
    /// or [`VaultError::CorruptStore`] if the file's contents no longer
    /// hash to `hash`.
    pub fn get(&self, hash: &str) -> Result<Vec<u8>> {
        let path = self.path_for(hash)?;
        let bytes = fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                VaultError::NotFound(format!("blob '{hash}'"))
            } else {
                VaultError::IoError(e.to_string())
            }
        })?;
        let recomputed = hex::encode(Sha256::digest(&bytes));
        if recomputed != hash {
            return Err(VaultError::CorruptStore(format!(
                "blob at '{hash}' hashes to '{recomputed}'"
            )));
        }
        Ok(bytes)
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    fn tmp_store() -> (tempfile::TempDir, BlobStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new(dir.path().join("blobs").join("sha256"));
        (dir, store)
    }

    #[test]
    fn put_then_get_roundtrips() {
        let (_dir, store) = tmp_store();
        let hash = store.put(b"ciphertext-bytes").unwrap();
        let back = store.get(&hash).unwrap();
        assert_eq!(back, b"ciphertext-bytes");
    }

    #[test]
    fn hash_matches_sha256_of_content() {
        let (_dir, store) = tmp_store();
        let hash = store.put(b"hello").unwrap();
        assert_eq!(hash, hex::encode(Sha256::digest(b"hello")));
    }

    #[test]
    fn identical_content_writes_once() {
        let (dir, store) = tmp_store();
        let h1 = store.put(b"same bytes").unwrap();
        let h2 = store.put(b"same bytes").unwrap();
        assert_eq!(h1, h2);
        let shard_dir = dir.path().join("blobs").join("sha256").join(&h1[0..2]);
        let count = fs::read_dir(shard_dir).unwrap().count();
        assert_eq!(count, 1);
    }

    #[test]
    fn get_missing_hash_is_not_found() {
        let (_dir, store) = tmp_store();
        let err = store.get("deadbeefdeadbeefdeadbeefdeadbeefdeadbeefdeadbeefdeadbeefdeadbeef");
        assert!(matches!(err, Err(VaultError::NotFound(_))));
    }

    #[test]
    fn get_rejects_malformed_hash() {
        let (_dir, store) = tmp_store();
        let err = store.get("not-hex!!");
        assert!(matches!(err, Err(VaultError::CorruptStore(_))));
    }

    #[test]
    fn detects_on_disk_corruption() {
        let (dir, store) = tmp_store();
        let hash = store.put(b"original").unwrap();
        let path = dir.path().join("blobs").join("sha256").join(&hash[0..2]).join(format!("{}.enc", &hash[2..]));
        fs::write(&path, b"tampered").unwrap();
        let err = store.get(&hash);
        assert!(matches!(err, Err(VaultError::CorruptStore(_))));
    }
}
