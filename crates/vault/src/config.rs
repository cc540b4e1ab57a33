use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Engine configuration: where the index and blob store live on disk, and
/// which password KDF a brand-new vault should be created with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Path to the `SQLite` index database.
    pub db_path: PathBuf,

    /// Root of the content-addressed blob store.
    pub blob_dir: PathBuf,

    /// Whether a newly created vault uses Argon2id (preferred) or the
    /// PBKDF2-HMAC-SHA256 fallback. Has no effect on a vault that already
    /// has persisted KDF parameters; see `VaultEngine::unlock`.
    pub use_argon2: bool,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./index.sqlite"),
            blob_dir: PathBuf::from("./blobs/sha256"),
            use_argon2: true,
        }
    }
}

impl VaultConfig {
    #[must_use]
    pub fn new(db_path: impl Into<PathBuf>, blob_dir: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            blob_dir: blob_dir.into(),
            use_argon2: true,
        }
    }

    #[must_use]
    pub fn with_use_argon2(mut self, use_argon2: bool) -> Self {
        self.use_argon2 = use_argon2;
        self
    }
}
