pub mod blob_store;
pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod payloads;

pub use blob_store::BlobStore;
pub use config::VaultConfig;
pub use crypto::{
    DataEncryptionKey, KdfAlgorithm, KdfParams, MasterKey, aead_decrypt, aead_encrypt, derive_master_key,
    derive_wrap_key, unwrap_dek, wrap_dek,
};
pub use db::{Db, FileRow, ItemRow, ItemSummary, SecretRow, SecretSummary};
pub use error::{Result, VaultError};
pub use payloads::{Audit, IdentityPayload, SecretPayload, SecretType};

use serde_json::Value;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

const CANARY_AAD: &[u8] = b"vault-canary-v1";

/// A fixed 32-byte known-plaintext, zero-padded at compile time so its
/// length always matches a `DataEncryptionKey` regardless of the phrase.
const CANARY_PLAINTEXT: [u8; 32] = {
    const PHRASE: &[u8] = b"vault-unlock-canary-ok";
    let mut buf = [0u8; 32];
    let mut i = 0;
    while i < PHRASE.len() {
        buf[i] = PHRASE[i];
        i += 1;
    }
    buf
};

fn now_ms() -> i64 {
    let t = OffsetDateTime::now_utc();
    t.unix_timestamp() * 1000 + i64::from(t.millisecond())
}

struct UnlockedKeys {
    master_key: MasterKey,
    wrap_key: MasterKey,
}

/// Input to [`VaultEngine::create_identity`].
#[derive(Debug, Clone, Default)]
pub struct NewIdentity {
    pub item_id: String,
    pub domain: String,
    pub name: String,
    pub dob: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub national_id: Option<String>,
    pub tags: Option<Vec<String>>,
    pub notes: Option<String>,
    pub site_type: Option<String>,
    pub trust_level: i64,
}

/// Input to [`VaultEngine::create_secret`].
#[derive(Debug, Clone)]
pub struct NewSecret {
    pub secret_id: String,
    pub item_id: String,
    pub kind: SecretType,
    pub username: Option<String>,
    pub password: Option<String>,
    pub totp_uri: Option<String>,
    pub notes: Option<String>,
}

/// The cryptographic storage engine: owns the relational index and the
/// content-addressed blob store, and mediates every encrypt/decrypt through
/// the key hierarchy derived from the vault password.
pub struct VaultEngine {
    config: VaultConfig,
    db: Db,
    blobs: BlobStore,
    keys: Option<UnlockedKeys>,
}

impl VaultEngine {
    /// Opens (creating if necessary) the index database and blob store
    /// described by `config`. The vault starts locked.
    ///
    /// # Errors
    /// Returns [`VaultError::IoError`] if the database or blob directory
    /// cannot be opened/created.
    pub fn open(config: VaultConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.blob_dir)?;
        let db = Db::open(&config.db_path)?;
        let blobs = BlobStore::new(config.blob_dir.clone());
        Ok(Self {
            config,
            db,
            blobs,
            keys: None,
        })
    }

    #[must_use]
    pub fn is_unlocked(&self) -> bool {
        self.keys.is_some()
    }

    /// Derives the master key from `password` and verifies it against the
    /// vault's canary (creating one, along with the KDF parameters, on the
    /// very first unlock of a brand-new vault).
    ///
    /// # Errors
    /// Returns [`VaultError::CryptoFailure`] if the password is wrong (the
    /// canary fails to decrypt), or any underlying KDF/AEAD error.
    pub fn unlock(&mut self, password: &str) -> Result<()> {
        self.db.ensure_salt()?;
        let params = match self.db.read_kdf_params()? {
            Some(params) => params,
            None => {
                let salt = self.db.ensure_salt()?;
                let fresh = match KdfParams::new_default(self.config.use_argon2) {
                    KdfParams::Argon2id {
                        m_cost_kib, t_cost, p_cost, ..
                    } => KdfParams::Argon2id {
                        salt,
                        m_cost_kib,
                        t_cost,
                        p_cost,
                    },
                    KdfParams::Pbkdf2HmacSha256 { rounds, .. } => KdfParams::Pbkdf2HmacSha256 { salt, rounds },
                };
                self.db.write_kdf_params(&fresh)?;
                fresh
            }
        };

        let master_key = derive_master_key(password, &params)?;
        let wrap_key = derive_wrap_key(&master_key)?;

        match self.db.read_canary()? {
            Some(wrapped) => {
                let dek = unwrap_dek(&wrap_key, &wrapped, CANARY_AAD)?;
                if dek.0 != CANARY_PLAINTEXT {
                    return Err(VaultError::CryptoFailure("canary mismatch".into()));
                }
            }
            None => {
                let canary = DataEncryptionKey(CANARY_PLAINTEXT);
                let wrapped = wrap_dek(&wrap_key, &canary, CANARY_AAD)?;
                self.db.write_canary(&wrapped)?;
            }
        }

        info!("vault unlocked");
        self.keys = Some(UnlockedKeys { master_key, wrap_key });
        Ok(())
    }

    /// Drops the in-memory master key and wrap key (best effort zeroization
    /// happens on drop).
    pub fn lock(&mut self) {
        self.keys = None;
        debug!("vault locked");
    }

    fn keys(&self) -> Result<&UnlockedKeys> {
        self.keys.as_ref().ok_or(VaultError::Locked)
    }

    fn encrypt_payload(&self, plaintext: &[u8], aad: &[u8]) -> Result<(String, Vec<u8>)> {
        let keys = self.keys()?;
        let dek = DataEncryptionKey::generate();
        let blob = aead_encrypt(&dek.0, plaintext, aad)?;
        let hash = self.blobs.put(&blob)?;
        let dek_wrap = wrap_dek(&keys.wrap_key, &dek, aad)?;
        Ok((hash, dek_wrap))
    }

    fn decrypt_payload(&self, hash: &str, dek_wrap: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        let keys = self.keys()?;
        let dek = unwrap_dek(&keys.wrap_key, dek_wrap, aad)?;
        let blob = self.blobs.get(hash)?;
        aead_decrypt(&dek.0, &blob, aad)
    }

    /// Creates a new identity item. Fails [`VaultError::InvalidArgument`] if
    /// an item with the same id already exists.
    ///
    /// # Errors
    /// Propagates [`VaultError::Locked`], crypto failures, and I/O errors.
    pub fn create_identity(&self, new: &NewIdentity) -> Result<String> {
        let now = now_ms();
        let mut payload = IdentityPayload::new(&new.item_id, &new.name, now);
        payload.dob = new.dob.clone();
        payload.email = new.email.clone();
        payload.phone = new.phone.clone();
        payload.address = new.address.clone();
        payload.national_id = new.national_id.clone();
        payload.tags = new.tags.clone();
        payload.notes = new.notes.clone();

        let plaintext = serde_json::to_vec(&payload)?;
        let (hash, dek_wrap) = self.encrypt_payload(&plaintext, new.item_id.as_bytes())?;

        self.db.insert_item(&ItemRow {
            item_id: new.item_id.clone(),
            domain: new.domain.clone(),
            title: new.name.clone(),
            detail_blob_hash: hash.clone(),
            detail_dek_wrap: dek_wrap,
            has_attachments: false,
            site_type: new.site_type.clone(),
            trust_level: new.trust_level,
            created_at: now,
            updated_at: now,
            version: 1,
            tombstoned: false,
        })?;
        Ok(hash)
    }

    /// Loads and decrypts an identity's payload.
    ///
    /// # Errors
    /// Returns [`VaultError::NotFound`] if `item_id` does not exist,
    /// [`VaultError::Locked`] if the vault is locked, or
    /// [`VaultError::CryptoFailure`] on decryption failure.
    pub fn load_identity(&self, item_id: &str) -> Result<IdentityPayload> {
        let row = self
            .db
            .get_item(item_id)?
            .ok_or_else(|| VaultError::NotFound(format!("item '{item_id}'")))?;
        let plaintext = self.decrypt_payload(&row.detail_blob_hash, &row.detail_dek_wrap, item_id.as_bytes())?;
        Ok(serde_json::from_slice(&plaintext)?)
    }

    /// Shallow-merges `updates` into the decrypted identity payload and
    /// re-encrypts it to a new blob. Bumps `version` and `updated_at`.
    ///
    /// # Errors
    /// As [`VaultEngine::load_identity`].
    pub fn update_identity(&self, item_id: &str, updates: &Value) -> Result<IdentityPayload> {
        let row = self
            .db
            .get_item(item_id)?
            .ok_or_else(|| VaultError::NotFound(format!("item '{item_id}'")))?;
        let plaintext = self.decrypt_payload(&row.detail_blob_hash, &row.detail_dek_wrap, item_id.as_bytes())?;
        let mut payload: IdentityPayload = serde_json::from_slice(&plaintext)?;

        let now = now_ms();
        payload.apply_update(updates, now);

        let domain = updates
            .get("domain")
            .and_then(|v| if v.is_null() { None } else { v.as_str() })
            .unwrap_or(&row.domain);

        let new_plaintext = serde_json::to_vec(&payload)?;
        let (hash, dek_wrap) = self.encrypt_payload(&new_plaintext, item_id.as_bytes())?;

        self.db.update_item_detail(item_id, &payload.name, domain, &hash, &dek_wrap, now)?;
        Ok(payload)
    }

    /// Creates a new secret under an existing item.
    ///
    /// # Errors
    /// As [`VaultEngine::create_identity`].
    pub fn create_secret(&self, new: &NewSecret) -> Result<String> {
        let now = now_ms();
        let mut payload = SecretPayload::new(&new.secret_id, new.kind, now);
        payload.username = new.username.clone();
        payload.password = new.password.clone();
        payload.totp_uri = new.totp_uri.clone();
        payload.notes = new.notes.clone();

        let plaintext = serde_json::to_vec(&payload)?;
        let (hash, dek_wrap) = self.encrypt_payload(&plaintext, new.secret_id.as_bytes())?;

        self.db.insert_secret(&SecretRow {
            secret_id: new.secret_id.clone(),
            item_id: new.item_id.clone(),
            blob_hash: hash.clone(),
            dek_wrap,
            secret_type: new.kind.as_str().to_string(),
            created_at: now,
            updated_at: now,
        })?;
        Ok(hash)
    }

    /// Loads and decrypts a secret's payload.
    ///
    /// # Errors
    /// As [`VaultEngine::load_identity`].
    pub fn load_secret(&self, secret_id: &str) -> Result<SecretPayload> {
        let row = self
            .db
            .get_secret(secret_id)?
            .ok_or_else(|| VaultError::NotFound(format!("secret '{secret_id}'")))?;
        let plaintext = self.decrypt_payload(&row.blob_hash, &row.dek_wrap, secret_id.as_bytes())?;
        Ok(serde_json::from_slice(&plaintext)?)
    }

    /// Shallow-merges `updates` into the decrypted secret payload and
    /// re-encrypts it to a new blob.
    ///
    /// # Errors
    /// As [`VaultEngine::update_identity`].
    pub fn update_secret(&self, secret_id: &str, updates: &Value) -> Result<SecretPayload> {
        let row = self
            .db
            .get_secret(secret_id)?
            .ok_or_else(|| VaultError::NotFound(format!("secret '{secret_id}'")))?;
        let plaintext = self.decrypt_payload(&row.blob_hash, &row.dek_wrap, secret_id.as_bytes())?;
        let mut payload: SecretPayload = serde_json::from_slice(&plaintext)?;

        let now = now_ms();
        payload.apply_update(updates, now);

        let new_plaintext = serde_json::to_vec(&payload)?;
        let (hash, dek_wrap) = self.encrypt_payload(&new_plaintext, secret_id.as_bytes())?;

        self.db.update_secret_detail(secret_id, &hash, &dek_wrap, now)?;
        Ok(payload)
    }

    /// Encrypts `bytes` directly (no JSON wrapping) and attaches it to
    /// `item_id` as a file, marking the item as having attachments.
    ///
    /// # Errors
    /// As [`VaultEngine::create_identity`]; additionally
    /// [`VaultError::NotFound`] if `item_id` does not exist.
    #[allow(clippy::too_many_arguments)]
    pub fn add_file(
        &self,
        file_id: &str,
        item_id: &str,
        filename: &str,
        mime_type: Option<&str>,
        bytes: &[u8],
        description: Option<&str>,
    ) -> Result<String> {
        if self.db.get_item(item_id)?.is_none() {
            return Err(VaultError::NotFound(format!("item '{item_id}'")));
        }
        let now = now_ms();
        let (hash, dek_wrap) = self.encrypt_payload(bytes, file_id.as_bytes())?;

        self.db.insert_file_and_touch_item(&FileRow {
            file_id: file_id.to_string(),
            item_id: item_id.to_string(),
            blob_hash: hash.clone(),
            dek_wrap,
            filename: filename.to_string(),
            mime_type: mime_type.map(str::to_string),
            size_bytes: i64::try_from(bytes.len()).unwrap_or(i64::MAX),
            description: description.map(str::to_string),
            created_at: now,
            updated_at: now,
        })?;
        Ok(hash)
    }

    /// Loads and decrypts a file's raw bytes.
    ///
    /// # Errors
    /// As [`VaultEngine::load_identity`].
    pub fn load_file(&self, file_id: &str) -> Result<Vec<u8>> {
        let row = self
            .db
            .get_file(file_id)?
            .ok_or_else(|| VaultError::NotFound(format!("file '{file_id}'")))?;
        self.decrypt_payload(&row.blob_hash, &row.dek_wrap, file_id.as_bytes())
    }

    /// Lists a lightweight projection of every non-tombstoned item, most
    /// recently updated first.
    ///
    /// # Errors
    /// Propagates I/O errors from the index.
    pub fn list_items(&self) -> Result<Vec<ItemSummary>> {
        self.db.list_items()
    }

    /// Lists `{secret_id, secret_type}` pairs belonging to `item_id`.
    ///
    /// # Errors
    /// Propagates I/O errors from the index.
    pub fn list_secrets_for_item(&self, item_id: &str) -> Result<Vec<SecretSummary>> {
        self.db.list_secrets_for_item(item_id)
    }

    #[must_use]
    pub fn blob_store(&self) -> &BlobStore {
        &self.blobs
    }

    #[must_use]
    pub fn config(&self) -> &VaultConfig {
        &self.config
    }
}

impl Drop for VaultEngine {
    fn drop(&mut self) {
        if self.keys.is_some() {
            warn!("vault dropped while still unlocked");
        }
    }
}
