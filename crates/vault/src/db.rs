use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use rusqlite::{Connection, OptionalExtension, params};

use crate::crypto::{KdfAlgorithm, KdfParams};
use crate::error::{Result, VaultError};

/// Thin wrapper around the relational index: `meta`, `items`, `secrets`,
/// `files`. Every mutating method runs inside its own transaction.
#[derive(Debug)]
pub struct Db {
    conn: Connection,
}

impl Db {
    /// # Errors
    /// Returns [`VaultError::IoError`] if the database cannot be opened or
    /// migrated.
    pub fn open(path: &std::path::Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(
            r"
            PRAGMA journal_mode=WAL;
            PRAGMA foreign_keys=ON;

            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS items (
                item_id TEXT PRIMARY KEY,
                domain TEXT NOT NULL,
                title TEXT NOT NULL,
                detail_blob_hash TEXT NOT NULL,
                detail_dek_wrap BLOB NOT NULL,
                has_attachments INTEGER NOT NULL DEFAULT 0,
                site_type TEXT,
                trust_level INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                version INTEGER NOT NULL DEFAULT 1,
                tombstoned INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS secrets (
                secret_id TEXT PRIMARY KEY,
                item_id TEXT NOT NULL REFERENCES items(item_id),
                blob_hash TEXT NOT NULL,
                dek_wrap BLOB NOT NULL,
                secret_type TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS files (
                file_id TEXT PRIMARY KEY,
                item_id TEXT NOT NULL REFERENCES items(item_id),
                blob_hash TEXT NOT NULL,
                dek_wrap BLOB NOT NULL,
                filename TEXT NOT NULL,
                mime_type TEXT,
                size_bytes INTEGER NOT NULL,
                description TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_secrets_item_id ON secrets(item_id);
            CREATE INDEX IF NOT EXISTS idx_files_item_id ON files(item_id);
            ",
        )?;
        Ok(())
    }

    /// Exposes the raw connection for white-box tests in other modules of
    /// this crate (e.g. simulating row-level corruption).
    #[cfg(test)]
    pub(crate) fn conn_for_test(&self) -> &Connection {
        &self.conn
    }

    fn meta_get(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .conn
            .query_row("SELECT value FROM meta WHERE key = ?", params![key], |r| r.get(0))
            .optional()?)
    }

    fn meta_set(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO meta (key, value) VALUES (?, ?) ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    /// Returns the vault's salt, generating and persisting one if this is a
    /// brand-new vault.
    pub fn ensure_salt(&self) -> Result<Vec<u8>> {
        if let Some(existing) = self.meta_get("salt")? {
            return Ok(BASE64.decode(existing)?);
        }
        let mut salt = vec![0u8; 16];
        getrandom::fill(&mut salt).map_err(|e| VaultError::CryptoFailure(e.to_string()))?;
        self.meta_set("salt", &BASE64.encode(&salt))?;
        Ok(salt)
    }

    pub fn read_kdf_params(&self) -> Result<Option<KdfParams>> {
        match self.meta_get("kdf_params")? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub fn write_kdf_params(&self, params: &KdfParams) -> Result<()> {
        let json = serde_json::to_string(params)?;
        self.meta_set("kdf_params", &json)?;
        self.meta_set(
            "kdf_algorithm",
            match params.algorithm() {
                KdfAlgorithm::Argon2id => "argon2id",
                KdfAlgorithm::Pbkdf2HmacSha256 => "pbkdf2-sha256",
            },
        )
    }

    pub fn read_canary(&self) -> Result<Option<Vec<u8>>> {
        match self.meta_get("canary")? {
            Some(b64) => Ok(Some(BASE64.decode(b64)?)),
            None => Ok(None),
        }
    }

    pub fn write_canary(&self, wrapped: &[u8]) -> Result<()> {
        self.meta_set("canary", &BASE64.encode(wrapped))
    }

    pub fn insert_item(&self, row: &ItemRow) -> Result<()> {
        self.conn.execute(
            "INSERT INTO items (item_id, domain, title, detail_blob_hash, detail_dek_wrap, has_attachments,
                site_type, trust_level, created_at, updated_at, version, tombstoned)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                row.item_id,
                row.domain,
                row.title,
                row.detail_blob_hash,
                row.detail_dek_wrap,
                i64::from(row.has_attachments),
                row.site_type,
                row.trust_level,
                row.created_at,
                row.updated_at,
                row.version,
                i64::from(row.tombstoned),
            ],
        )?;
        Ok(())
    }

    pub fn get_item(&self, item_id: &str) -> Result<Option<ItemRow>> {
        self.conn
            .query_row(
                "SELECT item_id, domain, title, detail_blob_hash, detail_dek_wrap, has_attachments,
                    site_type, trust_level, created_at, updated_at, version, tombstoned
                 FROM items WHERE item_id = ?",
                params![item_id],
                Self::map_item_row,
            )
            .optional()
            .map_err(VaultError::from)
    }

    fn map_item_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<ItemRow> {
        Ok(ItemRow {
            item_id: r.get(0)?,
            domain: r.get(1)?,
            title: r.get(2)?,
            detail_blob_hash: r.get(3)?,
            detail_dek_wrap: r.get(4)?,
            has_attachments: r.get::<_, i64>(5)? != 0,
            site_type: r.get(6)?,
            trust_level: r.get(7)?,
            created_at: r.get(8)?,
            updated_at: r.get(9)?,
            version: r.get(10)?,
            tombstoned: r.get::<_, i64>(11)? != 0,
        })
    }

    /// Updates an item's detail blob/wrap in place, bumping `version` and
    /// `updated_at`. Also allows `title`/`domain`/`has_attachments` to be
    /// refreshed so they stay in sync with the decrypted payload.
    #[allow(clippy::too_many_arguments)]
    pub fn update_item_detail(
        &self,
        item_id: &str,
        title: &str,
        domain: &str,
        detail_blob_hash: &str,
        detail_dek_wrap: &[u8],
        updated_at: i64,
    ) -> Result<()> {
        self.conn.execute(
            "UPDATE items SET title = ?, domain = ?, detail_blob_hash = ?, detail_dek_wrap = ?,
                updated_at = ?, version = version + 1
             WHERE item_id = ?",
            params![title, domain, detail_blob_hash, detail_dek_wrap, updated_at, item_id],
        )?;
        Ok(())
    }

    pub fn list_items(&self) -> Result<Vec<ItemSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT item_id, domain, title, created_at, updated_at FROM items
             WHERE tombstoned = 0 ORDER BY updated_at DESC",
        )?;
        let rows = stmt.query_map([], |r| {
            Ok(ItemSummary {
                item_id: r.get(0)?,
                domain: r.get(1)?,
                title: r.get(2)?,
                created_at: r.get(3)?,
                updated_at: r.get(4)?,
            })
        })?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    pub fn insert_secret(&self, row: &SecretRow) -> Result<()> {
        self.conn.execute(
            "INSERT INTO secrets (secret_id, item_id, blob_hash, dek_wrap, secret_type, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                row.secret_id,
                row.item_id,
                row.blob_hash,
                row.dek_wrap,
                row.secret_type,
                row.created_at,
                row.updated_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_secret(&self, secret_id: &str) -> Result<Option<SecretRow>> {
        self.conn
            .query_row(
                "SELECT secret_id, item_id, blob_hash, dek_wrap, secret_type, created_at, updated_at
                 FROM secrets WHERE secret_id = ?",
                params![secret_id],
                |r| {
                    Ok(SecretRow {
                        secret_id: r.get(0)?,
                        item_id: r.get(1)?,
                        blob_hash: r.get(2)?,
                        dek_wrap: r.get(3)?,
                        secret_type: r.get(4)?,
                        created_at: r.get(5)?,
                        updated_at: r.get(6)?,
                    })
                },
            )
            .optional()
            .map_err(VaultError::from)
    }

    pub fn update_secret_detail(
        &self,
        secret_id: &str,
        blob_hash: &str,
        dek_wrap: &[u8],
        updated_at: i64,
    ) -> Result<()> {
        self.conn.execute(
            "UPDATE secrets SET blob_hash = ?, dek_wrap = ?, updated_at = ? WHERE secret_id = ?",
            params![blob_hash, dek_wrap, updated_at, secret_id],
        )?;
        Ok(())
    }

    pub fn list_secrets_for_item(&self, item_id: &str) -> Result<Vec<SecretSummary>> {
        let mut stmt = self
            .conn
            .prepare("SELECT secret_id, secret_type FROM secrets WHERE item_id = ? ORDER BY created_at ASC")?;
        let rows = stmt.query_map(params![item_id], |r| {
            Ok(SecretSummary {
                secret_id: r.get(0)?,
                secret_type: r.get(1)?,
            })
        })?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn insert_file(&self, row: &FileRow) -> Result<()> {
        self.conn.execute(
            "INSERT INTO files (file_id, item_id, blob_hash, dek_wrap, filename, mime_type, size_bytes,
                description, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                row.file_id,
                row.item_id,
                row.blob_hash,
                row.dek_wrap,
                row.filename,
                row.mime_type,
                row.size_bytes,
                row.description,
                row.created_at,
                row.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Inserts a file row and marks its owning item as having attachments,
    /// in a single transaction.
    pub fn insert_file_and_touch_item(&self, row: &FileRow) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO files (file_id, item_id, blob_hash, dek_wrap, filename, mime_type, size_bytes,
                description, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                row.file_id,
                row.item_id,
                row.blob_hash,
                row.dek_wrap,
                row.filename,
                row.mime_type,
                row.size_bytes,
                row.description,
                row.created_at,
                row.updated_at,
            ],
        )?;
        tx.execute(
            "UPDATE items SET has_attachments = 1, updated_at = ? WHERE item_id = ?",
            params![row.updated_at, row.item_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn get_file(&self, file_id: &str) -> Result<Option<FileRow>> {
        self.conn
            .query_row(
                "SELECT file_id, item_id, blob_hash, dek_wrap, filename, mime_type, size_bytes, description,
                    created_at, updated_at
                 FROM files WHERE file_id = ?",
                params![file_id],
                |r| {
                    Ok(FileRow {
                        file_id: r.get(0)?,
                        item_id: r.get(1)?,
                        blob_hash: r.get(2)?,
                        dek_wrap: r.get(3)?,
                        filename: r.get(4)?,
                        mime_type: r.get(5)?,
                        size_bytes: r.get(6)?,
                        description: r.get(7)?,
                        created_at: r.get(8)?,
                        updated_at: r.get(9)?,
                    })
                },
            )
            .optional()
            .map_err(VaultError::from)
    }
}

#[derive(Debug, Clone)]
pub struct ItemRow {
    pub item_id: String,
    pub domain: String,
    pub title: String,
    pub detail_blob_hash: String,
    pub detail_dek_wrap: Vec<u8>,
    pub has_attachments: bool,
    pub site_type: Option<String>,
    pub trust_level: i64,
    pub created_at: i64,
    pub updated_at: i64,
    pub version: i64,
    pub tombstoned: bool,
}

#[derive(Debug, Clone)]
pub struct ItemSummary {
    pub item_id: String,
    pub domain: String,
    pub title: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone)]
pub struct SecretRow {
    pub secret_id: String,
    pub item_id: String,
    pub blob_hash: String,
    pub dek_wrap: Vec<u8>,
    pub secret_type: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone)]
pub struct SecretSummary {
    pub secret_id: String,
    pub secret_type: String,
}

#[derive(Debug, Clone)]
pub struct FileRow {
    pub file_id: String,
    pub item_id: String,
    pub blob_hash: String,
    pub dek_wrap: Vec<u8>,
    pub filename: String,
    pub mime_type: Option<String>,
    pub size_bytes: i64,
    pub description: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    fn tmp_path(name: &str) -> std::path::PathBuf {
        let now = time::OffsetDateTime::now_utc().unix_timestamp_nanos();
        let pid = std::process::id();
        std::env::temp_dir().join(format!("vault_db_{name}_{pid}_{now}.sqlite3"))
    }

    fn item_row(id: &str) -> ItemRow {
        ItemRow {
            item_id: id.to_string(),
            domain: "example.com".to_string(),
            title: "Alice".to_string(),
            detail_blob_hash: "a".repeat(64),
            detail_dek_wrap: vec![1, 2, 3],
            has_attachments: false,
            site_type: Some("personal".to_string()),
            trust_level: 1,
            created_at: 1000,
            updated_at: 1000,
            version: 1,
            tombstoned: false,
        }
    }

    #[test]
    fn open_and_migrate_is_idempotent() {
        let path = tmp_path("migrate");
        let db1 = Db::open(&path).unwrap();
        assert!(db1.meta_get("salt").unwrap().is_none());
        let db2 = Db::open(&path).unwrap();
        assert!(db2.meta_get("salt").unwrap().is_none());
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn ensure_salt_is_generated_once_and_stable() {
        let path = tmp_path("salt");
        let db = Db::open(&path).unwrap();
        let s1 = db.ensure_salt().unwrap();
        let s2 = db.ensure_salt().unwrap();
        assert_eq!(s1, s2);
        assert_eq!(s1.len(), 16);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn insert_and_get_item_roundtrips() {
        let path = tmp_path("item_roundtrip");
        let db = Db::open(&path).unwrap();
        db.insert_item(&item_row("item-aaaa")).unwrap();
        let back = db.get_item("item-aaaa").unwrap().unwrap();
        assert_eq!(back.domain, "example.com");
        assert_eq!(back.version, 1);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn update_item_detail_bumps_version_and_updated_at() {
        let path = tmp_path("update_item");
        let db = Db::open(&path).unwrap();
        db.insert_item(&item_row("item-bbbb")).unwrap();
        db.update_item_detail("item-bbbb", "Alice", "example.com", &"b".repeat(64), &[4, 5, 6], 2000)
            .unwrap();
        let back = db.get_item("item-bbbb").unwrap().unwrap();
        assert_eq!(back.version, 2);
        assert_eq!(back.updated_at, 2000);
        assert_eq!(back.detail_blob_hash, "b".repeat(64));
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn list_items_orders_by_updated_at_desc() {
        let path = tmp_path("list_items");
        let db = Db::open(&path).unwrap();
        let mut a = item_row("item-a");
        a.updated_at = 1000;
        let mut b = item_row("item-b");
        b.updated_at = 3000;
        let mut c = item_row("item-c");
        c.updated_at = 2000;
        db.insert_item(&a).unwrap();
        db.insert_item(&b).unwrap();
        db.insert_item(&c).unwrap();

        let rows = db.list_items().unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r.item_id.as_str()).collect();
        assert_eq!(ids, vec!["item-b", "item-c", "item-a"]);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn duplicate_item_id_is_rejected() {
        let path = tmp_path("dup_item");
        let db = Db::open(&path).unwrap();
        db.insert_item(&item_row("item-dup")).unwrap();
        let err = db.insert_item(&item_row("item-dup"));
        assert!(err.is_err());
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn secret_insert_and_list_for_item() {
        let path = tmp_path("secrets");
        let db = Db::open(&path).unwrap();
        db.insert_item(&item_row("item-s")).unwrap();
        db.insert_secret(&SecretRow {
            secret_id: "sec-1".to_string(),
            item_id: "item-s".to_string(),
            blob_hash: "c".repeat(64),
            dek_wrap: vec![9, 9],
            secret_type: "password".to_string(),
            created_at: 1000,
            updated_at: 1000,
        })
        .unwrap();

        let list = db.list_secrets_for_item("item-s").unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].secret_type, "password");
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn file_insert_persists_description() {
        let path = tmp_path("files");
        let db = Db::open(&path).unwrap();
        db.insert_item(&item_row("item-f")).unwrap();
        db.insert_file(&FileRow {
            file_id: "file-1".to_string(),
            item_id: "item-f".to_string(),
            blob_hash: "d".repeat(64),
            dek_wrap: vec![1],
            filename: "passport.pdf".to_string(),
            mime_type: Some("application/pdf".to_string()),
            size_bytes: 1024,
            description: Some("scanned passport".to_string()),
            created_at: 1000,
            updated_at: 1000,
        })
        .unwrap();

        let back = db.get_file("file-1").unwrap().unwrap();
        assert_eq!(back.description.as_deref(), Some("scanned passport"));
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn kdf_params_roundtrip_through_meta() {
        let path = tmp_path("kdf_meta");
        let db = Db::open(&path).unwrap();
        assert!(db.read_kdf_params().unwrap().is_none());
        let params = KdfParams::new_default(true);
        db.write_kdf_params(&params).unwrap();
        let back = db.read_kdf_params().unwrap().unwrap();
        assert_eq!(back.algorithm(), KdfAlgorithm::Argon2id);
        std::fs::remove_file(path).ok();
    }
}
