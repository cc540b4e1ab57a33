use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const IDENTITY_SCHEMA: &str = "vault.identity@1";
pub const SECRET_SCHEMA: &str = "vault.secret@1";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Audit {
    pub created_at: i64,
    pub updated_at: i64,
}

/// Plaintext payload encrypted into an item's detail blob. Unknown keys from
/// a future schema version round-trip via `extra` rather than being dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityPayload {
    pub schema: String,
    pub item_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dob: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub national_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_specific: Option<Value>,
    pub audit: Audit,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl IdentityPayload {
    #[must_use]
    pub fn new(item_id: impl Into<String>, name: impl Into<String>, now_ms: i64) -> Self {
        Self {
            schema: IDENTITY_SCHEMA.to_string(),
            item_id: item_id.into(),
            name: name.into(),
            dob: None,
            email: None,
            phone: None,
            address: None,
            national_id: None,
            tags: None,
            notes: None,
            site_specific: None,
            audit: Audit {
                created_at: now_ms,
                updated_at: now_ms,
            },
            extra: HashMap::new(),
        }
    }

    /// Shallow-merges non-null fields from `updates` over this payload.
    /// Nested objects in `updates` replace the existing value wholesale;
    /// they are never deep-merged.
    pub fn apply_update(&mut self, updates: &Value, now_ms: i64) {
        let Some(map) = updates.as_object() else {
            return;
        };
        for (key, value) in map {
            if value.is_null() {
                continue;
            }
            match key.as_str() {
                "name" => {
                    if let Some(s) = value.as_str() {
                        self.name = s.to_string();
                    }
                }
                "dob" => self.dob = value.as_str().map(str::to_string),
                "email" => self.email = value.as_str().map(str::to_string),
                "phone" => self.phone = value.as_str().map(str::to_string),
                "address" => self.address = value.as_str().map(str::to_string),
                "national_id" => self.national_id = value.as_str().map(str::to_string),
                "notes" => self.notes = value.as_str().map(str::to_string),
                "tags" => {
                    if let Some(arr) = value.as_array() {
                        self.tags = Some(arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect());
                    }
                }
                "site_specific" => self.site_specific = Some(value.clone()),
                "domain" => {} // an items column, not a payload field; the caller syncs it separately
                other => {
                    self.extra.insert(other.to_string(), value.clone());
                }
            }
        }
        self.audit.updated_at = now_ms;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretType {
    Password,
    Totp,
    Note,
}

impl SecretType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SecretType::Password => "password",
            SecretType::Totp => "totp",
            SecretType::Note => "note",
        }
    }
}

impl std::str::FromStr for SecretType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "password" => Ok(SecretType::Password),
            "totp" => Ok(SecretType::Totp),
            "note" => Ok(SecretType::Note),
            other => Err(format!("unknown secret type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretPayload {
    pub schema: String,
    pub secret_id: String,
    #[serde(rename = "type")]
    pub kind: SecretType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub totp_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default)]
    pub history: Vec<Value>,
    pub audit: Audit,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl SecretPayload {
    #[must_use]
    pub fn new(secret_id: impl Into<String>, kind: SecretType, now_ms: i64) -> Self {
        Self {
            schema: SECRET_SCHEMA.to_string(),
            secret_id: secret_id.into(),
            kind,
            username: None,
            password: None,
            totp_uri: None,
            notes: None,
            history: Vec::new(),
            audit: Audit {
                created_at: now_ms,
                updated_at: now_ms,
            },
            extra: HashMap::new(),
        }
    }

    pub fn apply_update(&mut self, updates: &Value, now_ms: i64) {
        let Some(map) = updates.as_object() else {
            return;
        };
        for (key, value) in map {
            if value.is_null() {
                continue;
            }
            match key.as_str() {
                "username" => self.username = value.as_str().map(str::to_string),
                "password" => self.password = value.as_str().map(str::to_string),
                "totp_uri" => self.totp_uri = value.as_str().map(str::to_string),
                "notes" => self.notes = value.as_str().map(str::to_string),
                "history" => {
                    if let Some(arr) = value.as_array() {
                        self.history = arr.clone();
                    }
                }
                other => {
                    self.extra.insert(other.to_string(), value.clone());
                }
            }
        }
        self.audit.updated_at = now_ms;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identity_update_is_shallow_merge_and_ignores_null() {
        let mut p = IdentityPayload::new("item-a", "Alice", 1000);
        p.email = Some("a@e.com".into());
        p.apply_update(&json!({"phone": "+2", "email": null}), 2000);
        assert_eq!(p.phone.as_deref(), Some("+2"));
        assert_eq!(p.email.as_deref(), Some("a@e.com"));
        assert_eq!(p.audit.updated_at, 2000);
    }

    #[test]
    fn identity_preserves_unknown_keys_via_extra() {
        let mut p = IdentityPayload::new("item-a", "Alice", 1000);
        p.apply_update(&json!({"future_field": "x"}), 1500);
        assert_eq!(p.extra.get("future_field").and_then(|v| v.as_str()), Some("x"));

        let s = serde_json::to_string(&p).unwrap();
        let back: IdentityPayload = serde_json::from_str(&s).unwrap();
        assert_eq!(back.extra.get("future_field").and_then(|v| v.as_str()), Some("x"));
    }

    #[test]
    fn secret_type_roundtrips_through_str() {
        use std::str::FromStr;
        assert_eq!(SecretType::from_str("totp").unwrap(), SecretType::Totp);
        assert_eq!(SecretType::Totp.as_str(), "totp");
    }
}
