//! Passkey credential records as persisted by the credential stores.

use serde::{Deserialize, Serialize};

/// One registered passkey.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCredential {
    /// Credential id, base64url.
    pub id: String,
    /// Raw COSE public key, base64url.
    pub public_key: String,
    pub counter: u32,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transports: Option<Vec<String>>,
    /// Verifier-specific material needed to check later assertions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passkey: Option<serde_json::Value>,
}

impl StoredCredential {
    pub fn new(id: impl Into<String>, public_key: impl Into<String>, counter: u32, user_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            public_key: public_key.into(),
            counter,
            user_id: user_id.into(),
            transports: None,
            passkey: None,
        }
    }
}

/// The on-disk JSON document of the file store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CredentialDocument {
    #[serde(default)]
    pub credentials: Vec<StoredCredential>,
}

impl CredentialDocument {
    pub fn by_user(&self, user_id: &str) -> Vec<StoredCredential> {
        self.credentials
            .iter()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect()
    }

    pub fn by_id(&self, id: &str) -> Option<&StoredCredential> {
        self.credentials.iter().find(|c| c.id == id)
    }

    /// Replace the record with the same id in place, or append.
    pub fn upsert(&mut self, credential: StoredCredential) {
        match self.credentials.iter_mut().find(|c| c.id == credential.id) {
            Some(existing) => *existing = credential,
            None => self.credentials.push(credential),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_field_names() {
        let mut cred = StoredCredential::new("cred-1", "pk", 3, "admin");
        cred.transports = Some(vec!["internal".into()]);
        let json = serde_json::to_value(&cred).unwrap();

        assert_eq!(json["id"], "cred-1");
        assert_eq!(json["publicKey"], "pk");
        assert_eq!(json["counter"], 3);
        assert_eq!(json["userId"], "admin");
        assert_eq!(json["transports"][0], "internal");
        assert!(json.get("passkey").is_none());
    }

    #[test]
    fn test_reads_document_without_optional_fields() {
        let raw = r#"{"credentials":[{"id":"a","publicKey":"pk","counter":0,"userId":"admin"}]}"#;
        let doc: CredentialDocument = serde_json::from_str(raw).unwrap();
        assert_eq!(doc.credentials.len(), 1);
        assert_eq!(doc.credentials[0].transports, None);

        let empty: CredentialDocument = serde_json::from_str("{}").unwrap();
        assert!(empty.credentials.is_empty());
    }

    #[test]
    fn test_upsert_replaces_by_id() {
        let mut doc = CredentialDocument::default();
        doc.upsert(StoredCredential::new("a", "pk", 0, "admin"));
        doc.upsert(StoredCredential::new("b", "pk", 0, "other"));
        doc.upsert(StoredCredential::new("a", "pk", 5, "admin"));

        assert_eq!(doc.credentials.len(), 2);
        assert_eq!(doc.by_id("a").map(|c| c.counter), Some(5));
        assert_eq!(doc.by_user("admin").len(), 1);
        assert!(doc.by_id("missing").is_none());
    }
}
