use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A unit the vault persists. The vault treats records as opaque serializable values
/// and only relies on a stable, caller-assigned identity.
pub trait Record {
    /// Unique identifier; never reused for a different record.
    fn id(&self) -> &str;
}

/// Username/password/notes entry held by the vault.
///
/// Field names serialize in camelCase so snapshots written by earlier releases
/// (which used `createdAt`) keep parsing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub id: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(username: String, password: String, notes: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            username,
            password,
            notes,
            created_at: Utc::now(),
        }
    }
}

impl Record for Credential {
    fn id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_assigns_distinct_ids() {
        let first = Credential::new("alice".into(), "pw".into(), String::new());
        let second = Credential::new("alice".into(), "pw".into(), String::new());
        assert_ne!(first.id(), second.id());
    }

    #[test]
    fn parses_camel_case_snapshot() {
        let json = r#"[{
            "id": "abc",
            "username": "bob",
            "password": "hunter2",
            "notes": "bank",
            "createdAt": "2024-05-01T10:00:00.000Z"
        }]"#;
        let parsed: Vec<Credential> = serde_json::from_str(json).expect("parse");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].id(), "abc");
        assert_eq!(parsed[0].notes, "bank");

        let encoded = serde_json::to_string(&parsed).expect("encode");
        assert!(encoded.contains("\"createdAt\""));
    }

    #[test]
    fn notes_default_to_empty() {
        let json = r#"{"id":"x","username":"u","password":"p","createdAt":"2024-05-01T10:00:00Z"}"#;
        let parsed: Credential = serde_json::from_str(json).expect("parse");
        assert!(parsed.notes.is_empty());
    }
}
