//! User domain model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Authenticated user as reported by the auth backend
///
/// The store only ever holds a read-only copy; the backend owns the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    /// Free-form bag set at sign-up (name, phone, avatar hints, ...)
    #[serde(default)]
    pub user_metadata: Map<String, JsonValue>,
    #[serde(default)]
    pub email_confirmed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: Some(email.into()),
            user_metadata: Map::new(),
            email_confirmed_at: None,
            created_at: None,
        }
    }

    /// Attach a metadata entry (builder style, used by adapters and tests)
    pub fn with_metadata(mut self, key: &str, value: impl Into<JsonValue>) -> Self {
        self.user_metadata.insert(key.to_string(), value.into());
        self
    }

    /// Non-empty string value from the metadata bag
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.user_metadata
            .get(key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
    }

    /// First of `keys` that holds a non-empty string
    pub fn first_metadata_str(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|k| self.metadata_str(k))
    }

    pub fn is_email_confirmed(&self) -> bool {
        self.email_confirmed_at.is_some()
    }
}

/// Fields collected by the sign-up form
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignUpData {
    pub full_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub agree_to_terms: bool,
    pub subscribe_newsletter: bool,
}

impl SignUpData {
    /// Metadata bag sent with the sign-up request
    ///
    /// Both `name` and `full_name` are written so that readers of either
    /// profile schema find a display name.
    pub fn to_metadata(&self) -> Map<String, JsonValue> {
        let text = |v: &Option<String>| JsonValue::String(v.clone().unwrap_or_default());

        let mut meta = Map::new();
        meta.insert("name".into(), text(&self.full_name));
        meta.insert("full_name".into(), text(&self.full_name));
        meta.insert("phone".into(), text(&self.phone));
        meta.insert("first_name".into(), text(&self.first_name));
        meta.insert("last_name".into(), text(&self.last_name));
        meta.insert(
            "agreement_to_terms_and_policies".into(),
            JsonValue::Bool(self.agree_to_terms),
        );
        meta.insert(
            "subscribed_to_newsletters".into(),
            JsonValue::Bool(self.subscribe_newsletter),
        );
        meta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_creation() {
        let user = User::new("user-123", "test@example.com");
        assert_eq!(user.id, "user-123");
        assert_eq!(user.email.as_deref(), Some("test@example.com"));
        assert!(!user.is_email_confirmed());
    }

    #[test]
    fn test_metadata_str_skips_blank_values() {
        let user = User::new("u1", "a@b.c")
            .with_metadata("name", "   ")
            .with_metadata("full_name", "Asha Rao")
            .with_metadata("count", 3);

        assert_eq!(user.metadata_str("name"), None);
        assert_eq!(user.metadata_str("count"), None);
        assert_eq!(user.first_metadata_str(&["name", "full_name"]), Some("Asha Rao"));
    }

    #[test]
    fn test_sign_up_metadata_defaults() {
        let data = SignUpData {
            full_name: Some("Asha Rao".into()),
            subscribe_newsletter: true,
            ..Default::default()
        };
        let meta = data.to_metadata();

        assert_eq!(meta["name"], "Asha Rao");
        assert_eq!(meta["full_name"], "Asha Rao");
        assert_eq!(meta["phone"], "");
        assert_eq!(meta["agreement_to_terms_and_policies"], false);
        assert_eq!(meta["subscribed_to_newsletters"], true);
    }

    #[test]
    fn test_user_deserializes_without_optional_fields() {
        let user: User = serde_json::from_str(r#"{"id":"abc"}"#).unwrap();
        assert_eq!(user.id, "abc");
        assert!(user.email.is_none());
        assert!(user.user_metadata.is_empty());
    }
}
