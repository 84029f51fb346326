//! Profile domain model and schema normalization
//!
//! The backend exposes a profile in two places: the writable `user_profiles`
//! table and the read-optimized `complete_users` view. Older rows (and older
//! UI code) use `full_name`/`avatar_url` where the current schema uses
//! `name`/`avatar`. Everything read from the backend goes through
//! [`normalize_profile`] before it is cached, so the rest of the crate only
//! ever sees the canonical [`Profile`].

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as JsonValue};

use super::result::{Error, Result};
use super::User;

/// Fallback display name when neither metadata nor e-mail provide one
pub const UNKNOWN_USER_NAME: &str = "Unknown User";

/// Keys accepted by profile updates, after legacy names are mapped
pub const UPDATABLE_FIELDS: &[&str] = &["name", "interests", "avatar", "user_id"];

/// Legacy update keys and the canonical key they write to
const LEGACY_UPDATE_KEYS: &[(&str, &str)] = &[("full_name", "name"), ("avatar_url", "avatar")];

/// Where a profile row is read from or written to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProfileSource {
    /// `complete_users` view (read-optimized, joined)
    View,
    /// `user_profiles` base table (writable)
    Table,
}

impl ProfileSource {
    pub fn relation(&self) -> &'static str {
        match self {
            ProfileSource::View => "complete_users",
            ProfileSource::Table => "user_profiles",
        }
    }
}

/// Canonical in-memory profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Always equal to the owning user's id
    pub id: String,
    /// Public display handle, e.g. `user_1a2b3c4d`
    pub user_id: Option<String>,
    pub name: String,
    pub avatar: Option<String>,
    pub phone: Option<String>,
    pub bio: Option<String>,
    pub interests: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub subscribed_to_newsletters: bool,
    pub is_admin: bool,
    pub password_changed_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Profile {
    /// Render with both canonical and legacy key names
    pub fn legacy_view(&self) -> JsonValue {
        json!({
            "id": self.id,
            "user_id": self.user_id,
            "name": self.name,
            "full_name": self.name,
            "avatar": self.avatar,
            "avatar_url": self.avatar,
            "phone": self.phone,
            "bio": self.bio,
            "interests": self.interests,
            "date_of_birth": self.date_of_birth,
            "subscribed_to_newsletters": self.subscribed_to_newsletters,
            "is_admin": self.is_admin,
            "password_changed_at": self.password_changed_at,
            "updated_at": self.updated_at,
        })
    }
}

// =============================================================================
// Normalizer
// =============================================================================

/// Canonical name field and the source keys it accepts, in priority order
const NAME_KEYS: &[&str] = &["name", "full_name"];
const AVATAR_KEYS: &[&str] = &["avatar", "avatar_url"];
const NEWSLETTER_KEYS: &[&str] = &["subscribed_to_newsletters", "newsletter_subscribed"];

/// Map any remote profile row (current or legacy schema) to a [`Profile`]
pub fn normalize_profile(raw: &JsonValue) -> Result<Profile> {
    let row = raw
        .as_object()
        .ok_or_else(|| Error::Normalization("profile row is not an object".into()))?;

    let id = match row.get("id") {
        Some(JsonValue::String(s)) if !s.is_empty() => s.clone(),
        _ => return Err(Error::Normalization("profile row has no id".into())),
    };

    Ok(Profile {
        id,
        user_id: first_text(row, &["user_id"]),
        name: first_text(row, NAME_KEYS).unwrap_or_default(),
        avatar: first_text(row, AVATAR_KEYS),
        phone: first_text(row, &["phone"]),
        bio: first_text(row, &["bio"]),
        interests: interests(row.get("interests")),
        date_of_birth: row.get("date_of_birth").and_then(parse_date),
        subscribed_to_newsletters: first_bool(row, NEWSLETTER_KEYS),
        is_admin: first_bool(row, &["is_admin"]),
        password_changed_at: row.get("password_changed_at").and_then(parse_timestamp),
        updated_at: row.get("updated_at").and_then(parse_timestamp),
    })
}

fn first_text(row: &Map<String, JsonValue>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match row.get(*k) {
        Some(JsonValue::String(s)) if !s.trim().is_empty() => Some(s.clone()),
        _ => None,
    })
}

fn first_bool(row: &Map<String, JsonValue>, keys: &[&str]) -> bool {
    keys.iter()
        .find_map(|k| row.get(*k).and_then(|v| v.as_bool()))
        .unwrap_or(false)
}

/// Interests are stored either as free text or as a text array
fn interests(value: Option<&JsonValue>) -> Option<String> {
    match value? {
        JsonValue::String(s) if !s.trim().is_empty() => Some(s.clone()),
        JsonValue::Array(items) => {
            let parts: Vec<&str> = items.iter().filter_map(|v| v.as_str()).collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join(", "))
            }
        }
        _ => None,
    }
}

fn parse_date(value: &JsonValue) -> Option<NaiveDate> {
    let s = value.as_str()?;
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .or_else(|| parse_timestamp(value).map(|ts| ts.date_naive()))
}

/// Accepts RFC 3339 as well as zone-less Postgres `timestamp` output
fn parse_timestamp(value: &JsonValue) -> Option<DateTime<Utc>> {
    let s = value.as_str()?;
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}

// =============================================================================
// Writes
// =============================================================================

/// Minimal base row upserted when a user has no profile yet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProfileRow {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub avatar: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interests: Option<String>,
}

impl NewProfileRow {
    /// Derive a row from the user's metadata
    ///
    /// Name precedence: metadata `name`, metadata `full_name`, `name_hint`,
    /// e-mail, then "Unknown User".
    pub fn for_user(user: &User, name_hint: Option<&str>) -> Self {
        let name = user
            .first_metadata_str(&["name", "full_name"])
            .or(name_hint.filter(|s| !s.trim().is_empty()))
            .or(user.email.as_deref().filter(|s| !s.is_empty()))
            .unwrap_or(UNKNOWN_USER_NAME)
            .to_string();

        let user_id = user
            .metadata_str("user_id")
            .map(str::to_string)
            .unwrap_or_else(|| fallback_display_id(&user.id));

        Self {
            id: user.id.clone(),
            user_id,
            name,
            avatar: user
                .first_metadata_str(&["avatar", "avatar_url"])
                .map(str::to_string),
            interests: None,
        }
    }

    pub fn with_interests(mut self, interests: Option<String>) -> Self {
        self.interests = interests;
        self
    }
}

/// `user_<first 8 chars of the id>`
pub fn fallback_display_id(user_id: &str) -> String {
    let prefix: String = user_id.chars().take(8).collect();
    format!("user_{}", prefix)
}

/// Filtered, schema-aligned profile update
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileChanges {
    fields: Map<String, JsonValue>,
    updated_at: DateTime<Utc>,
}

impl ProfileChanges {
    /// Map legacy keys, drop everything outside [`UPDATABLE_FIELDS`]
    pub fn from_updates(updates: &Map<String, JsonValue>, now: DateTime<Utc>) -> Self {
        let mut mapped = updates.clone();
        for (legacy, canonical) in LEGACY_UPDATE_KEYS {
            if let Some(value) = updates.get(*legacy) {
                mapped.insert((*canonical).to_string(), value.clone());
            }
        }

        let fields = mapped
            .into_iter()
            .filter(|(key, _)| UPDATABLE_FIELDS.contains(&key.as_str()))
            .collect();

        Self {
            fields,
            updated_at: now,
        }
    }

    /// Changes touching only the avatar column
    pub fn avatar(url: &str, now: DateTime<Utc>) -> Self {
        let mut fields = Map::new();
        fields.insert("avatar".into(), JsonValue::String(url.to_string()));
        Self {
            fields,
            updated_at: now,
        }
    }

    pub fn fields(&self) -> &Map<String, JsonValue> {
        &self.fields
    }

    /// Body sent to the backend, including the `updated_at` stamp
    pub fn to_json(&self) -> Map<String, JsonValue> {
        let mut body = self.fields.clone();
        body.insert(
            "updated_at".into(),
            JsonValue::String(self.updated_at.to_rfc3339()),
        );
        body
    }
}

/// Body stamping a completed password change
pub fn password_changed_stamp(now: DateTime<Utc>) -> Map<String, JsonValue> {
    let mut body = Map::new();
    let stamp = JsonValue::String(now.to_rfc3339());
    body.insert("password_changed_at".into(), stamp.clone());
    body.insert("updated_at".into(), stamp);
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn obj(value: JsonValue) -> Map<String, JsonValue> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_normalize_current_schema() {
        let raw = json!({
            "id": "u1",
            "user_id": "user_u1",
            "name": "Asha",
            "avatar": "https://cdn/a.png",
            "is_admin": true,
            "subscribed_to_newsletters": true,
            "date_of_birth": "1990-04-12",
            "updated_at": "2025-01-02T03:04:05.123456+00:00"
        });
        let profile = normalize_profile(&raw).unwrap();

        assert_eq!(profile.id, "u1");
        assert_eq!(profile.name, "Asha");
        assert_eq!(profile.avatar.as_deref(), Some("https://cdn/a.png"));
        assert!(profile.is_admin);
        assert!(profile.subscribed_to_newsletters);
        assert_eq!(profile.date_of_birth, NaiveDate::from_ymd_opt(1990, 4, 12));
        assert!(profile.updated_at.is_some());
    }

    #[test]
    fn test_normalize_legacy_schema() {
        let raw = json!({
            "id": "u1",
            "full_name": "Legacy Name",
            "avatar_url": "https://cdn/old.png",
            "newsletter_subscribed": true
        });
        let profile = normalize_profile(&raw).unwrap();

        assert_eq!(profile.name, "Legacy Name");
        assert_eq!(profile.avatar.as_deref(), Some("https://cdn/old.png"));
        assert!(profile.subscribed_to_newsletters);
        assert!(!profile.is_admin);
    }

    #[test]
    fn test_normalize_prefers_current_keys_when_both_present() {
        let raw = json!({"id": "u1", "name": "New", "full_name": "Old", "avatar": null, "avatar_url": "x"});
        let profile = normalize_profile(&raw).unwrap();
        assert_eq!(profile.name, "New");
        // null avatar falls through to the legacy key
        assert_eq!(profile.avatar.as_deref(), Some("x"));
    }

    #[test]
    fn test_normalize_empty_name_falls_back_then_defaults() {
        let raw = json!({"id": "u1", "name": "", "full_name": "Fallback"});
        assert_eq!(normalize_profile(&raw).unwrap().name, "Fallback");

        let raw = json!({"id": "u1"});
        let profile = normalize_profile(&raw).unwrap();
        assert_eq!(profile.name, "");
        assert_eq!(profile.avatar, None);
        assert_eq!(profile.date_of_birth, None);
    }

    #[test]
    fn test_normalize_rejects_rows_without_id() {
        assert!(normalize_profile(&json!({"name": "x"})).is_err());
        assert!(normalize_profile(&json!({"id": 42})).is_err());
        assert!(normalize_profile(&json!("not an object")).is_err());
    }

    #[test]
    fn test_normalize_interests_array_and_bad_dates() {
        let raw = json!({
            "id": "u1",
            "interests": ["herbs", "tea"],
            "date_of_birth": "not a date",
            "password_changed_at": "2025-03-01 10:00:00"
        });
        let profile = normalize_profile(&raw).unwrap();
        assert_eq!(profile.interests.as_deref(), Some("herbs, tea"));
        assert_eq!(profile.date_of_birth, None);
        assert_eq!(
            profile.password_changed_at,
            Some(Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_date_of_birth_from_timestamp() {
        let raw = json!({"id": "u1", "date_of_birth": "1990-04-12T00:00:00Z"});
        let profile = normalize_profile(&raw).unwrap();
        assert_eq!(profile.date_of_birth, NaiveDate::from_ymd_opt(1990, 4, 12));
    }

    #[test]
    fn test_legacy_view_carries_both_names() {
        let profile = normalize_profile(&json!({"id": "u1", "name": "A", "avatar": "p"})).unwrap();
        let view = profile.legacy_view();
        assert_eq!(view["full_name"], "A");
        assert_eq!(view["name"], "A");
        assert_eq!(view["avatar_url"], "p");
    }

    #[test]
    fn test_changes_map_legacy_and_filter() {
        let now = Utc::now();
        let updates = obj(json!({
            "full_name": "X",
            "avatar_url": "https://cdn/x.png",
            "is_admin": true,
            "email": "evil@example.com",
            "interests": "tea"
        }));
        let changes = ProfileChanges::from_updates(&updates, now);
        let fields = changes.fields();

        assert_eq!(fields.get("name"), Some(&json!("X")));
        assert_eq!(fields.get("avatar"), Some(&json!("https://cdn/x.png")));
        assert_eq!(fields.get("interests"), Some(&json!("tea")));
        assert!(!fields.contains_key("is_admin"));
        assert!(!fields.contains_key("email"));
        assert!(!fields.contains_key("full_name"));
        assert_eq!(fields.len(), 3);

        let body = changes.to_json();
        assert_eq!(body["updated_at"], json!(now.to_rfc3339()));
    }

    #[test]
    fn test_changes_legacy_key_wins_over_canonical() {
        let updates = obj(json!({"name": "canonical", "full_name": "legacy"}));
        let changes = ProfileChanges::from_updates(&updates, Utc::now());
        assert_eq!(changes.fields()["name"], "legacy");
    }

    #[test]
    fn test_changes_keep_explicit_null() {
        let updates = obj(json!({"avatar": null}));
        let changes = ProfileChanges::from_updates(&updates, Utc::now());
        assert_eq!(changes.fields().get("avatar"), Some(&JsonValue::Null));
    }

    #[test]
    fn test_new_row_name_precedence() {
        let bare = User::new("1234567890abcdef", "asha@example.com");
        let row = NewProfileRow::for_user(&bare, None);
        assert_eq!(row.name, "asha@example.com");
        assert_eq!(row.user_id, "user_12345678");
        assert_eq!(row.avatar, None);

        let hinted = NewProfileRow::for_user(&bare, Some("Hint"));
        assert_eq!(hinted.name, "Hint");

        let with_meta = bare
            .clone()
            .with_metadata("full_name", "Full")
            .with_metadata("user_id", "asha")
            .with_metadata("avatar_url", "https://cdn/a.png");
        let row = NewProfileRow::for_user(&with_meta, Some("Hint"));
        assert_eq!(row.name, "Full");
        assert_eq!(row.user_id, "asha");
        assert_eq!(row.avatar.as_deref(), Some("https://cdn/a.png"));

        let mut anonymous = User::new("u1", "");
        anonymous.email = None;
        assert_eq!(NewProfileRow::for_user(&anonymous, None).name, UNKNOWN_USER_NAME);
    }

    #[test]
    fn test_password_stamp_sets_both_columns() {
        let body = password_changed_stamp(Utc::now());
        assert_eq!(body["password_changed_at"], body["updated_at"]);
    }

    #[test]
    fn test_profile_source_relations() {
        assert_eq!(ProfileSource::View.relation(), "complete_users");
        assert_eq!(ProfileSource::Table.relation(), "user_profiles");
    }
}
