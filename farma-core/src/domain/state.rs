//! Store state and its persisted subset

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::{Preferences, Profile, User};

/// Current on-disk schema version of [`PersistedState`]
pub const PERSISTED_STATE_VERSION: u32 = 1;

/// Everything the session store knows
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreState {
    pub user: Option<User>,
    /// Only ever `Some` while `user` is `Some`
    pub profile: Option<Profile>,
    pub is_loading: bool,
    pub is_initialized: bool,
    pub error: Option<String>,
    pub preferences: Preferences,
    /// Cached `addresses` rows for the signed-in user
    pub addresses: Vec<JsonValue>,
    pub recently_viewed: Vec<String>,
}

impl StoreState {
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    /// Drop everything tied to the signed-in user
    pub fn clear_user_data(&mut self) {
        self.user = None;
        self.profile = None;
        self.addresses.clear();
        self.recently_viewed.clear();
    }

    pub fn to_persisted(&self) -> PersistedState {
        PersistedState {
            version: PERSISTED_STATE_VERSION,
            user: self.user.clone(),
            profile: self.profile.clone(),
            preferences: self.preferences.clone(),
            recently_viewed: self.recently_viewed.clone(),
        }
    }

    /// Rehydrate from disk; user and profile stay provisional until the
    /// store re-validates them against the backend
    pub fn apply_persisted(&mut self, persisted: PersistedState) {
        self.user = persisted.user;
        self.profile = match (&self.user, persisted.profile) {
            (Some(user), Some(profile)) if profile.id == user.id => Some(profile),
            _ => None,
        };
        self.preferences = persisted.preferences;
        self.recently_viewed = persisted.recently_viewed;
    }
}

/// Subset of [`StoreState`] that survives restarts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    /// 0 for snapshots written before versioning
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub profile: Option<Profile>,
    #[serde(default)]
    pub preferences: Preferences,
    #[serde(default, alias = "recentlyViewed")]
    pub recently_viewed: Vec<String>,
}

impl PersistedState {
    /// Bring an older snapshot up to the current schema
    ///
    /// Returns `None` for snapshots from a newer, unknown version.
    pub fn upgrade(mut self) -> Option<Self> {
        match self.version {
            0 => {
                // Unversioned snapshots may hold a profile without its user
                if self.user.is_none() {
                    self.profile = None;
                }
                self.version = PERSISTED_STATE_VERSION;
                Some(self)
            }
            PERSISTED_STATE_VERSION => Some(self),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::normalize_profile;
    use serde_json::json;

    fn profile(id: &str) -> Profile {
        normalize_profile(&json!({"id": id, "name": "A"})).unwrap()
    }

    #[test]
    fn test_clear_user_data_keeps_preferences() {
        let mut state = StoreState {
            user: Some(User::new("u1", "a@b.c")),
            profile: Some(profile("u1")),
            addresses: vec![json!({"id": 1})],
            recently_viewed: vec!["p1".into()],
            ..Default::default()
        };
        state.preferences.theme = "dark".into();
        state.clear_user_data();

        assert!(state.user.is_none());
        assert!(state.profile.is_none());
        assert!(state.addresses.is_empty());
        assert!(state.recently_viewed.is_empty());
        assert_eq!(state.preferences.theme, "dark");
    }

    #[test]
    fn test_apply_persisted_drops_mismatched_profile() {
        let persisted = PersistedState {
            version: PERSISTED_STATE_VERSION,
            user: Some(User::new("u1", "a@b.c")),
            profile: Some(profile("someone-else")),
            ..Default::default()
        };
        let mut state = StoreState::default();
        state.apply_persisted(persisted);
        assert!(state.user.is_some());
        assert!(state.profile.is_none());
    }

    #[test]
    fn test_upgrade_unversioned_snapshot() {
        let raw = json!({"profile": {"id": "u1", "user_id": null, "name": "A", "avatar": null,
            "phone": null, "bio": null, "interests": null, "date_of_birth": null,
            "subscribed_to_newsletters": false, "is_admin": false,
            "password_changed_at": null, "updated_at": null},
            "recentlyViewed": ["p1"]});
        let snapshot: PersistedState = serde_json::from_value(raw).unwrap();
        assert_eq!(snapshot.version, 0);

        let upgraded = snapshot.upgrade().unwrap();
        assert_eq!(upgraded.version, PERSISTED_STATE_VERSION);
        assert!(upgraded.profile.is_none());
        assert_eq!(upgraded.recently_viewed, vec!["p1".to_string()]);
    }

    #[test]
    fn test_upgrade_rejects_future_versions() {
        let snapshot = PersistedState {
            version: PERSISTED_STATE_VERSION + 1,
            ..Default::default()
        };
        assert!(snapshot.upgrade().is_none());
    }
}
