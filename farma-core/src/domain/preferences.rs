//! Locally persisted user preferences

use serde::{Deserialize, Serialize};

/// Most entries kept in the recently-viewed list
pub const RECENTLY_VIEWED_LIMIT: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub newsletter_subscribed: bool,
    pub order_notifications: bool,
    /// "auto", "light" or "dark"
    pub theme: String,
    /// ISO 4217 code
    pub currency: String,
    pub language: String,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            newsletter_subscribed: false,
            order_notifications: true,
            theme: "auto".to_string(),
            currency: "INR".to_string(),
            language: "en".to_string(),
        }
    }
}

/// Move `item` to the front, dropping duplicates and the oldest overflow
pub fn push_recently_viewed(list: &mut Vec<String>, item: &str) {
    list.retain(|existing| existing != item);
    list.insert(0, item.to_string());
    list.truncate(RECENTLY_VIEWED_LIMIT);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let prefs = Preferences::default();
        assert!(!prefs.newsletter_subscribed);
        assert!(prefs.order_notifications);
        assert_eq!(prefs.currency, "INR");
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let prefs: Preferences = serde_json::from_str(r#"{"theme":"dark"}"#).unwrap();
        assert_eq!(prefs.theme, "dark");
        assert_eq!(prefs.language, "en");
    }

    #[test]
    fn test_recently_viewed_dedupes_and_caps() {
        let mut list = Vec::new();
        for i in 0..25 {
            push_recently_viewed(&mut list, &format!("p{}", i));
        }
        push_recently_viewed(&mut list, "p10");

        assert_eq!(list.len(), RECENTLY_VIEWED_LIMIT);
        assert_eq!(list[0], "p10");
        assert_eq!(list.iter().filter(|p| *p == "p10").count(), 1);
        assert!(!list.contains(&"p0".to_string()));
    }
}
