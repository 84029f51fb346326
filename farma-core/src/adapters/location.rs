//! URL-backed navigation state

use std::sync::{Mutex, MutexGuard};

use url::Url;

use crate::domain::result::{Error, Result};
use crate::ports::Location;

struct Inner {
    url: Url,
    history: Vec<String>,
}

/// A browser-like location: one current URL plus the paths navigated to
pub struct UrlLocation {
    inner: Mutex<Inner>,
}

impl UrlLocation {
    pub fn parse(raw: &str) -> Result<Self> {
        let url = Url::parse(raw.trim())
            .map_err(|e| Error::validation(format!("Invalid link: {}", e)))?;
        Ok(Self {
            inner: Mutex::new(Inner {
                url,
                history: Vec::new(),
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Current URL as shown to the user
    pub fn current(&self) -> String {
        self.lock().url.to_string()
    }

    pub fn path(&self) -> String {
        self.lock().url.path().to_string()
    }

    /// Paths passed to `navigate`, oldest first
    pub fn history(&self) -> Vec<String> {
        self.lock().history.clone()
    }
}

impl Location for UrlLocation {
    fn fragment(&self) -> Option<String> {
        self.lock()
            .url
            .fragment()
            .filter(|f| !f.is_empty())
            .map(str::to_string)
    }

    fn clear_fragment(&self) {
        self.lock().url.set_fragment(None);
    }

    fn navigate(&self, path: &str) {
        let mut inner = self.lock();
        if let Ok(next) = inner.url.join(path) {
            inner.url = next;
        }
        inner.history.push(path.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fragment_extracted() {
        let location =
            UrlLocation::parse("http://localhost:3000/login/reset-password#abc?type=recovery")
                .unwrap();
        assert_eq!(location.fragment().as_deref(), Some("abc?type=recovery"));
        assert_eq!(location.path(), "/login/reset-password");
    }

    #[test]
    fn test_clear_fragment_keeps_path() {
        let location = UrlLocation::parse("http://localhost:3000/login/reset-password#t").unwrap();
        location.clear_fragment();
        assert!(location.fragment().is_none());
        assert_eq!(location.current(), "http://localhost:3000/login/reset-password");
    }

    #[test]
    fn test_navigate_records_history() {
        let location = UrlLocation::parse("http://localhost:3000/account#x").unwrap();
        location.navigate("/");
        assert_eq!(location.path(), "/");
        assert!(location.fragment().is_none());
        assert_eq!(location.history(), vec!["/".to_string()]);
    }

    #[test]
    fn test_invalid_link_rejected() {
        assert!(matches!(
            UrlLocation::parse("not a link"),
            Err(Error::Validation(_))
        ));
    }
}
