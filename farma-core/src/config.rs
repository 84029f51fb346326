//! Configuration management
//!
//! Backend parameters come from `settings.json` in the data directory:
//! ```json
//! {
//!   "backend": { "url": "...", "anonKey": "...", "redirectBase": "..." },
//!   ...
//! }
//! ```
//! Environment variables (`FARMA_SUPABASE_URL`, `FARMA_SUPABASE_ANON_KEY`,
//! `FARMA_REDIRECT_BASE`) override the file, and a `.env` file in the
//! working directory is read first.

use std::path::Path;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::domain::result::{Error, Result};

pub const URL_ENV: &str = "FARMA_SUPABASE_URL";
pub const ANON_KEY_ENV: &str = "FARMA_SUPABASE_ANON_KEY";
pub const REDIRECT_BASE_ENV: &str = "FARMA_REDIRECT_BASE";
pub const DIR_ENV: &str = "FARMA_DIR";

pub const DEFAULT_REDIRECT_BASE: &str = "http://localhost:3000";

/// Raw settings.json structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default)]
    backend: BackendSettings,
    // Keep sections we don't manage when saving
    #[serde(flatten)]
    other: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BackendSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    anon_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    redirect_base: Option<String>,
}

/// Resolved backend configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub supabase_url: Url,
    pub anon_key: String,
    /// Origin the auth e-mails and OAuth providers redirect back to
    pub redirect_base: String,
}

impl Config {
    /// Load config from the data directory, environment and `.env`
    pub fn load(farma_dir: &Path) -> Result<Self> {
        // A missing .env is the normal case
        let _ = dotenvy::dotenv();

        let settings = read_settings(farma_dir)?;
        Self::resolve(settings.backend, |key| std::env::var(key).ok())
    }

    /// Validate explicit values, e.g. from `farma setup`
    pub fn new(url: &str, anon_key: &str, redirect_base: Option<&str>) -> Result<Self> {
        let file = BackendSettings {
            url: Some(url.to_string()),
            anon_key: Some(anon_key.to_string()),
            redirect_base: redirect_base.map(str::to_string),
        };
        Self::resolve(file, |_| None)
    }

    fn resolve(file: BackendSettings, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let pick = |key: &str, from_file: Option<String>| {
            env(key)
                .or(from_file)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let url = pick(URL_ENV, file.url).ok_or_else(|| {
            Error::config(format!("Missing backend URL. Set {} or backend.url", URL_ENV))
        })?;
        let anon_key = pick(ANON_KEY_ENV, file.anon_key).ok_or_else(|| {
            Error::config(format!(
                "Missing backend anon key. Set {} or backend.anonKey",
                ANON_KEY_ENV
            ))
        })?;
        let redirect_base = pick(REDIRECT_BASE_ENV, file.redirect_base)
            .unwrap_or_else(|| DEFAULT_REDIRECT_BASE.to_string());

        Ok(Self {
            supabase_url: parse_http_url(&url, "backend URL")?,
            anon_key,
            redirect_base: parse_http_url(&redirect_base, "redirect base")?
                .as_str()
                .trim_end_matches('/')
                .to_string(),
        })
    }

    /// Write the backend section, preserving everything else in settings.json
    pub fn save(&self, farma_dir: &Path) -> Result<()> {
        let mut settings = read_settings(farma_dir)?;
        settings.backend = BackendSettings {
            url: Some(self.supabase_url.to_string()),
            anon_key: Some(self.anon_key.clone()),
            redirect_base: Some(self.redirect_base.clone()),
        };

        std::fs::create_dir_all(farma_dir)?;
        let content = serde_json::to_string_pretty(&settings)?;
        std::fs::write(farma_dir.join("settings.json"), content)?;
        Ok(())
    }
}

fn read_settings(farma_dir: &Path) -> Result<SettingsFile> {
    let settings_path = farma_dir.join("settings.json");
    if !settings_path.exists() {
        return Ok(SettingsFile::default());
    }
    let content = std::fs::read_to_string(&settings_path)?;
    serde_json::from_str(&content)
        .map_err(|e| Error::config(format!("Invalid {}: {}", settings_path.display(), e)))
}

fn parse_http_url(raw: &str, what: &str) -> Result<Url> {
    let url = Url::parse(raw).map_err(|e| Error::config(format!("Invalid {}: {}", what, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(Error::config(format!(
            "Invalid {}: unsupported scheme '{}'",
            what, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn file(url: &str, key: &str) -> BackendSettings {
        BackendSettings {
            url: Some(url.into()),
            anon_key: Some(key.into()),
            redirect_base: None,
        }
    }

    #[test]
    fn test_file_values_with_default_redirect() {
        let config = Config::resolve(file("https://x.supabase.co", "k"), env(&[])).unwrap();
        assert_eq!(config.supabase_url.as_str(), "https://x.supabase.co/");
        assert_eq!(config.anon_key, "k");
        assert_eq!(config.redirect_base, "http://localhost:3000");
    }

    #[test]
    fn test_env_overrides_file() {
        let config = Config::resolve(
            file("https://x.supabase.co", "k"),
            env(&[(ANON_KEY_ENV, "from-env"), (REDIRECT_BASE_ENV, "https://shop.example/")]),
        )
        .unwrap();
        assert_eq!(config.anon_key, "from-env");
        assert_eq!(config.redirect_base, "https://shop.example");
    }

    #[test]
    fn test_missing_key_names_variable() {
        let err = Config::resolve(
            BackendSettings {
                url: Some("https://x.supabase.co".into()),
                ..Default::default()
            },
            env(&[]),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains(ANON_KEY_ENV));
    }

    #[test]
    fn test_blank_values_count_as_missing() {
        let err = Config::resolve(file("  ", "k"), env(&[])).unwrap_err();
        assert!(err.to_string().contains(URL_ENV));
    }

    #[test]
    fn test_new_validates_explicit_values() {
        let config = Config::new("https://x.supabase.co", "k", Some("https://shop.example/")).unwrap();
        assert_eq!(config.redirect_base, "https://shop.example");
        assert!(Config::new("https://x.supabase.co", " ", None).is_err());
    }

    #[test]
    fn test_rejects_non_http_url() {
        let err = Config::resolve(file("ftp://x.supabase.co", "k"), env(&[])).unwrap_err();
        assert!(err.to_string().contains("unsupported scheme"));
    }

    #[test]
    fn test_save_preserves_other_sections() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("settings.json"),
            r#"{"theme":{"accent":"green"},"backend":{"url":"https://old.example"}}"#,
        )
        .unwrap();

        let config = Config::resolve(file("https://x.supabase.co", "k"), env(&[])).unwrap();
        config.save(dir.path()).unwrap();

        let saved = read_settings(dir.path()).unwrap();
        assert_eq!(saved.backend.url.as_deref(), Some("https://x.supabase.co/"));
        assert_eq!(saved.other["theme"]["accent"], "green");
    }
}
