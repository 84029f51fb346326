//! CLI command implementations

pub mod auth;
pub mod listen;
pub mod password;
pub mod prefs;
pub mod profile;
pub mod setup;
pub mod status;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use farma_core::adapters::UrlLocation;
use farma_core::config::{self, Config};
use farma_core::ports::Location;
use farma_core::{Error, FarmaContext, OperationResult};

/// Get the farma directory from environment or default
pub fn get_farma_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(config::DIR_ENV) {
        return Ok(PathBuf::from(dir));
    }
    let home = dirs::home_dir().context("Could not find home directory")?;
    Ok(home.join(".farma"))
}

/// Build a context whose location is the storefront root
pub fn get_context(offline: bool) -> Result<FarmaContext> {
    let farma_dir = get_farma_dir()?;
    let redirect_base = if offline {
        config::DEFAULT_REDIRECT_BASE.to_string()
    } else {
        Config::load(&farma_dir)
            .map_err(|e| config_error(e, &farma_dir))?
            .redirect_base
    };
    let location = FarmaContext::root_location(&redirect_base)?;
    get_context_at(offline, location)
}

/// Build a context reading from `location`, e.g. a pasted reset link
pub fn get_context_at(offline: bool, location: Arc<UrlLocation>) -> Result<FarmaContext> {
    let farma_dir = get_farma_dir()?;
    std::fs::create_dir_all(&farma_dir)
        .with_context(|| format!("Failed to create farma directory: {:?}", farma_dir))?;

    let location: Arc<dyn Location> = location;
    if offline {
        return Ok(FarmaContext::offline(&farma_dir, location));
    }
    FarmaContext::new(&farma_dir, location).map_err(|e| config_error(e, &farma_dir))
}

/// Context with the stored session restored
pub async fn get_initialized_context(offline: bool) -> Result<FarmaContext> {
    let ctx = get_context(offline)?;
    check(&ctx.store.initialize().await).context("Failed to restore session")?;
    Ok(ctx)
}

/// Attach a retry hint to configuration errors
fn config_error(e: Error, farma_dir: &Path) -> anyhow::Error {
    match e {
        Error::Config(_) => anyhow!(
            "{}\n\nSet {} and {} (or add them to {}) and try again.",
            e,
            config::URL_ENV,
            config::ANON_KEY_ENV,
            farma_dir.join("settings.json").display()
        ),
        other => anyhow::Error::new(other),
    }
}

/// Fail with the operation's error message unless it succeeded
pub fn check<T>(result: &OperationResult<T>) -> Result<()> {
    if !result.success {
        match result.error.as_deref() {
            Some(msg) if !msg.is_empty() => bail!("{}", msg),
            _ => bail!("Operation failed"),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_passes_success() {
        assert!(check(&OperationResult::ok(1)).is_ok());
    }

    #[test]
    fn test_check_surfaces_error_message() {
        let err = check(&OperationResult::<()>::fail("User not authenticated")).unwrap_err();
        assert_eq!(err.to_string(), "User not authenticated");
    }

    #[test]
    fn test_config_error_has_hint() {
        let err = config_error(Error::config("FARMA_SUPABASE_URL is not set"), Path::new("/tmp/f"));
        let text = err.to_string();
        assert!(text.starts_with("Configuration error: FARMA_SUPABASE_URL is not set"));
        assert!(text.contains("try again"));
    }

    #[test]
    fn test_other_errors_pass_through() {
        let err = config_error(Error::Unauthenticated, Path::new("/tmp/f"));
        assert_eq!(err.to_string(), "User not authenticated");
    }
}
