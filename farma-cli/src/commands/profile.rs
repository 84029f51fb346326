//! Profile commands - show, refresh and edit the signed-in user's profile

use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use colored::Colorize;
use farma_core::domain::{AvatarUpload, Profile};
use serde_json::{Map, Value as JsonValue};

use super::{check, get_initialized_context};
use crate::output::{self, or_dash};

#[derive(Subcommand)]
pub enum ProfileCommands {
    /// Show the cached profile
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Re-read the profile from the backend
    Refresh,
    /// Change profile fields
    Update {
        /// Display name
        #[arg(long)]
        name: Option<String>,
        /// Public handle
        #[arg(long)]
        user_id: Option<String>,
        /// Free-text interests
        #[arg(long)]
        interests: Option<String>,
        /// Avatar image URL
        #[arg(long)]
        avatar_url: Option<String>,
    },
}

pub async fn run(offline: bool, command: ProfileCommands) -> Result<()> {
    let ctx = get_initialized_context(offline).await?;
    if !ctx.store.is_authenticated() {
        bail!("Not signed in. Run 'farma login' first.");
    }

    match command {
        ProfileCommands::Show { json } => {
            let profile = match ctx.store.profile() {
                Some(p) => p,
                None => {
                    let result = ctx.store.load_profile(None).await;
                    check(&result)?;
                    result.data.context("Profile not found")?
                }
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&profile.legacy_view())?);
            } else {
                print_profile(&profile);
            }
        }
        ProfileCommands::Refresh => {
            let result = ctx.store.refresh_profile().await;
            check(&result)?;
            if let Some(profile) = result.data {
                print_profile(&profile);
            }
        }
        ProfileCommands::Update {
            name,
            user_id,
            interests,
            avatar_url,
        } => {
            let updates = collect_updates(name, user_id, interests, avatar_url);
            if updates.is_empty() {
                bail!("Nothing to update. Pass at least one of --name, --user-id, --interests, --avatar-url");
            }
            let result = ctx.store.update_profile(&updates).await;
            check(&result)?;
            output::success("Profile updated");
            if let Some(profile) = result.data {
                print_profile(&profile);
            }
        }
    }

    Ok(())
}

/// Upload a new avatar image from disk
pub async fn avatar(offline: bool, path: &Path) -> Result<()> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {:?}", path))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "avatar".to_string());
    let content_type = content_type_for(path);

    let ctx = get_initialized_context(offline).await?;
    let upload = AvatarUpload::new(file_name, content_type, bytes);
    println!("Uploading {} ({})", path.display(), output::format_size(upload.size()));

    let result = ctx.store.upload_avatar(upload).await;
    check(&result)?;
    output::success("Avatar updated");
    if let Some(uploaded) = result.data {
        println!("{}", uploaded.url);
    }
    Ok(())
}

fn collect_updates(
    name: Option<String>,
    user_id: Option<String>,
    interests: Option<String>,
    avatar_url: Option<String>,
) -> Map<String, JsonValue> {
    [
        ("name", name),
        ("user_id", user_id),
        ("interests", interests),
        ("avatar", avatar_url),
    ]
    .into_iter()
    .filter_map(|(key, value)| value.map(|v| (key.to_string(), JsonValue::String(v))))
    .collect()
}

/// MIME type from the file extension
fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "avif" => "image/avif",
        _ => "application/octet-stream",
    }
}

fn print_profile(profile: &Profile) {
    println!("{}", profile.name.bold());
    let rows = vec![
        ("Handle", or_dash(profile.user_id.as_deref())),
        ("Phone", or_dash(profile.phone.as_deref())),
        ("Interests", or_dash(profile.interests.as_deref())),
        ("Avatar", or_dash(profile.avatar.as_deref())),
        (
            "Newsletter",
            if profile.subscribed_to_newsletters { "subscribed" } else { "no" }.to_string(),
        ),
        (
            "Password changed",
            profile
                .password_changed_at
                .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
                .unwrap_or_else(|| "-".to_string()),
        ),
    ];
    println!("{}", output::field_table(rows));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for(Path::new("me.PNG")), "image/png");
        assert_eq!(content_type_for(Path::new("me.jpeg")), "image/jpeg");
        assert_eq!(content_type_for(Path::new("notes.txt")), "application/octet-stream");
        assert_eq!(content_type_for(Path::new("README")), "application/octet-stream");
    }

    #[test]
    fn test_collect_updates_skips_missing() {
        let updates = collect_updates(Some("Asha".into()), None, None, Some("https://x/a.png".into()));
        assert_eq!(updates.len(), 2);
        assert_eq!(updates["name"], "Asha");
        assert_eq!(updates["avatar"], "https://x/a.png");
    }
}
