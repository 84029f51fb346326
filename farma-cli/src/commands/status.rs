//! Status command - show session and profile summary

use anyhow::Result;
use colored::Colorize;
use serde_json::json;

use super::get_initialized_context;
use crate::output::{self, or_dash};

pub async fn run(offline: bool, json: bool) -> Result<()> {
    let ctx = get_initialized_context(offline).await?;
    let state = ctx.store.snapshot();

    if json {
        let report = json!({
            "authenticated": state.is_authenticated(),
            "isAdmin": ctx.store.is_admin(),
            "user": state.user,
            "profile": state.profile.as_ref().map(|p| p.legacy_view()),
            "preferences": state.preferences,
            "addresses": state.addresses.len(),
            "recentlyViewed": state.recently_viewed,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{}", "Farma Account Status".bold());
    println!();

    let Some(user) = &state.user else {
        output::warning("Not signed in");
        println!("Run 'farma login' to sign in.");
        return Ok(());
    };

    let confirmed = if user.is_email_confirmed() { "yes" } else { "pending" };
    let mut rows = vec![
        ("Email", or_dash(user.email.as_deref())),
        ("Email confirmed", confirmed.to_string()),
    ];
    match &state.profile {
        Some(profile) => {
            rows.push(("Name", profile.name.clone()));
            rows.push(("Handle", or_dash(profile.user_id.as_deref())));
            rows.push(("Admin", if profile.is_admin { "yes" } else { "no" }.to_string()));
        }
        None => rows.push(("Profile", "not loaded".to_string())),
    }
    rows.push(("Saved addresses", state.addresses.len().to_string()));
    println!("{}", output::field_table(rows));

    if !state.recently_viewed.is_empty() {
        println!();
        println!("{}", "Recently Viewed".bold());
        for item in &state.recently_viewed {
            println!("  • {}", item);
        }
    }

    Ok(())
}
