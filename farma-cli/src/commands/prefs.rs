//! Preference commands - locally persisted settings

use anyhow::{bail, Result};
use clap::Subcommand;
use farma_core::Preferences;

use super::{check, get_context};
use crate::output;

const THEMES: &[&str] = &["auto", "light", "dark"];

#[derive(Subcommand)]
pub enum PrefsCommands {
    /// Show current preferences
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change one or more preferences
    Set {
        /// auto, light or dark
        #[arg(long)]
        theme: Option<String>,
        /// ISO 4217 currency code
        #[arg(long)]
        currency: Option<String>,
        #[arg(long)]
        language: Option<String>,
        /// Receive the newsletter
        #[arg(long)]
        newsletter: Option<bool>,
        /// Receive order notifications
        #[arg(long)]
        order_notifications: Option<bool>,
    },
}

pub fn run(offline: bool, command: PrefsCommands) -> Result<()> {
    let ctx = get_context(offline)?;

    match command {
        PrefsCommands::Show { json } => {
            let prefs = ctx.store.snapshot().preferences;
            if json {
                println!("{}", serde_json::to_string_pretty(&prefs)?);
            } else {
                print_preferences(&prefs);
            }
        }
        PrefsCommands::Set {
            theme,
            currency,
            language,
            newsletter,
            order_notifications,
        } => {
            let mut prefs = ctx.store.snapshot().preferences;
            if let Some(theme) = theme {
                if !THEMES.contains(&theme.as_str()) {
                    bail!("Unknown theme '{}'. Use one of: {}", theme, THEMES.join(", "));
                }
                prefs.theme = theme;
            }
            if let Some(currency) = currency {
                prefs.currency = currency.to_ascii_uppercase();
            }
            if let Some(language) = language {
                prefs.language = language;
            }
            if let Some(v) = newsletter {
                prefs.newsletter_subscribed = v;
            }
            if let Some(v) = order_notifications {
                prefs.order_notifications = v;
            }

            let result = ctx.store.update_preferences(prefs);
            check(&result)?;
            output::success("Preferences saved");
            if let Some(prefs) = result.data {
                print_preferences(&prefs);
            }
        }
    }

    Ok(())
}

fn print_preferences(prefs: &Preferences) {
    let yes_no = |v: bool| if v { "yes" } else { "no" }.to_string();
    let rows = vec![
        ("Theme", prefs.theme.clone()),
        ("Currency", prefs.currency.clone()),
        ("Language", prefs.language.clone()),
        ("Newsletter", yes_no(prefs.newsletter_subscribed)),
        ("Order notifications", yes_no(prefs.order_notifications)),
    ];
    println!("{}", output::field_table(rows));
}
