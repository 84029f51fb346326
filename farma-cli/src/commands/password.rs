//! Password commands - reset e-mail, reset from a recovery link, change

use std::sync::Arc;

use anyhow::{bail, Result};
use clap::Subcommand;
use dialoguer::Password;
use farma_core::adapters::UrlLocation;

use super::{check, get_context, get_context_at, get_initialized_context};
use crate::output;

/// Shortest password the form accepts
const MIN_PASSWORD_LEN: usize = 6;

#[derive(Subcommand)]
pub enum PasswordCommands {
    /// Send a password reset e-mail
    Forgot {
        /// Account e-mail address
        email: String,
    },
    /// Choose a new password using the link from the reset e-mail
    Reset {
        /// Full link, including the part after '#'
        link: String,
    },
    /// Change the password of the signed-in account
    Set,
}

pub async fn run(offline: bool, command: PasswordCommands) -> Result<()> {
    match command {
        PasswordCommands::Forgot { email } => {
            let ctx = get_context(offline)?;
            let result = ctx.recovery.request_password_reset(&email).await;
            check(&result)?;
            if let Some(msg) = result.message {
                output::success(&msg);
            }
        }
        PasswordCommands::Reset { link } => {
            let location = Arc::new(UrlLocation::parse(&link)?);
            let ctx = get_context_at(offline, location)?;
            if !ctx.recovery.has_recovery_token() {
                bail!("That link does not contain a recovery token. Request a new reset e-mail.");
            }

            let password = prompt_new_password()?;
            let result = ctx.recovery.complete_forgot_password_reset(&password).await;
            check(&result)?;
            if let Some(msg) = result.message {
                output::success(&msg);
            }
        }
        PasswordCommands::Set => {
            let ctx = get_initialized_context(offline).await?;
            let password = prompt_new_password()?;
            let result = ctx.recovery.update_password_with_token(&password).await;
            check(&result)?;
            if let Some(msg) = result.message {
                output::success(&msg);
            }
        }
    }

    Ok(())
}

/// Prompt twice and apply the form's length rule
fn prompt_new_password() -> Result<String> {
    let password = Password::new()
        .with_prompt("New password")
        .with_confirmation("Confirm new password", "Passwords do not match")
        .interact()?;
    validate_new_password(&password)?;
    Ok(password)
}

fn validate_new_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        bail!("Password must be at least {} characters", MIN_PASSWORD_LEN);
    }
    Ok(())
}
