//! Sign-in, sign-up and sign-out commands

use anyhow::{bail, Result};
use dialoguer::{Input, Password};
use farma_core::domain::SignUpData;

use super::{check, get_context, get_initialized_context};
use crate::output;

/// Environment variable checked before prompting for a password
const PASSWORD_ENV: &str = "FARMA_PASSWORD";

/// Get password from FARMA_PASSWORD or prompt
fn get_password_or_prompt(prompt: &str) -> Result<String> {
    if let Ok(p) = std::env::var(PASSWORD_ENV) {
        return Ok(p);
    }
    Ok(Password::new().with_prompt(prompt).interact()?)
}

pub async fn login(offline: bool, email: Option<String>) -> Result<()> {
    let email = match email {
        Some(e) => e,
        None => Input::<String>::new().with_prompt("Email").interact_text()?,
    };
    let password = get_password_or_prompt("Password")?;

    let ctx = get_context(offline)?;
    let result = ctx.store.sign_in(&email, &password).await;
    check(&result)?;

    let name = ctx
        .store
        .profile()
        .map(|p| p.name)
        .unwrap_or_else(|| email.clone());
    output::success(&format!("Signed in as {}", name));
    Ok(())
}

pub async fn signup(
    offline: bool,
    email: String,
    name: String,
    phone: Option<String>,
    newsletter: bool,
    agree_terms: bool,
) -> Result<()> {
    if !agree_terms {
        bail!("You must agree to the terms to create an account (--agree-terms)");
    }

    let password = match std::env::var(PASSWORD_ENV) {
        Ok(p) => p,
        Err(_) => Password::new()
            .with_prompt("Password")
            .with_confirmation("Confirm password", "Passwords do not match")
            .interact()?,
    };

    let data = SignUpData {
        full_name: Some(name),
        phone,
        agree_to_terms: agree_terms,
        subscribe_newsletter: newsletter,
        ..Default::default()
    };

    let ctx = get_context(offline)?;
    let result = ctx.store.sign_up(&email, &password, &data).await;
    check(&result)?;

    let confirmed = result
        .data
        .and_then(|r| r.user)
        .is_some_and(|u| u.is_email_confirmed());
    if confirmed {
        output::success(&format!("Account created for {}", email));
    } else {
        output::success("Account created");
        output::info("Check your inbox to confirm your e-mail address.");
    }
    Ok(())
}

pub async fn oauth(offline: bool, provider: &str) -> Result<()> {
    let ctx = get_context(offline)?;
    let result = ctx.store.sign_in_with_oauth(provider).await;
    check(&result)?;

    if let Some(redirect) = result.data {
        output::info(&format!("Continue signing in with {} at:", redirect.provider));
        println!("{}", redirect.url);
    }
    Ok(())
}

pub async fn logout(offline: bool) -> Result<()> {
    let ctx = get_initialized_context(offline).await?;
    if !ctx.store.is_authenticated() {
        output::warning("Not signed in");
        return Ok(());
    }

    check(&ctx.store.sign_out().await)?;
    output::success("Signed out");
    Ok(())
}
