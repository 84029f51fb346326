//! Setup command - point the CLI at a Supabase project

use anyhow::Result;
use colored::Colorize;
use dialoguer::Input;
use farma_core::config::{self, Config};

use super::get_farma_dir;

pub fn run(url: Option<String>, anon_key: Option<String>, redirect_base: Option<String>) -> Result<()> {
    let url = match url {
        Some(u) => u,
        None => Input::<String>::new()
            .with_prompt("Supabase project URL")
            .interact_text()?,
    };
    let anon_key = match anon_key {
        Some(k) => k,
        None => Input::<String>::new()
            .with_prompt("Supabase anon key")
            .interact_text()?,
    };
    let redirect_base = match redirect_base {
        Some(r) => r,
        None => Input::<String>::new()
            .with_prompt("Storefront URL")
            .default(config::DEFAULT_REDIRECT_BASE.to_string())
            .interact_text()?,
    };

    let config = Config::new(&url, &anon_key, Some(&redirect_base))?;
    let farma_dir = get_farma_dir()?;
    config.save(&farma_dir)?;

    println!("{} Backend configured ({})", "Success!".green(), config.supabase_url);
    println!("Run 'farma login' to sign in.");
    Ok(())
}
