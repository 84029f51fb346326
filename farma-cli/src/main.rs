//! Farma CLI - storefront account management in your terminal

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{auth, listen, password, prefs, profile, setup, status};

/// Environment variable holding the log filter
const LOG_ENV: &str = "FARMA_LOG";

/// Farma - storefront account management in your terminal
#[derive(Parser)]
#[command(name = "farma", version, about, long_about = None)]
struct Cli {
    /// Use a demo backend with a signed-in demo shopper (state kept apart in <dir>/offline)
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the Supabase project to use
    Setup {
        /// Project URL, e.g. https://abc.supabase.co
        #[arg(long)]
        url: Option<String>,
        /// Public anon key
        #[arg(long)]
        anon_key: Option<String>,
        /// Storefront origin that auth e-mails link back to
        #[arg(long)]
        redirect_base: Option<String>,
    },

    /// Show session and profile status
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Sign in with e-mail and password
    Login {
        /// Account e-mail (prompted if omitted)
        #[arg(long)]
        email: Option<String>,
    },

    /// Create an account
    Signup {
        #[arg(long)]
        email: String,
        /// Full name shown on the profile
        #[arg(long)]
        name: String,
        #[arg(long)]
        phone: Option<String>,
        /// Subscribe to the newsletter
        #[arg(long)]
        newsletter: bool,
        /// Agree to the terms of service
        #[arg(long)]
        agree_terms: bool,
    },

    /// Start signing in with an OAuth provider
    Oauth {
        /// Provider name, e.g. google
        provider: String,
    },

    /// Sign out of this device
    Logout,

    /// Manage the profile
    Profile {
        #[command(subcommand)]
        command: profile::ProfileCommands,
    },

    /// Upload a new avatar image
    Avatar {
        /// Image file
        path: PathBuf,
    },

    /// Reset or change the password
    Password {
        #[command(subcommand)]
        command: password::PasswordCommands,
    },

    /// Manage local preferences
    Prefs {
        #[command(subcommand)]
        command: prefs::PrefsCommands,
    },

    /// Follow auth events until Ctrl-C
    Listen,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

/// Log to stderr, filtered by FARMA_LOG (default: warn)
fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let offline = cli.offline;
    match cli.command {
        Commands::Setup { url, anon_key, redirect_base } => {
            setup::run(url, anon_key, redirect_base)
        }
        Commands::Status { json } => status::run(offline, json).await,
        Commands::Login { email } => auth::login(offline, email).await,
        Commands::Signup { email, name, phone, newsletter, agree_terms } => {
            auth::signup(offline, email, name, phone, newsletter, agree_terms).await
        }
        Commands::Oauth { provider } => auth::oauth(offline, &provider).await,
        Commands::Logout => auth::logout(offline).await,
        Commands::Profile { command } => profile::run(offline, command).await,
        Commands::Avatar { path } => profile::avatar(offline, &path).await,
        Commands::Password { command } => password::run(offline, command).await,
        Commands::Prefs { command } => prefs::run(offline, command),
        Commands::Listen => listen::run(offline).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_offline_flag_is_global() {
        let cli = Cli::try_parse_from(["farma", "prefs", "show", "--offline"]).unwrap();
        assert!(cli.offline);
        assert!(matches!(
            cli.command,
            Commands::Prefs { command: prefs::PrefsCommands::Show { json: false } }
        ));
    }

    #[test]
    fn test_signup_requires_email_and_name() {
        assert!(Cli::try_parse_from(["farma", "signup", "--email", "a@b.c"]).is_err());
    }
}
