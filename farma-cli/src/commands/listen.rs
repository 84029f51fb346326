//! Listen command - follow auth events until interrupted

use anyhow::Result;
use colored::Colorize;
use tokio::sync::broadcast::error::RecvError;

use farma_core::ports::AuthGateway;
use farma_core::FarmaContext;

use super::get_initialized_context;
use crate::output;

pub async fn run(offline: bool) -> Result<()> {
    let ctx = get_initialized_context(offline).await?;
    let location = FarmaContext::root_location(&ctx.redirect_base)?;
    let mut events = ctx.gateway.subscribe();
    let _listener = ctx.listen(location);

    output::info("Listening for auth events (Ctrl-C to stop)");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            received = events.recv() => match received {
                Ok(event) => {
                    let who = event
                        .user()
                        .and_then(|u| u.email.clone())
                        .unwrap_or_default();
                    println!(
                        "{} {} {}",
                        chrono::Local::now().format("%H:%M:%S"),
                        event.kind.as_str().bold(),
                        who
                    );
                }
                Err(RecvError::Lagged(skipped)) => {
                    output::warning(&format!("Missed {} events", skipped));
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    let state = ctx.store.snapshot();
    match &state.user {
        Some(user) => println!("Signed in as {}", user.email.as_deref().unwrap_or(&user.id)),
        None => println!("Signed out"),
    }
    Ok(())
}
