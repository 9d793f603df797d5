//! portalauth - terminal client for portal authentication sessions.
//!
//! Logs in against a portal's auth endpoints, keeps the session across runs
//! and issues authenticated requests that refresh the session on demand.

mod app;
mod settings;

use std::io;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use app::App;
use settings::Settings;

const USAGE: &str = "\
Usage: portalauth <command>

Commands:
  login [username]   Sign in and store the session
  whoami             Restore the session and print the current account
  status             Show the stored session without contacting the server
  get <path>         Authenticated GET against the portal
  logout             Revoke the session and forget it

Environment:
  PORTALAUTH_BASE_URL   Portal base URL (default http://localhost:3000)
  PORTALAUTH_PORTAL     admin | user (default user)
  PORTALAUTH_STORAGE    file | keyring (default file)
  PORTALAUTH_TIMEOUT_SECS  Request timeout in seconds (default 30)
  RUST_LOG              Log filter (default warn)";

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        eprintln!("{}", USAGE);
        std::process::exit(2);
    };

    let settings = Settings::load()?;
    let mut app = App::new(settings)?;
    info!(command = %command, "portalauth starting");

    match command.as_str() {
        "login" => app.login(args.get(1).cloned()).await?,
        "whoami" => app.whoami().await?,
        "status" => app.status(),
        "get" => {
            let path = args
                .get(1)
                .ok_or_else(|| anyhow::anyhow!("Usage: portalauth get <path>"))?;
            app.get(path).await?;
        }
        "logout" => app.logout().await,
        "-h" | "--help" | "help" => println!("{}", USAGE),
        other => {
            eprintln!("Unknown command: {}\n\n{}", other, USAGE);
            std::process::exit(2);
        }
    }

    Ok(())
}
