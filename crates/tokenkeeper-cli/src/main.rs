//! tokenkeeper - sign in to an authentication service and make
//! authenticated API calls from the terminal.
//!
//! The credential pair survives between runs in the configured token store
//! while its access token is valid; an expired pair is discarded at start-up.
//! Within a run, expired access tokens are renewed before each request.

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Local, Utc};
use tokenkeeper_core::{ApiClient, AuthCoordinator, AuthError, Config, HttpAuthService};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Directory for log files; stderr only when unset
const ENV_LOG_DIR: &str = "TOKENKEEPER_LOG_DIR";

/// Password used by `login` instead of prompting
const ENV_PASSWORD: &str = "TOKENKEEPER_PASSWORD";

const USAGE: &str = "\
Usage: tokenkeeper <command>

Commands:
  login [email]   Sign in and store the credential pair
  register        Create an account (does not sign in)
  logout          Forget the stored credential pair
  refresh         Renew the access token now
  status          Show who is signed in and when the token expires
  get <path>      Authenticated GET against the API, printed as JSON
  help            Show this message";

/// Initialize the tracing subscriber for logging
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var(ENV_LOG_DIR) {
        Ok(dir) if !dir.trim().is_empty() => {
            let appender = tracing_appender::rolling::daily(dir, "tokenkeeper.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

struct Cli {
    config: Config,
    auth: AuthCoordinator,
    api: ApiClient,
}

impl Cli {
    fn build() -> Result<Self> {
        let config = Config::load().context("Failed to load config")?;
        let store = config.open_token_store()?;
        let service = Arc::new(HttpAuthService::from_config(&config)?);
        let auth = AuthCoordinator::new(service, store);
        let api = ApiClient::from_config(&config, auth.clone())?;
        Ok(Self { config, auth, api })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let _log_guard = init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first().map(String::as_str) else {
        eprintln!("{}", USAGE);
        std::process::exit(2);
    };

    if matches!(command, "help" | "-h" | "--help") {
        println!("{}", USAGE);
        return Ok(());
    }

    let mut ctx = Cli::build()?;
    info!(command, "tokenkeeper starting");

    match command {
        "login" => login(&mut ctx, args.get(1).cloned()).await,
        "register" => register(&ctx).await,
        "logout" => {
            ctx.auth.logout();
            println!("Logged out.");
            Ok(())
        }
        "refresh" => refresh(&ctx).await,
        "status" => {
            status(&ctx);
            Ok(())
        }
        "get" => {
            let path = args
                .get(1)
                .ok_or_else(|| anyhow::anyhow!("Usage: tokenkeeper get <path>"))?;
            get(&ctx, path).await
        }
        other => {
            eprintln!("Unknown command: {}\n\n{}", other, USAGE);
            std::process::exit(2);
        }
    }
}

async fn login(ctx: &mut Cli, email: Option<String>) -> Result<()> {
    let email = match email.or_else(|| ctx.config.last_email.clone()) {
        Some(email) => email,
        None => prompt("Email")?,
    };
    let password = match std::env::var(ENV_PASSWORD) {
        Ok(password) if !password.is_empty() => password,
        _ => rpassword::prompt_password("Password: ")?,
    };

    println!("Authenticating...");
    match ctx.auth.login(&email, &password).await {
        Ok(_) => {
            ctx.config.last_email = Some(email);
            if let Err(e) = ctx.config.save() {
                warn!(error = %e, "Failed to save config");
            }
            println!("Login successful!");
            status(ctx);
            Ok(())
        }
        Err(e) => {
            report_auth_error(&e);
            Err(e.into())
        }
    }
}

async fn register(ctx: &Cli) -> Result<()> {
    let email = prompt("Email")?;
    let username = prompt("Username")?;
    let password = rpassword::prompt_password("Password: ")?;
    let confirmation = rpassword::prompt_password("Confirm password: ")?;

    match ctx
        .auth
        .register(&email, &username, &password, &confirmation)
        .await
    {
        Ok(result) => {
            let name = result.username.as_deref().unwrap_or(&username);
            println!("Account {} created. Run `tokenkeeper login` to sign in.", name);
            Ok(())
        }
        Err(e) => {
            report_auth_error(&e);
            Err(e.into())
        }
    }
}

async fn refresh(ctx: &Cli) -> Result<()> {
    match ctx.auth.refresh().await {
        Ok(_) => {
            println!("Access token refreshed.");
            status(ctx);
            Ok(())
        }
        Err(e) => {
            report_auth_error(&e);
            Err(e.into())
        }
    }
}

async fn get(ctx: &Cli, path: &str) -> Result<()> {
    let value: serde_json::Value = match ctx.api.get(path).await {
        Ok(value) => value,
        Err(e) if e.requires_login() => {
            eprintln!("Authentication required. Run `tokenkeeper login`.");
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    };
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn status(ctx: &Cli) {
    let state = ctx.auth.snapshot();
    let Some(identity) = state.identity() else {
        println!("Not signed in.");
        return;
    };

    let subject = identity.subject.as_deref().unwrap_or("unknown");
    println!("Signed in as: {}", subject);

    let now = Utc::now();
    match identity.expiry() {
        Some(expiry) if state.is_valid(now) => println!(
            "Access token expires: {} (in {}s)",
            expiry.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"),
            identity.seconds_until_expiry(now)
        ),
        _ => println!("Access token expired. Run `tokenkeeper login` to sign in again."),
    }

    println!("API base URL: {}", ctx.api.base_url());
}

fn report_auth_error(error: &AuthError) {
    let fields = error.field_errors();
    if fields.is_empty() {
        eprintln!("Error: {}", error);
        return;
    }
    for (field, message) in fields {
        eprintln!("  {}: {}", field, message);
    }
}

fn prompt(label: &str) -> Result<String> {
    print!("{}: ", label);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}
