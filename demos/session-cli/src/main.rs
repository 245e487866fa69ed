//! Command-line session demo.
//!
//! Tokens are kept in the state file (`SCRAPEDECK_STATE_FILE`), so a login
//! in one invocation is picked up by the next. Set `RUST_LOG=debug` to
//! watch the session manager restore and refresh tokens.

use clap::{Parser, Subcommand};
use scrapedeck::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "session-cli")]
#[command(about = "Sign in to Scrapedeck and call the dashboard API", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in and store the session
    Login {
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        password: String,
    },
    /// Create an account and sign in
    Signup {
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        password: String,
    },
    /// Show the stored session
    Status,
    /// Sign out and forget the stored tokens
    Logout,
    /// List API keys
    Keys,
    /// Print usage statistics
    Dashboard,
    /// Check that both backends respond
    Ping,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let args = Args::parse();
    if let Err(e) = run(args.command).await {
        eprintln!("error: {e}");
        if e.is_auth_error() {
            eprintln!("run `session-cli login` first");
        }
        std::process::exit(1);
    }
}

async fn run(command: Command) -> Result<(), ScrapedeckError> {
    let client = ScrapedeckClient::builder()
        .config(ClientConfig::from_env()?)
        .build()?;
    client.initialize().await;

    let result = dispatch(&client, command).await;
    client.shutdown().await;
    result
}

async fn dispatch(client: &ScrapedeckClient, command: Command) -> Result<(), ScrapedeckError> {
    match command {
        Command::Login { email, password } => {
            client.session().login(&email, &password).await?;
            println!("signed in as {email}");
        }
        Command::Signup { name, email, password } => {
            let request = SignupRequest {
                name,
                email: email.clone(),
                password_confirm: password.clone(),
                password,
            };
            client.session().signup(request).await?;
            println!("account created for {email}");
        }
        Command::Status => {
            let snapshot = client.session().snapshot();
            println!("state:         {}", snapshot.state);
            println!("authenticated: {}", snapshot.is_authenticated);
            println!("state file:    {}", client.config().state_file.display());
        }
        Command::Logout => {
            client.session().logout().await;
            println!("signed out");
        }
        Command::Keys => {
            let keys = client.api_keys().await?;
            if keys.is_empty() {
                println!("no API keys");
            }
            for key in keys {
                let last_used = key.last_used.as_deref().unwrap_or("never");
                println!("{:>5}  {:<24} last used: {last_used}", key.id, key.name);
            }
        }
        Command::Dashboard => {
            let stats = client.dashboard().await?;
            println!("{}", serde_json::to_string_pretty(&stats).unwrap_or_else(|_| stats.to_string()));
        }
        Command::Ping => {
            for outcome in client.ping().await {
                let status = outcome.status.map_or_else(|| "unreachable".to_owned(), |s| s.to_string());
                println!("{:<40} {status}", outcome.base_url);
            }
        }
    }
    Ok(())
}
