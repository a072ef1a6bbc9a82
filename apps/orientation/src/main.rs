use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    CredentialStore, FileCredentialStore, HttpOrientationClient, OrientationWorkflow,
};
use shared::{domain::SessionId, protocol::RegisterRequest};
use tokio::io::BufReader;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod render;
mod wizard;

use config::load_settings;
use wizard::{Preset, Wizard};

#[derive(Parser, Debug)]
#[command(name = "orientation", about = "Study orientation assistant")]
struct Cli {
    /// Config file (defaults to ./orientation.toml when present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Overrides the backend base URL, e.g. http://localhost:8000/api.
    #[arg(long, global = true)]
    api_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an account.
    Register {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        password_confirm: String,
        #[arg(long, default_value = "")]
        first_name: String,
        #[arg(long, default_value = "")]
        last_name: String,
    },
    /// Request a sign-in; the backend emails a verification link.
    Login {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },
    /// Confirm (or refuse with --deny) a pending sign-in.
    Verify {
        #[arg(long)]
        token: String,
        #[arg(long)]
        deny: bool,
    },
    Refresh,
    Logout,
    /// Run the orientation questionnaire.
    Start {
        #[arg(long, requires = "transcript")]
        serie: Option<String>,
        #[arg(long, requires = "serie")]
        transcript: Option<PathBuf>,
    },
    /// List past orientation sessions.
    Sessions,
    Session {
        id: i64,
    },
    DeleteSession {
        id: i64,
    },
}

fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut settings = load_settings(cli.config.as_deref())?;
    if let Some(api_url) = cli.api_url {
        settings.api_base_url = api_url;
    }
    init_tracing(&settings.log_filter);
    info!(api = %settings.api_base_url, "orientation client starting");

    let credentials: Arc<dyn CredentialStore> =
        Arc::new(FileCredentialStore::new(&settings.credentials_path));
    let client = HttpOrientationClient::new(&settings.api_base_url, credentials)
        .with_context(|| format!("invalid API base URL '{}'", settings.api_base_url))?;

    match cli.command {
        Command::Register {
            username,
            email,
            password,
            password_confirm,
            first_name,
            last_name,
        } => {
            let response = client
                .register(&RegisterRequest {
                    username,
                    email,
                    password,
                    password2: password_confirm,
                    first_name,
                    last_name,
                })
                .await
                .context("registration failed")?;
            println!("{}", response.message);
        }
        Command::Login { username, password } => {
            let challenge = client
                .login(&username, &password)
                .await
                .context("sign-in request failed")?;
            print!("{}", render::login_challenge(&challenge));
            println!("Run `orientation verify --token <token>` with the token from the email.");
        }
        Command::Verify { token, deny } => {
            let response = client
                .verify_login(&token, !deny)
                .await
                .context("sign-in verification failed")?;
            println!("{}", response.message);
            if let Some(user) = response.user {
                println!("Signed in as {} <{}>", user.username, user.email);
            }
        }
        Command::Refresh => {
            client
                .refresh_access_token()
                .await
                .context("token refresh failed")?;
            println!("Access token refreshed.");
        }
        Command::Logout => {
            let response = client.logout().await.context("sign-out failed")?;
            println!("{}", response.message);
        }
        Command::Start { serie, transcript } => {
            let preset = serie
                .zip(transcript)
                .map(|(serie, transcript)| Preset { serie, transcript });
            let mut workflow = OrientationWorkflow::new(client);
            let mut wizard = Wizard::new(BufReader::new(tokio::io::stdin()), std::io::stdout());
            wizard.run(&mut workflow, preset).await?;
        }
        Command::Sessions => {
            let sessions = client
                .list_sessions()
                .await
                .context("failed to list sessions")?;
            if sessions.is_empty() {
                println!("No orientation session yet.");
            }
            for session in &sessions {
                println!("{}", render::session_line(session));
            }
        }
        Command::Session { id } => {
            let session = client
                .get_session(SessionId(id))
                .await
                .with_context(|| format!("failed to load session {id}"))?;
            print!("{}", render::session_detail(&session));
        }
        Command::DeleteSession { id } => {
            client
                .delete_session(SessionId(id))
                .await
                .with_context(|| format!("failed to delete session {id}"))?;
            println!("Session {id} deleted.");
        }
    }

    Ok(())
}
