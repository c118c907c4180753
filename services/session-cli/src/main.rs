//! Session CLI
//!
//! Command-line front end for the session client:
//! 1. Loads configuration (TOML + env overlay)
//! 2. Opens the on-disk credential store
//! 3. Runs one command through the authenticated pipeline
//! 4. Prints the resulting JSON to stdout; logs go to stderr

mod command;
mod config;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use serde_json::{Value, json};
use session_auth::CredentialStore;
use session_client::{ApiRequest, MultipartForm, SessionClient, TracingObserver};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transport::ReqwestTransport;

use crate::command::{Cli, Command};
use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();

    // Installed before the client exists so every counter is captured
    let prometheus = if cli.print_metrics {
        Some(
            PrometheusBuilder::new()
                .install_recorder()
                .context("failed to install metrics recorder")?,
        )
    } else {
        None
    };

    let config_path = Config::resolve_path(cli.config_path.as_deref());
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        base_url = %config.client.base_url,
        store_path = %config.session.store_path.display(),
        max_attempts = config.retry.max_attempts,
        headers = config.headers.len(),
        "configuration loaded"
    );

    let store = CredentialStore::open(config.session.store_path.clone(), config.store_options())
        .await
        .with_context(|| {
            format!(
                "failed to open credential store {}",
                config.session.store_path.display()
            )
        })?;

    let http = reqwest::Client::builder()
        .build()
        .context("failed to build HTTP client")?;
    let client = SessionClient::new(
        Arc::new(ReqwestTransport::new(http)),
        Arc::new(store),
        config.client_config()?,
    )
    .with_observer(Arc::new(TracingObserver));

    let result = run(&client, &config, cli.command).await;

    if let Some(handle) = prometheus {
        eprint!("{}", handle.render());
    }

    let output = result?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn run(client: &SessionClient, config: &Config, command: Command) -> Result<Value> {
    match command {
        Command::Login { account } => {
            let account = account
                .or_else(|| config.login.account.clone())
                .context("no account given: pass one or set [login] account")?;
            let password = config
                .login
                .password
                .as_ref()
                .context("no password: set SESSION_PASSWORD or [login] password_file")?;

            let outcome = client
                .login(&account, password.expose())
                .await
                .context("login failed")?;
            Ok(json!({
                "logged_in": true,
                "expires_at": outcome.credential.expires_at,
                "identity": outcome.identity,
            }))
        }
        Command::Logout => {
            client.logout().await.context("logout failed")?;
            Ok(json!({ "logged_in": false }))
        }
        Command::Whoami => {
            let logged_in = client.is_logged_in().await;
            let remaining = client.store().remaining_ttl().await;
            let lifetime = client.current_credential().await.map(|c| c.lifetime());
            Ok(json!({
                "logged_in": logged_in,
                "identity": client.current_identity().await,
                "expires_in_secs": remaining.as_secs(),
                "lifetime_secs": lifetime.map(|l| l.as_secs()),
            }))
        }
        Command::Get { path, query } => {
            let request = query
                .into_iter()
                .fold(ApiRequest::get(&path), |req, (k, v)| req.with_query(k, v));
            Ok(client.execute(request).await?)
        }
        Command::Post { path, body } => Ok(client.post(&path, body).await?),
        Command::Delete { path, body } => Ok(client.delete(&path, body).await?),
        Command::Upload {
            path,
            file,
            field,
            content_type,
        } => {
            let bytes = tokio::fs::read(&file)
                .await
                .with_context(|| format!("failed to read {}", file.display()))?;
            let file_name = file
                .file_name()
                .and_then(|n| n.to_str())
                .context("upload path has no file name")?
                .to_string();
            let form = MultipartForm::new().file(field, file_name, bytes, content_type);
            Ok(client.upload_file(&path, form).await?)
        }
    }
}
