//! VHX API command-line client
//!
//! 1. Loads `ClientConfig` (--config > VHX_CONFIG > ./vhx.toml, secrets
//!    from the environment or key files)
//! 2. Builds an authenticated `Client`
//! 3. Runs one command and prints the JSON result on stdout
//!
//! Logs go to stderr so stdout stays machine-readable.

mod command;

use anyhow::{Context, Result};
use serde_json::{Value, json};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vhx_client::{Client, ClientConfig};

use crate::command::Command;

fn init_tracing() {
    // LOG_LEVEL / RUST_LOG filter; JSON lines when LOG_FORMAT=json
    let filter = EnvFilter::try_from_env("LOG_LEVEL")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let invocation = command::parse(&args)?;

    let config_path = ClientConfig::resolve_path(invocation.config_path.as_deref());
    info!(path = %config_path.display(), "loading configuration");
    let config = ClientConfig::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    let client = Client::new(config).context("failed to build VHX client")?;
    let output = run(&client, invocation.command).await?;

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn run(client: &Client, command: Command) -> Result<Value> {
    debug!(?command, "running command");
    let output = match command {
        Command::Get { path } => client.get(&path).await?,
        Command::Delete { path } => client.delete(&path).await?,
        Command::Post { path, body } => client.post(&path, body).await?,
        Command::Put { path, body } => client.put(&path, body).await?,
        Command::Whoami => client.get("/me").await?,
        Command::Refresh => {
            client.refresh().await.context("token refresh failed")?;
            credentials(client)
        }
        Command::Credentials => credentials(client),
    };
    Ok(output)
}

fn credentials(client: &Client) -> Value {
    match client.credentials() {
        Some(map) => Value::Object(map),
        None => json!({ "mode": client.credential().mode() }),
    }
}
