//! cord - gateway session client
//!
//! Connects to the gateway and prints every dispatched event as one JSON
//! line on stdout. Logs go to stderr.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use cord_gateway::{Client, ClientConfig, GatewaySession};
use futures::StreamExt;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "cord")]
#[command(about = "Gateway session client")]
#[command(version)]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Bot token (overrides the config file)
    #[arg(long, env = "CORD_TOKEN", global = true, hide_env_values = true)]
    token: Option<String>,

    /// Connect timeout in milliseconds, 0 for none (overrides the config file)
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a session and print events until interrupted
    Listen {
        /// Gateway URL to connect to directly, skipping bootstrap
        #[arg(long)]
        url: Option<String>,
    },

    /// Print the resolved gateway URL
    GatewayUrl,

    /// Validate the configuration and print it without the token
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::from_default_env().add_directive("cord_gateway=info".parse()?);
    if cli.json_logs {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .init();
    }

    let config = load_config(&cli)?;

    match cli.command {
        Commands::Listen { url } => {
            listen(config, url).await?;
        }

        Commands::GatewayUrl => {
            let client = Client::new(config)?;
            println!("{}", client.gateway_url().await?);
        }

        Commands::CheckConfig => {
            let mut shown = config;
            shown.token = "<redacted>".to_string();
            print!("{}", toml::to_string_pretty(&shown)?);
        }
    }

    Ok(())
}

fn load_config(cli: &Cli) -> anyhow::Result<ClientConfig> {
    let mut config = match (&cli.config, &cli.token) {
        (Some(path), _) => ClientConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        (None, Some(token)) => ClientConfig::new(token.clone()),
        (None, None) => anyhow::bail!("no token given: pass --token, set CORD_TOKEN or use --config"),
    };

    if let Some(token) = &cli.token {
        config.token.clone_from(token);
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        config.timeout_ms = timeout_ms;
    }

    config.validate()?;
    Ok(config)
}

async fn listen(config: ClientConfig, url: Option<String>) -> anyhow::Result<()> {
    let client = Client::new(config)?;
    let mut session = match url {
        Some(url) => GatewaySession::open(client.session_options(url))?,
        None => client.gateway().await?,
    };
    info!("listening for events");

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = &mut shutdown => {
                result.context("waiting for ctrl-c")?;
                info!("interrupted, closing session");
                session.close().await?;
                return Ok(());
            }
            item = session.next() => match item {
                Some(Ok(event)) => println!("{}", serde_json::to_string(&event)?),
                Some(Err(e)) => {
                    error!(error = %e, "session failed");
                    return Err(e.into());
                }
                None => return Ok(()),
            },
        }
    }
}
