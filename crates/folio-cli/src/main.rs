use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use folio_core::config::AI_PROVIDER_VAR;
use folio_core::{
    EnvSnapshot, FailoverRouter, HttpTransport, ProcessEnv, ProviderKind, contains_redirect_marker,
    provider_status, resolve,
};
use folio_gateway::{GatewayServer, GatewayState};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::FolioConfig;

#[derive(Parser)]
#[command(name = "folio")]
#[command(version)]
#[command(about = "Folio: portfolio chat backend with LLM provider failover")]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the chat gateway
    Serve {
        /// Address to bind (overrides server.bind)
        #[arg(long)]
        bind: Option<String>,

        /// Port to listen on (overrides server.port)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Send a one-shot question through the failover router
    Ask {
        /// The message to send
        message: String,
    },

    /// Show provider availability and models
    Providers,

    /// Write the default config to ~/.folio
    Init,

    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    match cli.command {
        Commands::Init => cmd_init().await,
        Commands::Config => cmd_config(&cli.config).await,
        Commands::Providers => cmd_providers(&cli.config).await,
        Commands::Serve { bind, port } => cmd_serve(&cli.config, bind, port).await,
        Commands::Ask { message } => cmd_ask(&cli.config, &message).await,
    }
}

async fn cmd_init() -> Result<()> {
    let config_dir = config::config_dir();
    tokio::fs::create_dir_all(&config_dir)
        .await
        .with_context(|| format!("Failed to create config dir: {}", config_dir.display()))?;

    let config_path = config_dir.join("config.toml");
    if config_path.exists() {
        warn!("Config already exists at {}", config_path.display());
    } else {
        let default_config = include_str!("../../../config/default.toml");
        tokio::fs::write(&config_path, default_config).await?;
        info!("Created default config at {}", config_path.display());
    }

    println!("Folio initialized at {}", config_dir.display());
    println!("Set SYSTEM_PROMPT and at least one of GROQ_API_KEY, GEMINI_API_KEY or OPENROUTER_API_KEY.");
    Ok(())
}

async fn cmd_config(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = FolioConfig::load(config_path)?;
    println!("{}", toml::to_string_pretty(&cfg)?);
    Ok(())
}

async fn cmd_providers(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = FolioConfig::load(config_path)?;
    let order = cfg.failover_order()?;
    let env = EnvSnapshot::from_process();

    for status in provider_status(&env, &order) {
        let state = if status.available { "available" } else { "unavailable" };
        println!("{:<12} {:<12} {}", status.provider.id(), state, status.model);
        if let Some(key) = &status.masked_key {
            println!("{:<12} key: {}", "", key);
        }
        if let Some(reason) = &status.reason {
            println!("{:<12} {}", "", reason);
        }
    }
    Ok(())
}

fn build_router(cfg: &FolioConfig) -> Result<FailoverRouter> {
    let transport = HttpTransport::new(cfg.request_timeout()).context("Failed to build HTTP client")?;
    let mut router = FailoverRouter::new(Arc::new(transport), cfg.failover_order()?)?
        .with_redirect_passthrough(cfg.chat.redirect_passthrough);
    for (kind, url) in cfg.endpoint_overrides()? {
        info!("Using endpoint override for {}: {}", kind, url);
        router = router.with_endpoint(kind, url);
    }
    Ok(router)
}

async fn cmd_serve(
    config_path: &Option<PathBuf>,
    bind: Option<String>,
    port: Option<u16>,
) -> Result<()> {
    let cfg = FolioConfig::load(config_path)?;
    info!("Starting Folio gateway...");

    let env = EnvSnapshot::from_process();
    if let Some(raw) = env.get(AI_PROVIDER_VAR) {
        let preferred: ProviderKind = raw
            .parse()
            .with_context(|| format!("Invalid {} value", AI_PROVIDER_VAR))?;
        info!("Preferred provider: {}", preferred);
    }

    let router = build_router(&cfg)?;
    let available = provider_status(&env, router.order())
        .into_iter()
        .filter(|s| s.available)
        .count();
    if available == 0 {
        warn!("No provider API keys are set; chat requests will fail until one is configured");
    }

    let profile = cfg.load_profile()?;
    if let Some(name) = profile.name() {
        info!("Loaded profile for {}", name);
    }

    let bind = bind.unwrap_or_else(|| cfg.server.bind.clone());
    let port = port.unwrap_or(cfg.server.port);
    let addr: SocketAddr = format!("{}:{}", bind, port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", bind, port))?;

    let state = GatewayState::new(Arc::new(ProcessEnv), Some(profile), router);
    let server = GatewayServer::new(addr, state).with_cors(cfg.server.cors);

    let cancel = CancellationToken::new();
    let server_cancel = cancel.clone();
    let mut server_task = tokio::spawn(async move { server.run_until(server_cancel).await });

    let result = tokio::select! {
        res = &mut server_task => res,
        res = signal::ctrl_c() => {
            res?;
            info!("Received Ctrl+C, shutting down...");
            cancel.cancel();
            server_task.await
        }
    };

    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            error!("Gateway error: {}", e);
            return Err(e);
        }
        Err(e) => return Err(anyhow!("Gateway task panicked: {}", e)),
    }

    println!("Folio stopped.");
    Ok(())
}

async fn cmd_ask(config_path: &Option<PathBuf>, message: &str) -> Result<()> {
    if message.trim().is_empty() {
        return Err(anyhow!("Message is empty"));
    }

    let cfg = FolioConfig::load(config_path)?;
    let router = build_router(&cfg)?;
    let profile = cfg.load_profile()?;

    let env = EnvSnapshot::from_process();
    let resolution = resolve(&env, Some(&profile), router.order())?;
    for (provider, reason) in &resolution.errors {
        warn!("{}: {}", provider, reason);
    }

    let answer = router.dispatch(&resolution, message).await?;
    println!("{}", answer.response.content);
    eprintln!(
        "[provider: {}{}]",
        answer.response.provider,
        if answer.used_fallback {
            format!(", fallback from {}", answer.original_provider)
        } else {
            String::new()
        }
    );
    if contains_redirect_marker(&answer.response.content) {
        eprintln!("[suggest contacting the portfolio owner directly]");
    }
    Ok(())
}
