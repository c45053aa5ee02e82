use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use secrecy::SecretString;

use brain_engine::{LlmEngine, RunnerConfig};
use brain_llm::{GeminiConfig, GeminiProvider, RetryConfig, RetryProvider};
use brain_server::ServerConfig;
use brain_telemetry::{init_telemetry, LogFormat, TelemetryConfig};

#[derive(Parser, Debug)]
#[command(name = "brain", version, about = "Tool-call bridge for remote agents")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Accept sessions over WebSocket until ctrl-c
    Serve(ServeArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Address to listen on
    #[arg(long, env = "BRAIN_ADDR", default_value = "0.0.0.0:8089")]
    addr: SocketAddr,

    /// Seconds to wait for each tool call response
    #[arg(long, env = "BRAIN_TOOL_TIMEOUT_SECS", default_value_t = 180)]
    tool_timeout_secs: u64,

    #[arg(long, env = "BRAIN_GEMINI_API_KEY", hide_env_values = true)]
    api_key: String,

    /// Gemini model id
    #[arg(long, env = "BRAIN_MODEL")]
    model: Option<String>,

    /// Default log level, overridden by RUST_LOG
    #[arg(long, env = "BRAIN_LOG_LEVEL", default_value = "info")]
    log_level: tracing::Level,

    /// Log output: json or text
    #[arg(long, env = "BRAIN_LOG_FORMAT", default_value = "json")]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> Result<()> {
    match Cli::parse().command {
        Command::Serve(args) => serve(args).await,
    }
}

async fn serve(args: ServeArgs) -> Result<()> {
    init_telemetry(TelemetryConfig {
        log_level: args.log_level,
        format: args.log_format,
        ..Default::default()
    })
    .context("failed to initialize logging")?;

    let mut gemini = GeminiConfig::new(SecretString::from(args.api_key));
    if let Some(model) = args.model {
        gemini = gemini.with_model(model);
    }
    tracing::info!(model = %gemini.model, "using gemini backend");
    let provider = GeminiProvider::new(gemini).context("failed to build model client")?;
    let provider = RetryProvider::new(provider, RetryConfig::default());
    let engine = Arc::new(LlmEngine::new(Arc::new(provider), RunnerConfig::default()));

    let config = ServerConfig {
        addr: args.addr,
        tool_timeout: Duration::from_secs(args.tool_timeout_secs),
        ..Default::default()
    };
    let handle = brain_server::start(config, engine)
        .await
        .with_context(|| format!("failed to bind {}", args.addr))?;
    tracing::info!(port = handle.port(), "brain ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    tracing::info!("shutting down");
    handle.shutdown().await;
    Ok(())
}
