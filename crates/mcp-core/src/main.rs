//! mcp-core binary entry point: wires configuration, the dispatch engine,
//! and one bound transport together.

use std::net::SocketAddr;

use clap::Parser;

use mcp_core::config::{init_tracing, Config, TransportKind};
use mcp_core::model::ServerInfo;
use mcp_core::transport::http::{build_router, serve, HttpTransport};
use mcp_core::transport::stdio::StdioTransport;
use mcp_core::Engine;

#[derive(Parser, Debug)]
#[command(name = "mcp-core")]
#[command(about = "Model Context Protocol server runtime")]
#[command(version)]
struct Cli {
    /// Transport mode: stdio or http
    #[arg(long, default_value = "stdio")]
    transport: TransportKind,

    /// HTTP server bind address (only used with --transport http)
    #[arg(long, default_value = "0.0.0.0:8080", env = "MCP_BIND_ADDR")]
    bind_addr: SocketAddr,

    /// Path of the single MCP endpoint (only used with --transport http)
    #[arg(long, default_value = "/mcp", env = "MCP_ENDPOINT_PATH")]
    endpoint_path: String,

    /// Bearer token required on every request (only used with --transport http)
    #[arg(long, env = "MCP_BEARER_TOKEN")]
    bearer_token: Option<String>,

    /// `resource_metadata` URL surfaced on a 401 `WWW-Authenticate` header
    #[arg(long, env = "MCP_RESOURCE_METADATA_URL")]
    resource_metadata_url: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "MCP_JSON_LOGS")]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    init_tracing(&cli.log_level, cli.json_logs);

    let config = Config {
        transport: cli.transport,
        bind_addr: cli.bind_addr,
        endpoint_path: cli.endpoint_path,
        bearer_token: cli.bearer_token,
        resource_metadata_url: cli.resource_metadata_url,
        log_json: cli.json_logs,
        log_level: cli.log_level,
    };

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        transport = ?config.transport,
        "starting mcp-core"
    );

    let engine = Engine::new(ServerInfo { name: "mcp-core".to_string(), version: env!("CARGO_PKG_VERSION").to_string() });

    match config.transport {
        TransportKind::Stdio => {
            let transport = StdioTransport::new();
            let _dispatch = engine.bind(transport.clone());
            transport.run().await?;
        }
        TransportKind::Http => {
            let http_config = config.http_transport_config();
            let bind_addr = http_config.bind_addr;
            let transport = HttpTransport::new(http_config, engine.sessions.clone());
            let _dispatch = engine.bind(transport.clone());
            let router = build_router(transport, engine.sessions.clone());
            serve(router, bind_addr).await?;
        }
    }

    Ok(())
}
