//! Server configuration: the bind transport, the HTTP endpoint shape, and
//! authentication, loaded from CLI flags or the matching environment
//! variables.

use std::net::SocketAddr;

use crate::auth::AuthMode;
use crate::transport::http::HttpTransportConfig;

/// Which transport the server binds at startup.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum TransportKind {
    /// Newline-delimited JSON-RPC over stdin/stdout.
    #[default]
    Stdio,
    /// The streamable HTTP transport.
    Http,
}

/// Top-level server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub transport: TransportKind,
    pub bind_addr: SocketAddr,
    pub endpoint_path: String,
    pub bearer_token: Option<String>,
    pub resource_metadata_url: Option<String>,
    pub log_json: bool,
    pub log_level: String,
}

impl Config {
    /// Build an [`HttpTransportConfig`] from this configuration's HTTP
    /// fields, the way the bound transport actually wants them.
    #[must_use]
    pub fn http_transport_config(&self) -> HttpTransportConfig {
        let auth = match &self.bearer_token {
            Some(token) => AuthMode::StaticToken(token.clone()),
            None => AuthMode::None,
        };
        HttpTransportConfig {
            bind_addr: self.bind_addr,
            endpoint_path: self.endpoint_path.clone(),
            auth,
            resource_metadata_url: self.resource_metadata_url.clone(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            transport: TransportKind::Stdio,
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            endpoint_path: "/mcp".to_string(),
            bearer_token: None,
            resource_metadata_url: None,
            log_json: false,
            log_level: "info".to_string(),
        }
    }
}

/// Initialize the global `tracing` subscriber, compact or JSON depending on
/// `json`. Call once at process start.
pub fn init_tracing(log_level: &str, json: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let subscriber = tracing_subscriber::registry().with(filter);

    if json {
        subscriber.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        subscriber.with(tracing_subscriber::fmt::layer().compact()).init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_no_auth() {
        let config = Config::default();
        assert!(config.bearer_token.is_none());
        assert!(matches!(config.http_transport_config().auth, AuthMode::None));
    }

    #[test]
    fn bearer_token_becomes_static_token_auth() {
        let mut config = Config::default();
        config.bearer_token = Some("secret".into());
        assert!(matches!(config.http_transport_config().auth, AuthMode::StaticToken(ref t) if t == "secret"));
    }
}
