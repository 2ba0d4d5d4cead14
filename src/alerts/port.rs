//! PORT alerts: TCP connect checks against a configured host and port

use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use serde_json::json;
use tokio::net::TcpStream;
use tokio::time;

use super::base::{AlertCheck, CheckContext, CheckOutcome};
use super::config::{placeholder_keys, AlertDefinition, AlertState};
use super::AlertError;

/// Checks that a TCP port accepts connections
#[derive(Debug, Clone)]
pub struct PortAlert {
    /// Literal `host:port` / URL, or a `{{lookup/key}}` placeholder
    uri: String,
    default_port: u16,
    /// Connect timeout; reported as CRITICAL when exceeded
    timeout: Duration,
    /// Response time above which the result is WARNING
    warning: Option<Duration>,
}

impl PortAlert {
    pub const SOURCE_TYPE: &'static str = "PORT";
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn from_definition(definition: &AlertDefinition) -> Result<Self, AlertError> {
        let source = &definition.source;
        let invalid = |reason: &str| AlertError::InvalidDefinition {
            name: definition.name.clone(),
            reason: reason.to_string(),
        };

        let uri = source
            .param_str("uri")
            .ok_or_else(|| invalid("PORT source requires a uri"))?
            .to_string();
        let default_port = source
            .param_u64("default_port")
            .and_then(|p| u16::try_from(p).ok())
            .ok_or_else(|| invalid("PORT source requires a valid default_port"))?;

        let threshold = |state| {
            source
                .reporting
                .for_state(state)
                .and_then(|entry| entry.value)
                .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
                .filter(|d| !d.is_zero())
        };

        Ok(Self {
            uri,
            default_port,
            timeout: threshold(AlertState::Critical).unwrap_or(Self::DEFAULT_TIMEOUT),
            warning: threshold(AlertState::Warning),
        })
    }

    /// Registry constructor
    pub fn create(definition: &AlertDefinition) -> Result<Box<dyn AlertCheck>, AlertError> {
        Ok(Box::new(Self::from_definition(definition)?))
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Host and port to probe, falling back to the agent host and default port
    fn target(&self, ctx: &CheckContext) -> (String, u16) {
        let (host, port) = match ctx.lookup_property_value(&self.uri) {
            Some(value) => split_host_port(&value),
            None => (None, None),
        };

        let host = match host {
            Some(h) if h != "0.0.0.0" => h,
            _ if !ctx.host_name.is_empty() => ctx.host_name.clone(),
            _ => "localhost".to_string(),
        };
        (host, port.unwrap_or(self.default_port))
    }
}

impl AlertCheck for PortAlert {
    fn source_type(&self) -> &'static str {
        Self::SOURCE_TYPE
    }

    fn lookup_keys(&self) -> Vec<String> {
        placeholder_keys(&self.uri)
    }

    fn check<'a>(
        &'a self,
        ctx: &'a CheckContext,
    ) -> BoxFuture<'a, Result<CheckOutcome, AlertError>> {
        Box::pin(async move {
            let (host, port) = self.target(ctx);
            let started = Instant::now();

            let connect = TcpStream::connect((host.as_str(), port));
            let outcome = match time::timeout(self.timeout, connect).await {
                Ok(Ok(_stream)) => {
                    let elapsed = started.elapsed();
                    let state = match self.warning {
                        Some(warning) if elapsed >= warning => AlertState::Warning,
                        _ => AlertState::Ok,
                    };
                    CheckOutcome::new(state, vec![json!(elapsed.as_secs_f64()), json!(port)])
                }
                Ok(Err(e)) => CheckOutcome::new(
                    AlertState::Critical,
                    vec![json!(e.to_string()), json!(host), json!(port)],
                ),
                Err(_) => {
                    let reason = format!("Connection timed out after {:?}", self.timeout);
                    CheckOutcome::new(
                        AlertState::Critical,
                        vec![json!(reason), json!(host), json!(port)],
                    )
                }
            };

            tracing::trace!(
                cluster = %ctx.cluster,
                host = %host,
                port,
                state = %outcome.state,
                "Port check finished"
            );

            Ok(outcome)
        })
    }
}

/// Split `scheme://host:port/path`, `host:port` or `[v6]:port` into parts.
/// A port that does not parse is reported as absent.
pub fn split_host_port(uri: &str) -> (Option<String>, Option<u16>) {
    let rest = match uri.find("://") {
        Some(idx) => &uri[idx + 3..],
        None => uri,
    };
    let authority = rest.split('/').next().unwrap_or_default().trim();

    let (host, port) = if let Some(bracketed) = authority.strip_prefix('[') {
        match bracketed.split_once(']') {
            Some((host, tail)) => (host, tail.strip_prefix(':')),
            None => (bracketed, None),
        }
    } else if authority.matches(':').count() == 1 {
        match authority.split_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (authority, None),
        }
    } else {
        (authority, None)
    };

    let host = (!host.is_empty()).then(|| host.to_string());
    let port = port.and_then(|p| p.trim().parse().ok());
    (host, port)
}
