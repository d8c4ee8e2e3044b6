use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

use crate::errors::TransportErrorKind;
use crate::outcome::TransactionResponse;
use crate::utils::split_escaped_list;

/// The HTTP capability the workload consumes.
///
/// One call is one attempt: implementations must not retry, and must report
/// every failure to obtain a response as [`TransactionResponse::TransportError`]
/// rather than returning early or panicking.
#[async_trait]
pub trait TransactionClient: Send + Sync {
    async fn post_transaction(
        &self,
        url: &str,
        headers: &HeaderMap,
        body: Vec<u8>,
    ) -> TransactionResponse;
}

#[async_trait]
impl TransactionClient for reqwest::Client {
    async fn post_transaction(
        &self,
        url: &str,
        headers: &HeaderMap,
        body: Vec<u8>,
    ) -> TransactionResponse {
        let response = match reqwest::Client::post(self, url)
            .headers(headers.clone())
            .body(body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                return TransactionResponse::transport_error(
                    TransportErrorKind::from_reqwest_error(&e),
                    e.to_string(),
                )
            }
        };

        let status = response.status().as_u16();
        match read_body_capped(response, MAX_RESPONSE_BODY_BYTES).await {
            Ok(body) => TransactionResponse::completed(status, body),
            Err(e) => TransactionResponse::transport_error(
                TransportErrorKind::from_reqwest_error(&e),
                format!("HTTP {} but body could not be read: {}", status, e),
            ),
        }
    }
}

/// Upper bound on how much of a response body is kept for classification.
pub const MAX_RESPONSE_BODY_BYTES: usize = 64 * 1024;

/// Reads at most `limit` bytes of the body. The rest is left unread and the
/// connection is dropped with the response.
async fn read_body_capped(
    mut response: reqwest::Response,
    limit: usize,
) -> Result<String, reqwest::Error> {
    let mut buf: Vec<u8> = Vec::new();
    while buf.len() < limit {
        match response.chunk().await? {
            Some(chunk) => {
                let take = chunk.len().min(limit - buf.len());
                buf.extend_from_slice(&chunk[..take]);
            }
            None => break,
        }
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Configuration for building the HTTP client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Bound on the whole request, body included
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub skip_tls_verify: bool,
    pub resolve_target_addr: Option<String>,
    pub custom_headers: Option<String>,
    pub pool_max_idle_per_host: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            skip_tls_verify: false,
            resolve_target_addr: None,
            custom_headers: None,
            pool_max_idle_per_host: 32,
        }
    }
}

/// Result of building the client, includes parsed headers for logging.
pub struct ClientBuildResult {
    pub client: reqwest::Client,
    pub parsed_headers: HeaderMap,
}

/// Builds a reqwest HTTP client with the specified configuration.
pub fn build_client(
    config: &ClientConfig,
) -> Result<ClientBuildResult, Box<dyn std::error::Error + Send + Sync>> {
    let mut client_builder = reqwest::Client::builder()
        .timeout(config.request_timeout)
        .connect_timeout(config.connect_timeout)
        .pool_max_idle_per_host(config.pool_max_idle_per_host);

    // DNS Override Configuration
    if let Some(ref resolve_str) = config.resolve_target_addr {
        if !resolve_str.is_empty() {
            client_builder = configure_dns_override(client_builder, resolve_str)?;
        } else {
            warn!("RESOLVE_TARGET_ADDR is set but empty, no DNS override will be applied");
        }
    }

    // Custom Headers Configuration
    let parsed_headers = configure_custom_headers(config.custom_headers.as_deref())?;
    if !parsed_headers.is_empty() {
        client_builder = client_builder.default_headers(parsed_headers.clone());
        info!(count = parsed_headers.len(), "Configured custom default headers");
    }

    let client = if config.skip_tls_verify {
        warn!("Skipping TLS certificate verification");
        client_builder
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true)
            .build()?
    } else {
        client_builder.build()?
    };

    Ok(ClientBuildResult {
        client,
        parsed_headers,
    })
}

fn configure_dns_override(
    client_builder: reqwest::ClientBuilder,
    resolve_str: &str,
) -> Result<reqwest::ClientBuilder, Box<dyn std::error::Error + Send + Sync>> {
    let (hostname, socket_addr) = parse_resolve_override(resolve_str)?;
    info!(
        hostname = %hostname,
        addr = %socket_addr,
        "Configured DNS override"
    );
    Ok(client_builder.resolve(&hostname, socket_addr))
}

/// Parses a `hostname:ip:port` DNS override.
pub fn parse_resolve_override(
    resolve_str: &str,
) -> Result<(String, SocketAddr), Box<dyn std::error::Error + Send + Sync>> {
    let parts: Vec<&str> = resolve_str.split(':').collect();
    if parts.len() != 3 {
        return Err(format!(
            "RESOLVE_TARGET_ADDR ('{}') is not in the expected format 'hostname:ip:port'",
            resolve_str
        )
        .into());
    }

    let hostname = parts[0].trim();
    let ip = parts[1].trim();
    let port_str = parts[2].trim();

    if hostname.is_empty() {
        return Err(
            "RESOLVE_TARGET_ADDR: hostname part cannot be empty. Format: 'hostname:ip:port'".into(),
        );
    }
    if ip.is_empty() {
        return Err(
            "RESOLVE_TARGET_ADDR: IP address part cannot be empty. Format: 'hostname:ip:port'"
                .into(),
        );
    }

    let port: u16 = port_str.parse().map_err(|e| {
        format!(
            "Failed to parse port '{}' in RESOLVE_TARGET_ADDR: {}. Format: 'hostname:ip:port'",
            port_str, e
        )
    })?;

    let socket_addr_str = format!("{}:{}", ip, port);
    let socket_addr: SocketAddr = socket_addr_str.parse().map_err(|e| {
        format!(
            "Failed to parse '{}' into a socket address for RESOLVE_TARGET_ADDR: {}",
            socket_addr_str, e
        )
    })?;

    Ok((hostname.to_string(), socket_addr))
}

/// Parses `Name:Value` pairs separated by commas (`\,` for a literal comma).
pub fn configure_custom_headers(
    custom_headers_str: Option<&str>,
) -> Result<HeaderMap, Box<dyn std::error::Error + Send + Sync>> {
    let mut parsed_headers = HeaderMap::new();

    let headers_str = match custom_headers_str {
        Some(s) if !s.is_empty() => s,
        _ => return Ok(parsed_headers),
    };

    for header_pair_str in split_escaped_list(headers_str) {
        let header_pair_str_trimmed = header_pair_str.trim();

        let (name_str, value_str) = header_pair_str_trimmed.split_once(':').ok_or_else(|| {
            format!(
                "Invalid header format in CUSTOM_HEADERS: '{}'. Expected 'Name:Value'.",
                header_pair_str_trimmed
            )
        })?;
        let name_str = name_str.trim();
        let value_str = value_str.trim();

        if name_str.is_empty() {
            return Err(format!(
                "Invalid header format: Header name cannot be empty in '{}'.",
                header_pair_str_trimmed
            )
            .into());
        }

        let header_name = HeaderName::from_str(name_str)
            .map_err(|e| format!("Invalid header name: {}. Name: '{}'", e, name_str))?;
        let header_value = HeaderValue::from_str(value_str).map_err(|e| {
            format!(
                "Invalid header value for '{}': {}. Value: '{}'",
                name_str, e, value_str
            )
        })?;

        parsed_headers.insert(header_name, header_value);
    }

    Ok(parsed_headers)
}
