use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::Certificate;
use std::env;
use std::fs;
use std::time::Duration;

/// Extra root certificate for networks that intercept TLS.
const EXTRA_CA_CERT_ENV: &str = "UPSTOX_CA_CERT";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

fn env_path(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn load_extra_ca_certificate() -> Result<Option<Certificate>> {
    let Some(path) = env_path(EXTRA_CA_CERT_ENV) else {
        return Ok(None);
    };
    let pem = fs::read(&path)
        .with_context(|| format!("failed to read CA certificate from {}", path))?;
    let certificate = Certificate::from_pem(&pem)
        .with_context(|| format!("failed to parse CA certificate from {}", path))?;
    Ok(Some(certificate))
}

fn default_headers(access_token: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    let mut bearer = HeaderValue::from_str(&format!("Bearer {}", access_token))
        .context("access token contains characters not allowed in a header")?;
    bearer.set_sensitive(true);
    headers.insert(AUTHORIZATION, bearer);
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    Ok(headers)
}

/// Blocking client that sends the bearer token on every request.
pub fn build_blocking_client(
    timeout: Option<Duration>,
    access_token: &str,
) -> Result<reqwest::blocking::Client> {
    let mut builder =
        reqwest::blocking::Client::builder().default_headers(default_headers(access_token)?);
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    if let Some(certificate) = load_extra_ca_certificate()? {
        builder = builder.add_root_certificate(certificate);
    }
    builder.build().context("failed to build HTTP client")
}
