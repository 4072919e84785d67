// Shared transport configuration for building reqwest::Client instances.
//
// The REST client and the change feed share TLS, timeout, and default-header
// settings through this module, avoiding duplicated builder logic.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};

use crate::error::Error;

/// TLS verification mode.
#[derive(Debug, Clone, Default)]
pub enum TlsMode {
    /// Use the system certificate store. Default for hosted backends.
    #[default]
    System,
    /// Use a custom CA certificate from the given PEM file.
    CustomCa(PathBuf),
    /// Accept any certificate (for self-hosted dev stacks).
    DangerAcceptInvalid,
}

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub tls: TlsMode,
    pub timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tls: TlsMode::System,
            timeout: Duration::from_secs(30),
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` with the given default headers.
    ///
    /// Used by the REST client to inject the project `apikey` header and
    /// the session bearer token on every request.
    pub fn build_client_with_headers(&self, headers: HeaderMap) -> Result<reqwest::Client, Error> {
        let mut builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent("qualisync/0.1.0")
            .default_headers(headers);

        match &self.tls {
            TlsMode::System => {}
            TlsMode::CustomCa(path) => {
                let cert_pem = std::fs::read(path)
                    .map_err(|e| Error::Tls(format!("failed to read CA cert: {e}")))?;
                let cert = reqwest::Certificate::from_pem(&cert_pem)
                    .map_err(|e| Error::Tls(format!("invalid CA cert: {e}")))?;
                builder = builder.add_root_certificate(cert);
            }
            TlsMode::DangerAcceptInvalid => {
                builder = builder.danger_accept_invalid_certs(true);
            }
        }

        builder
            .build()
            .map_err(|e| Error::Tls(format!("failed to build HTTP client: {e}")))
    }

    /// Build the standard header set: `apikey` plus `Authorization: Bearer`.
    ///
    /// The bearer token is the session access token when present, the anon
    /// key otherwise (unauthenticated reads on public tables).
    pub fn auth_headers(
        anon_key: &SecretString,
        access_token: Option<&SecretString>,
    ) -> Result<HeaderMap, Error> {
        let mut headers = HeaderMap::new();

        let mut key_value =
            HeaderValue::from_str(anon_key.expose_secret()).map_err(|e| Error::Authentication {
                message: format!("invalid anon key header value: {e}"),
            })?;
        key_value.set_sensitive(true);
        headers.insert("apikey", key_value);

        let bearer = access_token.unwrap_or(anon_key);
        let mut bearer_value = HeaderValue::from_str(&format!("Bearer {}", bearer.expose_secret()))
            .map_err(|e| Error::Authentication {
                message: format!("invalid bearer header value: {e}"),
            })?;
        bearer_value.set_sensitive(true);
        headers.insert(reqwest::header::AUTHORIZATION, bearer_value);

        Ok(headers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_headers_use_access_token_when_present() {
        let anon = SecretString::from("anon-key".to_string());
        let token = SecretString::from("session-token".to_string());

        let headers = TransportConfig::auth_headers(&anon, Some(&token)).expect("headers");
        assert_eq!(headers.get("apikey").map(|v| v.to_str().ok()), Some(Some("anon-key")));
        assert_eq!(
            headers
                .get(reqwest::header::AUTHORIZATION)
                .map(|v| v.to_str().ok()),
            Some(Some("Bearer session-token"))
        );
    }

    #[test]
    fn auth_headers_fall_back_to_anon_key() {
        let anon = SecretString::from("anon-key".to_string());

        let headers = TransportConfig::auth_headers(&anon, None).expect("headers");
        assert_eq!(
            headers
                .get(reqwest::header::AUTHORIZATION)
                .map(|v| v.to_str().ok()),
            Some(Some("Bearer anon-key"))
        );
    }
}
