//! HTTP client for an organization's certificate authority.
//!
//! Speaks the CA's REST API:
//! - `POST {ca}/api/v1/register`, authorized by a token made of the
//!   registrar's certificate and its signature over the request body
//! - `POST {ca}/api/v1/enroll`, authorized with basic auth (name, secret),
//!   carrying a signing request for a key generated on this side
//!
//! Every response uses the envelope `{success, result, errors, messages}`.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hfc_core::{Certificate, Enrollment, Identity, Keypair};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{NetworkError, Result};
use crate::transport::{CertificateAuthority, RegistrationRequest};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct ApiError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    success: bool,
    result: Option<T>,
    #[serde(default)]
    errors: Vec<ApiError>,
}

#[derive(Debug, Deserialize)]
struct RegisterResult {
    secret: String,
}

#[derive(Debug, Serialize)]
struct EnrollBody<'a> {
    certificate_request: &'a str,
}

#[derive(Debug, Deserialize)]
struct EnrollResult {
    #[serde(rename = "Cert")]
    cert: String,
}

/// Certificate authority reached over HTTP(S).
pub struct HttpCertificateAuthority {
    location: String,
    client: reqwest::Client,
}

impl HttpCertificateAuthority {
    pub fn new(location: impl Into<String>) -> Result<Self> {
        let location = location.into();
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| NetworkError::unreachable(&location, e))?;
        Ok(Self {
            location: location.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1/{}", self.location, path)
    }

    /// Authorization token: `base64(cert).base64(signature(body || cert))`.
    fn auth_token(body: &[u8], registrar: &Identity) -> Result<String> {
        let cert = registrar
            .certificate()
            .ok_or_else(|| NetworkError::rejected(&registrar.name, "registrar is not enrolled"))?;
        let cert_b64 = STANDARD.encode(cert.as_bytes());
        let mut signed = STANDARD.encode(body).into_bytes();
        signed.push(b'.');
        signed.extend_from_slice(cert_b64.as_bytes());
        let signature = registrar
            .sign(&signed)
            .map_err(|e| NetworkError::rejected(&registrar.name, e))?;
        Ok(format!("{}.{}", cert_b64, STANDARD.encode(signature.as_bytes())))
    }

    async fn read_envelope<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();
        let envelope: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| NetworkError::malformed(&self.location, e))?;

        if !envelope.success || !status.is_success() {
            let reason = envelope
                .errors
                .iter()
                .map(|e| format!("[{}] {}", e.code, e.message))
                .collect::<Vec<_>>()
                .join("; ");
            let reason = if reason.is_empty() {
                format!("HTTP {}", status)
            } else {
                reason
            };
            return Err(NetworkError::rejected(&self.location, reason));
        }
        envelope
            .result
            .ok_or_else(|| NetworkError::malformed(&self.location, "success without result"))
    }
}

#[async_trait]
impl CertificateAuthority for HttpCertificateAuthority {
    fn location(&self) -> &str {
        &self.location
    }

    async fn register(
        &self,
        request: &RegistrationRequest,
        registrar: &Identity,
    ) -> Result<String> {
        let body =
            serde_json::to_vec(request).map_err(|e| NetworkError::malformed(&self.location, e))?;
        let token = Self::auth_token(&body, registrar)?;
        debug!(ca = %self.location, name = %request.name, "registering identity");

        let response = self
            .client
            .post(self.url("register"))
            .header(reqwest::header::AUTHORIZATION, token)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| NetworkError::unreachable(&self.location, e))?;

        let result: RegisterResult = self.read_envelope(response).await?;
        Ok(result.secret)
    }

    async fn enroll(&self, name: &str, secret: &str) -> Result<Enrollment> {
        let keypair = Keypair::generate();
        let request = keypair.public_key.to_hex();
        debug!(ca = %self.location, name, "enrolling identity");

        let response = self
            .client
            .post(self.url("enroll"))
            .basic_auth(name, Some(secret))
            .json(&EnrollBody {
                certificate_request: &request,
            })
            .send()
            .await
            .map_err(|e| NetworkError::unreachable(&self.location, e))?;

        let result: EnrollResult = self.read_envelope(response).await?;
        let pem = STANDARD
            .decode(result.cert.trim())
            .map_err(|e| NetworkError::malformed(&self.location, e))?;
        let pem = String::from_utf8(pem).map_err(|e| NetworkError::malformed(&self.location, e))?;

        let cert =
            Certificate::from_pem(&pem).map_err(|e| NetworkError::malformed(&self.location, e))?;
        if cert.public_key() != &keypair.public_key {
            return Err(NetworkError::malformed(
                &self.location,
                "issued certificate does not match the requested key",
            ));
        }
        Ok(Enrollment::new(keypair.private_key_hex(), pem))
    }
}
