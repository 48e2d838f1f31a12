use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use url::{Host, Url};

use super::{AuthError, IdentityProvider, Session};

pub const DEFAULT_IDENTITY_BASE_URL: &str = "https://identitytoolkit.googleapis.com";

const SIGN_IN_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_RESPONSE_SIZE: usize = 64 * 1024;
/// Token lifetime assumed when the provider omits `expiresIn`.
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// Anonymous sign-up against an Identity Toolkit compatible endpoint.
///
/// `POST {base}/v1/accounts:signUp?key={api_key}` with
/// `{"returnSecureToken":true}`.
pub struct AnonymousSignIn {
    client: reqwest::Client,
    endpoint: Url,
    api_key: SecretString,
}

impl AnonymousSignIn {
    /// # Errors
    ///
    /// Rejects base URLs that do not parse, and non-HTTPS base URLs other
    /// than an exact loopback host. The API key travels in the query string.
    pub fn new(
        client: reqwest::Client,
        base_url: Option<&str>,
        api_key: SecretString,
    ) -> Result<Self, AuthError> {
        let base = base_url.unwrap_or(DEFAULT_IDENTITY_BASE_URL);
        let parsed = Url::parse(base).map_err(|e| AuthError::InvalidBaseUrl(e.to_string()))?;

        // SEC-002: never send the API key over plain HTTP to a remote host.
        match parsed.scheme() {
            "https" => {}
            "http" if is_loopback_host(&parsed) => {
                tracing::warn!(base_url = %base, "Using non-HTTPS identity base URL (loopback only)");
            }
            _ => {
                tracing::error!(base_url = %base, "Rejecting non-HTTPS identity base URL");
                return Err(AuthError::InsecureBaseUrl);
            }
        }

        let endpoint = Url::parse(&format!("{}/v1/accounts:signUp", base.trim_end_matches('/')))
            .map_err(|e| AuthError::InvalidBaseUrl(e.to_string()))?;

        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }
}

impl std::fmt::Debug for AnonymousSignIn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnonymousSignIn")
            .field("endpoint", &self.endpoint.as_str())
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignUpResponse {
    id_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    /// Seconds, sent as a decimal string.
    #[serde(default)]
    expires_in: Option<String>,
    local_id: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

#[async_trait]
impl IdentityProvider for AnonymousSignIn {
    async fn sign_in_anonymously(&self) -> Result<Session, AuthError> {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("key", self.api_key.expose_secret());

        let request = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(r#"{"returnSecureToken":true}"#);

        let response = tokio::time::timeout(SIGN_IN_TIMEOUT, request.send())
            .await
            .map_err(|_| AuthError::Timeout)?
            .map_err(AuthError::Network)?;

        let status = response.status();
        let bytes = read_limited(response).await?;

        if !status.is_success() {
            if let Ok(envelope) = serde_json::from_slice::<ErrorEnvelope>(&bytes) {
                if !envelope.error.message.is_empty() {
                    return Err(AuthError::Rejected(envelope.error.message));
                }
            }
            return Err(AuthError::HttpStatus(status.as_u16()));
        }

        let body: SignUpResponse = serde_json::from_slice(&bytes)
            .map_err(|e| AuthError::MalformedResponse(e.to_string()))?;

        let expires_at = expiry_from(body.expires_in.as_deref())?;

        Ok(Session {
            uid: body.local_id,
            id_token: SecretString::from(body.id_token),
            refresh_token: body.refresh_token.map(SecretString::from),
            expires_at,
        })
    }
}

/// Exact host match on `localhost` or a loopback address.
fn is_loopback_host(url: &Url) -> bool {
    match url.host() {
        Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(ip)) => ip.is_loopback(),
        Some(Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    }
}

/// Absolute expiry for a provider `expiresIn` (decimal seconds).
///
/// Values that are not positive or do not fit a timestamp are malformed.
fn expiry_from(raw: Option<&str>) -> Result<DateTime<Utc>, AuthError> {
    let malformed =
        || AuthError::MalformedResponse(format!("expiresIn {:?}", raw.unwrap_or_default()));
    let secs = match raw {
        Some(raw) => raw.trim().parse::<i64>().map_err(|_| malformed())?,
        None => DEFAULT_EXPIRES_IN_SECS,
    };
    if secs <= 0 {
        return Err(malformed());
    }
    chrono::Duration::try_seconds(secs)
        .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
        .ok_or_else(malformed)
}

async fn read_limited(response: reqwest::Response) -> Result<Vec<u8>, AuthError> {
    if response
        .content_length()
        .is_some_and(|len| len as usize > MAX_RESPONSE_SIZE)
    {
        return Err(AuthError::MalformedResponse("response too large".into()));
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(AuthError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > MAX_RESPONSE_SIZE {
            return Err(AuthError::MalformedResponse("response too large".into()));
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}
