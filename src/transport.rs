/*!
 * HTTP transport for the Upload API
 *
 * Wraps a `reqwest::Client` with request signing, the client user agent and
 * retry-on-throttle behavior. Every request races the caller's cancellation
 * token, including the backoff sleeps between retries.
 */

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, RETRY_AFTER};
use reqwest::{Client, Request, RequestBuilder, Response, StatusCode};
use tracing::{debug, warn};
use upflow_core_resilience::{cancellable, policy_fn, retrier, CancellationToken, RetryContext, RetryDecision};

use crate::config::UploadSettings;
use crate::error::{Result, UploadError};

/// Header carrying the client identification string
pub const USER_AGENT_HEADER: &str = "x-uc-user-agent";

/// Signs outgoing requests
pub trait AuthScheme: Send + Sync + fmt::Debug {
    /// Headers to add to `request` before it is sent
    fn headers(&self, request: &Request) -> Result<HeaderMap>;

    /// Public key identifying the project
    fn public_key(&self) -> &str;
}

/// Public-key-only auth; the key travels in the form or query string
#[derive(Debug, Clone)]
pub struct PublicKeyAuth {
    public_key: String,
}

impl PublicKeyAuth {
    pub fn new(public_key: impl Into<String>) -> Self {
        Self {
            public_key: public_key.into(),
        }
    }
}

impl AuthScheme for PublicKeyAuth {
    fn headers(&self, _request: &Request) -> Result<HeaderMap> {
        Ok(HeaderMap::new())
    }

    fn public_key(&self) -> &str {
        &self.public_key
    }
}

/// `Authorization: Uploadcare.Simple <public>:<secret>`
#[derive(Clone)]
pub struct SimpleAuth {
    public_key: String,
    secret_key: String,
}

impl SimpleAuth {
    pub fn new(public_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            public_key: public_key.into(),
            secret_key: secret_key.into(),
        }
    }
}

impl fmt::Debug for SimpleAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimpleAuth")
            .field("public_key", &self.public_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

impl AuthScheme for SimpleAuth {
    fn headers(&self, _request: &Request) -> Result<HeaderMap> {
        let value = format!("Uploadcare.Simple {}:{}", self.public_key, self.secret_key);
        let mut value = HeaderValue::from_str(&value)
            .map_err(|e| UploadError::Config(format!("invalid credentials: {}", e)))?;
        value.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, value);
        Ok(headers)
    }

    fn public_key(&self) -> &str {
        &self.public_key
    }
}

/// Build the auth scheme the settings call for
pub fn auth_from_settings(settings: &UploadSettings) -> Result<Arc<dyn AuthScheme>> {
    if settings.public_key.trim().is_empty() {
        return Err(UploadError::Config("public key is required".to_string()));
    }

    Ok(match &settings.secret_key {
        Some(secret) => Arc::new(SimpleAuth::new(&settings.public_key, secret)),
        None => Arc::new(PublicKeyAuth::new(&settings.public_key)),
    })
}

/// Client identification string sent with every request
pub fn user_agent(public_key: &str, integration: Option<&str>) -> String {
    let mut agent = format!(
        "UploadcareUploadClient/{}/{} (Rust",
        env!("CARGO_PKG_VERSION"),
        public_key
    );
    if let Some(integration) = integration {
        agent.push_str("; ");
        agent.push_str(integration);
    }
    agent.push(')');
    agent
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Signing {
    Signed,
    Presigned,
}

/// Signed, throttle-aware HTTP transport
#[derive(Debug, Clone)]
pub struct Transport {
    http: Client,
    auth: Arc<dyn AuthScheme>,
    user_agent: HeaderValue,
    retry_throttled_max_times: u32,
    retry_network_error_max_times: u32,
    throttle_backoff: Duration,
    network_backoff: Duration,
}

impl Transport {
    /// Create a transport with a fresh `reqwest::Client`
    pub fn new(settings: &UploadSettings) -> Result<Self> {
        let http = Client::builder()
            .build()
            .map_err(|e| UploadError::Config(format!("failed to build HTTP client: {}", e)))?;
        Self::with_client(http, settings)
    }

    /// Create a transport around an existing client
    pub fn with_client(http: Client, settings: &UploadSettings) -> Result<Self> {
        let auth = auth_from_settings(settings)?;
        let agent = user_agent(auth.public_key(), settings.integration.as_deref());
        let user_agent = HeaderValue::from_str(&agent)
            .map_err(|e| UploadError::Config(format!("invalid user agent: {}", e)))?;

        Ok(Self {
            http,
            auth,
            user_agent,
            retry_throttled_max_times: settings.retry_throttled_max_times,
            retry_network_error_max_times: settings.retry_network_error_max_times,
            throttle_backoff: settings.throttle_backoff(),
            network_backoff: settings.network_backoff(),
        })
    }

    /// Public key of the configured auth scheme
    pub fn public_key(&self) -> &str {
        self.auth.public_key()
    }

    /// Send a signed request, retrying throttled responses and network
    /// failures.
    ///
    /// `build` is called once per attempt so bodies can be recreated. Any
    /// response other than 429 is returned as-is; status handling is left
    /// to the caller.
    pub async fn send<B>(&self, build: B, cancel: &CancellationToken) -> Result<Response>
    where
        B: Fn(&Client) -> RequestBuilder,
    {
        self.send_with(build, Signing::Signed, cancel).await
    }

    /// Like [`Transport::send`] but without auth or user-agent headers.
    ///
    /// Part targets are presigned storage URLs that reject foreign
    /// authorization headers.
    pub async fn send_presigned<B>(&self, build: B, cancel: &CancellationToken) -> Result<Response>
    where
        B: Fn(&Client) -> RequestBuilder,
    {
        self.send_with(build, Signing::Presigned, cancel).await
    }

    async fn send_with<B>(
        &self,
        build: B,
        signing: Signing,
        cancel: &CancellationToken,
    ) -> Result<Response>
    where
        B: Fn(&Client) -> RequestBuilder,
    {
        let max_throttled = self.retry_throttled_max_times;
        let max_network = self.retry_network_error_max_times;
        let throttle_backoff = self.throttle_backoff;
        let network_backoff = self.network_backoff;
        let mut throttled = 0u32;
        let mut network = 0u32;

        let policy = policy_fn(move |ctx: &RetryContext, err: &UploadError| match err {
            UploadError::Throttled { retry_after } if throttled < max_throttled => {
                throttled += 1;
                let delay = retry_after.unwrap_or(throttle_backoff);
                warn!(attempt = ctx.attempt, ?delay, "request throttled, retrying");
                RetryDecision::RetryAfter(delay)
            }
            UploadError::Network(message) if network < max_network => {
                network += 1;
                warn!(attempt = ctx.attempt, error = %message, "network error, retrying");
                RetryDecision::RetryAfter(network_backoff)
            }
            _ => RetryDecision::Fail,
        });

        let build = &build;
        let attempts = retrier(move |_ctx| self.send_once(build, signing), policy);
        cancellable(cancel, attempts).await?
    }

    async fn send_once<B>(&self, build: &B, signing: Signing) -> Result<Response>
    where
        B: Fn(&Client) -> RequestBuilder,
    {
        let mut request = build(&self.http).build()?;
        if signing == Signing::Signed {
            let signed = self.auth.headers(&request)?;
            let headers = request.headers_mut();
            headers.insert(HeaderName::from_static(USER_AGENT_HEADER), self.user_agent.clone());
            headers.extend(signed);
        }

        debug!(method = %request.method(), url = %request.url(), "sending request");
        let response = self.http.execute(request).await?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(UploadError::Throttled {
                retry_after: retry_after(response.headers()),
            });
        }
        Ok(response)
    }
}

/// `Retry-After` as whole seconds
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
