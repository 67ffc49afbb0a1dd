use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use url::Url;

use crate::errors::{Error, Result};
use crate::redact::{redact, REDACTED};
use crate::requests::{ApiVersion, Location, CONFIGURATION};
use crate::responses::ResponseShape;

/// Environment variables read by [`ConnectionBuilder::from_env`].
pub const ENV_URL: &str = "HAPROXY_DATAPLANE_URL";
pub const ENV_USERNAME: &str = "HAPROXY_DATAPLANE_USERNAME";
pub const ENV_PASSWORD: &str = "HAPROXY_DATAPLANE_PASSWORD";
pub const ENV_API_VERSION: &str = "HAPROXY_DATAPLANE_API_VERSION";
pub const ENV_INSECURE: &str = "HAPROXY_DATAPLANE_INSECURE";
pub const ENV_TIMEOUT_SECS: &str = "HAPROXY_DATAPLANE_TIMEOUT_SECS";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP basic-auth credentials for the Data Plane API.
#[derive(Clone, Eq, PartialEq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &REDACTED)
            .finish()
    }
}

/// Configuration for connecting to a Data Plane API instance.
#[derive(Clone, Debug, PartialEq)]
pub struct ConnectionBuilder {
    base_url: String,
    credentials: Option<Credentials>,
    api_version: ApiVersion,
    verify_tls: bool,
    timeout: Duration,
}

impl ConnectionBuilder {
    /// Create a new `ConnectionBuilder` for the Data Plane API listening at `base_url`.
    ///
    /// # Examples
    /// ```no_run
    /// use haptik_dataplane::ConnectionBuilder;
    /// use haptik_dataplane::requests::ApiVersion;
    ///
    /// let connection = ConnectionBuilder::new("http://127.0.0.1:5555")
    ///     .credentials("admin", "adminpwd")
    ///     .api_version(ApiVersion::V2)
    ///     .connect()
    ///     .expect("Failed to build client");
    /// ```
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(Credentials {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    pub fn api_version(mut self, api_version: ApiVersion) -> Self {
        self.api_version = api_version;
        self
    }

    /// Disable to accept self-signed certificates.
    pub fn verify_tls(mut self, verify_tls: bool) -> Self {
        self.verify_tls = verify_tls;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Read the connection settings from `HAPROXY_DATAPLANE_*` environment variables.
    ///
    /// Unset variables keep their defaults; malformed values are rejected.
    pub fn from_env() -> Result<Self> {
        let mut builder = Self::default();

        if let Ok(url) = env::var(ENV_URL) {
            builder.base_url = url;
        }
        if let Ok(username) = env::var(ENV_USERNAME) {
            let password = env::var(ENV_PASSWORD).unwrap_or_default();
            builder = builder.credentials(username, password);
        }
        if let Ok(version) = env::var(ENV_API_VERSION) {
            builder.api_version = ApiVersion::from_str(&version)?;
        }
        if let Ok(insecure) = env::var(ENV_INSECURE) {
            builder.verify_tls = !parse_flag(ENV_INSECURE, &insecure)?;
        }
        if let Ok(secs) = env::var(ENV_TIMEOUT_SECS) {
            let secs = secs.trim().parse::<u64>().map_err(|_| {
                Error::InvalidConfig(format!("{} must be a whole number of seconds", ENV_TIMEOUT_SECS))
            })?;
            builder.timeout = Duration::from_secs(secs);
        }

        Ok(builder)
    }

    /// Build the HTTP client. No request is made until the first operation.
    pub fn connect(&self) -> Result<Connection> {
        let base_url = Url::parse(self.base_url.trim_end_matches('/'))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::InvalidConfig(format!(
                "{} cannot be used as a base URL",
                self.base_url
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(self.timeout)
            .danger_accept_invalid_certs(!self.verify_tls)
            .user_agent(concat!("haptik-dataplane/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::InvalidConfig(format!("failed to build HTTP client: {}", e)))?;

        Ok(Connection {
            http,
            base_url: base_url.as_str().trim_end_matches('/').to_string(),
            credentials: self.credentials.clone(),
            api_version: self.api_version,
            cancel: CancellationToken::new(),
        })
    }
}

/// Use the Data Plane API's default listen address, `http://127.0.0.1:5555`, speaking `v3`.
impl Default for ConnectionBuilder {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5555".to_string(),
            credentials: None,
            api_version: ApiVersion::default(),
            verify_tls: true,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(Error::InvalidConfig(format!(
            "{} must be a boolean, got '{}'",
            name, other
        ))),
    }
}

/// Status and body of a completed exchange.
#[derive(Debug)]
pub(crate) struct RawResponse {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

impl RawResponse {
    /// Turn non-2xx responses into [`Error::Api`].
    pub fn success(self) -> Result<Self> {
        if self.status.is_success() {
            Ok(self)
        } else {
            Err(Error::api(
                self.status.as_u16(),
                String::from_utf8_lossy(&self.body).into_owned(),
            ))
        }
    }
}

/// A client for one Data Plane API instance.
///
/// Cloning is cheap: clones share the underlying connection pool and cancellation token.
#[derive(Clone, Debug)]
pub struct Connection {
    http: reqwest::Client,
    base_url: String,
    credentials: Option<Credentials>,
    api_version: ApiVersion,
    cancel: CancellationToken,
}

impl Connection {
    pub fn api_version(&self) -> ApiVersion {
        self.api_version
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Abort in-flight and future requests when `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// A clone that ignores the caller's cancellation, used for cleanup requests.
    pub(crate) fn detached(&self) -> Self {
        Self {
            cancel: CancellationToken::new(),
            ..self.clone()
        }
    }

    /// Issue one request against the configured API version.
    pub(crate) async fn send(
        &self,
        method: Method,
        location: &Location,
        body: Option<&Value>,
    ) -> Result<RawResponse> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let url = format!("{}/{}{}", self.base_url, self.api_version, location.path);
        let mut request = self
            .http
            .request(method.clone(), &url)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if !location.query.is_empty() {
            request = request.query(&location.query);
        }
        if let Some(credentials) = &self.credentials {
            request = request.basic_auth(&credentials.username, Some(&credentials.password));
        }
        if let Some(body) = body {
            trace!(
                method = %method,
                path = %redact(&location.to_string()),
                body = %redact(&body.to_string()),
                "request body"
            );
            request = request.json(body);
        }

        let exchange = async {
            let response = request.send().await?;
            let status = response.status();
            let body = response.bytes().await?.to_vec();
            Ok::<_, Error>(RawResponse { status, body })
        };

        let response = tokio::select! {
            _ = self.cancel.cancelled() => return Err(Error::Cancelled),
            response = exchange => response?,
        };

        debug!(
            method = %method,
            path = %redact(&location.to_string()),
            status = response.status.as_u16(),
            "Data Plane API request"
        );
        if !response.body.is_empty() {
            trace!(
                path = %redact(&location.to_string()),
                body = %redact(&String::from_utf8_lossy(&response.body)),
                "response body"
            );
        }

        Ok(response)
    }

    /// Read a collection. A 404 is an empty collection; so is a 422 when `unprocessable_is_empty`.
    pub(crate) async fn read_list<T: DeserializeOwned>(
        &self,
        location: &Location,
        unprocessable_is_empty: bool,
    ) -> Result<Vec<T>> {
        let response = self.send(Method::GET, location, None).await?;
        match response.status {
            StatusCode::NOT_FOUND => Ok(Vec::new()),
            StatusCode::UNPROCESSABLE_ENTITY if unprocessable_is_empty => Ok(Vec::new()),
            _ => {
                let response = response.success()?;
                self.api_version.response_shape().decode_list(&response.body)
            }
        }
    }

    /// Read a single object; `Ok(None)` when the API reports it missing.
    pub(crate) async fn read_one<T: DeserializeOwned>(&self, location: &Location) -> Result<Option<T>> {
        let response = self.send(Method::GET, location, None).await?;
        if response.status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = response.success()?;
        self.api_version
            .response_shape()
            .decode(&response.body)
            .map(Some)
    }

    /// Send a mutation and discard the response payload.
    pub(crate) async fn write(
        &self,
        method: Method,
        location: &Location,
        body: Option<&Value>,
    ) -> Result<()> {
        self.send(method, location, body).await?.success()?;
        Ok(())
    }

    /// The version number of the committed configuration.
    pub async fn configuration_version(&self) -> Result<i64> {
        let location = Location::new(format!("{}/version", CONFIGURATION));
        let response = self.send(Method::GET, &location, None).await?.success()?;
        ResponseShape::Bare.decode(&response.body)
    }
}
