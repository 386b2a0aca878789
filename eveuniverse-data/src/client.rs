//! Shared HTTP plumbing for the remote adapters.
//!
//! The capability traits in `eveuniverse-core` are synchronous so the engine
//! can run without an async executor. [`HttpClient`] bridges them to
//! `reqwest` by blocking on a Tokio runtime it owns, and maps transport
//! failures onto [`SourceError`].

use std::future::Future;
use std::time::Duration;

use eveuniverse_core::SourceError;
use reqwest::header::HeaderMap;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::runtime::{Handle, Runtime, RuntimeFlavor};
use url::Url;

/// Error type for adapter construction failures.
#[derive(Debug)]
pub enum ClientBuildError {
    /// The configured base URL does not parse.
    BaseUrl(url::ParseError),
    /// Failed to build the HTTP client.
    HttpClient(reqwest::Error),
    /// Failed to build the Tokio runtime.
    Runtime(std::io::Error),
}

impl std::fmt::Display for ClientBuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BaseUrl(err) => write!(f, "invalid base URL: {err}"),
            Self::HttpClient(err) => write!(f, "failed to build HTTP client: {err}"),
            Self::Runtime(err) => write!(f, "failed to build Tokio runtime: {err}"),
        }
    }
}

impl std::error::Error for ClientBuildError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::BaseUrl(err) => Some(err),
            Self::HttpClient(err) => Some(err),
            Self::Runtime(err) => Some(err),
        }
    }
}

/// Default user agent for remote requests.
pub const DEFAULT_USER_AGENT: &str = "eveuniverse/0.1 (+https://github.com/leynos/eveuniverse)";

/// Default base URL of the EVE Swagger Interface.
pub const ESI_BASE_URL: &str = "https://esi.evetech.net/latest";

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Header carrying the page count of paginated ESI responses.
const PAGES_HEADER: &str = "x-pages";

/// Connection settings shared by every adapter.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Base URL the request paths are resolved against.
    pub base_url: String,
    /// Connect and request timeout.
    pub timeout: Duration,
    /// User agent string for requests.
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: ESI_BASE_URL.to_owned(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
        }
    }
}

impl HttpConfig {
    /// Create a configuration for the given base URL.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Set the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the user agent string.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

/// One `reqwest` client plus the runtime its futures are driven on.
pub(crate) struct HttpClient {
    client: Client,
    config: HttpConfig,
    base: Url,
    runtime: Runtime,
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("client", &self.client)
            .field("config", &self.config)
            .field("runtime", &"<tokio::runtime::Runtime>")
            .finish_non_exhaustive()
    }
}

impl HttpClient {
    pub(crate) fn new(config: HttpConfig) -> Result<Self, ClientBuildError> {
        let base = parse_base(&config.base_url).map_err(ClientBuildError::BaseUrl)?;
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .connect_timeout(config.timeout)
            .timeout(config.timeout)
            .build()
            .map_err(ClientBuildError::HttpClient)?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(ClientBuildError::Runtime)?;
        Ok(Self {
            client,
            config,
            base,
            runtime,
        })
    }

    pub(crate) const fn config(&self) -> &HttpConfig {
        &self.config
    }

    /// Resolve `path` against the base URL, keeping the base path prefix.
    pub(crate) fn endpoint(&self, path: &str) -> Result<Url, SourceError> {
        self.base
            .join(path.trim_start_matches('/'))
            .map_err(|_| SourceError::Unsupported {
                path: path.to_owned(),
            })
    }

    /// Drive `future` to completion from synchronous code.
    ///
    /// Inside a multi-thread runtime the caller's handle is used through
    /// [`tokio::task::block_in_place`]. Otherwise, including from a
    /// `current_thread` runtime, the owned runtime is used.
    pub(crate) fn block_on<F: Future>(&self, future: F) -> F::Output {
        match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(|| handle.block_on(future))
            }
            _ => self.runtime.block_on(future),
        }
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T, SourceError> {
        let response = self.send(self.client.get(url.clone()), url).await?;
        self.decode(response, url).await
    }

    /// Fetch every page of a paginated list response.
    ///
    /// The first page is requested without a `page` parameter; the page
    /// count comes from its `X-Pages` header.
    pub(crate) async fn get_pages<T: DeserializeOwned>(
        &self,
        url: &Url,
    ) -> Result<Vec<T>, SourceError> {
        let response = self.send(self.client.get(url.clone()), url).await?;
        let pages = page_count(response.headers());
        let mut items: Vec<T> = self.decode(response, url).await?;
        for page in 2..=pages {
            let mut page_url = url.clone();
            page_url
                .query_pairs_mut()
                .append_pair("page", &page.to_string());
            let response = self
                .send(self.client.get(page_url.clone()), &page_url)
                .await?;
            let rows: Vec<T> = self.decode(response, &page_url).await?;
            items.extend(rows);
        }
        Ok(items)
    }

    pub(crate) async fn post_json<B, T>(&self, url: &Url, body: &B) -> Result<T, SourceError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .send(self.client.post(url.clone()).json(body), url)
            .await?;
        self.decode(response, url).await
    }

    async fn send(&self, request: RequestBuilder, url: &Url) -> Result<Response, SourceError> {
        let response = request
            .send()
            .await
            .map_err(|err| self.convert_reqwest_error(&err, url))?;
        if let Some(err) = classify_status(url.as_str(), response.status()) {
            return Err(err);
        }
        Ok(response)
    }

    async fn decode<T: DeserializeOwned>(
        &self,
        response: Response,
        url: &Url,
    ) -> Result<T, SourceError> {
        let body = response
            .bytes()
            .await
            .map_err(|err| self.convert_reqwest_error(&err, url))?;
        serde_json::from_slice(&body).map_err(|err| SourceError::Decode {
            path: url.to_string(),
            message: err.to_string(),
        })
    }

    /// Convert a reqwest error to a [`SourceError`].
    fn convert_reqwest_error(&self, error: &reqwest::Error, url: &Url) -> SourceError {
        let path = url.to_string();
        if error.is_timeout() {
            return SourceError::Transient {
                path,
                message: format!("timed out after {}s", self.config.timeout.as_secs()),
            };
        }

        if let Some(err) = error
            .status()
            .and_then(|status| classify_status(&path, status))
        {
            return err;
        }

        if error.is_decode() {
            return SourceError::Decode {
                path,
                message: error.to_string(),
            };
        }

        SourceError::Transient {
            path,
            message: error.to_string(),
        }
    }
}

/// Map a response status onto the failure it represents, `None` on success.
///
/// 404 is a missing record. 5xx, ESI's error-limit 420 and 429 are worth
/// retrying. Anything else is reported as is.
pub(crate) fn classify_status(path: &str, status: StatusCode) -> Option<SourceError> {
    if status.is_success() {
        return None;
    }
    let path = path.to_owned();
    let code = status.as_u16();
    Some(match code {
        404 => SourceError::NotFound { path },
        420 | 429 => SourceError::Transient {
            path,
            message: format!("rate limited with HTTP status {code}"),
        },
        _ if status.is_server_error() => SourceError::Transient {
            path,
            message: format!("server error with HTTP status {code}"),
        },
        _ => SourceError::Http { path, status: code },
    })
}

/// Page count advertised by a list response, one when absent or invalid.
pub(crate) fn page_count(headers: &HeaderMap) -> u32 {
    headers
        .get(PAGES_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u32>().ok())
        .filter(|pages| *pages > 0)
        .unwrap_or(1)
}

/// Parse `base_url` so that relative joins append to its path.
fn parse_base(base_url: &str) -> Result<Url, url::ParseError> {
    let mut normalised = base_url.trim_end_matches('/').to_owned();
    normalised.push('/');
    Url::parse(&normalised)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use rstest::rstest;

    #[rstest]
    #[case(404, "not_found")]
    #[case(420, "transient")]
    #[case(429, "transient")]
    #[case(502, "transient")]
    #[case(503, "transient")]
    #[case(400, "http")]
    #[case(403, "http")]
    fn statuses_map_onto_source_errors(#[case] code: u16, #[case] expected: &str) {
        let status = StatusCode::from_u16(code).expect("valid status");
        let err = classify_status("/universe/types/", status).expect("failure");
        let actual = match err {
            SourceError::NotFound { .. } => "not_found",
            SourceError::Transient { .. } => "transient",
            SourceError::Http { status, .. } => {
                assert_eq!(status, code);
                "http"
            }
            other => panic!("unexpected error: {other:?}"),
        };
        assert_eq!(actual, expected);
    }

    #[rstest]
    fn successful_statuses_are_not_errors() {
        assert!(classify_status("/", StatusCode::OK).is_none());
        assert!(classify_status("/", StatusCode::NO_CONTENT).is_none());
    }

    #[rstest]
    #[case(None, 1)]
    #[case(Some("3"), 3)]
    #[case(Some(" 12 "), 12)]
    #[case(Some("0"), 1)]
    #[case(Some("many"), 1)]
    fn page_count_reads_the_pages_header(#[case] header: Option<&str>, #[case] expected: u32) {
        let mut headers = HeaderMap::new();
        if let Some(value) = header {
            headers.insert(PAGES_HEADER, HeaderValue::from_str(value).expect("header"));
        }
        assert_eq!(page_count(&headers), expected);
    }

    #[rstest]
    #[case("https://esi.evetech.net/latest")]
    #[case("https://esi.evetech.net/latest/")]
    fn endpoints_keep_the_base_path(#[case] base: &str) {
        let client = HttpClient::new(HttpConfig::new(base)).expect("client should build");

        let url = client.endpoint("/universe/races/").expect("endpoint");

        assert_eq!(url.as_str(), "https://esi.evetech.net/latest/universe/races/");
    }

    #[rstest]
    fn invalid_base_urls_are_rejected() {
        let err = HttpClient::new(HttpConfig::new("not a url")).expect_err("invalid base");
        assert!(matches!(err, ClientBuildError::BaseUrl(_)));
        assert!(err.to_string().starts_with("invalid base URL"));
    }

    #[rstest]
    fn config_builder_overrides_defaults() {
        let config = HttpConfig::new("http://localhost:8080")
            .with_timeout(Duration::from_secs(5))
            .with_user_agent("tests/1.0");

        assert_eq!(config.base_url, "http://localhost:8080");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.user_agent, "tests/1.0");
        assert_eq!(HttpConfig::default().base_url, ESI_BASE_URL);
    }
}
