//! HTTP session with the retry contract the fragment loop depends on.
//!
//! A fetch issues many requests to the same host over a kept-alive
//! connection. When the server half-closes that connection between
//! requests, the next send fails mid-flight; for idempotent methods the
//! request is replayed exactly once on a fresh connection. Connection
//! establishment failures (refused, DNS, connect timeout) are never
//! retried, and neither are non-idempotent methods.

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Method, Response, StatusCode};
use tracing::{debug, warn};

use crate::config::HdsConfig;
use crate::error::HdsError;
use crate::proxy::build_proxy_from_config;

/// Create a reqwest Client with the provided configuration.
pub fn create_client(config: &HdsConfig) -> Result<Client, HdsError> {
    let mut builder = Client::builder()
        .pool_max_idle_per_host(1)
        .user_agent(&config.user_agent)
        .redirect(reqwest::redirect::Policy::limited(10));

    if !config.timeout.is_zero() {
        builder = builder.timeout(config.timeout);
    }
    if !config.connect_timeout.is_zero() {
        builder = builder.connect_timeout(config.connect_timeout);
    }

    builder = match &config.proxy {
        Some(proxy) => builder.proxy(build_proxy_from_config(proxy).map_err(HdsError::Proxy)?),
        None => builder.no_proxy(),
    };

    builder.build().map_err(HdsError::from)
}

/// One HTTP session for the lifetime of a fetch.
pub struct HttpSession {
    client: Client,
}

impl HttpSession {
    pub fn new(config: &HdsConfig) -> Result<Self, HdsError> {
        Ok(HttpSession {
            client: create_client(config)?,
        })
    }

    /// GET with an `Accept` header built from `accept_types`; the response
    /// `Content-Type` must be one of them.
    pub async fn get(&self, url: &str, accept_types: &[&str]) -> Result<Response, HdsError> {
        self.open(Method::GET, url, accept_types).await
    }

    /// Sends a request, retrying once per the idempotency contract, and
    /// verifies status and content type.
    pub async fn open(
        &self,
        method: Method,
        url: &str,
        accept_types: &[&str],
    ) -> Result<Response, HdsError> {
        let accept = accept_types.join(", ");

        let response = match self.send_once(&method, url, &accept).await {
            Ok(response) if response.status() == StatusCode::REQUEST_TIMEOUT => {
                if !is_idempotent(&method) {
                    return Err(HdsError::Status(response.status()));
                }
                warn!(url, "request timed out on the server, retrying once");
                self.send_once(&method, url, &accept).await?
            }
            Ok(response) => response,
            Err(err) if is_idempotent(&method) && is_retryable(&err) => {
                warn!(url, error = %err, "connection failed mid-request, retrying once");
                self.send_once(&method, url, &accept).await?
            }
            Err(err) => return Err(err.into()),
        };

        if !response.status().is_success() {
            return Err(HdsError::Status(response.status()));
        }

        if !accept_types.is_empty() {
            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .map(|value| value.split(';').next().unwrap_or("").trim().to_owned())
                .unwrap_or_default();
            if !accept_types
                .iter()
                .any(|accepted| accepted.eq_ignore_ascii_case(&content_type))
            {
                // Dropping the response closes it.
                return Err(HdsError::ContentType {
                    expected: accept_types.iter().map(|t| (*t).to_owned()).collect(),
                    got: content_type,
                });
            }
        }

        debug!(url, status = %response.status(), "request completed");
        Ok(response)
    }

    async fn send_once(
        &self,
        method: &Method,
        url: &str,
        accept: &str,
    ) -> reqwest::Result<Response> {
        let mut request = self.client.request(method.clone(), url);
        if !accept.is_empty() {
            request = request.header(ACCEPT, accept);
        }
        request.send().await
    }
}

fn is_idempotent(method: &Method) -> bool {
    [
        Method::GET,
        Method::HEAD,
        Method::PUT,
        Method::DELETE,
        Method::TRACE,
        Method::OPTIONS,
    ]
    .contains(method)
}

/// Whether an error looks like a mid-flight connection failure on a reused
/// connection, as opposed to a failure to establish one.
fn is_retryable(err: &reqwest::Error) -> bool {
    if err.is_connect() || err.is_timeout() || err.is_builder() || err.is_redirect() {
        return false;
    }
    err.is_request() || err.is_body() || err.is_decode()
}
