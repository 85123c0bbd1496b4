//! reqwest-backed network used outside of tests.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use tracing::debug;

use crate::error::{CacheError, CacheResult};
use crate::http::{Headers, Request, Response, ResponseType, Scope};

use super::Network;

/// User agent sent with every request
const USER_AGENT: &str = concat!("rybu-offline/", env!("CARGO_PKG_VERSION"));

/// HTTP network for the worker.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpNetwork {
    client: Client,
    scope: Scope,
}

impl HttpNetwork {
    /// Create a network with no request timeout; the transport's own
    /// connect/read behaviour applies.
    pub fn new(scope: Scope) -> CacheResult<Self> {
        Self::build(scope, None)
    }

    pub fn with_timeout(scope: Scope, timeout: Duration) -> CacheResult<Self> {
        Self::build(scope, Some(timeout))
    }

    fn build(scope: Scope, timeout: Option<Duration>) -> CacheResult<Self> {
        let mut builder = Client::builder().user_agent(USER_AGENT);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            scope,
        })
    }

    fn classify(&self, response: &reqwest::Response) -> ResponseType {
        if self.scope.is_same_origin(response.url()) {
            ResponseType::Basic
        } else {
            ResponseType::Cors
        }
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &Request) -> CacheResult<Response> {
        let response = self
            .client
            .request(request.method.clone(), request.url.clone())
            .send()
            .await
            .map_err(|e| send_error(&request.url, e))?;

        let status = response.status().as_u16();
        let response_type = self.classify(&response);
        let headers: Headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
            .collect();
        let body = response.bytes().await?;

        debug!(url = %request.url, status = status, bytes = body.len(), "Network response");

        Ok(Response {
            status,
            response_type,
            headers,
            body,
        })
    }
}

/// A request reqwest refuses to build never reached the network, so it
/// must not look like an offline failure
fn send_error(url: &Url, err: reqwest::Error) -> CacheError {
    if err.is_builder() {
        CacheError::InvalidUrl {
            url: url.to_string(),
            reason: err.to_string(),
        }
    } else {
        CacheError::Http(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_with_timeout() {
        let scope = Scope::new(Url::parse("https://rybuhome.com/").unwrap());
        assert!(HttpNetwork::with_timeout(scope, Duration::from_secs(5)).is_ok());
    }

    #[tokio::test]
    async fn test_unsendable_request_is_not_a_network_failure() {
        let scope = Scope::new(Url::parse("https://rybuhome.com/").unwrap());
        let network = HttpNetwork::new(scope).unwrap();
        let request = Request::get(Url::parse("ftp://rybuhome.com/assets/img/logo.svg").unwrap());

        let err = network.fetch(&request).await.unwrap_err();
        assert!(matches!(err, CacheError::InvalidUrl { .. }), "got {:?}", err);
        assert!(!err.is_network_failure());
    }
}
