//! Plain HTTP and name resolution.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Status, headers, and body of a completed request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    /// Header names are lowercased.
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl HttpReply {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn get(&self, url: &str) -> Result<HttpReply>;

    async fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<HttpReply>;
}

#[async_trait]
pub trait NameResolver: Send + Sync {
    async fn resolve(&self, host: &str, port: u16) -> Result<Vec<SocketAddr>>;
}

pub struct ReqwestHttp {
    client: reqwest::Client,
}

impl ReqwestHttp {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("edgectl/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { client })
    }

    async fn into_reply(response: reqwest::Response) -> Result<HttpReply> {
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_ascii_lowercase(), value.to_string()))
            })
            .collect();
        let body = response
            .text()
            .await
            .context("failed to read response body")?;
        Ok(HttpReply {
            status,
            headers,
            body,
        })
    }
}

#[async_trait]
impl HttpClient for ReqwestHttp {
    async fn get(&self, url: &str) -> Result<HttpReply> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;
        Self::into_reply(response).await
    }

    async fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<HttpReply> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .with_context(|| format!("POST {url}"))?;
        Self::into_reply(response).await
    }
}

pub struct SystemResolver;

#[async_trait]
impl NameResolver for SystemResolver {
    async fn resolve(&self, host: &str, port: u16) -> Result<Vec<SocketAddr>> {
        let addrs = tokio::net::lookup_host((host, port))
            .await
            .with_context(|| format!("failed to resolve {host}"))?;
        Ok(addrs.collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_ignores_case() {
        let reply = HttpReply {
            status: 404,
            headers: BTreeMap::from([("server".to_string(), "envoy".to_string())]),
            body: String::new(),
        };
        assert_eq!(reply.header("Server"), Some("envoy"));
        assert_eq!(reply.header("content-type"), None);
    }

    #[tokio::test]
    async fn resolves_localhost() {
        let addrs = SystemResolver
            .resolve("localhost", 443)
            .await
            .expect("localhost resolves");
        assert!(addrs.iter().all(|addr| addr.port() == 443));
        assert!(!addrs.is_empty());
    }
}
