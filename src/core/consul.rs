//! HTTP client for the Consul v1 API.

use crate::core::coordinator::{Coordinator, KvEntry};
use crate::core::ent::{CheckSet, HealthCheck};
use crate::core::error::WatchError;
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const INDEX_HEADER: &str = "X-Consul-Index";
const TOKEN_HEADER: &str = "X-Consul-Token";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct ConsulClient {
    base_url: String,
    datacenter: Option<String>,
    token: Option<String>,
    client: reqwest::Client,
    timeout: Duration,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct SessionRequest<'a> {
    name: &'a str,
    #[serde(rename = "TTL")]
    ttl: String,
    behavior: &'a str,
}

#[derive(Debug, Deserialize)]
struct SessionCreated {
    #[serde(rename = "ID")]
    id: String,
}

impl ConsulClient {
    /// `address` is `host:port`, `scheme` is `http` or `https`.
    pub fn new(scheme: &str, address: &str) -> Self {
        Self {
            base_url: format!("{}://{}", scheme, address.trim_end_matches('/')),
            datacenter: None,
            token: None,
            client: reqwest::Client::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Caps every request, including the body read.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_datacenter(mut self, datacenter: impl Into<String>) -> Self {
        let dc = datacenter.into();
        self.datacenter = if dc.is_empty() { None } else { Some(dc) };
        self
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.is_empty());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut req = self
            .client
            .request(method, format!("{}/v1/{}", self.base_url, path))
            .timeout(self.timeout);
        if let Some(dc) = &self.datacenter {
            req = req.query(&[("dc", dc)]);
        }
        if let Some(token) = &self.token {
            req = req.header(TOKEN_HEADER, token);
        }
        req
    }

    /// Maps non-success responses. When `session` is given, a missing or
    /// invalid session is reported as expiry.
    async fn check(
        &self,
        what: &str,
        resp: Response,
        session: Option<&str>,
    ) -> Result<Response, WatchError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        if let Some(session) = session {
            if status == StatusCode::NOT_FOUND || body.contains("invalid session") {
                return Err(WatchError::SessionExpired {
                    session: session.to_string(),
                    reason: format!("{} returned {}", what, status),
                });
            }
        }
        Err(WatchError::CoordinationUnavailable(format!(
            "{} returned {}: {}",
            what,
            status,
            body.trim()
        )))
    }

    async fn put_flag(
        &self,
        what: &str,
        key: &str,
        query: Option<(&str, &str)>,
        value: Vec<u8>,
        session: Option<&str>,
    ) -> Result<bool, WatchError> {
        let mut req = self.request(Method::PUT, &format!("kv/{}", key)).body(value);
        if let Some(q) = query {
            req = req.query(&[q]);
        }
        let resp = self.check(what, req.send().await?, session).await?;
        Ok(resp.json::<bool>().await?)
    }
}

/// Consul takes whole seconds and reads `0s` as no TTL, so round up.
fn ttl_seconds(ttl: Duration) -> String {
    format!("{}s", ttl.as_secs_f64().ceil() as u64)
}

#[async_trait]
impl Coordinator for ConsulClient {
    async fn create_session(&self, name: &str, ttl: Duration) -> Result<String, WatchError> {
        let body = SessionRequest {
            name,
            ttl: ttl_seconds(ttl),
            behavior: "delete",
        };
        let resp = self
            .request(Method::PUT, "session/create")
            .json(&body)
            .send()
            .await?;
        let resp = self.check("session create", resp, None).await?;
        let created: SessionCreated = resp.json().await?;
        Ok(created.id)
    }

    async fn renew_session(&self, session: &str) -> Result<(), WatchError> {
        let resp = self
            .request(Method::PUT, &format!("session/renew/{}", session))
            .send()
            .await?;
        self.check("session renew", resp, Some(session)).await?;
        Ok(())
    }

    async fn destroy_session(&self, session: &str) -> Result<(), WatchError> {
        let resp = self
            .request(Method::PUT, &format!("session/destroy/{}", session))
            .send()
            .await?;
        self.check("session destroy", resp, None).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<KvEntry>, WatchError> {
        let resp = self
            .request(Method::GET, &format!("kv/{}", key))
            .query(&[("raw", "")])
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = self.check("kv get", resp, None).await?;
        let modify_index = resp
            .headers()
            .get(INDEX_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let value = resp.bytes().await?.to_vec();
        Ok(Some(KvEntry {
            value,
            modify_index,
        }))
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), WatchError> {
        if self.put_flag("kv put", key, None, value.to_vec(), None).await? {
            Ok(())
        } else {
            Err(WatchError::CoordinationUnavailable(format!(
                "kv put for '{}' was not applied",
                key
            )))
        }
    }

    async fn acquire(&self, key: &str, value: &[u8], session: &str) -> Result<bool, WatchError> {
        self.put_flag(
            "kv acquire",
            key,
            Some(("acquire", session)),
            value.to_vec(),
            Some(session),
        )
        .await
    }

    async fn release(&self, key: &str, session: &str) -> Result<bool, WatchError> {
        self.put_flag(
            "kv release",
            key,
            Some(("release", session)),
            Vec::new(),
            Some(session),
        )
        .await
    }

    async fn failing_checks(&self) -> Result<CheckSet, WatchError> {
        let resp = self
            .request(Method::GET, "health/state/critical")
            .send()
            .await?;
        let resp = self.check("health state", resp, None).await?;
        let checks: Vec<HealthCheck> = resp.json().await?;
        Ok(checks.into_iter().collect())
    }
}
