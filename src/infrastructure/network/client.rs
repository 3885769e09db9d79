use crate::domain::error::TmError;
use crate::domain::model::{parse_quality, MatchRecord, ProviderId, QueryContext};
use crate::domain::traits::Provider;
use crate::infrastructure::network::http::create_client;
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

// tmserver response structures
#[derive(Deserialize, Debug)]
struct WireMatch {
    source: String,
    target: String,
    #[serde(default)]
    quality: Option<WireQuality>,
    #[serde(default)]
    context: Option<String>,
}

// quality 可能是数字，也可能是 "87" 或 "87%" 这样的字符串
#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum WireQuality {
    Number(f64),
    Text(String),
}

impl WireQuality {
    fn percentage(&self) -> Option<u8> {
        match self {
            WireQuality::Number(n) => clamp_percentage(*n),
            WireQuality::Text(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(clamp_percentage)
                .or_else(|| parse_quality(&[s])),
        }
    }
}

fn clamp_percentage(n: f64) -> Option<u8> {
    (n.is_finite() && n >= 0.0).then(|| n.round().min(100.0) as u8)
}

impl From<WireMatch> for MatchRecord {
    fn from(wire: WireMatch) -> Self {
        let quality = wire.quality.as_ref().and_then(WireQuality::percentage);
        let context = wire.context.filter(|c| !c.is_empty());
        MatchRecord::new(wire.source, wire.target, quality, context)
    }
}

/// Decode a tmserver response body into ordered match records.
pub fn parse_matches(body: &str) -> Result<Vec<MatchRecord>, TmError> {
    let wire: Vec<WireMatch> = serde_json::from_str(body)
        .map_err(|e| TmError::LookupMalformedResponse(e.to_string()))?;
    Ok(wire.into_iter().map(MatchRecord::from).collect())
}

/// Host and port of a tmserver instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// `GET http://host:port/tmserver/{source}/{target}/unit/{query}`
    fn unit_url(&self, source: &str, target: &str, query: &str) -> Result<Url, TmError> {
        let invalid = || TmError::ProviderUnavailable(format!("invalid endpoint {}", self));
        let mut url = Url::parse(&format!("http://{}:{}/", self.host, self.port))
            .map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|_| invalid())?
            .pop_if_empty()
            .extend(["tmserver", source, target, "unit", query]);
        Ok(url)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Translation memory served by a remote tmserver over HTTP.
///
/// Every lookup is bounded by `timeout`. The endpoint can be changed at any
/// time; a lookup uses the endpoint that was current when it started.
pub struct RemoteServiceProvider {
    id: ProviderId,
    client: Client,
    endpoint: RwLock<Endpoint>,
    timeout: Duration,
    closed: AtomicBool,
}

impl RemoteServiceProvider {
    pub fn new(
        id: impl Into<ProviderId>,
        endpoint: Endpoint,
        timeout: Duration,
    ) -> Result<Self, TmError> {
        if endpoint.host.trim().is_empty() {
            return Err(TmError::ProviderUnavailable(
                "remote host not configured".to_string(),
            ));
        }

        Ok(Self {
            id: id.into(),
            client: create_client(timeout)?,
            endpoint: RwLock::new(endpoint),
            timeout,
            closed: AtomicBool::new(false),
        })
    }

    pub async fn endpoint(&self) -> Endpoint {
        self.endpoint.read().await.clone()
    }

    /// Point subsequent lookups at a different server.
    pub async fn reconfigure(&self, host: impl Into<String>, port: u16) {
        let endpoint = Endpoint::new(host, port);
        info!(provider = %self.id, %endpoint, "remote endpoint reconfigured");
        *self.endpoint.write().await = endpoint;
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn fetch(&self, url: Url) -> Result<Vec<MatchRecord>, TmError> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TmError::LookupTransportFailure(format!(
                "server answered {}",
                status
            )));
        }

        let body = response.text().await?;
        parse_matches(&body)
    }
}

#[async_trait]
impl Provider for RemoteServiceProvider {
    fn id(&self) -> &ProviderId {
        &self.id
    }

    async fn lookup(
        &self,
        query: &str,
        context: &QueryContext,
    ) -> Result<Vec<MatchRecord>, TmError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TmError::ProviderUnavailable(format!(
                "{} has been shut down",
                self.id
            )));
        }

        let (source, target) = context.pair().ok_or_else(|| {
            TmError::ProviderUnavailable(format!("{}: language pair not set", self.id))
        })?;

        let url = self.endpoint.read().await.unit_url(source, target, query)?;
        debug!(provider = %self.id, %url, "remote lookup");

        match tokio::time::timeout(self.timeout, self.fetch(url)).await {
            Ok(Err(TmError::LookupTimeout(_))) | Err(_) => {
                Err(TmError::LookupTimeout(self.timeout))
            }
            Ok(result) => result,
        }
    }

    async fn shutdown(&self) {
        // reqwest 连接池随 Client 一起释放，这里只拒绝后续查询
        self.closed.store(true, Ordering::Release);
    }
}
