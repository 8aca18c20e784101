//! Backend RPC client
//!
//! Every call follows the same lifecycle:
//! 1. Seal the form fields under the shared key
//! 2. POST the envelope to the endpoint
//! 3. Classify the status into a [`BackendError`] or a success
//! 4. On success, record health (and for commands, populate the cache)
//!
//! No lock is held while a request is in flight.

use std::sync::Arc;
use std::time::Duration;

use chanrelay_core::AuthInfo;
use chanrelay_crypto::{RequestSealer, SealedRequest, SharedKey};
use chanrelay_settings::Settings;
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::{Response, StatusCode};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{
    BackendError, ForwardedError, HealthBucket, HealthTracker, ResponseCache, Result,
};

/// Shortest per-call timeout; a zero timeout would fail every call
const MIN_REQUEST_TIMEOUT: Duration = Duration::from_millis(100);

/// Response header carrying how many seconds a command response may be cached
pub const CACHE_DURATION_HEADER: &str = "relay-cache";

/// Backend client configuration
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Base URL the endpoint paths are appended to
    pub base_url: String,
    /// Identifier sent with every sealed request
    pub server_id: i64,
    /// Per-call HTTP timeout
    pub timeout: Duration,
    /// Interval of the cache sweeper
    pub sweep_interval: Duration,
    /// Upper bound on backend-declared cache durations (`None` = unbounded)
    pub max_cache_ttl: Option<Duration>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8002/backend".to_string(),
            server_id: 0,
            timeout: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(120),
            max_cache_ttl: None,
        }
    }
}

impl BackendConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            base_url: settings.backend_url.clone(),
            server_id: settings.server_id,
            timeout: Duration::from_secs(settings.request_timeout_secs),
            sweep_interval: Duration::from_secs(settings.cache_sweep_interval_secs),
            max_cache_ttl: settings.max_cache_ttl_secs.map(Duration::from_secs),
        }
    }
}

/// Gateway to the backend RPC endpoints.
///
/// Shared by every connection task, usually behind an `Arc`.
pub struct BackendClient {
    config: BackendConfig,
    http_client: reqwest::Client,
    sealer: RequestSealer,
    cache: Arc<ResponseCache>,
    health: HealthTracker,
    sweeper: Option<JoinHandle<()>>,
}

impl BackendClient {
    /// Create a client sealing requests under `shared_key`.
    ///
    /// When called inside a tokio runtime the cache sweeper is started on
    /// it; it stops when the client is dropped.
    pub fn new(mut config: BackendConfig, shared_key: &SharedKey) -> Result<Self> {
        if config.timeout < MIN_REQUEST_TIMEOUT {
            warn!(
                requested_ms = config.timeout.as_millis() as u64,
                "Request timeout too short, using {:?}",
                MIN_REQUEST_TIMEOUT
            );
            config.timeout = MIN_REQUEST_TIMEOUT;
        }

        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        let cache = Arc::new(ResponseCache::new());
        let sweeper = tokio::runtime::Handle::try_current()
            .ok()
            .map(|_| cache.spawn_sweeper(config.sweep_interval));

        info!(
            base_url = %config.base_url,
            server_id = config.server_id,
            "Backend client ready"
        );

        Ok(Self {
            config,
            http_client,
            sealer: RequestSealer::new(shared_key),
            cache,
            health: HealthTracker::new(),
            sweeper,
        })
    }

    /// Create a client from the relay settings, deriving the shared key once
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let keypair = settings.relay_keypair()?;
        let backend_public = settings.backend_public_key()?;
        let shared_key = keypair.shared_key(&backend_public)?;
        Self::new(BackendConfig::from_settings(settings), &shared_key)
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    pub fn health(&self) -> &HealthTracker {
        &self.health
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Run a remote command, answering from the cache when possible.
    ///
    /// A cache hit never reaches the network and does not update health.
    pub async fn send_remote_command_cached(
        &self,
        command: &str,
        payload: &str,
        auth: &AuthInfo,
    ) -> Result<String> {
        if let Some(cached) = self.cache.get(command, payload) {
            debug!(command, "Remote command answered from cache");
            return Ok(cached);
        }
        self.send_remote_command(command, payload, auth).await
    }

    /// Run a remote command by POSTing to `/cmd/<command>`.
    ///
    /// The sealed form carries `clientData` (the opaque payload), `username`
    /// and `authenticated` (`1` when the username has been validated).
    pub async fn send_remote_command(
        &self,
        command: &str,
        payload: &str,
        auth: &AuthInfo,
    ) -> Result<String> {
        let bucket = HealthBucket::Command(command.to_string());
        let sealed = self.sealer.seal([
            ("clientData", payload),
            ("username", auth.username.as_str()),
            ("authenticated", auth.authenticated_flag()),
        ])?;

        let response = self.post_sealed(&bucket, &sealed).await?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            debug!(command, "Backend requires authentication");
            return Err(BackendError::AuthorizationNeeded);
        }

        if !status.is_success() {
            let is_json = is_json_content_type(response.headers());
            let body = response.text().await?;
            warn!(command, status = status.as_u16(), "Remote command failed");

            if is_json {
                return match serde_json::from_str(&body) {
                    Ok(payload) => Err(BackendError::Forwarded(ForwardedError { payload })),
                    Err(source) => Err(BackendError::Decode { source, body }),
                };
            }
            return Err(BackendError::Status(status.as_u16()));
        }

        let cache_ttl = parse_cache_duration(response.headers())?;
        let body = response.text().await?;

        if let Some(ttl) = cache_ttl {
            let ttl = self.cap_cache_ttl(ttl);
            if self.cache.insert(command, payload, body.clone(), ttl) {
                debug!(command, ttl_secs = ttl.as_secs(), "Cached remote command response");
            }
        }

        self.health.record_all(&[HealthBucket::OtherCommand, bucket]);
        Ok(body)
    }

    /// Submit aggregated statistics to `/stats`
    pub async fn send_aggregated_data<I, K, V>(&self, form: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let sealed = self.sealer.seal(form)?;
        let response = self.post_sealed(&HealthBucket::AggStats, &sealed).await?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "Statistics submission failed");
            return Err(BackendError::Status(status.as_u16()));
        }

        self.health.record_success(&HealthBucket::AggStats);
        Ok(())
    }

    /// Tell the backend a topic got its first subscriber.
    ///
    /// Posts `channels=<topic>&added=t` to `/topics`.
    pub async fn send_new_topic_notice(&self, topic: &str) -> Result<()> {
        self.send_topic_notice(topic, true).await
    }

    /// Tell the backend topics lost their last subscriber.
    ///
    /// Posts `channels=<a>,<b>,...&added=f` to `/topics`. An empty list is
    /// still posted, as `channels=&added=f`.
    pub async fn send_cleanup_topics_notice<S: AsRef<str>>(&self, topics: &[S]) -> Result<()> {
        let joined = topics
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<_>>()
            .join(",");
        self.send_topic_notice(&joined, false).await
    }

    /// Announce that this relay has started, posting to `/startup`
    pub async fn announce_startup(&self) -> Result<()> {
        let sealed = self.sealer.seal([("startup", "1")])?;
        let response = self.post_sealed(&HealthBucket::Startup, &sealed).await?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "Startup announcement failed");
            return Err(BackendError::Status(status.as_u16()));
        }

        self.health.record_success(&HealthBucket::Startup);
        Ok(())
    }

    async fn send_topic_notice(&self, channels: &str, added: bool) -> Result<()> {
        let sealed = self
            .sealer
            .seal([("channels", channels), ("added", if added { "t" } else { "f" })])?;
        let response = self.post_sealed(&HealthBucket::AddTopic, &sealed).await?;

        let status = response.status();
        if !status.is_success() {
            let code = status.as_u16();
            let response = match response.text().await {
                Ok(body) => body,
                Err(e) => format!("(error reading non-2xx response): {}", e),
            };
            warn!(code, added, "Topic notice rejected");
            return Err(BackendError::NotOk { code, response });
        }

        self.health.record_success(&HealthBucket::AddTopic);
        Ok(())
    }

    async fn post_sealed(&self, bucket: &HealthBucket, sealed: &SealedRequest) -> Result<Response> {
        let url = self.endpoint(bucket);
        debug!(
            %url,
            nonce = %hex::encode(&sealed.nonce()[..8]),
            sealed_len = sealed.ciphertext().len(),
            "Posting sealed request"
        );

        self.http_client
            .post(&url)
            .form(&sealed.to_form(self.config.server_id))
            .send()
            .await
            .map_err(|e| {
                warn!(%url, "Backend request failed: {}", e);
                BackendError::Transport(e)
            })
    }

    fn endpoint(&self, bucket: &HealthBucket) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), bucket.path())
    }

    fn cap_cache_ttl(&self, ttl: Duration) -> Duration {
        match self.config.max_cache_ttl {
            Some(max) => ttl.min(max),
            None => ttl,
        }
    }
}

impl Drop for BackendClient {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.abort();
        }
    }
}

/// Read the cache duration header.
///
/// Absent or empty means "do not cache". Anything other than a non-negative
/// integer number of seconds is an error.
pub fn parse_cache_duration(headers: &HeaderMap) -> Result<Option<Duration>> {
    let Some(value) = headers.get(CACHE_DURATION_HEADER) else {
        return Ok(None);
    };

    let text = value
        .to_str()
        .map_err(|_| {
            BackendError::InvalidCacheDuration(String::from_utf8_lossy(value.as_bytes()).into_owned())
        })?
        .trim();
    if text.is_empty() {
        return Ok(None);
    }

    text.parse::<u64>()
        .map(|secs| Some(Duration::from_secs(secs)))
        .map_err(|_| BackendError::InvalidCacheDuration(text.to_string()))
}

fn is_json_content_type(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|media| media.trim().eq_ignore_ascii_case("application/json"))
        .unwrap_or(false)
}
