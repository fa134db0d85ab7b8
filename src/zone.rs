use std::time::{Duration, Instant};

use parking_lot::Mutex;
use url::Url;

use crate::error::Error;

const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(3);
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Where the device sits relative to the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum NetworkZone {
    #[display("lan")]
    Lan,
    #[display("vpn")]
    Vpn,
    #[display("public")]
    Public,
}

/// Identity-provider addresses valid inside one network zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneEndpoints {
    pub issuer: Url,
    pub redirect_uri: Url,
    pub post_logout_redirect_uri: Url,
}

/// Per-zone endpoints and the probe URLs used to tell the zones apart.
#[derive(Debug, Clone)]
pub struct ZoneConfig {
    pub lan: ZoneEndpoints,
    pub vpn: ZoneEndpoints,
    pub public: ZoneEndpoints,
    pub lan_probe: Url,
    pub vpn_probe: Url,
}

impl ZoneConfig {
    /// Read the zone configuration from the environment.
    ///
    /// # Required env vars
    /// - `ZONE_{LAN,VPN,PUBLIC}_ISSUER`
    /// - `ZONE_{LAN,VPN,PUBLIC}_REDIRECT_URI`
    /// - `ZONE_{LAN,VPN,PUBLIC}_POST_LOGOUT_REDIRECT_URI`
    /// - `ZONE_LAN_PROBE_URL`, `ZONE_VPN_PROBE_URL`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the missing or invalid variable.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary lookup.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the missing or invalid variable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let url = |key: &str| -> Result<Url, Error> {
            lookup(key)
                .ok_or_else(|| Error::Config(format!("{key} is required")))?
                .parse()
                .map_err(|e| Error::Config(format!("{key}: {e}")))
        };
        let endpoints = |zone: &str| -> Result<ZoneEndpoints, Error> {
            Ok(ZoneEndpoints {
                issuer: url(&format!("ZONE_{zone}_ISSUER"))?,
                redirect_uri: url(&format!("ZONE_{zone}_REDIRECT_URI"))?,
                post_logout_redirect_uri: url(&format!("ZONE_{zone}_POST_LOGOUT_REDIRECT_URI"))?,
            })
        };

        Ok(Self {
            lan: endpoints("LAN")?,
            vpn: endpoints("VPN")?,
            public: endpoints("PUBLIC")?,
            lan_probe: url("ZONE_LAN_PROBE_URL")?,
            vpn_probe: url("ZONE_VPN_PROBE_URL")?,
        })
    }

    #[must_use]
    pub fn endpoints(&self, zone: NetworkZone) -> &ZoneEndpoints {
        match zone {
            NetworkZone::Lan => &self.lan,
            NetworkZone::Vpn => &self.vpn,
            NetworkZone::Public => &self.public,
        }
    }
}

/// Supplies the endpoints for the current connectivity context.
#[async_trait::async_trait]
pub trait ZoneResolver: Send + Sync {
    async fn resolve(&self) -> NetworkZone;

    fn endpoints(&self, zone: NetworkZone) -> &ZoneEndpoints;

    async fn current_endpoints(&self) -> ZoneEndpoints {
        let zone = self.resolve().await;
        self.endpoints(zone).clone()
    }
}

/// Probes the LAN host, then the VPN host, and falls back to the public zone.
///
/// The decision is cached for a TTL; call [`invalidate`](Self::invalidate)
/// when connectivity changes.
pub struct ProbingZoneResolver {
    config: ZoneConfig,
    http: reqwest::Client,
    probe_timeout: Duration,
    cache_ttl: Duration,
    cached: Mutex<Option<(NetworkZone, Instant)>>,
}

impl ProbingZoneResolver {
    #[must_use]
    pub fn new(config: ZoneConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            cache_ttl: DEFAULT_CACHE_TTL,
            cached: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    #[must_use]
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Forget the cached zone.
    pub fn invalidate(&self) {
        *self.cached.lock() = None;
    }

    fn cached_zone(&self) -> Option<NetworkZone> {
        let cached = *self.cached.lock();
        cached
            .filter(|(_, at)| at.elapsed() < self.cache_ttl)
            .map(|(zone, _)| zone)
    }

    /// Any HTTP response, whatever its status, means the host is reachable.
    async fn reachable(&self, url: &Url) -> bool {
        match self
            .http
            .get(url.clone())
            .timeout(self.probe_timeout)
            .send()
            .await
        {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "Zone probe failed");
                false
            }
        }
    }

    async fn detect(&self) -> NetworkZone {
        if self.reachable(&self.config.lan_probe).await {
            NetworkZone::Lan
        } else if self.reachable(&self.config.vpn_probe).await {
            NetworkZone::Vpn
        } else {
            NetworkZone::Public
        }
    }
}

#[async_trait::async_trait]
impl ZoneResolver for ProbingZoneResolver {
    async fn resolve(&self) -> NetworkZone {
        if let Some(zone) = self.cached_zone() {
            return zone;
        }
        let zone = self.detect().await;
        tracing::info!(zone = %zone, "Network zone detected");
        *self.cached.lock() = Some((zone, Instant::now()));
        zone
    }

    fn endpoints(&self, zone: NetworkZone) -> &ZoneEndpoints {
        self.config.endpoints(zone)
    }
}
