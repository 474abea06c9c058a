use std::{
    error::Error as StdError,
    net::SocketAddr,
    num::NonZeroUsize,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use lru::LruCache;
use reqwest::{
    dns::{Addrs, Name, Resolve, Resolving},
    Client,
};
use tokio::{
    sync::{OwnedSemaphorePermit, Semaphore},
    time::Instant,
};
use tracing::debug;

use crate::config::CloudConfig;
use crate::errors::{Result, TtsError};

const DNS_CACHE_CAPACITY: NonZeroUsize = match NonZeroUsize::new(64) {
    Some(capacity) => capacity,
    None => NonZeroUsize::MIN,
};

/// Configuration for the shared HTTP connection pool
#[derive(Debug, Clone, PartialEq)]
pub struct PoolConfig {
    /// Maximum number of requests in flight through the pool
    pub max_connections: usize,
    pub max_idle_per_host: usize,
    pub connect_timeout: Duration,
    /// Maximum gap between two reads of a response
    pub read_timeout: Duration,
    /// Deadline for the whole request, body included
    pub total_timeout: Duration,
    pub dns_ttl: Duration,
}

impl From<&CloudConfig> for PoolConfig {
    fn from(config: &CloudConfig) -> Self {
        Self {
            max_connections: config.max_connections.max(1),
            max_idle_per_host: config.max_idle_per_host,
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            read_timeout: Duration::from_secs(config.read_timeout_secs),
            total_timeout: Duration::from_secs(config.total_timeout_secs),
            dns_ttl: Duration::from_secs(config.dns_cache_ttl_secs),
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::from(&CloudConfig::default())
    }
}

type BoxError = Box<dyn StdError + Send + Sync>;

type DnsCache = Arc<Mutex<LruCache<String, (Vec<SocketAddr>, Instant)>>>;

/// Resolver that remembers lookups for a fixed TTL.
#[derive(Debug, Clone)]
pub struct CachingResolver {
    ttl: Duration,
    cache: DnsCache,
}

impl CachingResolver {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            cache: Arc::new(Mutex::new(LruCache::new(DNS_CACHE_CAPACITY))),
        }
    }

    fn cached(&self, host: &str) -> Option<Vec<SocketAddr>> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        let fresh = cache
            .get(host)
            .filter(|(_, resolved_at)| resolved_at.elapsed() < self.ttl)
            .map(|(addrs, _)| addrs.clone());
        if fresh.is_none() {
            cache.pop(host);
        }
        fresh
    }

    fn store(cache: &DnsCache, host: String, addrs: Vec<SocketAddr>) {
        cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .put(host, (addrs, Instant::now()));
    }
}

impl Resolve for CachingResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let host = name.as_str().to_string();

        if let Some(addrs) = self.cached(&host) {
            debug!(host = %host, "DNS cache hit");
            let addrs: Addrs = Box::new(addrs.into_iter());
            return Box::pin(futures::future::ready(Ok::<Addrs, BoxError>(addrs)));
        }

        let cache = self.cache.clone();
        Box::pin(async move {
            debug!(host = %host, "DNS cache miss, resolving");
            let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host.as_str(), 0))
                .await
                .map_err(|e| Box::new(e) as BoxError)?
                .collect();
            Self::store(&cache, host, addrs.clone());
            let addrs: Addrs = Box::new(addrs.into_iter());
            Ok::<Addrs, BoxError>(addrs)
        })
    }
}

/// Reusable HTTP sessions for network-bound providers.
///
/// One long-lived client keeps idle connections per host; a semaphore bounds
/// how many requests are in flight at once.
#[derive(Debug, Clone)]
pub struct ConnectionPool {
    client: Client,
    semaphore: Arc<Semaphore>,
    config: PoolConfig,
}

/// Holds a pool slot until dropped.
#[derive(Debug)]
pub struct PooledClient {
    client: Client,
    _permit: OwnedSemaphorePermit,
}

impl PooledClient {
    pub fn client(&self) -> &Client {
        &self.client
    }
}

impl ConnectionPool {
    pub fn new(config: PoolConfig) -> Result<Self> {
        let resolver = Arc::new(CachingResolver::new(config.dns_ttl));

        let client = Client::builder()
            .pool_max_idle_per_host(config.max_idle_per_host)
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .timeout(config.total_timeout)
            .dns_resolver(resolver)
            .user_agent(concat!("tts-failover/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            semaphore: Arc::new(Semaphore::new(config.max_connections.max(1))),
            config,
        })
    }

    pub async fn acquire(&self) -> Result<PooledClient> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| TtsError::Io(std::io::Error::other("connection pool closed")))?;
        Ok(PooledClient {
            client: self.client.clone(),
            _permit: permit,
        })
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }
}
