//! Target name resolution.
//!
//! - [`SystemResolver`]: the operating system resolver via `getaddrinfo`
//! - [`NameServerResolver`]: queries pinned to a single configured nameserver

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use thiserror::Error;
use trust_dns_resolver::TokioAsyncResolver;
use trust_dns_resolver::config::{
    LookupIpStrategy, NameServerConfigGroup, ResolverConfig, ResolverOpts,
};

use crate::config::DnsConfig;

/// Default DNS port appended to nameservers given without one.
pub const DNS_PORT: u16 = 53;

/// Errors that can occur while resolving a target.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// System resolver failure.
    #[error("lookup failed: {0}")]
    Io(#[from] std::io::Error),

    /// Nameserver query failure.
    #[error("dns query failed: {0}")]
    Dns(#[from] trust_dns_resolver::error::ResolveError),

    /// The configured nameserver is not an IP address or socket address.
    #[error("invalid nameserver '{0}'")]
    InvalidNameServer(String),
}

/// Resolves a target hostname to zero or more addresses.
#[async_trait::async_trait]
pub trait Resolver: Send + Sync {
    /// Resolve `host`. IP literals resolve to themselves.
    async fn lookup(&self, host: &str) -> Result<Vec<IpAddr>, ResolveError>;

    /// Resolver name for logs.
    fn name(&self) -> &str;
}

/// Build the resolver selected by the DNS configuration.
pub fn resolver_for(config: &DnsConfig) -> Result<Arc<dyn Resolver>, ResolveError> {
    match config.name_server.as_deref() {
        None | Some("") => Ok(Arc::new(SystemResolver)),
        Some(name_server) => Ok(Arc::new(NameServerResolver::new(name_server)?)),
    }
}

/// Operating system resolver.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[async_trait::async_trait]
impl Resolver for SystemResolver {
    async fn lookup(&self, host: &str) -> Result<Vec<IpAddr>, ResolveError> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(vec![ip]);
        }

        let addrs = tokio::net::lookup_host(format!("{host}:0")).await?;
        Ok(dedup(addrs.map(|addr| addr.ip())))
    }

    fn name(&self) -> &str {
        "system"
    }
}

/// Resolver that sends every query to one configured nameserver.
pub struct NameServerResolver {
    name: String,
    resolver: TokioAsyncResolver,
}

impl NameServerResolver {
    /// Create a resolver for `name_server`, given as `ip` or `ip:port`.
    ///
    /// Port 53 is used when none is given.
    pub fn new(name_server: &str) -> Result<Self, ResolveError> {
        let addr = parse_name_server(name_server)?;

        let group = NameServerConfigGroup::from_ips_clear(&[addr.ip()], addr.port(), true);
        let config = ResolverConfig::from_parts(None, vec![], group);

        let mut opts = ResolverOpts::default();
        opts.ip_strategy = LookupIpStrategy::Ipv4AndIpv6;

        Ok(Self {
            name: addr.to_string(),
            resolver: TokioAsyncResolver::tokio(config, opts),
        })
    }
}

impl std::fmt::Debug for NameServerResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NameServerResolver")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Resolver for NameServerResolver {
    async fn lookup(&self, host: &str) -> Result<Vec<IpAddr>, ResolveError> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(vec![ip]);
        }

        let lookup = self.resolver.lookup_ip(host).await?;
        Ok(dedup(lookup.iter()))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn parse_name_server(name_server: &str) -> Result<SocketAddr, ResolveError> {
    let name_server = name_server.trim();
    if let Ok(addr) = name_server.parse::<SocketAddr>() {
        return Ok(addr);
    }
    name_server
        .parse::<IpAddr>()
        .map(|ip| SocketAddr::new(ip, DNS_PORT))
        .map_err(|_| ResolveError::InvalidNameServer(name_server.to_string()))
}

/// Drop repeated addresses, keeping first-seen order.
fn dedup(addrs: impl Iterator<Item = IpAddr>) -> Vec<IpAddr> {
    let mut out: Vec<IpAddr> = Vec::new();
    for addr in addrs {
        if !out.contains(&addr) {
            out.push(addr);
        }
    }
    out
}
