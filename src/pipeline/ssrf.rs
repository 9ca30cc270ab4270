//! Guard against requests to loopback, private and link-local addresses.
//!
//! Pages on a reading list are untrusted: an article may embed
//! `<img src="http://169.254.169.254/…">` or redirect to `http://localhost`.
//! The guard sits in three places so no path reaches such a host:
//!
//! 1. [`SsrfResolver`] is installed as the client's DNS resolver and drops
//!    private addresses from every lookup;
//! 2. [`check_url`] rejects IP-literal hosts, which never hit the resolver;
//! 3. [`redirect_policy`] re-checks every redirect target.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use reqwest::redirect;
use reqwest::Url;
use thiserror::Error;
use tracing::debug;

use crate::error::DeckleError;

/// Maximum redirects followed per request.
pub const MAX_REDIRECTS: usize = 10;

/// Error raised inside the HTTP stack when a destination is refused.
///
/// Travels through reqwest's error chain and is turned back into
/// [`DeckleError::BlockedDestination`] by [`blocked_host`].
#[derive(Debug, Clone, Error)]
#[error("blocked connection to private/local IP for {host}")]
pub struct Blocked {
    pub host: String,
}

/// True for addresses a fetch must never reach.
pub fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_private_v4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_private_v4(v4),
            None => is_private_v6(v6),
        },
    }
}

fn is_private_v4(ip: Ipv4Addr) -> bool {
    let o = ip.octets();
    ip.is_loopback()                                   // 127.0.0.0/8
        || ip.is_unspecified()                         // 0.0.0.0
        || o[0] == 10                                  // 10.0.0.0/8
        || (o[0] == 172 && (o[1] & 0xf0) == 16)        // 172.16.0.0/12
        || (o[0] == 192 && o[1] == 168)                // 192.168.0.0/16
        || ip.is_link_local()                          // 169.254.0.0/16
        || (o[0] == 224 && o[1] == 0 && o[2] == 0) // link-local multicast
}

fn is_private_v6(ip: Ipv6Addr) -> bool {
    let s = ip.segments();
    ip.is_loopback()                        // ::1
        || ip.is_unspecified()              // ::
        || (s[0] & 0xffc0) == 0xfe80        // fe80::/10
        || (s[0] & 0xfe00) == 0xfc00        // fc00::/7
        || (s[0] & 0xff0f) == 0xff02 // link-local multicast
}

/// Reject a URL whose host is a private IP literal.
pub fn check_url(url: &Url, allow_private: bool) -> Result<(), Blocked> {
    if allow_private {
        return Ok(());
    }
    let host = url.host_str().unwrap_or_default();
    let literal = host.trim_start_matches('[').trim_end_matches(']');
    match literal.parse::<IpAddr>() {
        Ok(ip) if is_private_ip(ip) => Err(Blocked {
            host: host.to_string(),
        }),
        _ => Ok(()),
    }
}

/// Follow at most [`MAX_REDIRECTS`] hops, never onto a private IP literal.
pub fn redirect_policy(allow_private: bool) -> redirect::Policy {
    redirect::Policy::custom(move |attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            return attempt.error("too many redirects");
        }
        match check_url(attempt.url(), allow_private) {
            Ok(()) => attempt.follow(),
            Err(blocked) => attempt.error(blocked),
        }
    })
}

/// DNS resolver that filters out private addresses.
///
/// `exempt_host` (the configured proxy, usually on localhost) is resolved
/// without filtering.
#[derive(Debug, Clone, Default)]
pub struct SsrfResolver {
    exempt_host: Option<String>,
}

impl SsrfResolver {
    pub fn new(exempt_host: Option<String>) -> Arc<Self> {
        Arc::new(Self { exempt_host })
    }
}

type BoxError = Box<dyn std::error::Error + Send + Sync>;

impl Resolve for SsrfResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let host = name.as_str().to_string();
        let exempt = self.exempt_host.as_deref() == Some(host.as_str());
        Box::pin(lookup_filtered(host, exempt))
    }
}

async fn lookup_filtered(host: String, exempt: bool) -> Result<Addrs, BoxError> {
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host.as_str(), 0))
        .await?
        .collect();
    if exempt {
        return Ok(Box::new(addrs.into_iter()));
    }
    let safe: Vec<SocketAddr> = addrs
        .into_iter()
        .filter(|a| !is_private_ip(a.ip()))
        .collect();
    if safe.is_empty() {
        debug!(host = %host, "DNS answer contains only private addresses");
        return Err(Box::new(Blocked { host }));
    }
    Ok(Box::new(safe.into_iter()))
}

/// Walk an error's source chain looking for a [`Blocked`] refusal.
pub fn blocked_host(err: &(dyn std::error::Error + 'static)) -> Option<String> {
    let mut cur: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = cur {
        if let Some(b) = e.downcast_ref::<Blocked>() {
            return Some(b.host.clone());
        }
        cur = e.source();
    }
    None
}

impl From<Blocked> for DeckleError {
    fn from(b: Blocked) -> Self {
        DeckleError::BlockedDestination { host: b.host }
    }
}
