use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::Duration;

use reqwest::header::{HeaderMap, LOCATION};
use reqwest::{Client, StatusCode, redirect};
use sous_core::{AppError, Fetcher};
use url::Url;

use crate::http::{excerpt, send_error, status_error};

const USER_AGENT: &str = "Mozilla/5.0 (compatible; Sous/0.1; +recipe-instructions)";

const MAX_REDIRECTS: usize = 10;

/// HTTP page downloader.
///
/// Every URL it requests, redirect targets included, must be http/https and,
/// by default, must not be or resolve to a loopback, private, link-local or
/// otherwise reserved address.
/// [`allow_private_urls`](Self::allow_private_urls) lifts the address rule for
/// local development and tests.
#[derive(Clone)]
pub struct ReqwestFetcher {
    client: Client,
    guard_destinations: bool,
}

impl ReqwestFetcher {
    pub fn new() -> Result<Self, AppError> {
        Self::with_timeout(Duration::from_secs(15))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .redirect(redirect::Policy::none())
            .build()
            .map_err(|e| AppError::ConfigError(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            client,
            guard_destinations: true,
        })
    }

    pub fn allow_private_urls(mut self) -> Self {
        self.guard_destinations = false;
        self
    }
}

impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        let mut current =
            Url::parse(url).map_err(|e| AppError::InvalidQuery(format!("invalid URL: {e}")))?;
        let mut last_redirect = StatusCode::FOUND;

        for hop in 0..=MAX_REDIRECTS {
            check_destination(&current, self.guard_destinations).await?;
            tracing::debug!(url = %current, hop, "Downloading page");
            let response = self
                .client
                .get(current.clone())
                .send()
                .await
                .map_err(|e| send_error("page", e))?;

            let status = response.status();
            if status.is_redirection() {
                let next = redirect_target(&current, status, response.headers())?;
                tracing::debug!(from = %current, to = %next, "Following redirect");
                current = next;
                last_redirect = status;
                continue;
            }
            if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
                return Err(AppError::NotFound(format!("no page at {current}")));
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(status_error("page", status, excerpt(&body)));
            }

            return response
                .text()
                .await
                .map_err(|e| AppError::UpstreamUnavailable(format!("page body unreadable: {e}")));
        }

        Err(AppError::UpstreamRejected {
            status: last_redirect.as_u16(),
            message: format!("more than {MAX_REDIRECTS} redirects starting at {url}"),
        })
    }
}

/// Where a 3xx response points, resolved against the URL that produced it.
fn redirect_target(current: &Url, status: StatusCode, headers: &HeaderMap) -> Result<Url, AppError> {
    let location = headers
        .get(LOCATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::UpstreamRejected {
            status: status.as_u16(),
            message: "redirect without a usable Location header".into(),
        })?;
    current.join(location).map_err(|e| AppError::UpstreamRejected {
        status: status.as_u16(),
        message: format!("redirect to invalid location '{location}': {e}"),
    })
}

/// Refuse URLs that would make the server call into its own network.
/// Only the scheme is checked when `block_reserved` is off.
async fn check_destination(url: &Url, block_reserved: bool) -> Result<(), AppError> {
    if !matches!(url.scheme(), "http" | "https") {
        return Err(AppError::InvalidQuery(format!(
            "URL scheme '{}' is not allowed (only http/https)",
            url.scheme()
        )));
    }
    if !block_reserved {
        return Ok(());
    }

    let addresses: Vec<IpAddr> = match url.host() {
        None => return Err(AppError::InvalidQuery("URL has no host".into())),
        Some(url::Host::Ipv4(v4)) => vec![IpAddr::V4(v4)],
        Some(url::Host::Ipv6(v6)) => vec![IpAddr::V6(v6)],
        Some(url::Host::Domain(domain)) => {
            let port = url.port_or_known_default().unwrap_or(80);
            tokio::net::lookup_host((domain, port))
                .await
                .map_err(|e| {
                    AppError::UpstreamUnavailable(format!("cannot resolve {domain}: {e}"))
                })?
                .map(|addr| addr.ip())
                .collect()
        }
    };

    if addresses.is_empty() {
        return Err(AppError::UpstreamUnavailable(format!(
            "{url} resolved to no addresses"
        )));
    }
    if let Some(blocked) = addresses.into_iter().find(|ip| is_reserved(*ip)) {
        tracing::warn!(%url, %blocked, "Refusing request to reserved address");
        return Err(AppError::InvalidQuery(format!(
            "destination blocked: {url} points at reserved address {blocked}"
        )));
    }
    Ok(())
}

fn is_reserved(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_reserved_v4(v4),
        IpAddr::V6(v6) => is_reserved_v6(v6),
    }
}

fn is_reserved_v4(ip: Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        || ip.is_documentation()
        // shared address space, 100.64.0.0/10
        || (a == 100 && (64..128).contains(&b))
        // benchmarking, 198.18.0.0/15
        || (a == 198 && (b == 18 || b == 19))
}

fn is_reserved_v6(ip: Ipv6Addr) -> bool {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_reserved_v4(v4);
    }
    let first = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        || (first & 0xfe00) == 0xfc00 // unique local
        || (first & 0xffc0) == 0xfe80 // link local
}
