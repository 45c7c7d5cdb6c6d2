//! Transport construction: timeouts, local binding and proxy routing
//!
//! A [`Transport`] wraps one or more `reqwest::Client`s that share the same
//! timeout and bind settings. Redirects are never followed at this level;
//! the client drives them hop by hop so the redirect policy sees every
//! request.

use std::{net::IpAddr, num::NonZeroUsize, time::Duration};

use lru::LruCache;
use parking_lot::Mutex;
use reqwest::{redirect, Request};
use tracing::debug;
use url::Url;

use crate::{
    error::{HttpError, Result},
    options::{Options, ProxyResolver, ProxyType},
};

/// Clients kept for proxies picked by a resolver; least recently used go first
pub const MAX_ROUTED_CLIENTS: usize = 16;

/// Timeout and bind settings derived from resolved options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransportSettings {
    /// Effective connect timeout, already clamped to `timeout`
    pub connect_timeout: Option<Duration>,
    /// Deadline for the whole request
    pub timeout: Option<Duration>,
    /// Local address for outgoing connections
    pub interface: Option<IpAddr>,
}

impl TransportSettings {
    pub fn from_options(options: &Options) -> Self {
        let timeout = options.timeout.filter(|t| !t.is_zero());
        let mut connect_timeout = options.connect_timeout.filter(|t| !t.is_zero());

        // the connect phase must fit in the overall budget
        if let Some(total) = timeout {
            if connect_timeout.map_or(true, |connect| connect > total) {
                connect_timeout = Some(total);
            }
        }

        Self {
            connect_timeout,
            timeout,
            interface: options.interface,
        }
    }

    fn build_client(&self, proxy: Option<&Url>) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder()
            .redirect(redirect::Policy::none())
            .no_proxy();

        if let Some(connect_timeout) = self.connect_timeout {
            builder = builder.connect_timeout(connect_timeout);
        }
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(interface) = self.interface {
            builder = builder.local_address(interface);
        }

        if let Some(proxy_url) = proxy {
            let proxy = reqwest::Proxy::all(proxy_url.as_str())
                .map_err(|e| HttpError::InvalidProxy(e.to_string()))?;
            builder = builder.proxy(proxy);
        }

        builder
            .build()
            .map_err(|e| HttpError::BuildError(e.to_string()))
    }
}

/// Turn a proxy target into a proxy URL, defaulting to `http://`
pub fn proxy_url(target: &str) -> Result<Url> {
    let candidate = if target.contains("://") {
        target.to_string()
    } else {
        format!("http://{target}")
    };

    let url = Url::parse(&candidate)
        .map_err(|e| HttpError::InvalidProxy(format!("{target}: {e}")))?;

    if url.scheme() != "http" {
        return Err(HttpError::InvalidProxy(format!(
            "{target}: only http:// proxies are supported"
        )));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(HttpError::InvalidProxy(format!("{target}: missing host")));
    }

    Ok(url)
}

#[derive(Debug)]
enum ProxyRoute {
    Direct,
    Static(Url),
    Dynamic(ProxyResolver),
}

/// Configured network transport
#[derive(Debug)]
pub struct Transport {
    settings: TransportSettings,
    route: ProxyRoute,
    base: reqwest::Client,
    /// Clients for proxies picked by a resolver, keyed by proxy URL
    routed: Mutex<LruCache<Url, reqwest::Client>>,
}

impl Transport {
    /// Build a transport from resolved options
    pub fn from_options(options: &Options) -> Result<Self> {
        let settings = TransportSettings::from_options(options);

        let route = match &options.proxy_resolver {
            Some(resolver) => ProxyRoute::Dynamic(resolver.clone()),
            None => {
                if let Some(kind) = options.proxy_type {
                    if kind != ProxyType::Http {
                        return Err(HttpError::UnsupportedProxy(kind));
                    }
                }
                match &options.proxy {
                    Some(target) => ProxyRoute::Static(proxy_url(target)?),
                    None => ProxyRoute::Direct,
                }
            }
        };

        let base = match &route {
            ProxyRoute::Static(url) => settings.build_client(Some(url))?,
            ProxyRoute::Direct | ProxyRoute::Dynamic(_) => settings.build_client(None)?,
        };

        debug!(
            connect_timeout = ?settings.connect_timeout,
            timeout = ?settings.timeout,
            route = ?route,
            "built transport"
        );

        Ok(Self {
            settings,
            route,
            base,
            routed: Mutex::new(LruCache::new(
                NonZeroUsize::new(MAX_ROUTED_CLIENTS).unwrap_or(NonZeroUsize::MIN),
            )),
        })
    }

    pub fn settings(&self) -> &TransportSettings {
        &self.settings
    }

    /// Proxy applied to every request, if the transport has a static one
    pub fn static_proxy(&self) -> Option<&Url> {
        match &self.route {
            ProxyRoute::Static(url) => Some(url),
            _ => None,
        }
    }

    /// Client used to assemble requests; routing happens in [`Transport::execute`]
    pub(crate) fn base_client(&self) -> &reqwest::Client {
        &self.base
    }

    fn client_for(&self, request: &Request) -> Result<reqwest::Client> {
        let ProxyRoute::Dynamic(resolver) = &self.route else {
            return Ok(self.base.clone());
        };

        let Some(target) = resolver
            .resolve(request)
            .map_err(HttpError::ProxyResolution)?
        else {
            return Ok(self.base.clone());
        };

        if target.kind != ProxyType::Http {
            return Err(HttpError::UnsupportedProxy(target.kind));
        }
        let url = proxy_url(&target.address)?;

        let mut routed = self.routed.lock();
        if let Some(client) = routed.get(&url) {
            return Ok(client.clone());
        }
        debug!(proxy = %url, "building client for resolved proxy");
        let client = self.settings.build_client(Some(&url))?;
        routed.put(url, client.clone());
        Ok(client)
    }

    /// Send one request without following redirects
    pub async fn execute(&self, request: Request) -> Result<reqwest::Response> {
        let client = self.client_for(&request)?;
        client.execute(request).await.map_err(HttpError::RequestFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{ProxyResolver, ProxyTarget};
    use reqwest::Method;

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    fn request(url: &str) -> Request {
        Request::new(Method::GET, Url::parse(url).unwrap())
    }

    #[test]
    fn test_connect_timeout_clamped_to_timeout() {
        let settings = TransportSettings::from_options(
            &Options::new().timeout(ms(5000)).connect_timeout(ms(8000)),
        );
        assert_eq!(settings.connect_timeout, Some(ms(5000)));
        assert_eq!(settings.timeout, Some(ms(5000)));
    }

    #[test]
    fn test_connect_timeout_defaults_to_timeout() {
        let settings = TransportSettings::from_options(&Options::new().timeout(ms(5000)));
        assert_eq!(settings.connect_timeout, Some(ms(5000)));
    }

    #[test]
    fn test_connect_timeout_without_timeout() {
        let settings = TransportSettings::from_options(&Options::new().connect_timeout(ms(3000)));
        assert_eq!(settings.connect_timeout, Some(ms(3000)));
        assert_eq!(settings.timeout, None);
    }

    #[test]
    fn test_shorter_connect_timeout_kept() {
        let settings = TransportSettings::from_options(
            &Options::new().timeout(ms(5000)).connect_timeout(ms(1000)),
        );
        assert_eq!(settings.connect_timeout, Some(ms(1000)));
    }

    #[test]
    fn test_zero_timeouts_are_unset() {
        let settings = TransportSettings::from_options(
            &Options::new().timeout(Duration::ZERO).connect_timeout(Duration::ZERO),
        );
        assert_eq!(settings, TransportSettings::default());
    }

    #[test]
    fn test_proxy_url_prefixes_http() {
        let url = proxy_url("127.0.0.1:3128").unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:3128/");

        let url = proxy_url("http://proxy.local:8080").unwrap();
        assert_eq!(url.host_str(), Some("proxy.local"));
        assert_eq!(url.port(), Some(8080));
    }

    #[test]
    fn test_proxy_url_rejects_other_schemes() {
        assert!(matches!(
            proxy_url("socks5://127.0.0.1:1080"),
            Err(HttpError::InvalidProxy(_))
        ));
        assert!(matches!(proxy_url("http://"), Err(HttpError::InvalidProxy(_))));
    }

    #[test]
    fn test_static_proxy_transport() {
        let transport = Transport::from_options(
            &Options::new()
                .with(crate::HttpOption::ProxyType(ProxyType::Http))
                .proxy("127.0.0.1:3128"),
        )
        .unwrap();
        assert_eq!(
            transport.static_proxy().map(Url::as_str),
            Some("http://127.0.0.1:3128/")
        );
    }

    #[test]
    fn test_non_http_proxy_type_rejected() {
        let result = Transport::from_options(
            &Options::new()
                .with(crate::HttpOption::ProxyType(ProxyType::Socks5))
                .proxy("127.0.0.1:1080"),
        );
        assert!(matches!(
            result,
            Err(HttpError::UnsupportedProxy(ProxyType::Socks5))
        ));
    }

    #[test]
    fn test_resolver_error_propagates() {
        let resolver = ProxyResolver::new(|_| Err("no route".into()));
        let transport = Transport::from_options(
            &Options::new().with(crate::HttpOption::ProxyResolver(resolver)),
        )
        .unwrap();

        let err = transport.client_for(&request("http://example.com/")).unwrap_err();
        assert!(matches!(err, HttpError::ProxyResolution(_)));
        assert!(err.to_string().contains("no route"));
    }

    #[test]
    fn test_resolver_rejects_socks() {
        let resolver = ProxyResolver::new(|_| {
            Ok(Some(ProxyTarget {
                kind: ProxyType::Socks4,
                address: "127.0.0.1:1080".into(),
            }))
        });
        let transport = Transport::from_options(
            &Options::new().with(crate::HttpOption::ProxyResolver(resolver)),
        )
        .unwrap();

        assert!(matches!(
            transport.client_for(&request("http://example.com/")),
            Err(HttpError::UnsupportedProxy(ProxyType::Socks4))
        ));
    }

    #[test]
    fn test_resolver_clients_cached_per_proxy() {
        let resolver = ProxyResolver::new(|req| {
            if req.url().host_str() == Some("direct.example.com") {
                Ok(None)
            } else {
                Ok(Some(ProxyTarget::http("127.0.0.1:3128")))
            }
        });
        // the resolver wins over a static proxy
        let transport = Transport::from_options(
            &Options::new()
                .proxy("127.0.0.1:9999")
                .with(crate::HttpOption::ProxyResolver(resolver)),
        )
        .unwrap();
        assert!(transport.static_proxy().is_none());

        transport.client_for(&request("http://a.example.com/")).unwrap();
        transport.client_for(&request("http://b.example.com/")).unwrap();
        transport.client_for(&request("http://direct.example.com/")).unwrap();

        assert_eq!(transport.routed.lock().len(), 1);
    }

    #[test]
    fn test_routed_clients_bounded() {
        let resolver = ProxyResolver::new(|req| {
            let port: u16 = req.url().path().trim_start_matches('/').parse().unwrap();
            Ok(Some(ProxyTarget::http(format!("127.0.0.1:{port}"))))
        });
        let transport = Transport::from_options(
            &Options::new().with(crate::HttpOption::ProxyResolver(resolver)),
        )
        .unwrap();

        for port in 4000..4000 + MAX_ROUTED_CLIENTS as u16 + 4 {
            transport
                .client_for(&request(&format!("http://example.com/{port}")))
                .unwrap();
        }

        let routed = transport.routed.lock();
        assert_eq!(routed.len(), MAX_ROUTED_CLIENTS);
        assert!(!routed.contains(&Url::parse("http://127.0.0.1:4000/").unwrap()));
    }
}
