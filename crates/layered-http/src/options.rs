//! Typed request options and their precedence merge
//!
//! Options resolve in three layers, lowest first: library defaults, client
//! defaults, one-time overrides. Each field of [`Options`] is `None` when the
//! layer leaves it unset, so merging is a per-field overlay.

use std::{fmt, net::IpAddr, sync::Arc, time::Duration};

use reqwest::{cookie::CookieStore, Request};

use crate::error::{BoxError, RedirectDenied};

/// Default redirect limit
pub const DEFAULT_MAX_REDIRECTS: usize = 10;

/// Identifies one option, independent of its value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptionKey {
    AutoReferer,
    FollowLocation,
    MaxRedirects,
    ConnectTimeout,
    Timeout,
    ProxyType,
    Proxy,
    ProxyResolver,
    Interface,
    CookieJar,
    Referer,
    UserAgent,
    RedirectPolicy,
}

impl OptionKey {
    /// Keys whose one-time use forces a fresh transport
    pub const TRANSPORT: &'static [OptionKey] = &[
        OptionKey::ConnectTimeout,
        OptionKey::Timeout,
        OptionKey::ProxyType,
        OptionKey::Proxy,
        OptionKey::ProxyResolver,
        OptionKey::Interface,
    ];

    /// Keys whose one-time use forces a fresh cookie jar
    pub const JAR: &'static [OptionKey] = &[OptionKey::CookieJar];

    pub fn affects_transport(self) -> bool {
        Self::TRANSPORT.contains(&self)
    }

    pub fn affects_jar(self) -> bool {
        Self::JAR.contains(&self)
    }
}

/// Proxy protocol tag. Only [`ProxyType::Http`] is accepted by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProxyType {
    Http,
    Socks4,
    Socks4a,
    Socks5,
}

/// Proxy chosen by a [`ProxyResolver`] for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyTarget {
    pub kind: ProxyType,
    /// `host:port`, optionally prefixed with `http://`
    pub address: String,
}

impl ProxyTarget {
    pub fn http(address: impl Into<String>) -> Self {
        Self {
            kind: ProxyType::Http,
            address: address.into(),
        }
    }
}

type ResolveFn = dyn Fn(&Request) -> Result<Option<ProxyTarget>, BoxError> + Send + Sync;

/// Per-request proxy selection. Returning `Ok(None)` connects directly.
#[derive(Clone)]
pub struct ProxyResolver(Arc<ResolveFn>);

impl ProxyResolver {
    pub fn new<F>(resolve: F) -> Self
    where
        F: Fn(&Request) -> Result<Option<ProxyTarget>, BoxError> + Send + Sync + 'static,
    {
        Self(Arc::new(resolve))
    }

    pub fn resolve(&self, request: &Request) -> Result<Option<ProxyTarget>, BoxError> {
        (self.0)(request)
    }
}

impl fmt::Debug for ProxyResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ProxyResolver(..)")
    }
}

type CheckFn = dyn Fn(&mut Request, &[Request]) -> Result<(), RedirectDenied> + Send + Sync;

/// Caller-supplied redirect decision.
///
/// Receives the pending request and every request already issued in the
/// chain, oldest first. Any `Err` stops the chain.
#[derive(Clone)]
pub struct RedirectCheck(Arc<CheckFn>);

impl RedirectCheck {
    pub fn new<F>(check: F) -> Self
    where
        F: Fn(&mut Request, &[Request]) -> Result<(), RedirectDenied> + Send + Sync + 'static,
    {
        Self(Arc::new(check))
    }

    pub fn check(&self, next: &mut Request, via: &[Request]) -> Result<(), RedirectDenied> {
        (self.0)(next, via)
    }
}

impl fmt::Debug for RedirectCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RedirectCheck(..)")
    }
}

/// Cookie jar selection
#[derive(Clone)]
pub enum CookieJarSetting {
    /// No jar; cookies are attached to each request by hand
    Disabled,
    /// Fresh in-memory jar
    InMemory,
    /// Caller-owned store
    Custom(Arc<dyn CookieStore>),
}

impl From<bool> for CookieJarSetting {
    fn from(enabled: bool) -> Self {
        if enabled {
            CookieJarSetting::InMemory
        } else {
            CookieJarSetting::Disabled
        }
    }
}

impl fmt::Debug for CookieJarSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CookieJarSetting::Disabled => f.write_str("Disabled"),
            CookieJarSetting::InMemory => f.write_str("InMemory"),
            CookieJarSetting::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// A single option with its value
#[derive(Debug, Clone)]
pub enum HttpOption {
    AutoReferer(bool),
    FollowLocation(bool),
    MaxRedirects(usize),
    ConnectTimeout(Duration),
    Timeout(Duration),
    ProxyType(ProxyType),
    Proxy(String),
    ProxyResolver(ProxyResolver),
    Interface(IpAddr),
    CookieJar(CookieJarSetting),
    Referer(String),
    UserAgent(String),
    RedirectPolicy(RedirectCheck),
}

impl HttpOption {
    pub fn key(&self) -> OptionKey {
        match self {
            HttpOption::AutoReferer(_) => OptionKey::AutoReferer,
            HttpOption::FollowLocation(_) => OptionKey::FollowLocation,
            HttpOption::MaxRedirects(_) => OptionKey::MaxRedirects,
            HttpOption::ConnectTimeout(_) => OptionKey::ConnectTimeout,
            HttpOption::Timeout(_) => OptionKey::Timeout,
            HttpOption::ProxyType(_) => OptionKey::ProxyType,
            HttpOption::Proxy(_) => OptionKey::Proxy,
            HttpOption::ProxyResolver(_) => OptionKey::ProxyResolver,
            HttpOption::Interface(_) => OptionKey::Interface,
            HttpOption::CookieJar(_) => OptionKey::CookieJar,
            HttpOption::Referer(_) => OptionKey::Referer,
            HttpOption::UserAgent(_) => OptionKey::UserAgent,
            HttpOption::RedirectPolicy(_) => OptionKey::RedirectPolicy,
        }
    }
}

/// One layer of request options
#[derive(Debug, Clone, Default)]
pub struct Options {
    pub auto_referer: Option<bool>,
    pub follow_location: Option<bool>,
    pub max_redirects: Option<usize>,
    pub connect_timeout: Option<Duration>,
    pub timeout: Option<Duration>,
    pub proxy_type: Option<ProxyType>,
    pub proxy: Option<String>,
    pub proxy_resolver: Option<ProxyResolver>,
    pub interface: Option<IpAddr>,
    pub cookie_jar: Option<CookieJarSetting>,
    pub referer: Option<String>,
    pub user_agent: Option<String>,
    pub redirect_policy: Option<RedirectCheck>,
}

impl Options {
    /// Empty layer
    pub fn new() -> Self {
        Self::default()
    }

    /// Bottom layer applied under every client
    pub fn library_defaults() -> Self {
        Self {
            auto_referer: Some(true),
            follow_location: Some(true),
            max_redirects: Some(DEFAULT_MAX_REDIRECTS),
            cookie_jar: Some(CookieJarSetting::InMemory),
            ..Default::default()
        }
    }

    /// Set a single option
    pub fn set(&mut self, option: HttpOption) {
        match option {
            HttpOption::AutoReferer(v) => self.auto_referer = Some(v),
            HttpOption::FollowLocation(v) => self.follow_location = Some(v),
            HttpOption::MaxRedirects(v) => self.max_redirects = Some(v),
            HttpOption::ConnectTimeout(v) => self.connect_timeout = Some(v),
            HttpOption::Timeout(v) => self.timeout = Some(v),
            HttpOption::ProxyType(v) => self.proxy_type = Some(v),
            HttpOption::Proxy(v) => self.proxy = Some(v),
            HttpOption::ProxyResolver(v) => self.proxy_resolver = Some(v),
            HttpOption::Interface(v) => self.interface = Some(v),
            HttpOption::CookieJar(v) => self.cookie_jar = Some(v),
            HttpOption::Referer(v) => self.referer = Some(v),
            HttpOption::UserAgent(v) => self.user_agent = Some(v),
            HttpOption::RedirectPolicy(v) => self.redirect_policy = Some(v),
        }
    }

    /// Builder form of [`Options::set`]
    pub fn with(mut self, option: HttpOption) -> Self {
        self.set(option);
        self
    }

    pub fn follow_location(self, follow: bool) -> Self {
        self.with(HttpOption::FollowLocation(follow))
    }

    pub fn max_redirects(self, max: usize) -> Self {
        self.with(HttpOption::MaxRedirects(max))
    }

    pub fn connect_timeout(self, timeout: Duration) -> Self {
        self.with(HttpOption::ConnectTimeout(timeout))
    }

    pub fn timeout(self, timeout: Duration) -> Self {
        self.with(HttpOption::Timeout(timeout))
    }

    pub fn proxy(self, target: impl Into<String>) -> Self {
        self.with(HttpOption::Proxy(target.into()))
    }

    pub fn cookie_jar(self, jar: impl Into<CookieJarSetting>) -> Self {
        self.with(HttpOption::CookieJar(jar.into()))
    }

    pub fn user_agent(self, user_agent: impl Into<String>) -> Self {
        self.with(HttpOption::UserAgent(user_agent.into()))
    }

    pub fn referer(self, referer: impl Into<String>) -> Self {
        self.with(HttpOption::Referer(referer.into()))
    }

    /// Keys set in this layer
    pub fn keys(&self) -> Vec<OptionKey> {
        let present = [
            (OptionKey::AutoReferer, self.auto_referer.is_some()),
            (OptionKey::FollowLocation, self.follow_location.is_some()),
            (OptionKey::MaxRedirects, self.max_redirects.is_some()),
            (OptionKey::ConnectTimeout, self.connect_timeout.is_some()),
            (OptionKey::Timeout, self.timeout.is_some()),
            (OptionKey::ProxyType, self.proxy_type.is_some()),
            (OptionKey::Proxy, self.proxy.is_some()),
            (OptionKey::ProxyResolver, self.proxy_resolver.is_some()),
            (OptionKey::Interface, self.interface.is_some()),
            (OptionKey::CookieJar, self.cookie_jar.is_some()),
            (OptionKey::Referer, self.referer.is_some()),
            (OptionKey::UserAgent, self.user_agent.is_some()),
            (OptionKey::RedirectPolicy, self.redirect_policy.is_some()),
        ];
        present
            .into_iter()
            .filter_map(|(key, set)| set.then_some(key))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.keys().is_empty()
    }

    /// Fields set in `higher` replace ours
    pub fn overlay(&self, higher: &Options) -> Options {
        fn pick<T: Clone>(low: &Option<T>, high: &Option<T>) -> Option<T> {
            high.as_ref().or(low.as_ref()).cloned()
        }

        Options {
            auto_referer: pick(&self.auto_referer, &higher.auto_referer),
            follow_location: pick(&self.follow_location, &higher.follow_location),
            max_redirects: pick(&self.max_redirects, &higher.max_redirects),
            connect_timeout: pick(&self.connect_timeout, &higher.connect_timeout),
            timeout: pick(&self.timeout, &higher.timeout),
            proxy_type: pick(&self.proxy_type, &higher.proxy_type),
            proxy: pick(&self.proxy, &higher.proxy),
            proxy_resolver: pick(&self.proxy_resolver, &higher.proxy_resolver),
            interface: pick(&self.interface, &higher.interface),
            cookie_jar: pick(&self.cookie_jar, &higher.cookie_jar),
            referer: pick(&self.referer, &higher.referer),
            user_agent: pick(&self.user_agent, &higher.user_agent),
            redirect_policy: pick(&self.redirect_policy, &higher.redirect_policy),
        }
    }

    /// Merge layers ordered from lowest to highest precedence
    pub fn merge(layers: &[&Options]) -> Options {
        layers
            .iter()
            .fold(Options::default(), |merged, layer| merged.overlay(layer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_is_right_biased() {
        let defaults = Options::library_defaults();
        let client = Options::new().max_redirects(3).user_agent("client");
        let one_time = Options::new().max_redirects(1);

        let merged = Options::merge(&[&defaults, &client, &one_time]);

        assert_eq!(merged.max_redirects, Some(1));
        assert_eq!(merged.user_agent.as_deref(), Some("client"));
        assert_eq!(merged.follow_location, Some(true));
        assert!(merged.timeout.is_none());
    }

    #[test]
    fn test_merge_of_nothing_is_empty() {
        assert!(Options::merge(&[]).is_empty());
        assert!(Options::merge(&[&Options::new(), &Options::new()]).is_empty());
    }

    #[test]
    fn test_keys_lists_set_fields() {
        let options = Options::new()
            .timeout(Duration::from_secs(1))
            .cookie_jar(false)
            .referer("http://example.com/");

        assert_eq!(
            options.keys(),
            vec![OptionKey::Timeout, OptionKey::CookieJar, OptionKey::Referer]
        );
    }

    #[test]
    fn test_key_classification() {
        assert!(OptionKey::Proxy.affects_transport());
        assert!(OptionKey::Interface.affects_transport());
        assert!(!OptionKey::Proxy.affects_jar());
        assert!(OptionKey::CookieJar.affects_jar());
        assert!(!OptionKey::CookieJar.affects_transport());
        assert!(!OptionKey::UserAgent.affects_transport());
        assert!(!OptionKey::UserAgent.affects_jar());
    }

    #[test]
    fn test_option_keys_match_fields() {
        let mut options = Options::new();
        let option = HttpOption::ProxyType(ProxyType::Http);
        let key = option.key();
        options.set(option);
        assert_eq!(options.keys(), vec![key]);
    }

    #[test]
    fn test_cookie_jar_from_bool() {
        assert!(matches!(CookieJarSetting::from(true), CookieJarSetting::InMemory));
        assert!(matches!(CookieJarSetting::from(false), CookieJarSetting::Disabled));
    }
}
