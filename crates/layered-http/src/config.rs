//! HTTP client configuration

use std::{net::IpAddr, time::Duration};

use serde::{Deserialize, Serialize};

use crate::options::{CookieJarSetting, Options};

/// Serializable client configuration, turned into client-default [`Options`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Overall request timeout
    #[serde(default = "default_timeout")]
    pub timeout: Duration,

    /// Connection timeout
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: Duration,

    /// Follow `Location` on 3xx responses
    #[serde(default = "default_true")]
    pub follow_redirects: bool,

    /// Maximum redirects to follow (0 = no redirects)
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    /// Send the previous URL as `Referer` when following redirects
    #[serde(default = "default_true")]
    pub auto_referer: bool,

    /// Keep an in-memory cookie jar
    #[serde(default = "default_true")]
    pub cookies: bool,

    /// HTTP proxy, `host:port` or `http://host:port`
    #[serde(default)]
    pub proxy: Option<String>,

    /// Local address to bind outgoing connections to
    #[serde(default)]
    pub interface: Option<IpAddr>,

    /// Fixed `Referer` header
    #[serde(default)]
    pub referer: Option<String>,

    /// Custom user agent
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            connect_timeout: default_connect_timeout(),
            follow_redirects: true,
            max_redirects: default_max_redirects(),
            auto_referer: true,
            cookies: true,
            proxy: None,
            interface: None,
            referer: None,
            user_agent: default_user_agent(),
        }
    }
}

impl HttpConfig {
    /// Create a new HTTP config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Config for quick probes (5s timeout, no redirects)
    pub fn fast() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(2),
            follow_redirects: false,
            ..Default::default()
        }
    }

    /// Config for long transfers (5 minute timeout)
    pub fn long() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            connect_timeout: Duration::from_secs(10),
            ..Default::default()
        }
    }

    /// Set timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set connect timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set redirect limit
    pub fn with_max_redirects(mut self, max: usize) -> Self {
        self.max_redirects = max;
        self
    }

    /// Set proxy target
    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    /// Set user agent
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Client-default option layer for this config
    pub fn to_options(&self) -> Options {
        Options {
            auto_referer: Some(self.auto_referer),
            follow_location: Some(self.follow_redirects),
            max_redirects: Some(self.max_redirects),
            connect_timeout: Some(self.connect_timeout),
            timeout: Some(self.timeout),
            proxy: self.proxy.clone(),
            interface: self.interface,
            cookie_jar: Some(CookieJarSetting::from(self.cookies)),
            referer: self.referer.clone(),
            user_agent: Some(self.user_agent.clone()),
            ..Default::default()
        }
    }
}

// Default value functions for serde
fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_max_redirects() -> usize {
    crate::options::DEFAULT_MAX_REDIRECTS
}

fn default_true() -> bool {
    true
}

fn default_user_agent() -> String {
    format!("layered-http/{}", env!("CARGO_PKG_VERSION"))
}
