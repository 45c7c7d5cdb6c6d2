//! Cookie jar construction and cookie header helpers

use std::{sync::Arc, time::SystemTime};

use reqwest::{
    cookie::{CookieStore, Jar},
    header::{HeaderValue, COOKIE},
    Request,
};
use tracing::{debug, warn};
use url::Url;

use crate::options::{CookieJarSetting, Options};

/// A cookie handed to a jar or attached to a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: Option<String>,
    pub path: Option<String>,
    pub expires: Option<SystemTime>,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: None,
            path: None,
            expires: None,
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_expires(mut self, expires: SystemTime) -> Self {
        self.expires = Some(expires);
        self
    }

    /// `Set-Cookie` line used when storing into a jar
    pub fn to_set_cookie(&self) -> String {
        let mut line = self.pair();
        if let Some(domain) = &self.domain {
            line.push_str("; Domain=");
            line.push_str(domain);
        }
        if let Some(path) = &self.path {
            line.push_str("; Path=");
            line.push_str(path);
        }
        if let Some(expires) = self.expires {
            line.push_str("; Expires=");
            line.push_str(&httpdate::fmt_http_date(expires));
        }
        line
    }

    /// `name=value` as sent in a `Cookie` header
    pub fn pair(&self) -> String {
        format!("{}={}", self.name, self.value)
    }
}

/// Build the cookie jar selected by resolved options
pub fn build_jar(options: &Options) -> Option<Arc<dyn CookieStore>> {
    match &options.cookie_jar {
        Some(CookieJarSetting::InMemory) => {
            debug!("built in-memory cookie jar");
            Some(Arc::new(Jar::default()))
        }
        Some(CookieJarSetting::Custom(store)) => Some(Arc::clone(store)),
        Some(CookieJarSetting::Disabled) | None => None,
    }
}

/// Store cookies into `jar` as if `url` had set them
pub(crate) fn store_cookies(jar: &dyn CookieStore, cookies: &[Cookie], url: &Url) {
    let lines: Vec<HeaderValue> = cookies
        .iter()
        .filter_map(|cookie| match HeaderValue::from_str(&cookie.to_set_cookie()) {
            Ok(line) => Some(line),
            Err(_) => {
                warn!(name = %cookie.name, "cookie is not a valid header value, skipped");
                None
            }
        })
        .collect();

    if !lines.is_empty() {
        jar.set_cookies(&mut lines.iter(), url);
    }
}

/// Attach cookies straight onto a request (no jar)
pub(crate) fn attach_cookies(request: &mut Request, cookies: &[Cookie]) {
    if cookies.is_empty() {
        return;
    }
    let pairs = cookies.iter().map(Cookie::pair).collect::<Vec<_>>().join("; ");
    append_cookie_header(request, &pairs);
}

/// Attach whatever the jar holds for the request URL
pub(crate) fn attach_from_jar(request: &mut Request, jar: &dyn CookieStore) {
    let Some(value) = jar.cookies(request.url()) else {
        return;
    };
    match value.to_str() {
        Ok(pairs) => append_cookie_header(request, pairs),
        Err(_) => {
            request.headers_mut().insert(COOKIE, value);
        }
    }
}

fn append_cookie_header(request: &mut Request, pairs: &str) {
    let combined = match request.headers().get(COOKIE).and_then(|v| v.to_str().ok()) {
        Some(existing) if !existing.is_empty() => format!("{existing}; {pairs}"),
        _ => pairs.to_string(),
    };
    match HeaderValue::from_str(&combined) {
        Ok(value) => {
            request.headers_mut().insert(COOKIE, value);
        }
        Err(_) => warn!("cookie header is not a valid header value, skipped"),
    }
}

/// Split a `Cookie` header into name/value cookies
pub fn parse_cookie_header(value: &HeaderValue) -> Vec<Cookie> {
    let Ok(value) = value.to_str() else {
        return Vec::new();
    };
    value
        .split(';')
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            (!name.is_empty()).then(|| Cookie::new(name, value))
        })
        .collect()
}
