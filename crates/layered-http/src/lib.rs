//! HTTP client facade with layered options
//!
//! Wraps `reqwest` with per-request overrides for timeouts, proxy, redirect
//! policy, cookie jar and headers.
//!
//! ## Features
//!
//! - **Layered options**: library defaults < client defaults < one-time overrides
//! - **Resource reuse**: transport and cookie jar cached per client, rebuilt
//!   only when a request overrides an option that affects them
//! - **Redirect control**: hop limit, follow switch or a custom check
//! - **Form helpers**: query strings, url-encoded and multipart POST (`@field`
//!   uploads a file)
//! - **Gzip**: response bodies decoded transparently
//! - **Default client**: free functions backed by a process-wide client
//!
//! ```no_run
//! # async fn run() -> layered_http::Result<()> {
//! use std::time::Duration;
//! use layered_http::{Client, HttpOption};
//!
//! let client = Client::new();
//! let body = client
//!     .with_option(HttpOption::Timeout(Duration::from_secs(5)))
//!     .with_header("x-request-id", "42")
//!     .get("http://example.com/search", &[("q", "rust")])
//!     .await?
//!     .read_to_string()
//!     .await?;
//! # let _ = body;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod global;
pub mod jar;
pub mod options;
pub mod redirect;
pub mod request;
pub mod response;
pub mod transport;

pub use client::{Client, RequestBuilder};
pub use config::HttpConfig;
pub use error::{BoxError, HttpError, RedirectDenied, Result};
pub use global::{
    begin, cookie_value, cookie_values, cookies, default_client, defaults, get, post,
    post_multipart, send, with_cookie, with_cookies, with_header, with_headers, with_option,
    with_options,
};
pub use jar::Cookie;
pub use options::{
    CookieJarSetting, HttpOption, OptionKey, Options, ProxyResolver, ProxyTarget, ProxyType,
    RedirectCheck,
};
pub use redirect::RedirectPolicy;
pub use request::{add_query, FILE_MARKER};
pub use response::Response;
pub use transport::{Transport, TransportSettings};

/// Re-export commonly used types
pub use reqwest::{cookie::CookieStore, header, Body, Method, StatusCode};
