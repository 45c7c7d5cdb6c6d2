//! Process-wide default client
//!
//! Free functions that forward to a single [`Client`] created on first use.
//! It behaves like any other client; concurrent callers each get their own
//! [`RequestBuilder`].

use std::collections::HashMap;

use once_cell::sync::Lazy;
use reqwest::{header::HeaderMap, Body, Method};

use crate::{
    client::{Client, RequestBuilder},
    error::Result,
    jar::Cookie,
    options::{HttpOption, Options},
    response::Response,
};

static DEFAULT_CLIENT: Lazy<Client> = Lazy::new(Client::new);

/// The shared default client
pub fn default_client() -> &'static Client {
    &DEFAULT_CLIENT
}

/// Merge options and headers into the default client's defaults
pub fn defaults(options: Options, headers: HeaderMap) -> &'static Client {
    DEFAULT_CLIENT.defaults(options, headers)
}

pub fn begin() -> RequestBuilder {
    DEFAULT_CLIENT.begin()
}

pub fn with_option(option: HttpOption) -> RequestBuilder {
    DEFAULT_CLIENT.with_option(option)
}

pub fn with_options(options: Options) -> RequestBuilder {
    DEFAULT_CLIENT.with_options(options)
}

pub fn with_header(name: &str, value: &str) -> RequestBuilder {
    DEFAULT_CLIENT.with_header(name, value)
}

pub fn with_headers(headers: HeaderMap) -> RequestBuilder {
    DEFAULT_CLIENT.with_headers(headers)
}

pub fn with_cookie(cookie: Cookie) -> RequestBuilder {
    DEFAULT_CLIENT.with_cookie(cookie)
}

pub fn with_cookies(cookies: impl IntoIterator<Item = Cookie>) -> RequestBuilder {
    DEFAULT_CLIENT.with_cookies(cookies)
}

pub async fn send(
    method: Method,
    url: &str,
    headers: HeaderMap,
    body: Option<Body>,
) -> Result<Response> {
    DEFAULT_CLIENT.send(method, url, headers, body).await
}

pub async fn get(url: &str, params: &[(&str, &str)]) -> Result<Response> {
    DEFAULT_CLIENT.get(url, params).await
}

pub async fn post(url: &str, params: &[(&str, &str)]) -> Result<Response> {
    DEFAULT_CLIENT.post(url, params).await
}

pub async fn post_multipart(url: &str, params: &[(&str, &str)]) -> Result<Response> {
    DEFAULT_CLIENT.post_multipart(url, params).await
}

pub fn cookies(url: &str) -> Vec<Cookie> {
    DEFAULT_CLIENT.cookies(url)
}

pub fn cookie_values(url: &str) -> HashMap<String, String> {
    DEFAULT_CLIENT.cookie_values(url)
}

pub fn cookie_value(url: &str, name: &str) -> Option<String> {
    DEFAULT_CLIENT.cookie_value(url, name)
}
