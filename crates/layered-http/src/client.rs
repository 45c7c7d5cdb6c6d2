//! HTTP client implementation
//!
//! A [`Client`] holds client-level default options and headers plus a cached
//! transport and cookie jar. Every request goes through a [`RequestBuilder`]
//! that snapshots the defaults, collects one-time overrides and is consumed
//! by exactly one terminal call (`send`, `get`, `post`, `post_multipart`), so
//! one-time state can never leak into the next request.

use std::{collections::HashMap, fmt, sync::Arc};

use parking_lot::{Mutex, RwLock};
use reqwest::{
    cookie::CookieStore,
    header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, LOCATION, SET_COOKIE},
    Body, Method, Request,
};
use tracing::debug;
use url::Url;

use crate::{
    config::HttpConfig,
    error::{HttpError, Result},
    jar::{attach_cookies, attach_from_jar, build_jar, parse_cookie_header, store_cookies, Cookie},
    options::{HttpOption, Options},
    redirect::{next_request, snapshot, BodyReplay, RedirectPolicy},
    request::{
        add_query, encode_form, has_file_param, merge_headers, multipart_form, prepare_request,
        Payload, FORM_CONTENT_TYPE,
    },
    response::Response,
    transport::Transport,
};

/// HTTP client with layered options and a reusable transport and cookie jar.
///
/// Cloning is cheap; clones share defaults and cached resources.
#[derive(Clone, Default)]
pub struct Client {
    inner: Arc<ClientInner>,
}

#[derive(Default)]
struct ClientInner {
    defaults: RwLock<Defaults>,
    shared: Mutex<Shared>,
}

#[derive(Debug, Clone, Default)]
struct Defaults {
    options: Options,
    headers: HeaderMap,
    generation: Generation,
}

/// Bumped whenever client defaults invalidate a cached resource
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Generation {
    transport: u64,
    jar: u64,
}

/// Resources shared by requests that do not override them
#[derive(Default)]
struct Shared {
    transport: Option<Arc<Transport>>,
    jar: Option<Arc<dyn CookieStore>>,
    /// Defaults generation the cached resources belong to
    generation: Generation,
}

impl Client {
    /// Create a client with library defaults only
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a client whose defaults come from `config`
    pub fn from_config(config: &HttpConfig) -> Self {
        let client = Self::new();
        client.defaults(config.to_options(), HeaderMap::new());
        client
    }

    /// Merge options and headers into the client defaults.
    ///
    /// Cached resources built from the previous defaults are dropped when a
    /// transport- or jar-affecting option changes.
    pub fn defaults(&self, options: Options, headers: HeaderMap) -> &Self {
        let keys = options.keys();
        let drop_transport = keys.iter().any(|key| key.affects_transport());
        let drop_jar = keys.iter().any(|key| key.affects_jar());

        // lock order: shared, then defaults
        let mut shared = self.inner.shared.lock();
        let mut defaults = self.inner.defaults.write();
        defaults.options = defaults.options.overlay(&options);
        defaults.headers = merge_headers(&[&defaults.headers, &headers]);

        if drop_transport {
            defaults.generation.transport += 1;
            if shared.transport.take().is_some() {
                debug!("client defaults changed, dropping cached transport");
            }
        }
        if drop_jar {
            defaults.generation.jar += 1;
            if shared.jar.take().is_some() {
                debug!("client defaults changed, dropping cached cookie jar");
            }
        }
        shared.generation = defaults.generation;

        self
    }

    /// Snapshot of the client default options
    pub fn default_options(&self) -> Options {
        self.inner.defaults.read().options.clone()
    }

    /// Snapshot of the client default headers
    pub fn default_headers(&self) -> HeaderMap {
        self.inner.defaults.read().headers.clone()
    }

    /// Start configuring a single request
    pub fn begin(&self) -> RequestBuilder {
        RequestBuilder::new(self.clone())
    }

    pub fn with_option(&self, option: HttpOption) -> RequestBuilder {
        self.begin().with_option(option)
    }

    pub fn with_options(&self, options: Options) -> RequestBuilder {
        self.begin().with_options(options)
    }

    pub fn with_header(&self, name: &str, value: &str) -> RequestBuilder {
        self.begin().with_header(name, value)
    }

    pub fn with_headers(&self, headers: HeaderMap) -> RequestBuilder {
        self.begin().with_headers(headers)
    }

    pub fn with_cookie(&self, cookie: Cookie) -> RequestBuilder {
        self.begin().with_cookie(cookie)
    }

    pub fn with_cookies(&self, cookies: impl IntoIterator<Item = Cookie>) -> RequestBuilder {
        self.begin().with_cookies(cookies)
    }

    /// Send a request with client defaults only
    pub async fn send(
        &self,
        method: Method,
        url: &str,
        headers: HeaderMap,
        body: Option<Body>,
    ) -> Result<Response> {
        self.begin().send(method, url, headers, body).await
    }

    /// GET `url` with `params` appended as a query string
    pub async fn get(&self, url: &str, params: &[(&str, &str)]) -> Result<Response> {
        self.begin().get(url, params).await
    }

    /// POST `params` as a form; `@name` params switch to multipart
    pub async fn post(&self, url: &str, params: &[(&str, &str)]) -> Result<Response> {
        self.begin().post(url, params).await
    }

    /// POST `params` as `multipart/form-data`
    pub async fn post_multipart(&self, url: &str, params: &[(&str, &str)]) -> Result<Response> {
        self.begin().post_multipart(url, params).await
    }

    /// Cookies the cached jar holds for `url`
    pub fn cookies(&self, url: &str) -> Vec<Cookie> {
        let Some(jar) = self.inner.shared.lock().jar.clone() else {
            return Vec::new();
        };
        let Ok(url) = Url::parse(url) else {
            return Vec::new();
        };
        jar.cookies(&url)
            .map(|header| parse_cookie_header(&header))
            .unwrap_or_default()
    }

    /// Cookie names mapped to values for `url`
    pub fn cookie_values(&self, url: &str) -> HashMap<String, String> {
        self.cookies(url)
            .into_iter()
            .map(|cookie| (cookie.name, cookie.value))
            .collect()
    }

    /// Value of the cookie called `name` for `url`
    pub fn cookie_value(&self, url: &str, name: &str) -> Option<String> {
        self.cookies(url)
            .into_iter()
            .find(|cookie| cookie.name == name)
            .map(|cookie| cookie.value)
    }

    /// Pick cached or fresh transport and jar for one request.
    ///
    /// Fresh instances are cached only when the request may reuse them and
    /// its options were resolved against the current client defaults.
    fn resources(
        &self,
        options: &Options,
        generation: Generation,
        reuse_transport: bool,
        reuse_jar: bool,
    ) -> Result<(Arc<Transport>, Option<Arc<dyn CookieStore>>)> {
        let mut shared = self.inner.shared.lock();
        let reuse_transport =
            reuse_transport && generation.transport == shared.generation.transport;
        let reuse_jar = reuse_jar && generation.jar == shared.generation.jar;

        let cached = shared.transport.clone().filter(|_| reuse_transport);
        let transport = match cached {
            Some(transport) => transport,
            None => {
                let transport = Arc::new(Transport::from_options(options)?);
                if reuse_transport {
                    shared.transport = Some(Arc::clone(&transport));
                }
                transport
            }
        };

        let cached = shared.jar.clone().filter(|_| reuse_jar);
        let jar = match cached {
            Some(jar) => Some(jar),
            None => {
                let jar = build_jar(options);
                if reuse_jar {
                    shared.jar = jar.clone();
                }
                jar
            }
        };

        Ok((transport, jar))
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shared = self.inner.shared.lock();
        f.debug_struct("Client")
            .field("defaults", &*self.inner.defaults.read())
            .field("transport", &shared.transport)
            .field("jar", &shared.jar.is_some())
            .finish()
    }
}

/// Overrides for a single request.
///
/// Created by [`Client::begin`]; consumed by the terminal call.
#[must_use = "a request builder does nothing until it is sent"]
pub struct RequestBuilder {
    client: Client,
    defaults: Defaults,
    options: Options,
    headers: HeaderMap,
    cookies: Vec<Cookie>,
    reuse_transport: bool,
    reuse_jar: bool,
    error: Option<HttpError>,
}

impl RequestBuilder {
    fn new(client: Client) -> Self {
        let defaults = client.inner.defaults.read().clone();
        Self {
            client,
            defaults,
            options: Options::new(),
            headers: HeaderMap::new(),
            cookies: Vec::new(),
            reuse_transport: true,
            reuse_jar: true,
            error: None,
        }
    }

    /// Override one option for this request
    pub fn with_option(mut self, option: HttpOption) -> Self {
        let key = option.key();
        if key.affects_transport() {
            self.reuse_transport = false;
        }
        if key.affects_jar() {
            self.reuse_jar = false;
        }
        self.options.set(option);
        self
    }

    /// Override every option set in `options` for this request
    pub fn with_options(mut self, options: Options) -> Self {
        for key in options.keys() {
            if key.affects_transport() {
                self.reuse_transport = false;
            }
            if key.affects_jar() {
                self.reuse_jar = false;
            }
        }
        self.options = self.options.overlay(&options);
        self
    }

    /// Set a header for this request; invalid input fails the terminal call
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        let parsed = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| HttpError::InvalidHeader(format!("{name}: {e}")))
            .and_then(|name| {
                HeaderValue::from_str(value)
                    .map(|value| (name, value))
                    .map_err(|e| HttpError::InvalidHeader(format!("{value}: {e}")))
            });

        match parsed {
            Ok((name, value)) => {
                self.headers.insert(name, value);
            }
            Err(e) => {
                self.error.get_or_insert(e);
            }
        }
        self
    }

    /// Set several headers for this request
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = merge_headers(&[&self.headers, &headers]);
        self
    }

    /// Send a cookie with this request
    pub fn with_cookie(mut self, cookie: Cookie) -> Self {
        self.cookies.push(cookie);
        self
    }

    pub fn with_cookies(mut self, cookies: impl IntoIterator<Item = Cookie>) -> Self {
        self.cookies.extend(cookies);
        self
    }

    /// Whether this request may use the client's cached transport
    pub fn reuses_transport(&self) -> bool {
        self.reuse_transport
    }

    /// Whether this request may use the client's cached cookie jar
    pub fn reuses_jar(&self) -> bool {
        self.reuse_jar
    }

    /// Send the request; `headers` win over client and one-time headers
    pub async fn send(
        self,
        method: Method,
        url: &str,
        headers: HeaderMap,
        body: Option<Body>,
    ) -> Result<Response> {
        let payload = body.map_or(Payload::Empty, Payload::Body);
        self.dispatch(method, url, headers, payload).await
    }

    /// GET `url` with `params` appended as a query string
    pub async fn get(self, url: &str, params: &[(&str, &str)]) -> Result<Response> {
        let url = add_query(url, params);
        self.dispatch(Method::GET, &url, HeaderMap::new(), Payload::Empty)
            .await
    }

    /// POST `params` as a url-encoded form, or as multipart when any name
    /// starts with `@`
    pub async fn post(self, url: &str, params: &[(&str, &str)]) -> Result<Response> {
        if has_file_param(params) {
            return self.post_multipart(url, params).await;
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(FORM_CONTENT_TYPE));
        let body = Body::from(encode_form(params));
        self.dispatch(Method::POST, url, headers, Payload::Body(body))
            .await
    }

    /// POST `params` as `multipart/form-data`; `@name` params upload the
    /// file named by their value
    pub async fn post_multipart(self, url: &str, params: &[(&str, &str)]) -> Result<Response> {
        let form = multipart_form(params).await?;
        self.dispatch(Method::POST, url, HeaderMap::new(), Payload::Multipart(form))
            .await
    }

    async fn dispatch(
        self,
        method: Method,
        url: &str,
        headers: HeaderMap,
        payload: Payload,
    ) -> Result<Response> {
        let RequestBuilder {
            client,
            defaults,
            options: one_time_options,
            headers: one_time_headers,
            cookies,
            reuse_transport,
            reuse_jar,
            error,
        } = self;

        if let Some(error) = error {
            return Err(error);
        }

        let options = Options::merge(&[
            &Options::library_defaults(),
            &defaults.options,
            &one_time_options,
        ]);
        let headers = merge_headers(&[&defaults.headers, &one_time_headers, &headers]);

        let (transport, jar) =
            client.resources(&options, defaults.generation, reuse_transport, reuse_jar)?;
        let policy = RedirectPolicy::from_options(&options);

        let mut request = prepare_request(
            transport.base_client(),
            method,
            url,
            &headers,
            &options,
            payload,
        )?;
        match &jar {
            Some(jar) => store_cookies(jar.as_ref(), &cookies, request.url()),
            None => attach_cookies(&mut request, &cookies),
        }

        debug!(
            method = %request.method(),
            url = %request.url(),
            reuse_transport,
            reuse_jar,
            "dispatching request"
        );

        follow_redirects(
            &transport,
            jar.as_deref(),
            &policy,
            options.auto_referer.unwrap_or(true),
            request,
        )
        .await
    }
}

impl fmt::Debug for RequestBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestBuilder")
            .field("options", &self.options)
            .field("headers", &self.headers)
            .field("cookies", &self.cookies)
            .field("reuse_transport", &self.reuse_transport)
            .field("reuse_jar", &self.reuse_jar)
            .finish()
    }
}

/// Issue `request` and follow redirects as the policy allows
async fn follow_redirects(
    transport: &Transport,
    jar: Option<&dyn CookieStore>,
    policy: &RedirectPolicy,
    auto_referer: bool,
    mut request: Request,
) -> Result<Response> {
    let mut via: Vec<Request> = Vec::new();

    loop {
        if let Some(jar) = jar {
            attach_from_jar(&mut request, jar);
        }

        let sent = snapshot(&request);
        let body = BodyReplay::of(&request);
        let response = transport.execute(request).await?;

        if let Some(jar) = jar {
            jar.set_cookies(&mut response.headers().get_all(SET_COOKIE).iter(), sent.url());
        }

        let next = next_request(
            &sent,
            body,
            response.status(),
            response.headers().get(LOCATION),
            auto_referer,
        )?;
        let Some(mut next) = next else {
            return Ok(Response::new(response));
        };

        via.push(sent);
        if let Err(denied) = policy.check(&mut next, &via) {
            debug!(%denied, hops = via.len(), "redirect denied");
            return Err(HttpError::Redirect {
                denied,
                response: Box::new(Response::new(response)),
            });
        }

        debug!(status = %response.status(), to = %next.url(), "following redirect");
        request = next;
    }
}
