//! Request assembly helpers: query strings, forms, headers

use std::path::Path;

use reqwest::{
    header::{HeaderMap, HeaderValue, CONTENT_TYPE, REFERER, USER_AGENT},
    multipart::{Form, Part},
    Body, Method, Request,
};
use url::{form_urlencoded, Url};

use crate::{
    error::{HttpError, Result},
    options::Options,
};

/// Form field names starting with this character attach a file
pub const FILE_MARKER: char = '@';

/// Content type of url-encoded form bodies
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Request body handed to the client
pub(crate) enum Payload {
    Empty,
    Body(Body),
    Multipart(Form),
}

/// Append url-encoded params to a URL string
pub fn add_query(url: &str, params: &[(&str, &str)]) -> String {
    if params.is_empty() {
        return url.to_string();
    }

    let mut url = url.to_string();
    if !url.contains('?') {
        url.push('?');
    }
    if !url.ends_with('?') && !url.ends_with('&') {
        url.push('&');
    }
    url.push_str(&encode_form(params));
    url
}

/// Url-encode params as a form body
pub fn encode_form(params: &[(&str, &str)]) -> String {
    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params)
        .finish()
}

/// Whether any param selects a file attachment
pub fn has_file_param(params: &[(&str, &str)]) -> bool {
    params.iter().any(|(name, _)| name.starts_with(FILE_MARKER))
}

/// Build a multipart form; `@name` params read the file at their value
pub(crate) async fn multipart_form(params: &[(&str, &str)]) -> Result<Form> {
    let mut form = Form::new();

    for &(name, value) in params {
        match name.strip_prefix(FILE_MARKER) {
            Some(field) => {
                let part = file_part(Path::new(value)).await?;
                form = form.part(field.to_string(), part);
            }
            None => form = form.text(name.to_string(), value.to_string()),
        }
    }

    Ok(form)
}

async fn file_part(path: &Path) -> Result<Part> {
    let contents = tokio::fs::read(path)
        .await
        .map_err(|source| HttpError::FileAttachment {
            path: path.to_path_buf(),
            source,
        })?;

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mime = mime_guess::from_path(path).first_or_octet_stream();

    Part::bytes(contents)
        .file_name(file_name)
        .mime_str(mime.essence_str())
        .map_err(HttpError::RequestFailed)
}

/// Merge header layers ordered from lowest to highest precedence.
///
/// A layer that sets a name replaces every value lower layers gave it.
pub fn merge_headers(layers: &[&HeaderMap]) -> HeaderMap {
    let mut merged = HeaderMap::new();
    for layer in layers {
        for name in layer.keys() {
            merged.remove(name);
            for value in layer.get_all(name) {
                merged.append(name.clone(), value.clone());
            }
        }
    }
    merged
}

/// Assemble the first request of a chain.
///
/// `Referer` and `User-Agent` come from options unless `headers` name them.
/// A multipart payload replaces any `Content-Type` from `headers`.
pub(crate) fn prepare_request(
    factory: &reqwest::Client,
    method: Method,
    url: &str,
    headers: &HeaderMap,
    options: &Options,
    payload: Payload,
) -> Result<Request> {
    let url = Url::parse(url).map_err(|e| HttpError::InvalidUrl(format!("{url}: {e}")))?;

    let mut option_headers = HeaderMap::new();
    if let Some(referer) = &options.referer {
        option_headers.insert(REFERER, header_value(referer)?);
    }
    if let Some(user_agent) = options.user_agent.as_deref().filter(|ua| !ua.is_empty()) {
        option_headers.insert(USER_AGENT, header_value(user_agent)?);
    }

    let mut headers = merge_headers(&[&option_headers, headers]);
    if matches!(payload, Payload::Multipart(_)) {
        // the form supplies its own boundary content type
        headers.remove(CONTENT_TYPE);
    }

    let builder = factory.request(method, url).headers(headers);

    let builder = match payload {
        Payload::Empty => builder,
        Payload::Body(body) => builder.body(body),
        Payload::Multipart(form) => builder.multipart(form),
    };

    builder.build().map_err(HttpError::RequestFailed)
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| HttpError::InvalidHeader(format!("{value}: {e}")))
}
