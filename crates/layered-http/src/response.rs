//! Response wrapper with transparent gzip decoding

use std::{io::Read, ops::Deref};

use bytes::Bytes;
use flate2::read::GzDecoder;
use reqwest::header::CONTENT_ENCODING;

use crate::error::{HttpError, Result};

/// Thin wrapper over `reqwest::Response`; derefs to it for status and headers
#[derive(Debug)]
pub struct Response {
    inner: reqwest::Response,
}

impl Response {
    pub fn new(inner: reqwest::Response) -> Self {
        Self { inner }
    }

    /// Whether the body is declared as gzip-encoded
    pub fn is_gzip(&self) -> bool {
        self.inner
            .headers()
            .get(CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .map_or(false, |encoding| encoding.trim().eq_ignore_ascii_case("gzip"))
    }

    /// Read the whole body, decompressing gzip
    pub async fn read_all(self) -> Result<Bytes> {
        let gzip = self.is_gzip();
        let raw = self.inner.bytes().await?;
        if !gzip {
            return Ok(raw);
        }

        let mut decoded = Vec::new();
        GzDecoder::new(raw.as_ref())
            .read_to_end(&mut decoded)
            .map_err(HttpError::Decode)?;
        Ok(Bytes::from(decoded))
    }

    /// Read the whole body as UTF-8 text, decompressing gzip
    pub async fn read_to_string(self) -> Result<String> {
        let bytes = self.read_all().await?;
        Ok(String::from_utf8(bytes.to_vec())?)
    }

    /// Get underlying reqwest response
    pub fn into_inner(self) -> reqwest::Response {
        self.inner
    }
}

impl Deref for Response {
    type Target = reqwest::Response;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl From<reqwest::Response> for Response {
    fn from(inner: reqwest::Response) -> Self {
        Self::new(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::{write::GzEncoder, Compression};
    use std::io::Write;

    fn response(encoding: Option<&str>, body: Vec<u8>) -> Response {
        let mut builder = http::Response::builder().status(200);
        if let Some(encoding) = encoding {
            builder = builder.header("content-encoding", encoding);
        }
        Response::new(reqwest::Response::from(builder.body(body).unwrap()))
    }

    fn gzip(text: &str) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(text.as_bytes()).unwrap();
        encoder.finish().unwrap()
    }

    #[tokio::test]
    async fn test_gzip_body_decoded() {
        let res = response(Some("gzip"), gzip("hello, compressed world"));
        assert!(res.is_gzip());
        assert_eq!(res.read_to_string().await.unwrap(), "hello, compressed world");
    }

    #[tokio::test]
    async fn test_plain_body_untouched() {
        let res = response(None, b"plain".to_vec());
        assert!(!res.is_gzip());
        assert_eq!(res.status(), reqwest::StatusCode::OK);
        assert_eq!(res.read_all().await.unwrap(), Bytes::from_static(b"plain"));
    }

    #[tokio::test]
    async fn test_encoding_match_is_case_insensitive() {
        let res = response(Some(" GZIP "), gzip("x"));
        assert!(res.is_gzip());
    }

    #[tokio::test]
    async fn test_corrupt_gzip_is_decode_error() {
        let res = response(Some("gzip"), b"not gzip at all".to_vec());
        assert!(matches!(res.read_all().await, Err(HttpError::Decode(_))));
    }

    #[tokio::test]
    async fn test_invalid_utf8() {
        let res = response(None, vec![0xff, 0xfe, 0xfd]);
        assert!(matches!(res.read_to_string().await, Err(HttpError::Utf8(_))));
    }
}
