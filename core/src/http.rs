//! HTTP wire types shared by the request builder, the transport seam and the
//! response resolver.
//!
//! # Design
//! These types describe requests and responses as plain data. The core never
//! touches the network: a `Transport` implementation turns a built `Request`
//! into an `HttpResponse`, and everything on either side of that call stays
//! deterministic and easy to test.

use std::fmt;

use bytes::Bytes;

/// Media type that selects JSON body encoding and JSON response decoding.
pub const APPLICATION_JSON: &str = "application/json";

/// Canonical spelling of the content type header.
pub const CONTENT_TYPE: &str = "Content-Type";

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl HttpMethod {
    pub const fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered header list.
///
/// Pushing never replaces an existing entry. Lookups compare names
/// ASCII-case-insensitively and return the most recently pushed value, so a
/// later header wins without discarding the earlier one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.push((key.into(), value.into()));
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .rev()
            .find(|(name, _)| name.eq_ignore_ascii_case(key))
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for Headers
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl<K, V> Extend<(K, V)> for Headers
where
    K: Into<String>,
    V: Into<String>,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        self.0.extend(iter.into_iter().map(|(k, v)| (k.into(), v.into())));
    }
}

/// A raw HTTP response as returned by a `Transport`.
///
/// Converted into a `Response` by the client before resolution.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Headers,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn content_type(&self) -> &str {
        self.headers.get(CONTENT_TYPE).unwrap_or_default()
    }
}

/// True when `content_type` names `application/json`, ignoring parameters
/// such as `charset` and ASCII case.
pub fn is_json(content_type: &str) -> bool {
    media_type(content_type).eq_ignore_ascii_case(APPLICATION_JSON)
}

/// The media type portion of a content type value.
pub fn media_type(content_type: &str) -> &str {
    content_type.split(';').next().unwrap_or_default().trim()
}
