//! Request construction: options, validation and one-shot encoding.
//!
//! # Design
//! `RequestOptions` collects configuration in call order. Scalar settings
//! (domain, path, method, param, body) are last-write-wins; headers are
//! appended. `build` validates the collected options in a fixed order and
//! then derives the URL, query string and encoded body exactly once. The
//! resulting `Request` has no setters.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::thread;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::BuildError;
use crate::http::{self, Headers, HttpMethod, APPLICATION_JSON, CONTENT_TYPE};
use crate::query;

/// A zero-argument, re-invocable request build.
pub type RequestGenerator = Arc<dyn Fn() -> Result<Request, BuildError> + Send + Sync>;

/// A raw param or body value, captured as JSON when the option is applied.
#[derive(Debug, Clone, Default, PartialEq)]
enum RawValue {
    #[default]
    Absent,
    Captured(Value),
    Unserializable(String),
}

impl RawValue {
    fn capture<T: Serialize + ?Sized>(value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(Value::Null) => RawValue::Absent,
            Ok(value) => RawValue::Captured(value),
            Err(e) => RawValue::Unserializable(e.to_string()),
        }
    }

    /// Absent stays absent; anything else must be a JSON object.
    fn record(&self, invalid: fn(String) -> BuildError) -> Result<Option<Value>, BuildError> {
        match self {
            RawValue::Absent => Ok(None),
            RawValue::Captured(value @ Value::Object(_)) => Ok(Some(value.clone())),
            RawValue::Captured(other) => Err(invalid(format!("got {}", kind(other)))),
            RawValue::Unserializable(msg) => Err(invalid(msg.clone())),
        }
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Declarative request configuration, applied in call order.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    domain: String,
    path: String,
    method: Option<HttpMethod>,
    headers: Headers,
    param: RawValue,
    body: RawValue,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn method(mut self, method: HttpMethod) -> Self {
        self.method = Some(method);
        self
    }

    pub fn get(self) -> Self {
        self.method(HttpMethod::Get)
    }

    pub fn post(self) -> Self {
        self.method(HttpMethod::Post)
    }

    pub fn put(self) -> Self {
        self.method(HttpMethod::Put)
    }

    pub fn delete(self) -> Self {
        self.method(HttpMethod::Delete)
    }

    pub fn patch(self) -> Self {
        self.method(HttpMethod::Patch)
    }

    /// Append one header. Earlier headers with the same name are kept.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(key, value);
        self
    }

    pub fn headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.headers.extend(headers);
        self
    }

    /// Set the query parameter record. `None`/unit values count as absent.
    pub fn param<T: Serialize + ?Sized>(mut self, param: &T) -> Self {
        self.param = RawValue::capture(param);
        self
    }

    /// Set the body record. It is encoded according to the `Content-Type`
    /// header in effect at build time.
    pub fn body<T: Serialize + ?Sized>(mut self, body: &T) -> Self {
        self.body = RawValue::capture(body);
        self
    }

    /// Append `Content-Type: application/json` and set the body, unless the
    /// body is null.
    pub fn json<T: Serialize + ?Sized>(self, body: &T) -> Self {
        let this = self.header(CONTENT_TYPE, APPLICATION_JSON);
        match RawValue::capture(body) {
            RawValue::Absent => this,
            raw => Self { body: raw, ..this },
        }
    }

    /// Validate the options and derive the encoded request.
    ///
    /// Checks run in order: domain, path, method, param shape, body shape.
    /// The first failure is returned.
    pub fn build(&self) -> Result<Request, BuildError> {
        if self.domain.is_empty() {
            return Err(BuildError::DomainEmpty);
        }
        if self.path.is_empty() {
            return Err(BuildError::PathEmpty);
        }
        let method = self.method.ok_or(BuildError::MethodEmpty)?;
        let param = self
            .param
            .record(|detail| BuildError::ParamInvalidType { detail })?;
        let body = self
            .body
            .record(|detail| BuildError::BodyInvalidType { detail })?;

        let query = match &param {
            Some(Value::Object(fields)) => query::encode(fields),
            _ => String::new(),
        };
        let mut url = format!("{}{}", self.domain, self.path);
        if !query.is_empty() {
            url.push('?');
            url.push_str(&query);
        }
        let encoded_body = encode_body(body.as_ref(), self.headers.get(CONTENT_TYPE))?;

        Ok(Request {
            domain: self.domain.clone(),
            path: self.path.clone(),
            method,
            headers: self.headers.clone(),
            param,
            body,
            url,
            query,
            encoded_body,
        })
    }

    /// Defer `build` so it can be run later, any number of times.
    pub fn prepare(self) -> RequestGenerator {
        Arc::new(move || self.build())
    }
}

fn encode_body(body: Option<&Value>, content_type: Option<&str>) -> Result<String, BuildError> {
    let Some(body) = body else {
        return Ok(String::new());
    };
    match content_type {
        Some(ct) if http::is_json(ct) => {
            serde_json::to_string(body).map_err(|e| BuildError::JsonEncode(e.to_string()))
        }
        other => Err(BuildError::UnknownContentEncode {
            content_type: other.unwrap_or_default().to_string(),
        }),
    }
}

/// A validated, encoded request. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    domain: String,
    path: String,
    method: HttpMethod,
    headers: Headers,
    param: Option<Value>,
    body: Option<Value>,

    url: String,
    query: String,
    encoded_body: String,
}

impl Request {
    pub fn builder() -> RequestOptions {
        RequestOptions::new()
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE)
    }

    /// The param record as captured, before encoding.
    pub fn raw_param(&self) -> Option<&Map<String, Value>> {
        self.param.as_ref().and_then(Value::as_object)
    }

    /// The body record as captured, before encoding.
    pub fn raw_body(&self) -> Option<&Map<String, Value>> {
        self.body.as_ref().and_then(Value::as_object)
    }

    /// `domain ++ path`, followed by `?query` when a query is present.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    /// The encoded body. Empty when no body was set.
    pub fn body(&self) -> &str {
        &self.encoded_body
    }

    pub fn has_body(&self) -> bool {
        !self.encoded_body.is_empty()
    }
}

/// The outcome of running several request builds independently.
///
/// `requests()[i]` and `errors()[i]` describe generator `i`; exactly one of
/// the two slots is filled.
#[derive(Debug, Clone, Default)]
pub struct BulkRequest {
    requests: Vec<Option<Request>>,
    errors: Vec<Option<BuildError>>,
}

impl BulkRequest {
    /// Run every generator in order. A failing generator does not stop the
    /// ones after it.
    pub fn build(generators: &[RequestGenerator]) -> Self {
        generators.iter().map(|generate| generate()).collect()
    }

    /// Like `build`, but runs the generators on scoped threads, at most
    /// `available_parallelism` of them at a time.
    pub fn build_parallel(generators: &[RequestGenerator]) -> Self {
        let width = thread::available_parallelism().map_or(1, NonZeroUsize::get);
        Self::build_chunked(generators, width)
    }

    fn build_chunked(generators: &[RequestGenerator], width: usize) -> Self {
        generators
            .chunks(width.max(1))
            .flat_map(|chunk| {
                thread::scope(|scope| {
                    let handles: Vec<_> = chunk
                        .iter()
                        .map(|generate| scope.spawn(move || generate()))
                        .collect();
                    handles
                        .into_iter()
                        .map(|handle| match handle.join() {
                            Ok(result) => result,
                            Err(panic) => std::panic::resume_unwind(panic),
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect()
    }

    pub fn has_error(&self) -> bool {
        self.errors.iter().any(Option::is_some)
    }

    pub fn requests(&self) -> &[Option<Request>] {
        &self.requests
    }

    pub fn errors(&self) -> &[Option<BuildError>] {
        &self.errors
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn into_parts(self) -> (Vec<Option<Request>>, Vec<Option<BuildError>>) {
        (self.requests, self.errors)
    }
}

impl FromIterator<Result<Request, BuildError>> for BulkRequest {
    fn from_iter<I: IntoIterator<Item = Result<Request, BuildError>>>(iter: I) -> Self {
        let mut bulk = BulkRequest::default();
        for result in iter {
            match result {
                Ok(request) => {
                    bulk.requests.push(Some(request));
                    bulk.errors.push(None);
                }
                Err(err) => {
                    bulk.requests.push(None);
                    bulk.errors.push(Some(err));
                }
            }
        }
        bulk
    }
}

#[cfg(test)]
mod tests {
    use serde::Serialize;

    use super::*;

    fn base() -> RequestOptions {
        RequestOptions::new()
            .domain("example.com")
            .get()
            .path("/api/v1")
    }

    #[derive(Serialize)]
    struct TestBody {
        number: i32,
        decimal: Option<f64>,
    }

    #[test]
    fn scalar_options_are_last_write_wins() {
        let req = base()
            .domain("other.com")
            .path("/api/v2")
            .post()
            .build()
            .unwrap();
        assert_eq!(req.domain(), "other.com");
        assert_eq!(req.path(), "/api/v2");
        assert_eq!(req.method(), HttpMethod::Post);
        assert_eq!(req.url(), "other.com/api/v2");
    }

    #[test]
    fn header_options_append() {
        let req = base()
            .header("Content-Type", "application/json")
            .header("x-api-key", "my-custom-key")
            .build()
            .unwrap();
        assert_eq!(req.header("Content-Type"), Some("application/json"));
        assert_eq!(req.header("x-api-key"), Some("my-custom-key"));
        assert_eq!(req.header("non-existent"), None);
        assert_eq!(req.headers().len(), 2);
    }

    #[test]
    fn headers_in_either_order_are_both_retrievable() {
        let ab = base().header("a", "1").header("b", "2").build().unwrap();
        let ba = base().header("b", "2").header("a", "1").build().unwrap();
        for req in [ab, ba] {
            assert_eq!(req.header("a"), Some("1"));
            assert_eq!(req.header("b"), Some("2"));
        }
    }

    #[test]
    fn param_is_encoded_into_query_and_url() {
        #[derive(Serialize)]
        struct Param {
            number: i32,
            decimal: Option<f64>,
        }
        let req = base()
            .param(&Param {
                number: 123,
                decimal: Some(12.33),
            })
            .build()
            .unwrap();
        assert_eq!(req.query(), "number=123&decimal=12.33");
        assert_eq!(req.url(), "example.com/api/v1?number=123&decimal=12.33");
        assert_eq!(req.raw_param().unwrap()["number"], 123);
    }

    #[test]
    fn json_body_is_encoded_in_declaration_order() {
        let req = base()
            .json(&TestBody {
                number: 123,
                decimal: Some(12.33),
            })
            .build()
            .unwrap();
        assert_eq!(req.body(), r#"{"number":123,"decimal":12.33}"#);
        assert_eq!(req.content_type(), Some("application/json"));
    }

    #[test]
    fn param_and_json_body_together() {
        #[derive(Serialize)]
        #[allow(non_snake_case)]
        struct RequestParam {
            Name: String,
            SomeData: f64,
        }
        #[derive(Serialize)]
        struct RequestBody {
            body_name: String,
            body_data: f64,
        }
        let req = base()
            .header("x-api-key", "my-custom-key")
            .param(&RequestParam {
                Name: "param".to_string(),
                SomeData: 99.99,
            })
            .json(&RequestBody {
                body_name: "body".to_string(),
                body_data: 9.99,
            })
            .build()
            .unwrap();
        assert_eq!(req.query(), "name=param&somedata=99.99");
        assert_eq!(req.body(), r#"{"body_name":"body","body_data":9.99}"#);
        assert_eq!(req.header("x-api-key"), Some("my-custom-key"));
    }

    #[test]
    fn body_without_content_type_fails() {
        let err = base()
            .body(&TestBody {
                number: 123,
                decimal: Some(12.33),
            })
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            BuildError::UnknownContentEncode {
                content_type: String::new()
            }
        );
    }

    #[test]
    fn body_with_unsupported_content_type_fails() {
        let err = base()
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(&TestBody {
                number: 1,
                decimal: None,
            })
            .build()
            .unwrap_err();
        assert!(matches!(err, BuildError::UnknownContentEncode { .. }));
    }

    #[test]
    fn absent_body_ignores_content_type() {
        let req = base()
            .header("Content-Type", "text/plain")
            .build()
            .unwrap();
        assert_eq!(req.body(), "");
        assert!(!req.has_body());
    }

    #[test]
    fn json_with_null_body_sets_only_header() {
        let req = base().json(&None::<TestBody>).build().unwrap();
        assert_eq!(req.content_type(), Some("application/json"));
        assert!(req.raw_body().is_none());
    }

    #[test]
    fn missing_domain() {
        let err = RequestOptions::new().get().path("/api/v1").build().unwrap_err();
        assert_eq!(err, BuildError::DomainEmpty);
    }

    #[test]
    fn missing_path() {
        let err = RequestOptions::new()
            .domain("example.com")
            .get()
            .build()
            .unwrap_err();
        assert_eq!(err, BuildError::PathEmpty);
    }

    #[test]
    fn missing_method() {
        let err = RequestOptions::new()
            .domain("example.com")
            .path("/api/v1")
            .build()
            .unwrap_err();
        assert_eq!(err, BuildError::MethodEmpty);
    }

    #[test]
    fn validation_order_reports_domain_first() {
        let err = RequestOptions::new().param("x").build().unwrap_err();
        assert_eq!(err, BuildError::DomainEmpty);
    }

    #[test]
    fn param_that_is_not_a_record() {
        let err = base().param("some string").build().unwrap_err();
        assert!(matches!(err, BuildError::ParamInvalidType { .. }));
    }

    #[test]
    fn body_that_is_not_a_record() {
        let err = base().body("some string").build().unwrap_err();
        assert!(matches!(err, BuildError::BodyInvalidType { .. }));
    }

    #[test]
    fn param_checked_before_body() {
        let err = base().param(&[1, 2]).body(&3).build().unwrap_err();
        assert!(matches!(err, BuildError::ParamInvalidType { .. }));
    }

    #[test]
    fn prepare_rebuilds_on_each_call() {
        let generate = base().prepare();
        let first = generate().unwrap();
        let second = generate().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn bulk_build_isolates_failures() {
        for broken in 0..3 {
            let generators: Vec<_> = ["/a", "/b", "/c"]
                .iter()
                .enumerate()
                .map(|(i, path)| {
                    if i == broken {
                        RequestOptions::new().get().path(*path).prepare()
                    } else {
                        base().path(*path).prepare()
                    }
                })
                .collect();
            for bulk in [
                BulkRequest::build(&generators),
                BulkRequest::build_parallel(&generators),
                BulkRequest::build_chunked(&generators, 2),
            ] {
                assert!(bulk.has_error());
                assert_eq!(bulk.len(), 3);
                for (i, path) in ["/a", "/b", "/c"].iter().enumerate() {
                    if i == broken {
                        assert!(bulk.requests()[i].is_none());
                        assert_eq!(bulk.errors()[i], Some(BuildError::DomainEmpty));
                    } else {
                        assert_eq!(bulk.requests()[i].as_ref().unwrap().path(), *path);
                        assert!(bulk.errors()[i].is_none());
                    }
                }
            }
        }
    }

    #[test]
    fn chunked_bulk_build_keeps_order() {
        let generators: Vec<_> = (0..7)
            .map(|i| base().path(format!("/item/{i}")).prepare())
            .collect();
        for width in [1, 3, 64] {
            let bulk = BulkRequest::build_chunked(&generators, width);
            let paths: Vec<_> = bulk
                .requests()
                .iter()
                .map(|r| r.as_ref().unwrap().path().to_string())
                .collect();
            let expected: Vec<_> = (0..7).map(|i| format!("/item/{i}")).collect();
            assert_eq!(paths, expected);
        }
    }

    #[test]
    fn bulk_build_without_errors() {
        let bulk = BulkRequest::build(&[base().prepare(), base().post().prepare()]);
        assert!(!bulk.has_error());
        let (requests, errors) = bulk.into_parts();
        assert_eq!(requests.len(), 2);
        assert!(errors.iter().all(Option::is_none));
    }
}
