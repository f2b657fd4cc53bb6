//! Response assembly, body decoding and status-driven resolution.
//!
//! # Design
//! `ResponseOptions` mirrors `RequestOptions`: settings are collected first
//! and `build` validates them once. A `Response` is only produced once the
//! header set and the status code are both present. `resolve` classifies
//! the status and runs exactly one of the success handlers or the reject
//! table.

use std::borrow::Cow;
use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use bytes::Bytes;
use serde::de::value::{Error as ValueError, StringDeserializer};
use serde::de::{DeserializeOwned, IntoDeserializer};

use crate::error::{DecodeError, ResponseBuildError, ResponseError};
use crate::http::{self, Headers, HttpResponse};
use crate::reject::{self, ErrorStep, RejectStep, RejectTable};

/// Status codes routed to the success handlers.
pub const SUCCESS_CODES: [u16; 3] = [200, 201, 204];

/// A success handler. Its step is folded into the running error.
pub type SuccessHandler = Arc<dyn Fn(&Response) -> ErrorStep + Send + Sync>;

/// Response configuration, applied in call order.
#[derive(Clone, Default)]
pub struct ResponseOptions {
    headers: Option<Headers>,
    body: Bytes,
    content_type: String,
    status: u16,
    on_success: Vec<SuccessHandler>,
    require_success: bool,
    reject: RejectTable,
}

impl ResponseOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed header, body, content type and status from a transport response.
    pub fn from_http(raw: HttpResponse) -> Self {
        let content_type = raw.content_type().to_string();
        Self::new()
            .headers(raw.headers)
            .body(raw.body)
            .content_type(content_type)
            .status(raw.status)
    }

    pub fn headers(mut self, headers: Headers) -> Self {
        self.headers = Some(headers);
        self
    }

    /// Append a header, creating the header set if needed.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.get_or_insert_with(Headers::new).push(key, value);
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    pub fn status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Append a success handler. Handlers run in the order they were added.
    pub fn on_success<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Response) -> ErrorStep + Send + Sync + 'static,
    {
        self.on_success.push(Arc::new(handler));
        self
    }

    pub fn on_success_handler(mut self, handler: SuccessHandler) -> Self {
        self.on_success.push(handler);
        self
    }

    /// Make an empty success handler list a construction error.
    pub fn require_success_handlers(mut self) -> Self {
        self.require_success = true;
        self
    }

    /// Override the reject handler for one status code.
    pub fn on_reject(mut self, code: u16, steps: impl IntoIterator<Item = RejectStep>) -> Self {
        self.reject.set(code, steps.into_iter().collect());
        self
    }

    /// Carry the handlers declared on `declared` over to these options.
    pub(crate) fn with_handlers_from(mut self, declared: &ResponseOptions) -> Self {
        self.on_success.extend(declared.on_success.iter().cloned());
        self.require_success |= declared.require_success;
        self.reject = declared.reject.clone();
        self
    }

    pub fn build(self) -> Result<Response, ResponseBuildError> {
        let headers = self.headers.ok_or(ResponseBuildError::HeaderMissing)?;
        if self.status == 0 {
            return Err(ResponseBuildError::StatusCodeMissing);
        }
        if self.require_success && self.on_success.is_empty() {
            return Err(ResponseBuildError::MissingOnSuccess);
        }
        Ok(Response {
            headers,
            body: self.body,
            content_type: self.content_type,
            status: self.status,
            on_success: self.on_success,
            reject: self.reject,
        })
    }
}

impl fmt::Debug for ResponseOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseOptions")
            .field("headers", &self.headers)
            .field("content_type", &self.content_type)
            .field("status", &self.status)
            .field("on_success", &self.on_success.len())
            .field("require_success", &self.require_success)
            .field("reject", &self.reject)
            .finish_non_exhaustive()
    }
}

/// A validated response, ready to be decoded and resolved.
#[derive(Clone)]
pub struct Response {
    headers: Headers,
    body: Bytes,
    content_type: String,
    status: u16,
    on_success: Vec<SuccessHandler>,
    reject: RejectTable,
}

impl Response {
    pub fn new(options: ResponseOptions) -> Result<Self, ResponseBuildError> {
        options.build()
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key)
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn is_success(&self) -> bool {
        SUCCESS_CODES.contains(&self.status)
    }

    /// Decode the body according to the content type.
    ///
    /// JSON bodies use structured decoding. Any other content type copies
    /// the body verbatim, so `T` must be buildable from a string and the
    /// body must be valid UTF-8.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, DecodeError> {
        if http::is_json(&self.content_type) {
            if self.body.is_empty() {
                return Err(DecodeError::ResponseBodyEmpty);
            }
            return serde_json::from_slice(&self.body).map_err(|e| DecodeError::Json(e.to_string()));
        }
        let text = std::str::from_utf8(&self.body).map_err(|e| DecodeError::BodyNotUtf8(e.to_string()))?;
        let text: StringDeserializer<ValueError> = text.to_owned().into_deserializer();
        T::deserialize(text).map_err(|_| DecodeError::DefaultBindNotString)
    }

    /// Decode the body into a caller-held binding.
    pub fn decode_into<T: DeserializeOwned>(&self, binding: &Binding<T>) -> Result<(), DecodeError> {
        store(&binding.slot, self.decode()?)
    }

    fn decode_weak<T: DeserializeOwned>(&self, slot: &Weak<Mutex<Option<T>>>) -> Result<(), DecodeError> {
        let slot = slot.upgrade().ok_or(DecodeError::DataBindInvalid)?;
        store(&slot, self.decode()?)
    }

    /// Run the success handlers or the reject table, depending on the
    /// status code.
    pub fn resolve(&self) -> Result<(), ResponseError> {
        if self.is_success() {
            self.resolve_success()
        } else {
            self.resolve_reject()
        }
    }

    /// Fold every success handler's step. Fails only when a handler set a
    /// front message.
    pub fn resolve_success(&self) -> Result<(), ResponseError> {
        reject::fold(self.on_success.iter().map(|handler| handler(self))).into_result()
    }

    /// Look up the reject handler for this status code. Always an error.
    pub fn resolve_reject(&self) -> Result<(), ResponseError> {
        Err(self.reject.resolve(self))
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("content_type", &self.content_type)
            .field("headers", &self.headers)
            .field("body_len", &self.body.len())
            .field("on_success", &self.on_success.len())
            .field("reject", &self.reject)
            .finish()
    }
}

fn store<T>(slot: &Mutex<Option<T>>, value: T) -> Result<(), DecodeError> {
    let mut guard = slot.lock().map_err(|_| DecodeError::DataBindInvalid)?;
    *guard = Some(value);
    Ok(())
}

/// A caller-held slot that a success handler decodes into.
///
/// Handlers only keep a weak reference: once every `Binding` clone is
/// dropped, decoding into it fails with `DataBindInvalid`.
pub struct Binding<T> {
    slot: Arc<Mutex<Option<T>>>,
}

impl<T> Binding<T> {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
        }
    }

    pub fn is_set(&self) -> bool {
        self.slot.lock().map(|v| v.is_some()).unwrap_or(false)
    }

    pub fn take(&self) -> Option<T> {
        self.slot.lock().ok().and_then(|mut v| v.take())
    }

    fn downgrade(&self) -> Weak<Mutex<Option<T>>> {
        Arc::downgrade(&self.slot)
    }
}

impl<T: Clone> Binding<T> {
    pub fn get(&self) -> Option<T> {
        self.slot.lock().ok().and_then(|v| v.clone())
    }
}

impl<T> Clone for Binding<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> Default for Binding<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for Binding<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Binding").field(&self.slot).finish()
    }
}

/// Success handler that decodes the body into `binding`.
///
/// Decode failures are recorded on the diagnostic stack and do not set a
/// front message, so resolution still succeeds.
pub fn decode<T>(binding: &Binding<T>) -> SuccessHandler
where
    T: DeserializeOwned + Send + 'static,
{
    let slot = binding.downgrade();
    Arc::new(move |resp: &Response| match resp.decode_weak(&slot) {
        Ok(()) => ErrorStep::Skip,
        Err(e) => ErrorStep::Stack(e.to_string()),
    })
}

/// Success handler that fails resolution with `message` when `check`
/// rejects the response.
pub fn ensure<F>(message: impl Into<String>, check: F) -> SuccessHandler
where
    F: Fn(&Response) -> bool + Send + Sync + 'static,
{
    let message = message.into();
    Arc::new(move |resp: &Response| {
        if check(resp) {
            ErrorStep::Skip
        } else {
            ErrorStep::SetClient(message.clone())
        }
    })
}
