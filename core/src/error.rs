//! Error types for every stage of the pipeline.
//!
//! # Design
//! Each stage owns its error type so callers can tell a malformed request
//! from a transport failure from a rejected response. `ResponseError` is the
//! structured error handed to users: its `Display` is the user-safe front
//! message only, while the diagnostic stack is reserved for `log()`.

use std::fmt::Write as _;

use thiserror::Error;

/// Failures while validating or encoding a request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("empty domain name")]
    DomainEmpty,

    #[error("empty url path")]
    PathEmpty,

    #[error("empty request method")]
    MethodEmpty,

    /// The query parameter value is present but is not a record.
    #[error("expect request parameter to be struct: {detail}")]
    ParamInvalidType { detail: String },

    /// The body value is present but is not a record.
    #[error("expect request body to be struct: {detail}")]
    BodyInvalidType { detail: String },

    #[error("request body has fail to encoded as content type is unknown: {content_type:?}")]
    UnknownContentEncode { content_type: String },

    #[error("request body has fail to encoded to json: {0}")]
    JsonEncode(String),
}

/// Failures reported by a `Transport`. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("initialize new request fail: {0}")]
    Request(String),

    #[error("on sending request fail: {0}")]
    Send(String),
}

/// Failures while assembling a `Response` from its options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ResponseBuildError {
    #[error("response header is empty")]
    HeaderMissing,

    #[error("response status code is empty")]
    StatusCodeMissing,

    #[error("response success action is empty")]
    MissingOnSuccess,
}

/// Failures while decoding a response body into a target.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("failed to decode response json: {0}")]
    Json(String),

    #[error("the data bind has to be string type")]
    DefaultBindNotString,

    #[error("the data has to be a live binding")]
    DataBindInvalid,

    #[error("received response body is empty")]
    ResponseBodyEmpty,

    #[error("response body is not valid utf-8: {0}")]
    BodyNotUtf8(String),
}

/// Structured error produced by response resolution.
///
/// `front_message` is safe to show to users; `stack` collects internal
/// detail lines for logging only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Error)]
#[error("{front_message}")]
pub struct ResponseError {
    front_message: String,
    stack: Vec<String>,
}

impl ResponseError {
    pub fn new(front_message: impl Into<String>) -> Self {
        Self {
            front_message: front_message.into(),
            stack: Vec::new(),
        }
    }

    pub fn front_message(&self) -> &str {
        &self.front_message
    }

    pub fn stack(&self) -> &[String] {
        &self.stack
    }

    /// Set the front message, or append to it with `;` when one is present.
    pub fn set_client(&mut self, message: &str) {
        if self.front_message.is_empty() {
            self.front_message.push_str(message);
        } else {
            self.front_message.push(';');
            self.front_message.push_str(message);
        }
    }

    pub fn push_stack(&mut self, line: impl Into<String>) {
        self.stack.push(line.into());
    }

    /// An empty front message means nothing went wrong.
    pub fn has_error(&self) -> bool {
        !self.front_message.is_empty()
    }

    pub fn into_result(self) -> Result<(), ResponseError> {
        if self.has_error() {
            Err(self)
        } else {
            Ok(())
        }
    }

    /// Render the front message and the diagnostic stack for operational
    /// output.
    pub fn log(&self) -> String {
        let mut out = String::new();
        let _ = write!(out, "Front Message: {}, Stack Message: [", self.front_message);
        for (i, line) in self.stack.iter().enumerate() {
            if i > 0 {
                out.push_str("; ");
            }
            out.push_str(line);
        }
        out.push(']');
        out
    }
}

/// Failures of a full client send.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("build request: {0}")]
    Build(#[from] BuildError),

    #[error("send request: {0}")]
    Transport(#[from] TransportError),

    #[error("read response: {0}")]
    Response(#[from] ResponseBuildError),

    /// The response resolved to a structured error.
    #[error("{0}")]
    Rejected(ResponseError),

    #[error("retry policy allowed no attempt")]
    NoAttempt,

    #[error("request cancelled")]
    Cancelled,

    /// The task running the send panicked or was torn down.
    #[error("client task failed: {0}")]
    Task(String),
}

impl ClientError {
    /// The structured error when the response itself was rejected.
    pub fn rejection(&self) -> Option<&ResponseError> {
        match self {
            ClientError::Rejected(err) => Some(err),
            _ => None,
        }
    }
}
