//! Reject table: status code to structured error.
//!
//! # Design
//! Every recognised 4xx/5xx code maps to a canonical front message. Callers
//! may override individual codes with a list of `RejectStep`s; the steps are
//! folded over an empty `ResponseError` at resolution time. The table shape
//! itself never changes, only the per-code step lists.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::warn;

use crate::error::ResponseError;
use crate::response::Response;

/// Front message for status codes outside the table.
pub const UNKNOWN_REJECT_MESSAGE: &str = "Oops! Something went wrong.";

/// One transform applied to the running `ResponseError`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorStep {
    /// Set the front message, or append to it with `;`.
    SetClient(String),
    /// Append a diagnostic line.
    Stack(String),
    Skip,
}

impl ErrorStep {
    pub fn apply(self, err: &mut ResponseError) {
        match self {
            ErrorStep::SetClient(message) => err.set_client(&message),
            ErrorStep::Stack(line) => err.push_stack(line),
            ErrorStep::Skip => {}
        }
    }
}

/// Fold a sequence of steps into one structured error.
pub fn fold(steps: impl IntoIterator<Item = ErrorStep>) -> ResponseError {
    let mut err = ResponseError::default();
    for step in steps {
        step.apply(&mut err);
    }
    err
}

/// A reject customisation evaluated against the response being resolved.
pub type RejectStep = Arc<dyn Fn(&Response) -> ErrorStep + Send + Sync>;

pub fn set_client(message: impl Into<String>) -> RejectStep {
    let message = message.into();
    Arc::new(move |_: &Response| ErrorStep::SetClient(message.clone()))
}

pub fn stack(line: impl Into<String>) -> RejectStep {
    let line = line.into();
    Arc::new(move |_: &Response| ErrorStep::Stack(line.clone()))
}

pub fn skip() -> RejectStep {
    Arc::new(|_: &Response| ErrorStep::Skip)
}

/// Record the raw response body as a diagnostic line.
pub fn stack_body() -> RejectStep {
    Arc::new(|resp: &Response| ErrorStep::Stack(resp.body_text().into_owned()))
}

/// Canonical front message for a rejected status code.
pub fn reject_message(code: u16) -> Option<&'static str> {
    let message = match code {
        400 => "Bad request",
        401 => "Unauthorized",
        402 => "Payment required",
        403 => "Forbidden",
        404 => "Not found",
        405 => "Method not allowed",
        406 => "Not acceptable",
        407 => "Proxy authentication required",
        408 => "Request timeout",
        409 => "Conflict",
        410 => "Gone",
        411 => "Length required",
        412 => "Precondition failed",
        413 => "Payload too large",
        414 => "URI too long",
        415 => "Unsupported media type",
        416 => "Range not satisfiable",
        417 => "Expectation failed",
        418 => "I'm a teapot",
        421 => "Misdirected request",
        422 => "Unprocessable entity",
        423 => "Locked",
        424 => "Failed dependency",
        425 => "Too early",
        426 => "Upgrade required",
        428 => "Precondition required",
        429 => "Too many requests",
        431 => "Request header fields too large",
        451 => "Unavailable for legal reasons",
        500 => "Internal server error",
        501 => "Not implemented",
        502 => "Bad gateway",
        503 => "Service unavailable",
        504 => "Gateway timeout",
        _ => return None,
    };
    Some(message)
}

/// Per-code overrides on top of the canonical messages.
#[derive(Clone, Default)]
pub struct RejectTable {
    overrides: HashMap<u16, Vec<RejectStep>>,
}

impl RejectTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the handler for `code`. Codes outside the table are never
    /// consulted.
    pub fn set(&mut self, code: u16, steps: Vec<RejectStep>) {
        if reject_message(code).is_none() {
            warn!(code, "reject override for a status outside the reject table is ignored");
        }
        self.overrides.insert(code, steps);
    }

    pub fn is_overridden(&self, code: u16) -> bool {
        reject_message(code).is_some() && self.overrides.contains_key(&code)
    }

    /// Build the structured error for `response`.
    ///
    /// The result always carries a front message: an override that leaves it
    /// empty falls back to the canonical one.
    pub fn resolve(&self, response: &Response) -> ResponseError {
        let code = response.status();
        let Some(default_message) = reject_message(code) else {
            let mut err = ResponseError::new(UNKNOWN_REJECT_MESSAGE);
            err.push_stack(format!("{code} Unknown Error"));
            return err;
        };

        let Some(steps) = self.overrides.get(&code) else {
            return ResponseError::new(default_message);
        };
        let mut err = fold(steps.iter().map(|step| step(response)));
        if !err.has_error() {
            err.set_client(default_message);
        }
        err
    }
}

impl fmt::Debug for RejectTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut codes: Vec<_> = self.overrides.keys().collect();
        codes.sort();
        f.debug_struct("RejectTable").field("overrides", &codes).finish()
    }
}
