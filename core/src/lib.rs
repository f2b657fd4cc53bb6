//! Declarative outbound HTTP pipeline.
//!
//! # Overview
//! Builds `Request` values from option sets, sends them through a retry
//! policy against an injected `Transport`, and resolves the resulting
//! `Response` through a status-driven success/reject pipeline. Independent
//! sends can be fanned out concurrently with the `Dispatcher`.
//!
//! # Design
//! - The core never opens a socket; the caller supplies a `Transport`.
//! - Requests are validated and encoded once, in `RequestOptions::build`.
//! - Responses resolve exactly once: status 200/201/204 runs the success
//!   handlers, everything else goes through the reject table.
//! - Retries react to status codes only. Transport errors end the send.
//! - `Dispatcher` bounds how many sends run at once and delivers outcomes
//!   in invocation order; cancellation is cooperative.

pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod query;
pub mod reject;
pub mod request;
pub mod response;
pub mod retry;
pub mod transport;

pub use client::{Client, ClientGenerator, Exchange};
pub use config::{ClientConfig, DispatchConfig, RetryConfig};
pub use dispatch::{DispatchOutcome, Dispatcher};
pub use error::{BuildError, ClientError, DecodeError, ResponseBuildError, ResponseError, TransportError};
pub use http::{Headers, HttpMethod, HttpResponse};
pub use reject::{ErrorStep, RejectStep, RejectTable};
pub use request::{BulkRequest, Request, RequestGenerator, RequestOptions};
pub use response::{Binding, Response, ResponseOptions, SuccessHandler};
pub use retry::RetryPolicy;
pub use transport::Transport;
pub use tokio_util::sync::CancellationToken;
