//! The seam between the pipeline and the network.
//!
//! # Design
//! The core builds requests and resolves responses but never performs I/O.
//! A `Transport` executes one built `Request` and hands back the raw
//! response; pooling, TLS and protocol details all live behind it.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::TransportError;
use crate::http::HttpResponse;
use crate::request::Request;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `request` once. Non-2xx statuses are data, not errors.
    async fn send(&self, request: &Request) -> Result<HttpResponse, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, request: &Request) -> Result<HttpResponse, TransportError> {
        (**self).send(request).await
    }
}
