//! One request through the whole pipeline: build, send with retries,
//! resolve.
//!
//! # Design
//! `Client` holds only declarations: request options, a retry policy
//! template and the response handlers. Every `send` builds a fresh
//! `Request`, takes a fresh copy of the retry policy and resolves a fresh
//! `Response`, so a client can be sent any number of times, including from
//! several tasks at once. A stage failure returns immediately; later stages
//! never run on partial input.

use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, warn, Instrument};

use crate::error::ClientError;
use crate::request::{Request, RequestOptions};
use crate::response::{Response, ResponseOptions};
use crate::retry::RetryPolicy;
use crate::transport::Transport;

/// The built request together with its resolved response.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub request: Request,
    pub response: Response,
}

/// A zero-argument, re-invocable client send.
pub type ClientGenerator =
    Arc<dyn Fn() -> BoxFuture<'static, Result<Exchange, ClientError>> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct Client {
    name: String,
    request: RequestOptions,
    retry: RetryPolicy,
    response: ResponseOptions,
}

impl Client {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            request: RequestOptions::new(),
            retry: RetryPolicy::default(),
            response: ResponseOptions::new(),
        }
    }

    pub fn request(mut self, options: RequestOptions) -> Self {
        self.request = options;
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Success handlers and reject overrides for the response. Header, body,
    /// content type and status always come from the transport.
    pub fn response(mut self, options: ResponseOptions) -> Self {
        self.response = options;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the pipeline once.
    ///
    /// Transport errors abort immediately and are not retried. `cancel`
    /// interrupts both the retry delay and an in-flight transport call.
    pub async fn send(
        &self,
        transport: &dyn Transport,
        cancel: &CancellationToken,
    ) -> Result<Exchange, ClientError> {
        let request = self.request.build()?;
        let span = info_span!(
            "client_send",
            client = %self.name,
            method = %request.method(),
            url = request.url(),
        );
        self.send_built(request, transport, cancel).instrument(span).await
    }

    async fn send_built(
        &self,
        request: Request,
        transport: &dyn Transport,
        cancel: &CancellationToken,
    ) -> Result<Exchange, ClientError> {
        let mut retry = self.retry.fresh();
        let mut last = None;
        loop {
            let proceed = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ClientError::Cancelled),
                proceed = retry.next() => proceed,
            };
            if !proceed {
                break;
            }

            debug!(attempt = retry.attempts(), max = retry.max_attempts(), "sending request");
            let sent = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ClientError::Cancelled),
                sent = transport.send(&request) => sent,
            };
            let raw = sent.map_err(|err| {
                warn!(error = %err, "transport failed");
                err
            })?;
            debug!(status = raw.status, "received response");
            retry.validate_code(raw.status);
            last = Some(raw);
        }

        let raw = last.ok_or(ClientError::NoAttempt)?;
        let response = ResponseOptions::from_http(raw)
            .with_handlers_from(&self.response)
            .build()?;
        if let Err(err) = response.resolve() {
            warn!(status = response.status(), detail = %err.log(), "response rejected");
            return Err(ClientError::Rejected(err));
        }
        Ok(Exchange { request, response })
    }

    /// Wrap this client into a re-invocable generator bound to `transport`.
    pub fn generator(self, transport: Arc<dyn Transport>, cancel: CancellationToken) -> ClientGenerator {
        let client = Arc::new(self);
        Arc::new(move || {
            let client = Arc::clone(&client);
            let transport = Arc::clone(&transport);
            let cancel = cancel.clone();
            async move { client.send(&*transport, &cancel).await }.boxed()
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use bytes::Bytes;
    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::error::{BuildError, TransportError};
    use crate::http::{Headers, HttpMethod, HttpResponse};
    use crate::reject::set_client;
    use crate::response::{decode, Binding};

    /// Replays a fixed list of statuses, repeating the last one.
    struct Scripted {
        statuses: Vec<u16>,
        body: &'static str,
        calls: AtomicUsize,
        seen: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(statuses: Vec<u16>, body: &'static str) -> Self {
            Self {
                statuses,
                body,
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for Scripted {
        async fn send(&self, request: &Request) -> Result<HttpResponse, TransportError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen
                .lock()
                .unwrap()
                .push(format!("{} {}", request.method(), request.url()));
            let status = self.statuses[n.min(self.statuses.len() - 1)];
            let mut headers = Headers::new();
            headers.push("Content-Type", "application/json");
            Ok(HttpResponse {
                status,
                headers,
                body: Bytes::from_static(self.body.as_bytes()),
            })
        }
    }

    struct Broken;

    #[async_trait]
    impl Transport for Broken {
        async fn send(&self, _request: &Request) -> Result<HttpResponse, TransportError> {
            Err(TransportError::Send("connection refused".to_string()))
        }
    }

    struct Hanging;

    #[async_trait]
    impl Transport for Hanging {
        async fn send(&self, _request: &Request) -> Result<HttpResponse, TransportError> {
            futures::future::pending().await
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Data {
        some_data: String,
    }

    fn save_message() -> RequestOptions {
        RequestOptions::new()
            .post()
            .json(&Data {
                some_data: "Hello World".to_string(),
            })
            .domain("http://upstream")
            .path("/api/v1/save-message")
    }

    #[tokio::test]
    async fn send_builds_sends_and_decodes() {
        let transport = Scripted::new(vec![200], r#"{"some_data":"Hello World Appended"}"#);
        let data = Binding::<Data>::new();
        let client = Client::new("save")
            .request(save_message())
            .response(ResponseOptions::new().on_success_handler(decode(&data)));

        let exchange = client.send(&transport, &CancellationToken::new()).await.unwrap();

        assert_eq!(exchange.request.method(), HttpMethod::Post);
        assert_eq!(exchange.request.path(), "/api/v1/save-message");
        assert_eq!(exchange.response.status(), 200);
        assert_eq!(data.get().unwrap().some_data, "Hello World Appended");
        assert_eq!(
            transport.seen.lock().unwrap().as_slice(),
            ["POST http://upstream/api/v1/save-message"]
        );
    }

    #[tokio::test]
    async fn build_error_stops_before_transport() {
        let transport = Scripted::new(vec![200], "{}");
        let client = Client::new("broken").request(RequestOptions::new().get().path("/x"));
        let err = client.send(&transport, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ClientError::Build(BuildError::DomainEmpty)));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn retries_until_accepted() {
        let transport = Scripted::new(vec![503, 503, 200], r#"{"some_data":"ok"}"#);
        let client = Client::new("flaky")
            .request(save_message())
            .retry(RetryPolicy::until_success(5, Duration::ZERO));
        let exchange = client.send(&transport, &CancellationToken::new()).await.unwrap();
        assert_eq!(exchange.response.status(), 200);
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_resolve_last_response() {
        let transport = Scripted::new(vec![503], "{}");
        let client = Client::new("down")
            .request(save_message())
            .retry(RetryPolicy::simple(2, Duration::ZERO, |_| false));
        let err = client.send(&transport, &CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.rejection().unwrap().front_message(), "Service unavailable");
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn reject_override_is_applied() {
        let transport = Scripted::new(vec![500], "{}");
        let client = Client::new("custom")
            .request(save_message())
            .response(ResponseOptions::new().on_reject(500, [set_client("Upstream is down")]));
        let err = client.send(&transport, &CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "Upstream is down");
    }

    #[tokio::test]
    async fn transport_error_is_not_retried() {
        let client = Client::new("offline")
            .request(save_message())
            .retry(RetryPolicy::simple(3, Duration::ZERO, |_| false));
        let err = client.send(&Broken, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ClientError::Transport(TransportError::Send(_))));
    }

    #[tokio::test]
    async fn zero_attempt_policy_reports_no_attempt() {
        let transport = Scripted::new(vec![200], "{}");
        let client = Client::new("none")
            .request(save_message())
            .retry(RetryPolicy::simple(0, Duration::ZERO, |_| true));
        let err = client.send(&transport, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ClientError::NoAttempt));
    }

    #[tokio::test]
    async fn cancellation_interrupts_transport_call() {
        let cancel = CancellationToken::new();
        let client = Client::new("hang").request(save_message());
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });
        let err = client.send(&Hanging, &cancel).await.unwrap_err();
        assert!(matches!(err, ClientError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_retry_delay() {
        let transport = Scripted::new(vec![503], "{}");
        let cancel = CancellationToken::new();
        let client = Client::new("slow")
            .request(save_message())
            .retry(RetryPolicy::simple(3, Duration::from_secs(3600), |_| false));
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });
        let err = client.send(&transport, &cancel).await.unwrap_err();
        assert!(matches!(err, ClientError::Cancelled));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn generator_is_reinvocable() {
        let transport = Arc::new(Scripted::new(vec![204], ""));
        let generate = Client::new("gen")
            .request(save_message())
            .generator(transport.clone(), CancellationToken::new());
        assert!(generate().await.is_ok());
        assert!(generate().await.is_ok());
        assert_eq!(transport.calls(), 2);
    }
}
