//! Uniform JSON envelope around domain handlers.
//!
//! [`ResponseJson`] adapts a [`DomainHandler`] into a tower `Service` that
//! the router mounts with `route_service`. Each call tracks the request as
//! in-flight, derives a deadline-bound [`RequestContext`] from the server's
//! root token, times the handler, and shapes exactly one JSON response.
//!
//! Shaping precedence: a payload always wins. A handler that returns both a
//! payload and an error gets a 200 with the payload; the error is only
//! logged. Without a payload an error becomes a 500 carrying the handler's
//! public message. With neither, the envelope is sent with just the
//! processing time.

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::{FromRequest, Multipart, Query};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, HeaderValue, Method, Request, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Form;
use serde::Serialize;
use stackdemo_core::{format_duration, Envelope};
use tower::Service;
use tracing::{debug, error, warn};

use super::AppState;
use crate::context::{ContextError, RequestContext};
use crate::network::middleware::REQUEST_ID_HEADER;

/// Public message for a handler cut off by the request deadline.
pub const TIMEOUT_MESSAGE: &str = "Gagal memproses request: batas waktu habis";

/// Public message for a handler cut off because the server is stopping.
pub const CANCELLED_MESSAGE: &str = "Gagal memproses request: server berhenti";

// ---------------------------------------------------------------------------
// Handler contract
// ---------------------------------------------------------------------------

/// Client-facing failure. The message is shown to the client as-is, so it
/// must be generic; detailed causes belong in the logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for HandlerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for HandlerError {}

/// What a domain handler produced: an optional payload, an optional error,
/// and any status messages to attach.
#[derive(Debug)]
pub struct Reply<T> {
    pub data: Option<T>,
    pub error: Option<HandlerError>,
    pub status: Vec<String>,
}

impl<T> Reply<T> {
    #[must_use]
    pub fn ok(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
            status: Vec::new(),
        }
    }

    #[must_use]
    pub fn err(message: impl Into<String>) -> Self {
        Self {
            data: None,
            error: Some(HandlerError::new(message)),
            status: Vec::new(),
        }
    }

    /// Neither payload nor error.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            data: None,
            error: None,
            status: Vec::new(),
        }
    }

    /// Payload and error together. The payload takes precedence when shaped.
    #[must_use]
    pub fn partial(data: T, error: HandlerError) -> Self {
        Self {
            data: Some(data),
            error: Some(error),
            status: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_status(mut self, message: impl Into<String>) -> Self {
        self.status.push(message.into());
        self
    }
}

/// Request data handed to domain handlers.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    query: Vec<(String, String)>,
    form: Vec<(String, String)>,
}

impl ApiRequest {
    /// Reads the query string and, for `POST`/`PUT`/`PATCH` with a
    /// urlencoded or multipart body, the form fields. Multipart file parts
    /// are skipped. Malformed input reads as absent.
    pub async fn from_request(request: Request<Body>) -> Self {
        let method = request.method().clone();
        let uri = request.uri().clone();
        let headers = request.headers().clone();

        let query = match Query::<Vec<(String, String)>>::try_from_uri(&uri) {
            Ok(Query(pairs)) => pairs,
            Err(rejection) => {
                debug!(error = %rejection, "ignoring malformed query string");
                Vec::new()
            }
        };

        let form = match form_body(&method, &headers) {
            Some(FormBody::UrlEncoded) => read_urlencoded(request).await,
            Some(FormBody::Multipart) => read_multipart(request).await,
            None => Vec::new(),
        };

        Self {
            method,
            uri,
            headers,
            query,
            form,
        }
    }

    /// First value for `name`, body fields before query parameters.
    /// Absent fields read as the empty string.
    #[must_use]
    pub fn form_value(&self, name: &str) -> &str {
        self.form
            .iter()
            .chain(&self.query)
            .find(|(key, _)| key == name)
            .map_or("", |(_, value)| value.as_str())
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FormBody {
    UrlEncoded,
    Multipart,
}

fn form_body(method: &Method, headers: &HeaderMap) -> Option<FormBody> {
    if !(*method == Method::POST || *method == Method::PUT || *method == Method::PATCH) {
        return None;
    }
    let content_type = headers.get(CONTENT_TYPE)?.to_str().ok()?;
    if content_type.starts_with("application/x-www-form-urlencoded") {
        Some(FormBody::UrlEncoded)
    } else if content_type.starts_with("multipart/form-data") {
        Some(FormBody::Multipart)
    } else {
        None
    }
}

async fn read_urlencoded(request: Request<Body>) -> Vec<(String, String)> {
    match Form::<Vec<(String, String)>>::from_request(request, &()).await {
        Ok(Form(pairs)) => pairs,
        Err(rejection) => {
            debug!(error = %rejection, "ignoring unreadable form body");
            Vec::new()
        }
    }
}

/// Text parts in order. Reading stops at the first malformed part; the
/// fields before it are kept.
async fn read_multipart(request: Request<Body>) -> Vec<(String, String)> {
    let mut multipart = match Multipart::from_request(request, &()).await {
        Ok(multipart) => multipart,
        Err(rejection) => {
            debug!(error = %rejection, "ignoring unreadable multipart body");
            return Vec::new();
        }
    };

    let mut pairs = Vec::new();
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                debug!(error = %e, "stopping at malformed multipart part");
                break;
            }
        };
        if field.file_name().is_some() {
            continue;
        }
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        match field.text().await {
            Ok(value) => pairs.push((name, value)),
            Err(e) => {
                debug!(field = %name, error = %e, "stopping at unreadable multipart field");
                break;
            }
        }
    }
    pairs
}

/// Business logic behind an enveloped endpoint.
///
/// `headers` is the only response access a handler gets: it may add
/// headers, while the envelope owns the status and body.
#[async_trait]
pub trait DomainHandler: Send + Sync + 'static {
    type Payload: Serialize + Send;

    async fn handle(
        &self,
        state: &AppState,
        ctx: &RequestContext,
        request: &ApiRequest,
        headers: &mut HeaderMap,
    ) -> Reply<Self::Payload>;
}

// ---------------------------------------------------------------------------
// ResponseJson service
// ---------------------------------------------------------------------------

/// Tower service wrapping a [`DomainHandler`] in the envelope.
pub struct ResponseJson<H> {
    handler: Arc<H>,
    state: AppState,
}

impl<H> ResponseJson<H> {
    #[must_use]
    pub fn new(handler: H, state: AppState) -> Self {
        Self {
            handler: Arc::new(handler),
            state,
        }
    }
}

impl<H> Clone for ResponseJson<H> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
            state: self.state.clone(),
        }
    }
}

impl<H: DomainHandler> Service<Request<Body>> for ResponseJson<H> {
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Response, Infallible>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let handler = Arc::clone(&self.handler);
        let state = self.state.clone();
        Box::pin(async move { Ok(respond(handler.as_ref(), &state, request).await) })
    }
}

async fn respond<H: DomainHandler>(
    handler: &H,
    state: &AppState,
    request: Request<Body>,
) -> Response {
    let _in_flight = state.shutdown.in_flight_guard();

    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map_or_else(|| uuid::Uuid::new_v4().to_string(), str::to_string);
    let ctx = RequestContext::with_timeout(
        state.shutdown.root_token(),
        request_id,
        state.config.request_timeout,
    );

    let started = Instant::now();
    let mut headers = HeaderMap::new();
    let outcome = ctx
        .bound(async {
            let request = ApiRequest::from_request(request).await;
            handler.handle(state, &ctx, &request, &mut headers).await
        })
        .await;
    let reply = outcome.unwrap_or_else(|e| {
        error!(request_id = %ctx.request_id(), error = %e, "handler abandoned");
        Reply::err(match e {
            ContextError::DeadlineExceeded => TIMEOUT_MESSAGE,
            ContextError::Cancelled => CANCELLED_MESSAGE,
        })
    });

    shape_response(reply, started.elapsed(), headers, ctx.request_id())
}

/// Builds the single response for a reply, applying the precedence rule.
fn shape_response<T: Serialize>(
    reply: Reply<T>,
    elapsed: Duration,
    headers: HeaderMap,
    request_id: &str,
) -> Response {
    let mut envelope = Envelope::new(format_duration(elapsed));
    for message in reply.status {
        envelope.push_status(message);
    }

    let data = reply.data.and_then(|data| match serde_json::to_value(data) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(request_id, error = %e, "failed to serialize payload");
            None
        }
    });

    let status = match (data, reply.error) {
        (Some(value), error) => {
            if let Some(error) = error {
                debug!(request_id, error = %error, "payload present, dropping handler error");
            }
            envelope.data = Some(value);
            StatusCode::OK
        }
        (None, Some(error)) => {
            envelope.push_error(error.message);
            StatusCode::INTERNAL_SERVER_ERROR
        }
        (None, None) => StatusCode::OK,
    };

    let body = envelope.to_json().unwrap_or_else(|e| {
        warn!(request_id, error = %e, "failed to serialize envelope");
        Vec::new()
    });

    let mut response = (status, body).into_response();
    response.headers_mut().extend(headers);
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
