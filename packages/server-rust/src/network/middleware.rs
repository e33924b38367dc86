//! Transport-level middleware applied to every route.
//!
//! Ordering follows the outer-to-inner convention: the first layer listed
//! sees the request first and the response last.

use axum::http::header::HeaderName;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

/// Header carrying the request id, read by the envelope for log correlation.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

type HttpLayers = tower::layer::util::Stack<
    PropagateRequestIdLayer,
    tower::layer::util::Stack<
        TraceLayer<
            tower_http::classify::SharedClassifier<tower_http::classify::ServerErrorsAsFailures>,
        >,
        tower::layer::util::Stack<SetRequestIdLayer<MakeRequestUuid>, tower::layer::util::Identity>,
    >,
>;

/// Builds the middleware stack.
///
/// 1. `SetRequestId` -- assigns a UUID v4 `x-request-id` unless the client sent one
/// 2. `Tracing` -- structured request/response spans
/// 3. `PropagateRequestId` -- echoes `x-request-id` on the response
///
/// Request deadlines are not enforced here; the envelope owns them so a
/// timed-out request still gets an envelope body.
#[must_use]
pub fn build_http_layers() -> HttpLayers {
    let x_request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    ServiceBuilder::new()
        .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::new(x_request_id))
        .into_inner()
}
