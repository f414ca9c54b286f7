//! HTTP glue
//!
//! One fallback handler receives every request, converts it to a
//! [`Request`] and passes it through [`Admission`]. Routing happens later, on
//! the worker, so unmatched paths cost a queue slot like any other request.

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Query, State};
use axum::http::{Method as HttpMethod, StatusCode, Uri};
use axum::response::{IntoResponse, Response as HttpResponse};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::protocol::{Method, Request, Status};

use super::Admission;

/// Build the axum application around an admission wrapper
pub fn app(admission: Admission) -> Router {
    Router::new()
        .fallback(admit)
        // Values of any size are accepted
        .layer(DefaultBodyLimit::disable())
        .layer(TraceLayer::new_for_http())
        .with_state(admission)
}

async fn admit(
    State(admission): State<Admission>,
    method: HttpMethod,
    uri: Uri,
    body: Bytes,
) -> HttpResponse {
    let request = into_request(&method, &uri, body);
    let response = admission.dispatch(request).await;
    (status_code(response.status), response.body).into_response()
}

/// Strip HTTP framing down to what the router needs
///
/// The first `id` query parameter wins; a query string that fails to decode
/// counts as no `id` at all.
pub fn into_request(method: &HttpMethod, uri: &Uri, body: Bytes) -> Request {
    let method = if method == HttpMethod::GET {
        Method::Get
    } else if method == HttpMethod::PUT {
        Method::Put
    } else if method == HttpMethod::DELETE {
        Method::Delete
    } else {
        Method::Other
    };

    let id = Query::<Vec<(String, String)>>::try_from_uri(uri)
        .ok()
        .and_then(|Query(params)| {
            params
                .into_iter()
                .find(|(name, _)| name == "id")
                .map(|(_, value)| value)
        });

    Request {
        method,
        path: uri.path().to_string(),
        id,
        body: Some(body),
    }
}

fn status_code(status: Status) -> StatusCode {
    match status {
        Status::Ok => StatusCode::OK,
        Status::Created => StatusCode::CREATED,
        Status::Accepted => StatusCode::ACCEPTED,
        Status::BadRequest => StatusCode::BAD_REQUEST,
        Status::NotFound => StatusCode::NOT_FOUND,
        Status::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        Status::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
    }
}
