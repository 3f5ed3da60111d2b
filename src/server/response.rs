//! Local response construction for handlers and middleware.

use crate::proxy::ProxyBody;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Response, StatusCode};
use serde::Serialize;

/// Box a fixed byte payload into the shared proxy body type.
pub(crate) fn full_body(bytes: Bytes) -> ProxyBody {
    Full::new(bytes).map_err(|never| match never {}).boxed()
}

/// Build a JSON response from a serialisable value.
pub(crate) fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<ProxyBody> {
    let payload = serde_json::to_vec(value).unwrap_or_default();

    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(full_body(Bytes::from(payload)))
        .unwrap()
}

/// Build a JSON error response with an `error` field.
pub(crate) fn json_error(status: StatusCode, message: &str) -> Response<ProxyBody> {
    json_response(status, &serde_json::json!({ "error": message }))
}

/// Build a response with a status code and no body.
pub(crate) fn empty_response(status: StatusCode) -> Response<ProxyBody> {
    Response::builder()
        .status(status)
        .body(full_body(Bytes::new()))
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_error_shape() {
        let resp = json_error(StatusCode::BAD_REQUEST, "boom");
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            resp.headers().get("content-type").unwrap(),
            "application/json"
        );
    }

    #[test]
    fn test_empty_response() {
        let resp = empty_response(StatusCode::NO_CONTENT);
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    }
}
