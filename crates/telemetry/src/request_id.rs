use axum::http::Request;
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

/// HTTP header carrying the per-request identifier
pub const X_REQUEST_ID: &str = "x-request-id";

/// Generates a UUIDv4 request id for requests that arrive without one
#[derive(Clone, Copy, Debug, Default)]
pub struct MakeRequestUuid;

impl MakeRequestId for MakeRequestUuid {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        Uuid::new_v4().to_string().parse().ok().map(RequestId::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_request_id_is_uuid() {
        let request = Request::builder().body(()).unwrap();
        let id = MakeRequestUuid.make_request_id(&request).unwrap();
        let value = id.header_value().to_str().unwrap();
        assert!(Uuid::parse_str(value).is_ok());
    }

    #[test]
    fn test_make_request_id_is_unique() {
        let request = Request::builder().body(()).unwrap();
        let a = MakeRequestUuid.make_request_id(&request).unwrap();
        let b = MakeRequestUuid.make_request_id(&request).unwrap();
        assert_ne!(a.header_value(), b.header_value());
    }
}
