//! Handler responses.

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

pub const TEXT_PLAIN: &str = "text/plain";
pub const IMAGE_PNG: &str = "image/png";

/// Status, content type and body written back to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: StatusCode,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl Reply {
    pub fn new(status: StatusCode, content_type: &'static str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            content_type,
            body: body.into(),
        }
    }

    /// 200 with a `text/plain` body.
    pub fn text(body: impl Into<String>) -> Self {
        Self::new(StatusCode::OK, TEXT_PLAIN, body.into())
    }

    /// 200 with an `image/png` body.
    pub fn png(body: Vec<u8>) -> Self {
        Self::new(StatusCode::OK, IMAGE_PNG, body)
    }

    /// An error status with the message as a `text/plain` body.
    pub fn error(status: StatusCode, message: impl Into<String>) -> Self {
        Self::new(status, TEXT_PLAIN, message.into())
    }
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        let mut response = (self.status, Body::from(self.body)).into_response();
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static(self.content_type));
        response
    }
}
