//! Request handler for the removal endpoint
//!
//! The handler is transport agnostic: it takes the declared `Content-Length`
//! and the raw body, and produces a complete [`HandlerResponse`]. The axum
//! router in [`crate::server`] only moves bytes in and out.

use crate::{
    codec::ImageCodec,
    error::BgRemovalError,
    payload::{decode_base64_payload, strip_data_url_prefix, ErrorBody, SuccessBody},
    remover::BackgroundRemover,
};
use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use image::GenericImageView;
use instant::Instant;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// `Access-Control-Allow-Origin` value sent on every response
pub const CORS_ALLOW_ORIGIN: &str = "*";
/// `Access-Control-Allow-Methods` value sent on preflight
pub const CORS_ALLOW_METHODS: &str = "POST, OPTIONS";
/// `Access-Control-Allow-Headers` value sent on preflight
pub const CORS_ALLOW_HEADERS: &str = "Content-Type";

/// Reasons a removal request fails
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("No image provided")]
    MissingImage,

    #[error("Missing Content-Length header")]
    MissingContentLength,

    #[error("Invalid Content-Length header: {0}")]
    InvalidContentLength(String),

    #[error("Request body truncated: expected {expected} bytes, received {received}")]
    TruncatedBody { expected: usize, received: usize },

    #[error("Malformed JSON: {0}")]
    MalformedJson(#[from] serde_json::Error),

    #[error("Request body must be a JSON object")]
    NotAnObject,

    #[error("Field 'image' must be a string")]
    ImageNotString,

    #[error("Invalid base64 image data: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    #[error("Failed to decode image: {0}")]
    UndecodableImage(#[source] BgRemovalError),

    #[error("{0}")]
    Removal(#[source] BgRemovalError),

    #[error("Failed to encode PNG: {0}")]
    Encode(#[source] BgRemovalError),

    #[error("Worker failed: {0}")]
    Worker(String),
}

impl HandlerError {
    /// HTTP status for this failure
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingImage => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Render the failure as a JSON error response
    #[must_use]
    pub fn to_response(&self) -> HandlerResponse {
        let status = self.status_code();
        if status.is_server_error() {
            warn!(status = status.as_u16(), error = %self, "Request failed");
        } else {
            debug!(status = status.as_u16(), error = %self, "Request rejected");
        }
        HandlerResponse::json(status, &ErrorBody::new(self.to_string()))
    }
}

/// Complete response produced by the handler
#[derive(Debug, Clone)]
pub struct HandlerResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl HandlerResponse {
    /// JSON body with the CORS origin header
    pub fn json<T: Serialize>(status: StatusCode, body: &T) -> Self {
        let (status, body) = match serde_json::to_vec(body) {
            Ok(body) => (status, body),
            Err(e) => {
                warn!(error = %e, "Failed to serialize response body");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    br#"{"error":"Failed to serialize response"}"#.to_vec(),
                )
            },
        };

        let mut headers = cors_headers();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        Self {
            status,
            headers,
            body,
        }
    }

    /// CORS preflight answer with an empty body
    #[must_use]
    pub fn preflight() -> Self {
        let mut headers = cors_headers();
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(CORS_ALLOW_METHODS),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(CORS_ALLOW_HEADERS),
        );
        Self {
            status: StatusCode::OK,
            headers,
            body: Vec::new(),
        }
    }

    /// Body parsed as JSON, for inspection in tests and clients
    pub fn json_body(&self) -> serde_json::Result<Value> {
        serde_json::from_slice(&self.body)
    }
}

impl IntoResponse for HandlerResponse {
    fn into_response(self) -> Response {
        (self.status, self.headers, Body::from(self.body)).into_response()
    }
}

impl From<HandlerError> for HandlerResponse {
    fn from(error: HandlerError) -> Self {
        error.to_response()
    }
}

/// Headers every response carries, written here rather than by a router
/// layer so the handler's responses are complete on their own
fn cors_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static(CORS_ALLOW_ORIGIN),
    );
    headers
}

/// Stateless handler over an injected remover and codec
#[derive(Clone)]
pub struct RequestHandler {
    remover: Arc<dyn BackgroundRemover>,
    codec: Arc<dyn ImageCodec>,
}

impl RequestHandler {
    pub fn new(remover: Arc<dyn BackgroundRemover>, codec: Arc<dyn ImageCodec>) -> Self {
        Self { remover, codec }
    }

    /// Answer a POST carrying `{"image": "<base64 or data URL>"}`
    ///
    /// Exactly `Content-Length` bytes of `body` are read; anything past them
    /// is ignored. Never panics on bad input: every failure becomes a JSON
    /// error response.
    pub fn handle_post(
        &self,
        content_length: Option<&HeaderValue>,
        body: &[u8],
    ) -> HandlerResponse {
        match self.process(content_length, body) {
            Ok(success) => HandlerResponse::json(StatusCode::OK, &success),
            Err(error) => error.to_response(),
        }
    }

    /// Answer a CORS preflight; the request body is irrelevant
    #[must_use]
    pub fn handle_options(&self) -> HandlerResponse {
        HandlerResponse::preflight()
    }

    fn process(
        &self,
        content_length: Option<&HeaderValue>,
        body: &[u8],
    ) -> Result<SuccessBody, HandlerError> {
        let start = Instant::now();

        let body = read_declared_body(content_length, body)?;
        let image_field = extract_image_field(body)?;

        let bytes = decode_base64_payload(strip_data_url_prefix(&image_field))?;
        let image = self
            .codec
            .decode(&bytes)
            .map_err(HandlerError::UndecodableImage)?;
        let (width, height) = image.dimensions();

        let result = self
            .remover
            .remove_background(&image)
            .map_err(HandlerError::Removal)?;

        let png = self
            .codec
            .encode_png(&result)
            .map_err(HandlerError::Encode)?;

        info!(
            width,
            height,
            input_bytes = bytes.len(),
            output_bytes = png.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Background removed"
        );
        Ok(SuccessBody::from_png(&png))
    }
}

impl std::fmt::Debug for RequestHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestHandler").finish_non_exhaustive()
    }
}

/// Slice the body down to the declared `Content-Length`
fn read_declared_body<'a>(
    content_length: Option<&HeaderValue>,
    body: &'a [u8],
) -> Result<&'a [u8], HandlerError> {
    let raw = content_length.ok_or(HandlerError::MissingContentLength)?;
    let declared = raw
        .to_str()
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
        .ok_or_else(|| {
            HandlerError::InvalidContentLength(String::from_utf8_lossy(raw.as_bytes()).into_owned())
        })?;

    body.get(..declared).ok_or(HandlerError::TruncatedBody {
        expected: declared,
        received: body.len(),
    })
}

/// Pull a non-empty `image` string out of the JSON body
fn extract_image_field(body: &[u8]) -> Result<String, HandlerError> {
    let value: Value = serde_json::from_slice(body)?;
    let Value::Object(mut object) = value else {
        return Err(HandlerError::NotAnObject);
    };

    match object.remove("image") {
        Some(Value::String(image)) if !image.is_empty() => Ok(image),
        Some(value) if !is_empty_value(&value) => Err(HandlerError::ImageNotString),
        _ => Err(HandlerError::MissingImage),
    }
}

/// `null`, `false`, zero, `""`, `[]` and `{}` all count as no image
fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(flag) => !flag,
        Value::Number(number) => number.as_f64() == Some(0.0),
        Value::String(text) => text.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(fields) => fields.is_empty(),
    }
}
