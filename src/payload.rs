//! Request and response bodies, data URLs and base64 helpers

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

/// Prefix of every image returned by the endpoint
pub const PNG_DATA_URL_PREFIX: &str = "data:image/png;base64,";

/// Body accepted by the removal endpoint
///
/// `image` is either raw base64 or a `data:<mime>;base64,<payload>` URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveBackgroundRequest {
    #[serde(default)]
    pub image: Option<String>,
}

/// Body of a successful removal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessBody {
    pub success: bool,
    pub image: String,
}

impl SuccessBody {
    /// Wrap PNG bytes in a success body
    #[must_use]
    pub fn from_png(png: &[u8]) -> Self {
        Self {
            success: true,
            image: png_data_url(png),
        }
    }
}

/// Body of every failed request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new<S: Into<String>>(error: S) -> Self {
        Self {
            error: error.into(),
        }
    }
}

/// Drop everything up to and including the first comma
///
/// Strings without a comma are returned unchanged.
#[must_use]
pub fn strip_data_url_prefix(image: &str) -> &str {
    image.split_once(',').map_or(image, |(_, payload)| payload)
}

/// Decode a standard-alphabet, padded base64 payload
///
/// ASCII whitespace (line breaks from wrapped encoders) is ignored.
pub fn decode_base64_payload(payload: &str) -> Result<Vec<u8>, base64::DecodeError> {
    if payload.bytes().any(|b| b.is_ascii_whitespace()) {
        let compact: Vec<u8> = payload
            .bytes()
            .filter(|b| !b.is_ascii_whitespace())
            .collect();
        STANDARD.decode(compact)
    } else {
        STANDARD.decode(payload)
    }
}

/// Encode PNG bytes as `data:image/png;base64,<payload>`
#[must_use]
pub fn png_data_url(png: &[u8]) -> String {
    let mut url = String::with_capacity(PNG_DATA_URL_PREFIX.len() + png.len().div_ceil(3) * 4);
    url.push_str(PNG_DATA_URL_PREFIX);
    STANDARD.encode_string(png, &mut url);
    url
}
