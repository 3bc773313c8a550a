use crate::foundation::error::PayloadError;
use crate::foundation::math::base64_len;

/// Prefix marking a data-URL payload.
pub(crate) const DATA_URL_PREFIX: &str = "data:image/";

/// Longest accepted payload, in characters.
pub const MAX_PAYLOAD_LEN: usize = 1_000_000;

/// Size in bytes of the smallest well-formed PNG file.
const SMALLEST_PNG_BYTES: usize = 67;

/// Shortest accepted base64 body (92 characters).
///
/// Tiles decode as PNG only (see [`crate::decode_bitmap`]), so no valid tile is shorter.
pub const MIN_PAYLOAD_LEN: usize = base64_len(SMALLEST_PNG_BYTES);

/// Length limits applied before any decode work.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PayloadLimits {
    /// Minimum base64 body length (after any data-URL header).
    pub min_len: usize,
    /// Maximum total payload length.
    pub max_len: usize,
}

impl Default for PayloadLimits {
    fn default() -> Self {
        Self {
            min_len: MIN_PAYLOAD_LEN,
            max_len: MAX_PAYLOAD_LEN,
        }
    }
}

/// Cheap synchronous screening shared by every render path and the loader.
///
/// Returns the base64 body on success. Does not inspect the base64 alphabet.
pub fn screen(payload: &str, limits: PayloadLimits) -> Result<&str, PayloadError> {
    if payload.is_empty() {
        return Err(PayloadError::EmptyPayload);
    }
    if payload.len() > limits.max_len {
        return Err(PayloadError::PayloadTooLarge {
            len: payload.len(),
            max: limits.max_len,
        });
    }
    let body = base64_body(payload)?;
    if body.len() < limits.min_len {
        return Err(PayloadError::TooShort {
            len: body.len(),
            min: limits.min_len,
        });
    }
    Ok(body)
}

/// Strip a `data:image/<fmt>;base64,` header if present.
pub(crate) fn base64_body(payload: &str) -> Result<&str, PayloadError> {
    if !payload.starts_with(DATA_URL_PREFIX) {
        return Ok(payload);
    }
    let Some((header, body)) = payload.split_once(',') else {
        return Err(PayloadError::MalformedDataUrl("missing ',' separator"));
    };
    if body.contains(',') {
        return Err(PayloadError::MalformedDataUrl("more than one ',' separator"));
    }
    if !header.ends_with(";base64") {
        return Err(PayloadError::MalformedDataUrl("header is not ';base64'"));
    }
    if body.is_empty() {
        return Err(PayloadError::MalformedDataUrl("empty base64 segment"));
    }
    Ok(body)
}

/// Standard padded alphabet and length-multiple-of-4 check.
pub(crate) fn check_base64_alphabet(body: &str) -> Result<(), PayloadError> {
    if !body.len().is_multiple_of(4) {
        return Err(PayloadError::InvalidBase64(format!(
            "length {} is not a multiple of 4",
            body.len()
        )));
    }
    if let Some(pos) = body
        .bytes()
        .position(|b| !(b.is_ascii_alphanumeric() || b == b'+' || b == b'/' || b == b'='))
    {
        return Err(PayloadError::InvalidBase64(format!(
            "invalid character at position {pos}"
        )));
    }
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/assets/payload.rs"]
mod tests;
