//! Key material encoding between the backend wire format and raw bytes.
//!
//! The backend speaks URL-safe base64: standard base64 with `+` replaced by
//! `-` and `/` replaced by `_`. Padding is left as produced by the standard
//! alphabet when encoding. Decoding accepts keys with or without `=`
//! padding, since the server key endpoint has been seen to emit both.

use base64::{
    alphabet,
    engine::{general_purpose::STANDARD as BASE64, DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine,
};

use crate::error::{PushError, PushResult};

/// Standard alphabet, indifferent to trailing padding.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Decode a URL-safe base64 string (e.g. the server public key) into bytes.
pub fn decode_url_safe_base64(s: &str) -> PushResult<Vec<u8>> {
    let standard = s.trim().replace('-', "+").replace('_', "/");
    LENIENT_BASE64
        .decode(standard)
        .map_err(|e| PushError::MalformedResponse(format!("invalid base64url key: {e}")))
}

/// Encode raw key material for transmission.
///
/// Used for both the `p256dh` and `auth` subscription keys.
pub fn encode_url_safe_base64(bytes: &[u8]) -> String {
    BASE64.encode(bytes).replace('+', "-").replace('/', "_")
}
