use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-line-signature";

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing X-Line-Signature header")]
    Missing,
    #[error("X-Line-Signature is not valid base64")]
    Malformed,
    #[error("X-Line-Signature does not match the request body")]
    Mismatch,
    #[error("channel secret is empty")]
    EmptySecret,
}

/// Base64 HMAC-SHA256 of `body` keyed with the channel secret.
pub fn sign(channel_secret: &[u8], body: &[u8]) -> Result<String, SignatureError> {
    let mut mac = mac_for(channel_secret)?;
    mac.update(body);
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Checks the raw request body against the header value in constant time.
pub fn verify_signature(
    channel_secret: &[u8],
    body: &[u8],
    header: Option<&str>,
) -> Result<(), SignatureError> {
    let header = header.map(str::trim).filter(|value| !value.is_empty());
    let Some(header) = header else {
        return Err(SignatureError::Missing);
    };
    let expected = STANDARD.decode(header).map_err(|_| SignatureError::Malformed)?;

    let mut mac = mac_for(channel_secret)?;
    mac.update(body);
    mac.verify_slice(&expected).map_err(|_| SignatureError::Mismatch)
}

fn mac_for(channel_secret: &[u8]) -> Result<HmacSha256, SignatureError> {
    if channel_secret.is_empty() {
        return Err(SignatureError::EmptySecret);
    }
    HmacSha256::new_from_slice(channel_secret).map_err(|_| SignatureError::EmptySecret)
}
