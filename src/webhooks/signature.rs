//! Webhook signature verification using HMAC-SHA256.
//!
//! Senders sign the raw request body with the shared secret and pass the
//! result in the `X-Notesync-Signature-256` header as `sha256=<hex>`. The
//! signature is checked before the body is parsed or anything is spooled.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Name of the header carrying the body signature.
pub const SIGNATURE_HEADER: &str = "x-notesync-signature-256";

const SIGNATURE_PREFIX: &str = "sha256=";

/// Parses a signature header (`sha256=<hex>`) into raw bytes.
///
/// Returns `None` for a missing prefix or invalid hex. Never panics.
///
/// ```
/// use notesync::webhooks::parse_signature_header;
///
/// assert_eq!(parse_signature_header("sha256=0aff"), Some(vec![0x0a, 0xff]));
/// assert!(parse_signature_header("0aff").is_none());
/// assert!(parse_signature_header("sha1=0aff").is_none());
/// assert!(parse_signature_header("sha256=xyz").is_none());
/// ```
pub fn parse_signature_header(header: &str) -> Option<Vec<u8>> {
    hex::decode(header.strip_prefix(SIGNATURE_PREFIX)?).ok()
}

/// Computes the HMAC-SHA256 of `payload` under `secret`.
pub fn compute_signature(payload: &[u8], secret: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}

/// Formats a signature as a header value: `sha256=<hex>`.
pub fn format_signature_header(signature: &[u8]) -> String {
    format!("{SIGNATURE_PREFIX}{}", hex::encode(signature))
}

/// The header value a sender should attach to `payload`.
///
/// ```
/// use notesync::webhooks::{sign_payload, verify_signature};
///
/// let body = br#"{"data": "hello", "path": "inbox.md"}"#;
/// let header = sign_payload(body, b"shared-secret");
///
/// assert!(verify_signature(body, &header, b"shared-secret"));
/// assert!(!verify_signature(body, &header, b"other-secret"));
/// ```
pub fn sign_payload(payload: &[u8], secret: &[u8]) -> String {
    format_signature_header(&compute_signature(payload, secret))
}

/// Checks `signature_header` against `payload` and `secret`.
///
/// The comparison is constant-time. Malformed headers verify as `false`.
pub fn verify_signature(payload: &[u8], signature_header: &str, secret: &[u8]) -> bool {
    let Some(expected) = parse_signature_header(signature_header) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(payload);

    mac.verify_slice(&expected).is_ok()
}
