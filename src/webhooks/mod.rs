//! Webhook ingress support.
//!
//! Provides HMAC-SHA256 signature verification for incoming note events.

pub mod signature;

pub use signature::{
    SIGNATURE_HEADER, compute_signature, format_signature_header, parse_signature_header,
    sign_payload, verify_signature,
};
