//! Dedup fingerprints: one over the raw upload, one over its text content.

use sha2::{Digest, Sha256};
use std::fmt::Write;

fn hex_sha256(data: &[u8]) -> String {
    Sha256::digest(data)
        .iter()
        .fold(String::with_capacity(64), |mut out, b| {
            let _ = write!(out, "{b:02x}");
            out
        })
}

/// Digest of the uploaded bytes exactly as received.
pub fn file_digest(bytes: &[u8]) -> String {
    hex_sha256(bytes)
}

/// Collapses every whitespace run to one space and trims the ends, so line
/// ending and layout differences do not change the digest.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Digest of the whitespace-normalized extracted text.
pub fn text_digest(text: &str) -> String {
    hex_sha256(normalize_whitespace(text).as_bytes())
}
