//! Identity types for Inkwell documents
//!
//! Documents are keyed internally by an auto-incremented integer. That key
//! never leaves the process: every entity is exposed through an opaque
//! `code` produced by [`IdCodec`], a keyed bijection over the integer key.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::CodecError;

/// Internal document key assigned by the store (starts at 1).
pub type DocId = i64;

/// A stored document: a JSON object keyed by field name.
pub type Document = Map<String, Value>;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Field holding the internal key on every stored document.
pub const ID_FIELD: &str = "_id";

/// Read the internal key of a document, if present.
pub fn doc_id(doc: &Document) -> Option<DocId> {
    doc.get(ID_FIELD).and_then(Value::as_i64)
}

/// Reversible, obfuscated encoder for internal document keys.
///
/// Each collection gets its own codec (derived from a process salt and the
/// collection name), so the same internal key yields different codes in
/// different collections. The mapping is a permutation of `u64`, which makes
/// codes collision-free within a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdCodec {
    namespace: String,
    mask_in: u64,
    mask_out: u64,
    multiplier: u64,
    inverse: u64,
    rotation: u32,
}

impl IdCodec {
    /// Derive a codec for `namespace` from the process-wide `salt`.
    pub fn new(salt: &str, namespace: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(salt.as_bytes());
        hasher.update(b":");
        hasher.update(namespace.as_bytes());
        let digest = hasher.finalize();

        let word = |offset: usize| {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&digest[offset..offset + 8]);
            u64::from_be_bytes(bytes)
        };

        let multiplier = word(16) | 1;
        Self {
            namespace: namespace.to_string(),
            mask_in: word(0),
            mask_out: word(8),
            multiplier,
            inverse: modular_inverse(multiplier),
            rotation: u32::from(digest[24] % 63) + 1,
        }
    }

    /// Namespace this codec was derived for.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Encode an internal key as an opaque code.
    pub fn encode(&self, id: DocId) -> String {
        let mixed = ((id as u64) ^ self.mask_in)
            .wrapping_mul(self.multiplier)
            .rotate_left(self.rotation)
            ^ self.mask_out;
        URL_SAFE_NO_PAD.encode(mixed.to_be_bytes())
    }

    /// Decode an opaque code back to the internal key.
    pub fn decode(&self, code: &str) -> Result<DocId, CodecError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(code.trim())
            .map_err(|_| CodecError::Malformed(code.to_string()))?;
        let bytes: [u8; 8] = bytes
            .try_into()
            .map_err(|_| CodecError::Malformed(code.to_string()))?;

        let raw = ((u64::from_be_bytes(bytes) ^ self.mask_out).rotate_right(self.rotation))
            .wrapping_mul(self.inverse)
            ^ self.mask_in;

        match i64::try_from(raw) {
            Ok(id) if id > 0 => Ok(id),
            _ => Err(CodecError::OutOfRange(code.to_string())),
        }
    }
}

/// Inverse of an odd number modulo 2^64 (Newton iteration).
fn modular_inverse(odd: u64) -> u64 {
    let mut inverse = odd;
    for _ in 0..5 {
        inverse = inverse.wrapping_mul(2u64.wrapping_sub(odd.wrapping_mul(inverse)));
    }
    inverse
}
