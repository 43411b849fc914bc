//! Deterministic fixtures for tests and examples.
//!
//! Everything here derives from seeds so vectors are reproducible across
//! runs and crates.

use crate::codec::{encode_base32, ISCC_PREFIX};
use crate::crypto::{blake3_multihash, Keypair};
use crate::error::CoreError;
use crate::note::{IsccNote, NoteBuilder};

/// Client timestamp used by fixture notes (millisecond precision).
pub const TEST_TIMESTAMP: &str = "2025-08-04T12:34:56.789Z";

/// [`TEST_TIMESTAMP`] as microseconds since the UNIX epoch.
pub const TEST_NOW_MICROS: u64 = 1_754_310_896_789_000;

/// Build a SUM composite ISCC-CODE (Data + Instance, 64-bit units) whose
/// Instance-Code digest matches the leading bytes of `content_hash`.
pub fn sum_iscc_code(content_hash: &[u8; 32]) -> String {
    let data_digest = blake3::hash(content_hash);
    let mut raw = vec![0x55, 0x00];
    raw.extend_from_slice(&data_digest.as_bytes()[..8]);
    raw.extend_from_slice(&content_hash[..8]);
    format!("{}{}", ISCC_PREFIX, encode_base32(&raw))
}

/// A 256-bit ISCC-UNIT of the given maintype with a deterministic digest.
pub fn unit_code(maintype: u8, seed: u64) -> String {
    let digest = blake3::hash(&seed.to_be_bytes());
    let mut raw = vec![maintype << 4, 0x07];
    raw.extend_from_slice(digest.as_bytes());
    format!("{}{}", ISCC_PREFIX, encode_base32(&raw))
}

/// Deterministic nonce addressed to `server_id`, unique per `n`.
pub fn nonce_for(server_id: u16, n: u64) -> String {
    let filler = blake3::hash(&n.to_le_bytes());
    let mut bytes = [0u8; 16];
    bytes[..].copy_from_slice(&filler.as_bytes()[..16]);
    bytes[0] = (server_id >> 4) as u8;
    bytes[1] = (((server_id & 0x0f) as u8) << 4) | (bytes[1] & 0x0f);
    hex::encode(bytes)
}

/// Content bytes for fixture `n`.
pub fn content_for(n: u64) -> Vec<u8> {
    format!("Hello World #{n}!").into_bytes()
}

/// A builder pre-filled with consistent code, hash, nonce, and timestamp.
pub fn note_builder(_keypair: &Keypair, server_id: u16, n: u64) -> NoteBuilder {
    let content = content_for(n);
    let content_hash = *blake3::hash(&content).as_bytes();
    NoteBuilder::new(
        sum_iscc_code(&content_hash),
        blake3_multihash(&content),
        nonce_for(server_id, n),
        TEST_TIMESTAMP,
    )
}

/// A minimal signed note addressed to `server_id`, unique per `n`.
pub fn signed_note(keypair: &Keypair, server_id: u16, n: u64) -> Result<IsccNote, CoreError> {
    note_builder(keypair, server_id, n).sign(keypair)
}
