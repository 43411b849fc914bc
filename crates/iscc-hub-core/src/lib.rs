//! # ISCC Hub Core
//!
//! Pure primitives for the ISCC Hub: the ISCC-ID codec, note validation,
//! deterministic canonicalization, and receipt construction.
//!
//! This crate contains no I/O, no storage, no networking. It is pure
//! computation over cryptographic data structures.
//!
//! ## Key Types
//!
//! - [`IsccId`] - 64-bit identifier: 52-bit microsecond timestamp + 12-bit server-id
//! - [`IsccNote`] - A client-signed content declaration
//! - [`IsccReceipt`] - The hub-signed Verifiable Credential binding a note to its ISCC-ID
//! - [`Keypair`] / [`Ed25519PublicKey`] - Ed25519 identities
//!
//! ## Canonicalization
//!
//! Signing inputs use deterministic JSON (sorted keys, minimal escapes).
//! See [`canonical`].

pub mod canonical;
pub mod codec;
pub mod crypto;
pub mod error;
pub mod gateway;
pub mod note;
pub mod receipt;
pub mod testkit;
pub mod validate;

pub use canonical::canonical_json;
pub use codec::{parse_iscc_code, validate_iscc_unit, IsccCodeInfo, IsccId, MainType};
pub use crypto::{blake3_multihash, Blake3Hash, Ed25519PublicKey, Ed25519Signature, Keypair};
pub use error::{CoreError, ValidationError};
pub use note::{IsccNote, NoteBuilder, SignatureRecord, SIGNATURE_VERSION};
pub use receipt::{IsccReceipt, ReceiptSigner};
pub use validate::{validate_note, ValidationContext};

/// Maximum serialized note size in bytes.
pub const MAX_NOTE_BYTES: usize = 8192;

/// Maximum length of any string field in a note.
pub const MAX_FIELD_LEN: usize = 2048;

/// Maximum number of entries in the optional `units` array.
pub const MAX_UNITS: usize = 4;
