//! IsccNote: a client-signed content declaration.
//!
//! The schema is closed. Unknown fields are rejected at deserialization so
//! that the canonical form always covers exactly what the client signed.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::canonical::{canonical_json, signing_input};
use crate::crypto::{Ed25519PublicKey, Ed25519Signature, Keypair};
use crate::error::{CoreError, ValidationError};

/// The pinned signature scheme version.
pub const SIGNATURE_VERSION: &str = "ISCC-SIG v1.0";

/// Ed25519 signature record attached to a note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignatureRecord {
    /// Signature scheme version. Must equal [`SIGNATURE_VERSION`].
    pub version: String,
    /// Optional DID of the keyholder (e.g. `did:web:example.com`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub controller: Option<String>,
    /// Optional key identifier within the controller document.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyid: Option<String>,
    /// Ed25519 public key, lowercase hex.
    pub pubkey: String,
    /// Ed25519 signature over the canonical note sans this field, lowercase hex.
    pub proof: String,
}

/// A content declaration as submitted by a keyholder.
///
/// Immutable once received; the hub stores the canonical form verbatim so
/// receipts and audits reproduce the exact signed bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IsccNote {
    /// Composite ISCC-CODE of the declared content.
    pub iscc_code: String,
    /// Blake3 multihash of the content (`1e20` + 64 hex chars).
    pub datahash: String,
    /// 128-bit hex nonce; the first 12 bits address the target hub.
    pub nonce: String,
    /// Client-side RFC 3339 UTC timestamp with millisecond precision.
    pub timestamp: String,
    /// Optional gateway URL or RFC 6570 template for metadata discovery.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
    /// Optional ISCC-UNITs backing the composite code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub units: Option<Vec<String>>,
    /// Optional Blake3 multihash of seed metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metahash: Option<String>,
    /// The keyholder's signature record.
    pub signature: SignatureRecord,
}

impl IsccNote {
    /// Parse a note from JSON bytes, rejecting unknown fields.
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, ValidationError> {
        serde_json::from_slice(bytes)
            .map_err(|e| ValidationError::malformed("note", e.to_string()))
    }

    /// The note as a JSON value.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Canonical bytes of the full note (including proof).
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, CoreError> {
        canonical_json(&self.to_value())
    }

    /// The message covered by `signature.proof`.
    pub fn signing_input(&self) -> Result<Vec<u8>, CoreError> {
        signing_input(&self.to_value())
    }

    /// Decoded public key from the signature record.
    pub fn pubkey(&self) -> Result<Ed25519PublicKey, CoreError> {
        Ed25519PublicKey::from_hex(&self.signature.pubkey)
    }

    /// Decoded nonce bytes (16 bytes).
    pub fn nonce_bytes(&self) -> Result<[u8; 16], CoreError> {
        let bytes = hex::decode(&self.nonce)
            .map_err(|_| CoreError::Canonical("nonce is not hex".into()))?;
        bytes
            .try_into()
            .map_err(|_| CoreError::Canonical("nonce is not 16 bytes".into()))
    }

    /// Server-id addressed by the first 12 bits of the nonce.
    pub fn nonce_server_id(&self) -> Result<u16, CoreError> {
        let bytes = self.nonce_bytes()?;
        Ok((u16::from(bytes[0]) << 4) | (u16::from(bytes[1]) >> 4))
    }

    /// DID of the declaring subject: the controller when present, else
    /// `did:key:` over the raw public key.
    pub fn subject_did(&self) -> String {
        match &self.signature.controller {
            Some(controller) => controller.clone(),
            None => format!("did:key:{}", self.signature.pubkey),
        }
    }

    /// Verify `signature.proof` over the canonical signing input.
    pub fn verify_signature(&self) -> Result<(), ValidationError> {
        let pubkey = self.pubkey().map_err(|_| ValidationError::BadSignature)?;
        let proof = Ed25519Signature::from_hex(&self.signature.proof)
            .map_err(|_| ValidationError::BadSignature)?;
        let message = self
            .signing_input()
            .map_err(|_| ValidationError::BadSignature)?;
        pubkey
            .verify(&message, &proof)
            .map_err(|_| ValidationError::BadSignature)
    }
}

/// Builder that assembles and signs a note on the client side.
///
/// Used by tests and tooling; the hub itself only ever verifies.
pub struct NoteBuilder {
    iscc_code: String,
    datahash: String,
    nonce: String,
    timestamp: String,
    gateway: Option<String>,
    units: Option<Vec<String>>,
    metahash: Option<String>,
    controller: Option<String>,
    keyid: Option<String>,
}

impl NoteBuilder {
    /// Start building a note from the required content fields.
    pub fn new(
        iscc_code: impl Into<String>,
        datahash: impl Into<String>,
        nonce: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            iscc_code: iscc_code.into(),
            datahash: datahash.into(),
            nonce: nonce.into(),
            timestamp: timestamp.into(),
            gateway: None,
            units: None,
            metahash: None,
            controller: None,
            keyid: None,
        }
    }

    /// Set the gateway URL or template.
    pub fn gateway(mut self, gateway: impl Into<String>) -> Self {
        self.gateway = Some(gateway.into());
        self
    }

    /// Set the ISCC-UNITs.
    pub fn units(mut self, units: Vec<String>) -> Self {
        self.units = Some(units);
        self
    }

    /// Set the metahash.
    pub fn metahash(mut self, metahash: impl Into<String>) -> Self {
        self.metahash = Some(metahash.into());
        self
    }

    /// Set the signature controller DID.
    pub fn controller(mut self, controller: impl Into<String>) -> Self {
        self.controller = Some(controller.into());
        self
    }

    /// Set the signature key id.
    pub fn keyid(mut self, keyid: impl Into<String>) -> Self {
        self.keyid = Some(keyid.into());
        self
    }

    /// Sign with the keypair and produce the finished note.
    ///
    /// The proof covers the canonical note with the signature record
    /// present but its `proof` field absent.
    pub fn sign(self, keypair: &Keypair) -> Result<IsccNote, CoreError> {
        let mut note = IsccNote {
            iscc_code: self.iscc_code,
            datahash: self.datahash,
            nonce: self.nonce,
            timestamp: self.timestamp,
            gateway: self.gateway,
            units: self.units,
            metahash: self.metahash,
            signature: SignatureRecord {
                version: SIGNATURE_VERSION.to_string(),
                controller: self.controller,
                keyid: self.keyid,
                pubkey: keypair.public_key().to_hex(),
                proof: String::new(),
            },
        };
        let message = note.signing_input()?;
        note.signature.proof = keypair.sign(&message).to_hex();
        Ok(note)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit;

    #[test]
    fn build_sign_verify() {
        let keypair = Keypair::from_seed(&[0x42; 32]);
        let note = testkit::signed_note(&keypair, 1, 1).unwrap();

        assert_eq!(note.signature.version, SIGNATURE_VERSION);
        note.verify_signature().unwrap();
    }

    #[test]
    fn altered_byte_breaks_verification() {
        let keypair = Keypair::from_seed(&[0x42; 32]);
        let mut note = testkit::signed_note(&keypair, 1, 1).unwrap();
        note.datahash = note.datahash.replace('0', "1");
        assert!(note.verify_signature().is_err());
    }

    #[test]
    fn foreign_proof_breaks_verification() {
        let keypair = Keypair::from_seed(&[0x42; 32]);
        let other = Keypair::from_seed(&[0x43; 32]);
        let mut note = testkit::signed_note(&keypair, 1, 1).unwrap();

        let message = note.signing_input().unwrap();
        note.signature.proof = other.sign(&message).to_hex();
        assert!(note.verify_signature().is_err());
    }

    #[test]
    fn json_roundtrip_preserves_canonical_bytes() {
        let keypair = Keypair::from_seed(&[0x01; 32]);
        let note = testkit::signed_note(&keypair, 7, 3).unwrap();

        let bytes = note.canonical_bytes().unwrap();
        let reparsed = IsccNote::from_json_bytes(&bytes).unwrap();
        assert_eq!(reparsed.canonical_bytes().unwrap(), bytes);
        reparsed.verify_signature().unwrap();
    }

    #[test]
    fn unknown_fields_rejected() {
        let raw = br#"{"iscc_code":"x","datahash":"y","nonce":"z","timestamp":"t",
            "extra":"nope","signature":{"version":"v","pubkey":"p","proof":"q"}}"#;
        assert!(IsccNote::from_json_bytes(raw).is_err());
    }

    #[test]
    fn missing_required_field_rejected() {
        let raw = br#"{"iscc_code":"x","nonce":"z","timestamp":"t",
            "signature":{"version":"v","pubkey":"p","proof":"q"}}"#;
        assert!(IsccNote::from_json_bytes(raw).is_err());
    }

    #[test]
    fn subject_did_prefers_controller() {
        let keypair = Keypair::from_seed(&[0x09; 32]);
        let note = testkit::note_builder(&keypair, 1, 1)
            .controller("did:web:example.com")
            .sign(&keypair)
            .unwrap();
        assert_eq!(note.subject_did(), "did:web:example.com");

        let bare = testkit::signed_note(&keypair, 1, 2).unwrap();
        assert_eq!(
            bare.subject_did(),
            format!("did:key:{}", keypair.public_key().to_hex())
        );
    }

    #[test]
    fn nonce_server_id_extraction() {
        let keypair = Keypair::from_seed(&[0x05; 32]);
        let note = testkit::signed_note(&keypair, 0xfff, 1).unwrap();
        assert_eq!(note.nonce_server_id().unwrap(), 0xfff);
    }
}
