//! IsccReceipt: the hub-signed Verifiable Credential for a sequenced
//! declaration.
//!
//! A receipt is a pure function of committed event state. Rebuilding it
//! from the same event yields byte-identical canonical form, so auditors
//! can re-derive and verify the signing input at any time.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::canonical::canonical_json;
use crate::codec::{format_micros_iso, IsccId};
use crate::crypto::{Ed25519PublicKey, Ed25519Signature, Keypair};
use crate::error::CoreError;
use crate::note::IsccNote;

/// The W3C credentials context carried by every receipt.
pub const VC_CONTEXT: &str = "https://www.w3.org/ns/credentials/v2";

/// The proof cryptosuite: Ed25519 over canonical JSON.
pub const PROOF_CRYPTOSUITE: &str = "eddsa-jcs-2022";

/// Declaration data embedded in the credential subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclarationRecord {
    /// Gapless log sequence number.
    pub seq: u64,
    /// The minted ISCC-ID in canonical form.
    pub iscc_id: String,
    /// The note exactly as admitted.
    pub iscc_note: IsccNote,
}

/// The credential subject: who declared, and what was sequenced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialSubject {
    /// DID of the declaring keyholder.
    pub id: String,
    /// The sequenced declaration.
    pub declaration: DeclarationRecord,
}

/// Data-integrity proof by the hub key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptProof {
    #[serde(rename = "type")]
    pub proof_type: String,
    pub cryptosuite: String,
    /// Proof creation time; equals the event's hub timestamp.
    pub created: String,
    #[serde(rename = "verificationMethod")]
    pub verification_method: String,
    #[serde(rename = "proofPurpose")]
    pub proof_purpose: String,
    /// Ed25519 signature over the canonical credential sans proof, hex.
    #[serde(rename = "proofValue")]
    pub proof_value: String,
}

/// A signed IsccReceipt (W3C Verifiable Credential shape).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IsccReceipt {
    #[serde(rename = "@context")]
    pub context: Vec<String>,
    #[serde(rename = "type")]
    pub types: Vec<String>,
    /// The hub's DID (`did:web:{domain}`).
    pub issuer: String,
    /// Hub sequencing time, RFC 3339 with microsecond precision.
    #[serde(rename = "issuanceDate")]
    pub issuance_date: String,
    #[serde(rename = "credentialSubject")]
    pub credential_subject: CredentialSubject,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof: Option<ReceiptProof>,
}

impl IsccReceipt {
    /// Canonical bytes of the credential with the proof removed.
    pub fn signing_input(&self) -> Result<Vec<u8>, CoreError> {
        let mut value = serde_json::to_value(self)
            .map_err(|e| CoreError::Canonical(e.to_string()))?;
        if let Some(map) = value.as_object_mut() {
            map.remove("proof");
        }
        canonical_json(&value)
    }

    /// Canonical bytes of the full signed credential.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, CoreError> {
        let value: Value = serde_json::to_value(self)
            .map_err(|e| CoreError::Canonical(e.to_string()))?;
        canonical_json(&value)
    }

    /// Verify the proof under the hub's public key.
    pub fn verify(&self, hub_key: &Ed25519PublicKey) -> Result<(), CoreError> {
        let proof = self.proof.as_ref().ok_or(CoreError::InvalidSignature)?;
        let signature = Ed25519Signature::from_hex(&proof.proof_value)?;
        let message = self.signing_input()?;
        hub_key.verify(&message, &signature)
    }
}

/// Issues receipts under the hub's identity.
pub struct ReceiptSigner {
    keypair: Keypair,
    issuer_did: String,
}

impl ReceiptSigner {
    /// Create a signer for `did:web:{domain}`.
    pub fn new(keypair: Keypair, domain: &str) -> Self {
        Self {
            issuer_did: format!("did:web:{domain}"),
            keypair,
        }
    }

    /// The issuer DID used in receipts.
    pub fn issuer_did(&self) -> &str {
        &self.issuer_did
    }

    /// The hub verification key.
    pub fn public_key(&self) -> Ed25519PublicKey {
        self.keypair.public_key()
    }

    /// Build and sign the receipt for a committed event.
    pub fn issue(
        &self,
        seq: u64,
        iscc_id: IsccId,
        note: &IsccNote,
    ) -> Result<IsccReceipt, CoreError> {
        let issued_at = format_micros_iso(iscc_id.timestamp_micros());
        let mut receipt = IsccReceipt {
            context: vec![VC_CONTEXT.to_string()],
            types: vec!["VerifiableCredential".to_string(), "IsccReceipt".to_string()],
            issuer: self.issuer_did.clone(),
            issuance_date: issued_at.clone(),
            credential_subject: CredentialSubject {
                id: note.subject_did(),
                declaration: DeclarationRecord {
                    seq,
                    iscc_id: iscc_id.to_string(),
                    iscc_note: note.clone(),
                },
            },
            proof: None,
        };

        let message = receipt.signing_input()?;
        let signature = self.keypair.sign(&message);
        receipt.proof = Some(ReceiptProof {
            proof_type: "DataIntegrityProof".to_string(),
            cryptosuite: PROOF_CRYPTOSUITE.to_string(),
            created: issued_at,
            verification_method: format!("{}#key-0", self.issuer_did),
            proof_purpose: "assertionMethod".to_string(),
            proof_value: signature.to_hex(),
        });
        Ok(receipt)
    }
}
