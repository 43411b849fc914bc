//! Stateless note validation.
//!
//! Checks run in a fixed order and the first failure is returned. State
//! checks (nonce uniqueness, duplicates) live with the store; nothing here
//! touches I/O.

use chrono::{DateTime, Utc};

use crate::codec::{parse_iscc_code, validate_iscc_unit, IsccCodeInfo};
use crate::error::ValidationError;
use crate::gateway::validate_gateway;
use crate::note::{IsccNote, SIGNATURE_VERSION};
use crate::{MAX_FIELD_LEN, MAX_UNITS};

/// Hub-side parameters the checks run against.
#[derive(Debug, Clone)]
pub struct ValidationContext {
    /// This hub's server-id (0-4095).
    pub server_id: u16,
    /// Allowed clock skew in seconds (default 600).
    pub skew_secs: i64,
    /// The hub's current wall time.
    pub now: DateTime<Utc>,
}

/// Validate a parsed note against this hub.
///
/// Order: shape, formats, nonce prefix, clock skew, gateway, units,
/// datahash/Instance-Code match, signature.
pub fn validate_note(note: &IsccNote, ctx: &ValidationContext) -> Result<(), ValidationError> {
    validate_shape(note)?;
    let code_info = validate_formats(note)?;
    validate_nonce_prefix(note, ctx.server_id)?;
    validate_clock_skew(&note.timestamp, ctx)?;
    if let Some(gateway) = &note.gateway {
        validate_gateway(gateway)?;
    }
    if let Some(units) = &note.units {
        validate_units(units)?;
    }
    validate_datahash_match(&code_info, &note.datahash)?;
    validate_signature(note)?;
    Ok(())
}

fn validate_shape(note: &IsccNote) -> Result<(), ValidationError> {
    let required = [
        ("iscc_code", &note.iscc_code),
        ("datahash", &note.datahash),
        ("nonce", &note.nonce),
        ("timestamp", &note.timestamp),
        ("signature.version", &note.signature.version),
        ("signature.pubkey", &note.signature.pubkey),
        ("signature.proof", &note.signature.proof),
    ];
    for (name, value) in required {
        if value.trim().is_empty() {
            return Err(ValidationError::malformed(name, "must not be empty"));
        }
        if value.len() > MAX_FIELD_LEN {
            return Err(ValidationError::malformed(
                name,
                format!("exceeds maximum length of {MAX_FIELD_LEN}"),
            ));
        }
    }

    let optional = [
        ("gateway", note.gateway.as_ref()),
        ("metahash", note.metahash.as_ref()),
        ("signature.controller", note.signature.controller.as_ref()),
        ("signature.keyid", note.signature.keyid.as_ref()),
    ];
    for (name, value) in optional {
        if let Some(value) = value {
            if value.trim().is_empty() {
                return Err(ValidationError::malformed(name, "must not be empty"));
            }
            if value.len() > MAX_FIELD_LEN {
                return Err(ValidationError::malformed(
                    name,
                    format!("exceeds maximum length of {MAX_FIELD_LEN}"),
                ));
            }
        }
    }

    if let Some(units) = &note.units {
        if units.is_empty() {
            return Err(ValidationError::malformed("units", "must not be empty"));
        }
        if units.len() > MAX_UNITS {
            return Err(ValidationError::malformed(
                "units",
                format!("exceeds maximum of {MAX_UNITS} entries"),
            ));
        }
        for unit in units {
            if unit.trim().is_empty() {
                return Err(ValidationError::malformed("units", "must not be empty"));
            }
        }
    }
    Ok(())
}

fn validate_formats(note: &IsccNote) -> Result<IsccCodeInfo, ValidationError> {
    let code_info = parse_iscc_code(&note.iscc_code)
        .map_err(|e| ValidationError::malformed("iscc_code", e.to_string()))?;

    validate_multihash(&note.datahash, "datahash")?;
    if let Some(metahash) = &note.metahash {
        validate_multihash(metahash, "metahash")?;
    }

    validate_hex_exact(&note.nonce, "nonce", 32)?;
    parse_note_timestamp(&note.timestamp)?;

    Ok(code_info)
}

/// A Blake3 multihash field: `1e20` prefix + 64 lowercase hex chars.
fn validate_multihash(value: &str, field: &str) -> Result<(), ValidationError> {
    if !value.starts_with("1e20") {
        return Err(ValidationError::malformed(
            field,
            "must start with the Blake3 multihash prefix '1e20'",
        ));
    }
    validate_hex_exact(value, field, 68)
}

fn validate_hex_exact(value: &str, field: &str, len: usize) -> Result<(), ValidationError> {
    if value.len() != len {
        return Err(ValidationError::malformed(
            field,
            format!("must be exactly {len} characters"),
        ));
    }
    if value.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(ValidationError::malformed(field, "must be lowercase"));
    }
    if !value.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ValidationError::malformed(
            field,
            "must contain only hexadecimal characters",
        ));
    }
    Ok(())
}

/// RFC 3339 UTC with a `Z` suffix and exactly three fractional digits.
pub fn parse_note_timestamp(value: &str) -> Result<DateTime<Utc>, ValidationError> {
    if !value.ends_with('Z') {
        return Err(ValidationError::malformed(
            "timestamp",
            "must end with 'Z' to indicate UTC",
        ));
    }
    let fraction = value
        .split_once('.')
        .map(|(_, tail)| tail.trim_end_matches('Z'))
        .ok_or_else(|| {
            ValidationError::malformed("timestamp", "must include millisecond precision")
        })?;
    if fraction.len() != 3 || !fraction.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::malformed(
            "timestamp",
            "must have exactly 3 digits for milliseconds",
        ));
    }
    let parsed = DateTime::parse_from_rfc3339(value).map_err(|_| {
        ValidationError::malformed(
            "timestamp",
            "must be RFC 3339 formatted (e.g. '2025-08-04T12:34:56.789Z')",
        )
    })?;
    Ok(parsed.with_timezone(&Utc))
}

fn validate_nonce_prefix(note: &IsccNote, server_id: u16) -> Result<(), ValidationError> {
    let got = note
        .nonce_server_id()
        .map_err(|e| ValidationError::malformed("nonce", e.to_string()))?;
    if got != server_id {
        return Err(ValidationError::WrongHub {
            expected: server_id,
            got,
        });
    }
    Ok(())
}

fn validate_clock_skew(timestamp: &str, ctx: &ValidationContext) -> Result<(), ValidationError> {
    let parsed = parse_note_timestamp(timestamp)?;
    let offset_secs = (parsed - ctx.now).num_seconds();
    if offset_secs > ctx.skew_secs {
        return Err(ValidationError::Future {
            offset_secs,
            tolerance_secs: ctx.skew_secs,
        });
    }
    if -offset_secs > ctx.skew_secs {
        return Err(ValidationError::Stale {
            offset_secs: -offset_secs,
            tolerance_secs: ctx.skew_secs,
        });
    }
    Ok(())
}

fn validate_units(units: &[String]) -> Result<(), ValidationError> {
    for unit in units {
        validate_iscc_unit(unit)
            .map_err(|e| ValidationError::malformed("units", e.to_string()))?;
    }
    Ok(())
}

/// The composite's trailing Instance-Code digest must match the leading
/// bytes of the declared datahash (8 bytes standard, 16 WIDE).
fn validate_datahash_match(info: &IsccCodeInfo, datahash: &str) -> Result<(), ValidationError> {
    // Format already validated; decode cannot fail here.
    let hash_bytes = hex::decode(&datahash[4..])
        .map_err(|_| ValidationError::malformed("datahash", "must be hex"))?;
    let n = if info.wide { 16 } else { 8 };
    if info.instance_digest() != &hash_bytes[..n] {
        return Err(ValidationError::malformed(
            "datahash",
            "does not match the ISCC Instance-Code",
        ));
    }
    Ok(())
}

fn validate_signature(note: &IsccNote) -> Result<(), ValidationError> {
    if note.signature.version != SIGNATURE_VERSION {
        return Err(ValidationError::malformed(
            "signature.version",
            format!("expected '{SIGNATURE_VERSION}'"),
        ));
    }
    note.verify_signature()
}
