//! ISCC codec: the ISCC-ID wire format and ISCC header parsing.
//!
//! The ISCC-IDv1 canonical form is `ISCC:` followed by unpadded uppercase
//! RFC 4648 base32 of a 16-bit header and a 64-bit body:
//!
//! - header: MAINTYPE=0110 (ID), SUBTYPE=0000 (realm 0), VERSION=0001, LENGTH=0001
//! - body: 52-bit microsecond timestamp, then 12-bit server-id, big-endian
//!
//! Composite ISCC-CODEs and ISCC-UNITs are parsed only as deep as the hub
//! needs: header decode, unit-set extraction, and the Instance-Code digest.
//! Generating codes from content is the job of the ISCC codec library, not
//! this crate.

use std::fmt;

use chrono::{TimeZone, Utc};

use crate::error::CoreError;

/// Scheme prefix shared by all canonical ISCC strings.
pub const ISCC_PREFIX: &str = "ISCC:";

/// Fixed ISCC-IDv1 header (realm 0).
pub const ISCC_ID_HEADER: [u8; 2] = [0x60, 0x11];

/// Largest timestamp representable in the 52-bit body field (~year 2112).
pub const MAX_TIMESTAMP_MICROS: u64 = (1 << 52) - 1;

/// Largest server-id representable in the 12-bit body field.
pub const MAX_SERVER_ID: u16 = 4095;

/// A 64-bit ISCC-ID body: `(ts_micros << 12) | server_id`.
///
/// Ordering is chronological: timestamp first, then server-id, which is
/// exactly the numeric order of the body integer.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IsccId(u64);

impl IsccId {
    /// Compose an ISCC-ID from a microsecond timestamp and server-id.
    pub fn from_parts(ts_micros: u64, server_id: u16) -> Result<Self, CoreError> {
        if ts_micros > MAX_TIMESTAMP_MICROS {
            return Err(CoreError::TimestampOverflow(ts_micros));
        }
        if server_id > MAX_SERVER_ID {
            return Err(CoreError::ServerIdOverflow(server_id));
        }
        Ok(Self((ts_micros << 12) | u64::from(server_id)))
    }

    /// Reconstruct from the 8-byte big-endian body.
    pub const fn from_body_bytes(bytes: [u8; 8]) -> Self {
        Self(u64::from_be_bytes(bytes))
    }

    /// The body as an unsigned integer.
    pub const fn body_uint(&self) -> u64 {
        self.0
    }

    /// The body as 8 big-endian bytes.
    pub const fn body_bytes(&self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    /// Microseconds since the UNIX epoch (upper 52 bits).
    pub const fn timestamp_micros(&self) -> u64 {
        self.0 >> 12
    }

    /// Server-id (lower 12 bits).
    pub const fn server_id(&self) -> u16 {
        (self.0 & 0xFFF) as u16
    }

    /// RFC 3339 UTC timestamp with microsecond precision.
    pub fn timestamp_iso(&self) -> String {
        format_micros_iso(self.timestamp_micros())
    }

    /// Parse the canonical string form.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        let encoded = s
            .strip_prefix(ISCC_PREFIX)
            .ok_or_else(|| CoreError::MalformedIscc(format!("missing '{ISCC_PREFIX}' prefix")))?;
        let bytes = decode_base32(encoded)?;
        if bytes.len() != 10 {
            return Err(CoreError::MalformedIscc(format!(
                "ISCC-ID must decode to 10 bytes, got {}",
                bytes.len()
            )));
        }
        if bytes[0..2] != ISCC_ID_HEADER {
            return Err(CoreError::MalformedIscc(format!(
                "unexpected ISCC-ID header {:02x}{:02x}",
                bytes[0], bytes[1]
            )));
        }
        let mut body = [0u8; 8];
        body.copy_from_slice(&bytes[2..]);
        Ok(Self::from_body_bytes(body))
    }
}

impl fmt::Display for IsccId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut raw = [0u8; 10];
        raw[0..2].copy_from_slice(&ISCC_ID_HEADER);
        raw[2..].copy_from_slice(&self.body_bytes());
        write!(f, "{}{}", ISCC_PREFIX, encode_base32(&raw))
    }
}

impl fmt::Debug for IsccId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IsccId({self})")
    }
}

/// Format microseconds since epoch as RFC 3339 UTC with 6 fractional digits.
pub fn format_micros_iso(ts_micros: u64) -> String {
    match Utc.timestamp_micros(ts_micros as i64).single() {
        Some(dt) => dt.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string(),
        None => String::from("invalid-timestamp"),
    }
}

// RFC 4648 Base32 encoding (uppercase, no padding) - the ISCC alphabet.
pub fn encode_base32(data: &[u8]) -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";
    let mut result = String::new();
    let mut buffer: u64 = 0;
    let mut bits_in_buffer = 0;

    for &byte in data {
        buffer = (buffer << 8) | u64::from(byte);
        bits_in_buffer += 8;

        while bits_in_buffer >= 5 {
            bits_in_buffer -= 5;
            let index = ((buffer >> bits_in_buffer) & 0x1f) as usize;
            result.push(ALPHABET[index] as char);
        }
    }

    if bits_in_buffer > 0 {
        let index = ((buffer << (5 - bits_in_buffer)) & 0x1f) as usize;
        result.push(ALPHABET[index] as char);
    }

    result
}

/// Strict RFC 4648 Base32 decoding (uppercase, no padding).
pub fn decode_base32(s: &str) -> Result<Vec<u8>, CoreError> {
    let mut result = Vec::with_capacity(s.len() * 5 / 8);
    let mut buffer: u64 = 0;
    let mut bits_in_buffer = 0;

    for c in s.chars() {
        let value = match c {
            'A'..='Z' => c as u64 - 'A' as u64,
            '2'..='7' => c as u64 - '2' as u64 + 26,
            _ => {
                return Err(CoreError::MalformedIscc(format!(
                    "invalid base32 character {c:?}"
                )))
            }
        };
        buffer = (buffer << 5) | value;
        bits_in_buffer += 5;

        if bits_in_buffer >= 8 {
            bits_in_buffer -= 8;
            result.push(((buffer >> bits_in_buffer) & 0xff) as u8);
        }
    }

    // Trailing bits must be zero padding shorter than one character.
    if bits_in_buffer >= 5 || (buffer & ((1u64 << bits_in_buffer) - 1)) != 0 {
        return Err(CoreError::MalformedIscc("invalid base32 padding".into()));
    }

    Ok(result)
}

/// ISCC MainType header nibble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MainType {
    Meta = 0,
    Semantic = 1,
    Content = 2,
    Data = 3,
    Instance = 4,
    Iscc = 5,
    Id = 6,
    Flake = 7,
}

impl MainType {
    fn from_nibble(n: u8) -> Option<Self> {
        match n {
            0 => Some(Self::Meta),
            1 => Some(Self::Semantic),
            2 => Some(Self::Content),
            3 => Some(Self::Data),
            4 => Some(Self::Instance),
            5 => Some(Self::Iscc),
            6 => Some(Self::Id),
            7 => Some(Self::Flake),
            _ => None,
        }
    }
}

/// Composite SubType indicating the WIDE layout (128-bit Data + Instance).
pub const SUBTYPE_WIDE: u8 = 6;

/// Decoded header of a composite ISCC-CODE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsccCodeInfo {
    /// Composite subtype nibble.
    pub subtype: u8,
    /// True for the WIDE layout.
    pub wide: bool,
    /// Unit types in body order. Data and Instance are always last.
    pub unit_types: Vec<MainType>,
    /// The raw body: concatenated unit digests.
    pub body: Vec<u8>,
}

impl IsccCodeInfo {
    /// Number of units carried in the body.
    pub fn unit_count(&self) -> usize {
        self.unit_types.len()
    }

    /// The Instance-Code digest portion of the body (always the tail).
    pub fn instance_digest(&self) -> &[u8] {
        let len = if self.wide { 16 } else { 8 };
        &self.body[self.body.len() - len..]
    }
}

fn decode_iscc_parts(s: &str) -> Result<(MainType, u8, u8, u8, Vec<u8>), CoreError> {
    let encoded = s
        .strip_prefix(ISCC_PREFIX)
        .ok_or_else(|| CoreError::MalformedIscc(format!("missing '{ISCC_PREFIX}' prefix")))?;
    let bytes = decode_base32(encoded)?;
    if bytes.len() < 3 {
        return Err(CoreError::MalformedIscc("ISCC too short".into()));
    }

    let nibbles = [
        bytes[0] >> 4,
        bytes[0] & 0x0f,
        bytes[1] >> 4,
        bytes[1] & 0x0f,
    ];
    // Nibble values >= 8 are varint continuations; no type the hub accepts
    // uses them.
    if nibbles.iter().any(|&n| n >= 8) {
        return Err(CoreError::MalformedIscc(
            "extended header varints are not supported".into(),
        ));
    }

    let maintype = MainType::from_nibble(nibbles[0])
        .ok_or_else(|| CoreError::MalformedIscc("invalid maintype".into()))?;
    Ok((maintype, nibbles[1], nibbles[2], nibbles[3], bytes[2..].to_vec()))
}

/// Parse a composite ISCC-CODE header.
///
/// Returns the unit set and raw body. The LENGTH nibble of a composite is a
/// bitfield of optional units (bit 2 = Meta, bit 1 = Semantic, bit 0 =
/// Content); Data and Instance are always present.
pub fn parse_iscc_code(s: &str) -> Result<IsccCodeInfo, CoreError> {
    let (maintype, subtype, version, length, body) = decode_iscc_parts(s)?;

    if maintype != MainType::Iscc {
        return Err(CoreError::MalformedIscc(
            "not a composite ISCC-CODE (maintype must be ISCC)".into(),
        ));
    }
    if version != 0 {
        return Err(CoreError::MalformedIscc(format!(
            "unsupported ISCC-CODE version {version}"
        )));
    }

    let wide = subtype == SUBTYPE_WIDE;
    let mut unit_types = Vec::new();
    if length & 0b100 != 0 {
        unit_types.push(MainType::Meta);
    }
    if length & 0b010 != 0 {
        unit_types.push(MainType::Semantic);
    }
    if length & 0b001 != 0 {
        unit_types.push(MainType::Content);
    }
    if wide && !unit_types.is_empty() {
        return Err(CoreError::MalformedIscc(
            "WIDE composite cannot carry optional units".into(),
        ));
    }
    unit_types.push(MainType::Data);
    unit_types.push(MainType::Instance);

    let expected_len = if wide { 32 } else { unit_types.len() * 8 };
    if body.len() != expected_len {
        return Err(CoreError::MalformedIscc(format!(
            "composite body must be {expected_len} bytes, got {}",
            body.len()
        )));
    }

    Ok(IsccCodeInfo {
        subtype,
        wide,
        unit_types,
        body,
    })
}

/// Validate a single ISCC-UNIT and return its MainType.
///
/// A unit is any non-composite code whose LENGTH nibble matches its body:
/// body bits = (LENGTH + 1) * 32.
pub fn validate_iscc_unit(s: &str) -> Result<MainType, CoreError> {
    let (maintype, _subtype, version, length, body) = decode_iscc_parts(s)?;

    match maintype {
        MainType::Meta | MainType::Semantic | MainType::Content | MainType::Data
        | MainType::Instance => {}
        other => {
            return Err(CoreError::MalformedIscc(format!(
                "{other:?} is not an ISCC-UNIT maintype"
            )))
        }
    }
    if version != 0 {
        return Err(CoreError::MalformedIscc(format!(
            "unsupported ISCC-UNIT version {version}"
        )));
    }

    let expected_bytes = (usize::from(length) + 1) * 4;
    if body.len() != expected_bytes {
        return Err(CoreError::MalformedIscc(format!(
            "unit body must be {expected_bytes} bytes, got {}",
            body.len()
        )));
    }

    Ok(maintype)
}
