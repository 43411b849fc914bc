//! Gateway URL and URI-template handling.
//!
//! A gateway is either a plain absolute http(s) URL or an RFC 6570 template
//! restricted to the variables a hub can actually substitute.

use crate::error::ValidationError;

/// Template variables a gateway may reference.
pub const GATEWAY_VARIABLES: [&str; 4] = ["iscc_id", "iscc_code", "pubkey", "datahash"];

/// Values substituted into a gateway template when resolving.
#[derive(Debug, Clone)]
pub struct GatewayContext {
    pub iscc_id: String,
    pub iscc_code: String,
    pub pubkey: String,
    pub datahash: String,
}

impl GatewayContext {
    fn get(&self, name: &str) -> Option<&str> {
        match name {
            "iscc_id" => Some(&self.iscc_id),
            "iscc_code" => Some(&self.iscc_code),
            "pubkey" => Some(&self.pubkey),
            "datahash" => Some(&self.datahash),
            _ => None,
        }
    }
}

/// Extract `{name}` variables, rejecting unbalanced or nested braces.
fn template_variables(s: &str) -> Result<Vec<&str>, ValidationError> {
    let mut vars = Vec::new();
    let mut rest = s;
    while let Some(open) = rest.find('{') {
        let after = &rest[open + 1..];
        let close = after.find('}').ok_or_else(|| {
            ValidationError::malformed("gateway", "invalid URI template syntax")
        })?;
        let name = &after[..close];
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(ValidationError::malformed(
                "gateway",
                "invalid URI template syntax",
            ));
        }
        vars.push(name);
        rest = &after[close + 1..];
    }
    if rest.contains('}') {
        return Err(ValidationError::malformed(
            "gateway",
            "invalid URI template syntax",
        ));
    }
    Ok(vars)
}

fn is_http_url(s: &str) -> bool {
    if s != s.trim() {
        return false;
    }
    let remainder = match s.strip_prefix("https://").or_else(|| s.strip_prefix("http://")) {
        Some(r) => r,
        None => return false,
    };
    let host = remainder.split('/').next().unwrap_or("");
    !host.is_empty()
}

/// Validate a gateway value: template variables must be from the supported
/// set, and the string must still read as an absolute http(s) URL.
pub fn validate_gateway(gateway: &str) -> Result<(), ValidationError> {
    if gateway.matches('{').count() != gateway.matches('}').count() {
        return Err(ValidationError::malformed(
            "gateway",
            "invalid URI template syntax",
        ));
    }

    let vars = template_variables(gateway)?;
    let unsupported: Vec<&str> = vars
        .iter()
        .copied()
        .filter(|v| !GATEWAY_VARIABLES.contains(v))
        .collect();
    if !unsupported.is_empty() {
        return Err(ValidationError::malformed(
            "gateway",
            format!("unsupported template variables: {}", unsupported.join(", ")),
        ));
    }

    if !is_http_url(gateway) {
        return Err(ValidationError::malformed(
            "gateway",
            "must be an absolute http(s) URL or URI template",
        ));
    }
    Ok(())
}

/// Expand a gateway for resolution.
///
/// Templates get their variables substituted; plain URLs get the ISCC-ID
/// appended (with a separating slash unless the URL already ends in `/` or
/// `=`).
pub fn expand_gateway(gateway: &str, ctx: &GatewayContext) -> String {
    if gateway.contains('{') && gateway.contains('}') {
        let mut out = String::with_capacity(gateway.len() + 32);
        let mut rest = gateway;
        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            match after.find('}') {
                Some(close) => {
                    let name = &after[..close];
                    out.push_str(ctx.get(name).unwrap_or(""));
                    rest = &after[close + 1..];
                }
                None => {
                    rest = after;
                    break;
                }
            }
        }
        out.push_str(rest);
        out
    } else if gateway.ends_with('/') || gateway.ends_with('=') {
        format!("{}{}", gateway, ctx.iscc_id)
    } else {
        format!("{}/{}", gateway, ctx.iscc_id)
    }
}
