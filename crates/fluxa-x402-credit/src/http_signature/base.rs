//! Signature base reconstruction.
//!
//! The base is byte-exact: four lines joined with `\n`, no trailing
//! newline. The first two lines carry the received header bytes untouched;
//! any re-encoding would break verification.

use url::Url;

/// Error produced while building a signature base.
#[derive(Debug, thiserror::Error)]
pub enum SignatureBaseError {
    #[error("resource url does not parse: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("resource url has no authority")]
    MissingAuthority,
}

/// Extracts the `host[:port]` authority of a URL.
///
/// The port appears only when explicitly present and non-default for the
/// scheme, matching what a client sends in its `Host` header.
pub fn authority(url: &str) -> Result<String, SignatureBaseError> {
    let url = Url::parse(url)?;
    let host = url.host_str().ok_or(SignatureBaseError::MissingAuthority)?;
    Ok(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

/// Builds the signature base over the three covered components plus the
/// signature parameters.
///
/// `signature_params` must be the raw `Signature-Input` substring beginning
/// at its `(`.
pub fn signature_base(
    payment_signature_header: &str,
    signature_agent_header: &str,
    url: &str,
    signature_params: &str,
) -> Result<String, SignatureBaseError> {
    let authority = authority(url)?;
    Ok(format!(
        "\"payment-signature\": {payment_signature_header}\n\
         \"signature-agent\": {signature_agent_header}\n\
         \"@authority\": {authority}\n\
         \"@signature-params\": {signature_params}"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authority_drops_default_port() {
        assert_eq!(authority("https://api.example.com/resource").unwrap(), "api.example.com");
        assert_eq!(authority("https://api.example.com:443/x").unwrap(), "api.example.com");
        assert_eq!(authority("http://localhost:8402/x").unwrap(), "localhost:8402");
    }

    #[test]
    fn test_base_layout() {
        let base = signature_base(
            "cGF5bG9hZA",
            "\"https://agent.example\"",
            "https://api.example.com/resource",
            "(\"payment-signature\" \"signature-agent\" \"@authority\");created=1;expires=2",
        )
        .unwrap();
        let lines: Vec<&str> = base.split('\n').collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "\"payment-signature\": cGF5bG9hZA");
        assert_eq!(lines[1], "\"signature-agent\": \"https://agent.example\"");
        assert_eq!(lines[2], "\"@authority\": api.example.com");
        assert!(lines[3].starts_with("\"@signature-params\": (\"payment-signature\""));
        assert!(!base.ends_with('\n'));
    }
}
