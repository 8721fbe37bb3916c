//! Parsing of OpenPGP cleartext-signed documents.
//!
//! Only the envelope is handled here: splitting the signed text from the armored
//! signature block and undoing dash-escaping. Verifying the signature is the
//! keyring's job.

const SIGNED_HEADER: &str = "-----BEGIN PGP SIGNED MESSAGE-----";
const SIGNATURE_HEADER: &str = "-----BEGIN PGP SIGNATURE-----";
const SIGNATURE_FOOTER: &str = "-----END PGP SIGNATURE-----";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ClearsignError {
    #[error("document is not a cleartext-signed message")]
    NotSigned,
    #[error("cleartext-signed message is truncated: {0}")]
    Truncated(&'static str),
}

/// The two halves of a cleartext-signed document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clearsigned {
    /// The armor headers (`Hash: SHA512`, ...).
    pub headers: Vec<String>,
    /// The signed text with dash-escaping removed.
    pub payload: String,
    /// The armored signature block, including its begin/end lines.
    pub signature: String,
}

/// Split a cleartext-signed document.
pub fn parse_clearsigned(text: &str) -> Result<Clearsigned, ClearsignError> {
    let mut lines = text.lines();
    loop {
        match lines.next() {
            Some(line) if line.trim_end() == SIGNED_HEADER => break,
            Some(line) if line.trim().is_empty() => continue,
            _ => return Err(ClearsignError::NotSigned),
        }
    }

    let mut headers = Vec::new();
    loop {
        match lines.next() {
            Some(line) if line.trim().is_empty() => break,
            Some(line) => headers.push(line.trim_end().to_string()),
            None => return Err(ClearsignError::Truncated("missing armor headers")),
        }
    }

    let mut body = Vec::new();
    let mut found_signature = false;
    for line in lines.by_ref() {
        if line.trim_end() == SIGNATURE_HEADER {
            found_signature = true;
            break;
        }
        body.push(line.strip_prefix("- ").unwrap_or(line));
    }
    if !found_signature {
        return Err(ClearsignError::Truncated("missing signature block"));
    }

    let mut signature = vec![SIGNATURE_HEADER.to_string()];
    let mut closed = false;
    for line in lines {
        signature.push(line.trim_end().to_string());
        if line.trim_end() == SIGNATURE_FOOTER {
            closed = true;
            break;
        }
    }
    if !closed {
        return Err(ClearsignError::Truncated("unterminated signature block"));
    }

    Ok(Clearsigned {
        headers,
        payload: body.join("\n"),
        signature: signature.join("\n"),
    })
}

/// Return the signed text of a cleartext-signed document.
pub fn extract_signed_payload(text: &str) -> Result<String, ClearsignError> {
    parse_clearsigned(text).map(|doc| doc.payload)
}

/// Return the signed text if `text` is cleartext-signed, otherwise `text` itself.
pub fn payload_or_plain(text: &str) -> Result<String, ClearsignError> {
    match parse_clearsigned(text) {
        Ok(doc) => Ok(doc.payload),
        Err(ClearsignError::NotSigned) => Ok(text.to_string()),
        Err(err) => Err(err),
    }
}

/// Assemble a cleartext-signed document from a payload and an armored signature.
pub fn assemble_clearsigned(hash_algorithm: &str, payload: &str, signature: &str) -> String {
    let mut out = String::new();
    out.push_str(SIGNED_HEADER);
    out.push('\n');
    out.push_str(&format!("Hash: {hash_algorithm}\n\n"));
    for line in payload.lines() {
        if line.starts_with('-') {
            out.push_str("- ");
        }
        out.push_str(line);
        out.push('\n');
    }
    out.push_str(signature.trim_end());
    out.push('\n');
    out
}
