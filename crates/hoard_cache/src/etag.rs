use http::{HeaderMap, header};
use sha2::{Digest, Sha256};

/// An entity tag. `value` is the opaque tag without quotes or weak prefix,
/// `header` is what goes on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityTag {
    pub value: String,
    pub header: String,
    pub weak: bool,
}

impl EntityTag {
    pub fn strong(value: &str) -> Self {
        Self {
            value: value.to_string(),
            header: format!(r#""{value}""#),
            weak: false,
        }
    }

    pub fn weak(value: &str) -> Self {
        Self {
            value: value.to_string(),
            header: format!(r#"W/"{value}""#),
            weak: true,
        }
    }

    /// Strong tag over the SHA-256 of a body, for handlers without a natural
    /// version to report.
    pub fn from_body(body: &[u8]) -> Self {
        let digest = Sha256::digest(body);
        Self::strong(&hex::encode(&digest[..16]))
    }

    /// Parse a single `ETag` header value.
    pub fn parse(value: &str) -> Option<Self> {
        let trimmed = value.trim();
        let weak = trimmed.starts_with("W/") || trimmed.starts_with("w/");
        let tag = normalize_etag_token(trimmed)?;
        Some(if weak { Self::weak(&tag) } else { Self::strong(&tag) })
    }

    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        headers
            .get(header::ETAG)
            .and_then(|v| v.to_str().ok())
            .and_then(Self::parse)
    }
}

/// Strip the weak prefix and surrounding quotes from one entity tag token.
pub fn normalize_etag_token(token: &str) -> Option<String> {
    let mut tag = token.trim();
    if tag.is_empty() {
        return None;
    }

    if let Some(stripped) = tag.strip_prefix("W/").or_else(|| tag.strip_prefix("w/")) {
        tag = stripped.trim();
    }

    if tag.len() >= 2
        && ((tag.starts_with('"') && tag.ends_with('"'))
            || (tag.starts_with('\'') && tag.ends_with('\'')))
    {
        tag = &tag[1..tag.len() - 1];
    }

    let tag = tag.trim();
    if tag.is_empty() {
        None
    } else {
        Some(tag.to_string())
    }
}
