//! Media types and `Accept` header parsing.

use std::{fmt, str::FromStr};

use http::{HeaderMap, header};

const WILDCARD: &str = "*";
const MAX_QUALITY: u16 = 1000;

/// A `type/subtype` pair, lowercased, parameters dropped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MediaType {
    type_: String,
    subtype: String,
}

impl MediaType {
    pub fn new(type_: &str, subtype: &str) -> Self {
        Self {
            type_: type_.to_ascii_lowercase(),
            subtype: subtype.to_ascii_lowercase(),
        }
    }

    pub fn any() -> Self {
        Self::new(WILDCARD, WILDCARD)
    }

    pub fn octet_stream() -> Self {
        Self::new("application", "octet-stream")
    }

    /// Parse `type/subtype[;params]`. Returns `None` on malformed input.
    pub fn parse(value: &str) -> Option<Self> {
        let essence = value.split(';').next()?.trim();
        if essence == WILDCARD {
            return Some(Self::any());
        }

        let (type_, subtype) = essence.split_once('/')?;
        let (type_, subtype) = (type_.trim(), subtype.trim());
        if !is_token(type_) || !is_token(subtype) {
            return None;
        }
        // `*/plain` is not a valid range
        if type_ == WILDCARD && subtype != WILDCARD {
            return None;
        }
        Some(Self::new(type_, subtype))
    }

    /// Media type declared by a response's `Content-Type`, or octet-stream.
    pub fn from_content_type(headers: &HeaderMap) -> Self {
        headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(Self::parse)
            .filter(|mt| !mt.is_wildcard_type() && !mt.is_wildcard_subtype())
            .unwrap_or_else(Self::octet_stream)
    }

    pub fn type_(&self) -> &str {
        &self.type_
    }

    pub fn subtype(&self) -> &str {
        &self.subtype
    }

    pub fn is_wildcard_type(&self) -> bool {
        self.type_ == WILDCARD
    }

    pub fn is_wildcard_subtype(&self) -> bool {
        self.subtype == WILDCARD
    }

    /// Whether `self`, read as a range, covers `other`.
    pub fn is_compatible(&self, other: &MediaType) -> bool {
        if self.is_wildcard_type() || other.is_wildcard_type() {
            return true;
        }
        if self.type_ != other.type_ {
            return false;
        }
        self.is_wildcard_subtype() || other.is_wildcard_subtype() || self.subtype == other.subtype
    }

    /// 0 for `*/*`, 1 for `type/*`, 2 for a concrete type.
    pub fn specificity(&self) -> u8 {
        if self.is_wildcard_type() {
            0
        } else if self.is_wildcard_subtype() {
            1
        } else {
            2
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.type_, self.subtype)
    }
}

impl FromStr for MediaType {
    type Err = InvalidMediaType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| InvalidMediaType(s.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid media type: {0:?}")]
pub struct InvalidMediaType(pub String);

/// One element of an `Accept` header. Quality is kept in thousandths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRange {
    media_type: MediaType,
    quality: u16,
}

impl MediaRange {
    pub fn new(media_type: MediaType, quality: u16) -> Self {
        Self {
            media_type,
            quality: quality.min(MAX_QUALITY),
        }
    }

    fn parse(element: &str) -> Option<Self> {
        let mut parts = element.split(';');
        let media_type = MediaType::parse(parts.next()?)?;
        let mut quality = MAX_QUALITY;

        for param in parts {
            let Some((name, value)) = param.split_once('=') else {
                continue;
            };
            if name.trim().eq_ignore_ascii_case("q") {
                quality = parse_quality(value.trim())?;
            }
        }

        Some(Self::new(media_type, quality))
    }

    pub fn media_type(&self) -> &MediaType {
        &self.media_type
    }

    pub fn quality(&self) -> u16 {
        self.quality
    }
}

/// Parse an RFC 9110 qvalue (`0`, `0.5`, `1.000`) into thousandths.
fn parse_quality(value: &str) -> Option<u16> {
    let (int, frac) = value.split_once('.').unwrap_or((value, ""));
    if frac.len() > 3 || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let millis = match int {
        "0" => {
            let mut digits = frac.to_string();
            while digits.len() < 3 {
                digits.push('0');
            }
            digits.parse::<u16>().ok()?
        }
        "1" if frac.bytes().all(|b| b == b'0') => MAX_QUALITY,
        _ => return None,
    };
    Some(millis)
}

fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b))
}

/// Rank of a media type against an `Accept` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Preference {
    pub quality: u16,
    pub specificity: u8,
}

/// Parsed `Accept` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accept {
    ranges: Vec<MediaRange>,
}

impl Default for Accept {
    fn default() -> Self {
        Self::any()
    }
}

impl Accept {
    pub fn any() -> Self {
        Self {
            ranges: vec![MediaRange::new(MediaType::any(), MAX_QUALITY)],
        }
    }

    /// Parse a header value. Malformed elements are dropped; if nothing
    /// usable remains the header is read as `*/*`.
    pub fn parse(value: &str) -> Self {
        let ranges: Vec<MediaRange> = value
            .split(',')
            .map(str::trim)
            .filter(|element| !element.is_empty())
            .filter_map(MediaRange::parse)
            .collect();

        if ranges.is_empty() {
            Self::any()
        } else {
            Self { ranges }
        }
    }

    /// Combine every `Accept` field line of a request.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let combined: Vec<&str> = headers
            .get_all(header::ACCEPT)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();

        if combined.is_empty() {
            Self::any()
        } else {
            Self::parse(&combined.join(","))
        }
    }

    pub fn ranges(&self) -> &[MediaRange] {
        &self.ranges
    }

    /// Highest quality the client gives to any range.
    pub fn top_quality(&self) -> u16 {
        self.ranges.iter().map(|r| r.quality).max().unwrap_or(0)
    }

    /// How much the client wants `media_type`: the most specific matching
    /// range decides, `None` when nothing matches or it was refused with `q=0`.
    pub fn preference(&self, media_type: &MediaType) -> Option<Preference> {
        let best = self
            .ranges
            .iter()
            .filter(|range| range.media_type.is_compatible(media_type))
            .map(|range| Preference {
                quality: range.quality,
                specificity: range.media_type.specificity(),
            })
            .max_by_key(|pref| (pref.specificity, pref.quality))?;

        (best.quality > 0).then_some(best)
    }

    /// Pick the best of `available` for this header, first listed on ties.
    pub fn negotiate<'a>(&self, available: &'a [MediaType]) -> Option<&'a MediaType> {
        let mut best: Option<(&MediaType, Preference)> = None;
        for candidate in available {
            let Some(pref) = self.preference(candidate) else {
                continue;
            };
            if best.is_none_or(|(_, current)| pref > current) {
                best = Some((candidate, pref));
            }
        }
        best.map(|(mt, _)| mt)
    }
}
