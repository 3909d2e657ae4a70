use std::sync::Arc;

use http::{HeaderMap, HeaderName, header};

use crate::{entry::CacheEntry, etag::EntityTag};

/// Parsed `If-None-Match` or `If-Match` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagCondition {
    Any,
    Tags(Vec<EntityTag>),
}

impl TagCondition {
    fn from_headers(headers: &HeaderMap, name: &HeaderName) -> Option<Self> {
        let mut combined = String::new();
        for value in headers.get_all(name).iter().filter_map(|v| v.to_str().ok()) {
            if !combined.is_empty() {
                combined.push(',');
            }
            combined.push_str(value.trim());
        }
        Self::parse(&combined)
    }

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }

        let mut tags = Vec::new();
        for token in value.split(',') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            if token == "*" {
                return Some(TagCondition::Any);
            }
            if let Some(tag) = EntityTag::parse(token) {
                tags.push(tag);
            }
        }

        if tags.is_empty() {
            None
        } else {
            Some(TagCondition::Tags(tags))
        }
    }

    /// Weak comparison, used by `If-None-Match`.
    pub fn matches_weak(&self, etag: &str) -> bool {
        match self {
            TagCondition::Any => true,
            TagCondition::Tags(tags) => tags.iter().any(|tag| tag.value == etag),
        }
    }

    /// Strong comparison, used by `If-Match`. Weak request tags never match.
    pub fn matches_strong(&self, etag: &str) -> bool {
        match self {
            TagCondition::Any => true,
            TagCondition::Tags(tags) => tags.iter().any(|tag| !tag.weak && tag.value == etag),
        }
    }
}

/// Validators carried by a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conditions {
    pub if_none_match: Option<TagCondition>,
    pub if_match: Option<TagCondition>,
}

impl Conditions {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            if_none_match: TagCondition::from_headers(headers, &header::IF_NONE_MATCH),
            if_match: TagCondition::from_headers(headers, &header::IF_MATCH),
        }
    }

    pub fn none_match(&self, etag: &str) -> bool {
        self.if_none_match
            .as_ref()
            .is_some_and(|cond| cond.matches_weak(etag))
    }

    fn match_fails(&self, etag: &str) -> bool {
        self.if_match
            .as_ref()
            .is_some_and(|cond| !cond.matches_strong(etag))
    }
}

/// Why the handler has to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Revalidation {
    Miss,
    Expired { previous_etag: String },
    Precondition,
}

#[derive(Debug, Clone)]
pub enum Outcome {
    NotModified(Arc<CacheEntry>),
    Cached(Arc<CacheEntry>),
    Delegate(Revalidation),
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::NotModified(_) => "not_modified",
            Outcome::Cached(_) => "hit",
            Outcome::Delegate(Revalidation::Miss) => "miss",
            Outcome::Delegate(Revalidation::Expired { .. }) => "expired",
            Outcome::Delegate(Revalidation::Precondition) => "precondition",
        }
    }
}

/// Decide how to answer a request given the negotiated entry, if any.
pub fn evaluate(entry: Option<Arc<CacheEntry>>, conditions: &Conditions, now_secs: u64) -> Outcome {
    let Some(entry) = entry else {
        return Outcome::Delegate(Revalidation::Miss);
    };

    if entry.is_expired(now_secs) {
        return Outcome::Delegate(Revalidation::Expired {
            previous_etag: entry.etag().to_string(),
        });
    }

    // If-Match is evaluated before If-None-Match (RFC 9110 13.2.2)
    if conditions.match_fails(entry.etag()) {
        return Outcome::Delegate(Revalidation::Precondition);
    }
    if conditions.none_match(entry.etag()) {
        return Outcome::NotModified(entry);
    }
    Outcome::Cached(entry)
}

/// After an expired entry was recomputed: answer 304 when the representation
/// did not change and the client already holds it.
pub fn not_modified_after_recompute(
    reason: &Revalidation,
    fresh_etag: &str,
    conditions: &Conditions,
) -> bool {
    match reason {
        Revalidation::Expired { previous_etag } => {
            previous_etag == fresh_etag && conditions.none_match(fresh_etag)
        }
        Revalidation::Miss | Revalidation::Precondition => false,
    }
}
