use http::{HeaderMap, Method, header};

pub struct CachePolicy;

impl CachePolicy {
    /// Methods answered from the cache.
    pub fn is_cacheable(method: &Method) -> bool {
        matches!(*method, Method::GET | Method::HEAD)
    }

    /// Methods whose response may be stored. A HEAD response has no body.
    pub fn is_storable(method: &Method) -> bool {
        *method == Method::GET
    }

    /// Methods that may change the resource and so invalidate its variants.
    pub fn invalidates(method: &Method) -> bool {
        !method.is_safe()
    }
}

/// The subset of `Cache-Control` the cache acts on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheDirectives {
    pub max_age_secs: Option<u64>,
    pub no_store: bool,
    pub no_cache: bool,
}

impl CacheDirectives {
    pub fn max_age(secs: u64) -> Self {
        Self {
            max_age_secs: Some(secs),
            ..Self::default()
        }
    }

    /// Read the directives from every `Cache-Control` line of a response.
    /// `None` when the header is absent.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let mut lines = headers
            .get_all(header::CACHE_CONTROL)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .peekable();
        lines.peek()?;

        let mut directives = Self::default();
        for directive in lines.flat_map(|line| line.split(',')) {
            let directive = directive.trim();
            let (name, value) = match directive.split_once('=') {
                Some((name, value)) => (name.trim(), Some(value.trim().trim_matches('"'))),
                None => (directive, None),
            };

            if name.eq_ignore_ascii_case("max-age") {
                // a malformed or negative max-age counts as absent
                directives.max_age_secs = value.and_then(|v| v.parse::<u64>().ok());
            } else if name.eq_ignore_ascii_case("no-store") {
                directives.no_store = true;
            } else if name.eq_ignore_ascii_case("no-cache") {
                directives.no_cache = true;
            }
        }
        Some(directives)
    }

    /// TTL to store under, `None` when the response must not be stored.
    pub fn storable_ttl(&self) -> Option<u64> {
        if self.no_store || self.no_cache {
            return None;
        }
        self.max_age_secs
    }
}

/// Replace the `max-age` value of a `Cache-Control` header, appending one if
/// it is missing.
pub fn rewrite_max_age(value: &str, remaining_secs: u64) -> String {
    let mut found = false;
    let mut parts: Vec<String> = value
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            let is_max_age = part
                .split_once('=')
                .is_some_and(|(name, _)| name.trim().eq_ignore_ascii_case("max-age"));
            if is_max_age {
                found = true;
                format!("max-age={remaining_secs}")
            } else {
                part.to_string()
            }
        })
        .collect();

    if !found {
        parts.push(format!("max-age={remaining_secs}"));
    }
    parts.join(", ")
}
