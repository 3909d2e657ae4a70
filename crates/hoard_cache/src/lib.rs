//! Server-side HTTP response cache.
//!
//! [`CachePipeline`] sits in front of a [`Handler`]: it answers `GET`/`HEAD`
//! from stored variants when they are still fresh, turns matching
//! `If-None-Match` requests into `304 Not Modified`, stores new responses that
//! declare a `max-age` and an `ETag`, and drops every variant of a URI after a
//! successful mutating request.

pub mod clock;
pub mod conditional;
pub mod entry;
pub mod error;
pub mod etag;
pub mod key;
pub mod manager;
pub mod media;
pub mod negotiate;
pub mod pipeline;
pub mod policy;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use conditional::{Conditions, Outcome, Revalidation};
pub use entry::{CacheEntry, CachedHeader, CachedHeaders, HeaderKind};
pub use error::CacheError;
pub use etag::EntityTag;
pub use key::{VariantKey, VaryHeaders};
pub use manager::{CacheManager, NewEntry};
pub use media::{Accept, MediaRange, MediaType};
pub use pipeline::{CachePipeline, Handler};
pub use policy::{CacheDirectives, CachePolicy};
pub use store::{CacheStore, MemoryCacheStore, StoreError};
