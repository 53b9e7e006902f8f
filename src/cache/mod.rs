//! Request caches.
//!
//! Three layers, from the bottom up:
//! - [`BoundedOrderedCache`]: a small FIFO-bounded key/value store
//! - [`FunCache`]: wraps one fetch function and hands out at most one
//!   request per distinct argument tuple
//! - [`ServerCaches`]: the registry holding one `FunCache` per resource kind

mod dedup;
mod ordered;
mod registry;

pub use dedup::{CacheKey, FunCache};
pub use ordered::{BoundedOrderedCache, CacheStats, DEFAULT_SIZE_LIMIT};
pub use registry::{CacheKind, ManagedCache, ServerCaches};
