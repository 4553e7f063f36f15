//! Response and function-result caching.
//!
//! - [`CacheBackend`] is the storage seam; [`MemoryCache`] is the
//!   in-process implementation.
//! - [`Memo`] memoizes computations under `prefix:name:chunk…` keys.
//! - [`cache_view`] caches whole handler responses for anonymous, query-less
//!   requests, keyed by user, language and path.

mod backend;
mod memo;
mod view;

pub use backend::{CacheBackend, MemoryCache};
pub use memo::{Memo, cache_key};
pub use view::{ViewCache, cache_view};
