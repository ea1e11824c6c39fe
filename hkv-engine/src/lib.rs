//! Generic, single-process TTL cache with pluggable eviction.
//!
//! [`BCache`] is the bare arena-backed hash+list container; [`FlexCache`]
//! layers expiry, item/byte limits, and copy/free/on-delete hooks on top of
//! it. Three eviction policies — [`policy::Lru`], [`policy::Fifo`], and
//! [`policy::Random`] — are provided, and a host can implement
//! [`policy::Policy`] for its own.

mod bcache;
mod entry;
mod flexcache;
pub mod policy;

pub use bcache::{BCache, RemovedNode};
pub use entry::Entry;
pub use flexcache::{FlexCache, FlexCacheConfig, KeyHooks, ValueHooks};
pub use policy::Policy;

pub use hkv_common::{Clock, HkvError, HkvResult, MockClock, SystemClock};
