//! Error types shared across the HybridKV workspace.
//!
//! The original taxonomy (duplicate / invalid-argument / out-of-memory /
//! absent) is split here into the errors an insert can actually produce in
//! safe Rust and the "not found" case, which every lookup-style operation
//! already expresses with `Option`/`bool` rather than a dedicated variant.

use thiserror::Error;

/// Result alias for fallible HybridKV operations.
pub type HkvResult<T> = Result<T, HkvError>;

/// Errors an insert into a [`FlexCache`](../../hkv_engine/struct.FlexCache.html)
/// can return.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HkvError {
    /// A node with this key is already present.
    #[error("key already exists")]
    Duplicate,

    /// The call violated a precondition (empty key, negative byte size, ...).
    #[error("invalid argument: {reason}")]
    InvalidArgument {
        /// Human-readable reason, attached for host-side logging.
        reason: &'static str,
    },

    /// A host-supplied copy hook declined to produce a copy of the key or
    /// value. In the original this is the out-of-memory path; a safe-Rust
    /// copy hook can decline for any reason it likes (allocation failure,
    /// a refcount ceiling, ...), so this variant is named for what actually
    /// happened rather than assuming why.
    #[error("copy hook declined to produce a value")]
    HookRejected,
}
