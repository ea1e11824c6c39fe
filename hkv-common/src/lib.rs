// hkv-common - Shared error and time types for the HybridKV cache workspace.

pub mod clock;
pub mod error;

pub use clock::{Clock, MockClock, SystemClock};
pub use error::{HkvError, HkvResult};
