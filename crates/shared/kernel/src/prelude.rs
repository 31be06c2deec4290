//! Convenience re-exports for crates that only need the common surface:
//! the application state type, plus the ID helpers every slice reaches for.

#[cfg(feature = "server")]
pub use crate::server::ApiState;
pub use crate::{SAFE_ALPHABET, safe_nanoid};
