//! Small utilities shared across the snapsql crates: arena-friendly
//! collection aliases and a builder-style `Config` trait, in the same
//! spirit as the rest of the workspace's shared-helpers crates.

use std::hash::BuildHasherDefault;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// An insertion-ordered map keyed with a fast, non-cryptographic hasher.
/// Used for the parameter/constant namespace, where iteration order must
/// match declaration order for reproducible diagnostics.
pub type IndexMap<K, V> = indexmap::IndexMap<K, V, BuildHasherDefault<ahash::AHasher>>;

/// An insertion-ordered set keyed with a fast, non-cryptographic hasher.
pub type IndexSet<V> = indexmap::IndexSet<V, BuildHasherDefault<ahash::AHasher>>;

/// Fluent `with`-style configuration for builder types.
pub trait Config: Sized {
    fn config(mut self, f: impl FnOnce(&mut Self)) -> Self {
        f(&mut self);
        self
    }
}

impl<T> Config for T {}

/// A cheaply-cloned, shared cancellation flag. Compile and render calls
/// check it between stages/opcodes and bail out with a `Cancelled` error
/// rather than unwind partway through producing an artifact.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_token_observes_cancel_across_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
