//! Identifier generation.
//!
//! Record identifiers and log commit identifiers are opaque string tokens
//! produced by an [`IdGenerator`]. The generator is injected where it is
//! needed rather than reached through global state, so tests can swap in
//! [`SequentialIds`] and get stable identifiers.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Produces a fresh, unique string token on every call.
pub trait IdGenerator: Send + Sync {
    /// Returns a token that has never been returned before.
    fn generate(&self) -> String;
}

/// Shared handle to an identifier generator.
pub type SharedIdGenerator = Arc<dyn IdGenerator>;

/// Random v4 UUID tokens. This is the default generator.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn generate(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Deterministic `prefix-N` tokens counting up from 1.
#[derive(Debug)]
pub struct SequentialIds {
    prefix: String,
    next: AtomicU64,
}

impl SequentialIds {
    /// Creates a generator producing `prefix-1`, `prefix-2`, ...
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }
}

impl IdGenerator for SequentialIds {
    fn generate(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", self.prefix, n)
    }
}

/// Returns the default generator.
pub fn default_generator() -> SharedIdGenerator {
    Arc::new(UuidGenerator)
}

macro_rules! token_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(String);

        impl $name {
            /// Draws a fresh identifier from the generator.
            pub fn generate(ids: &dyn IdGenerator) -> Self {
                Self(ids.generate())
            }

            /// Wraps an existing token.
            pub fn from_string(token: impl Into<String>) -> Self {
                Self(token.into())
            }

            /// Returns the raw token.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

token_type!(
    /// Identifier of an entity, unique within the process.
    RecordId
);

token_type!(
    /// Identifier of a transaction log entry.
    CommitId
);
