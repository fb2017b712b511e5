//! Opaque handle identifiers.
//!
//! Identifiers are 20 alphanumeric characters drawn from the thread-local
//! ChaCha generator, which is cryptographically strong and seeded once from
//! the OS. Registries call [`IdGenerator::generate_unique`] while holding
//! their map lock, so the uniqueness check and the insert are atomic.

use crate::error::RegistryError;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::fmt;
use std::sync::Arc;

/// Length of every generated identifier.
pub const ID_LENGTH: usize = 20;

/// Default number of fresh ids tried before giving up.
pub const DEFAULT_ATTEMPTS: usize = 8;

type IdSource = Arc<dyn Fn() -> String + Send + Sync>;

/// Generator for connection and statement identifiers.
#[derive(Clone)]
pub struct IdGenerator {
    source: IdSource,
    attempts: usize,
}

impl fmt::Debug for IdGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdGenerator")
            .field("attempts", &self.attempts)
            .finish()
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGenerator {
    /// Create a generator backed by the thread-local CSPRNG.
    pub fn new() -> Self {
        Self {
            source: Arc::new(random_id),
            attempts: DEFAULT_ATTEMPTS,
        }
    }

    /// Create a generator backed by a custom source.
    pub fn with_source<F>(source: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        Self {
            source: Arc::new(source),
            attempts: DEFAULT_ATTEMPTS,
        }
    }

    /// Set how many candidates are tried before failing.
    pub fn with_attempts(mut self, attempts: usize) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    /// Produce one candidate identifier.
    pub fn generate(&self) -> String {
        (self.source)()
    }

    /// Produce an identifier for which `is_taken` is false.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::IdExhausted` if every candidate collided.
    pub fn generate_unique(
        &self,
        is_taken: impl Fn(&str) -> bool,
    ) -> Result<String, RegistryError> {
        for _ in 0..self.attempts {
            let candidate = self.generate();
            if !is_taken(&candidate) {
                return Ok(candidate);
            }
            tracing::debug!(candidate = %candidate, "Identifier collision, regenerating");
        }
        Err(RegistryError::IdExhausted {
            attempts: self.attempts,
        })
    }
}

/// Generate a random 20-character alphanumeric identifier.
pub fn random_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ID_LENGTH)
        .map(char::from)
        .collect()
}
