//! Session configuration.

/// Configuration for a selection session.
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// Seed for tie-breaking (None = seeded from OS entropy)
    pub rng_seed: Option<u64>,
}

impl SessionConfig {
    /// Use a fixed seed so tie-breaks are reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }
}
