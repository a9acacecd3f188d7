//! Generation - Totally ordered snapshot identity
//!
//! Every committed write batch produces exactly one generation. Generations
//! are strictly increasing for the lifetime of a process, including across
//! store swaps after a rebuild or reload.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A totally ordered, opaque generation number.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Generation(u64);

impl Generation {
    /// Generation of an empty store before its first commit.
    pub const ZERO: Generation = Generation(0);

    #[inline]
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    #[inline]
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Returns the generation directly after this one.
    #[inline]
    pub fn next(&self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
