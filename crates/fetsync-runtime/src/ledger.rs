#![forbid(unsafe_code)]

//! Generation ledger: cooperative invalidation of in-flight work.
//!
//! Every navigation bumps the ledger. Work started under an older token is
//! never cancelled directly; instead every result is tagged with the token it
//! was issued under and the consumer checks [`GenerationLedger::is_current`]
//! before applying it.
//!
//! ```
//! use fetsync_runtime::ledger::GenerationLedger;
//!
//! let ledger = GenerationLedger::new();
//! let issued = ledger.current();
//!
//! // A navigation supersedes everything issued before it.
//! let next = ledger.bump();
//! assert!(!ledger.is_current(issued));
//! assert!(ledger.is_current(next));
//! ```

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

/// Opaque, totally ordered generation token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(
    feature = "engine-config",
    derive(serde::Serialize, serde::Deserialize),
    serde(transparent)
)]
pub struct GenerationToken(u64);

impl GenerationToken {
    /// The token that is current before the first navigation.
    pub const INITIAL: Self = Self(0);

    /// Construct a token from its raw value.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw counter value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for GenerationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen#{}", self.0)
    }
}

/// Monotonic token source.
///
/// Cloning yields another handle to the same counter, so scheduled
/// callbacks can capture a ledger cheaply and compare against the live
/// value when they fire.
#[derive(Clone, Default)]
pub struct GenerationLedger {
    current: Rc<Cell<u64>>,
}

impl GenerationLedger {
    /// Create a ledger whose current token is [`GenerationToken::INITIAL`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance to a new generation and return it. All previously issued
    /// tokens become stale.
    pub fn bump(&self) -> GenerationToken {
        let next = self.current.get().saturating_add(1);
        self.current.set(next);
        tracing::trace!(generation = next, "generation bumped");
        GenerationToken(next)
    }

    /// The token currently considered live.
    #[must_use]
    pub fn current(&self) -> GenerationToken {
        GenerationToken(self.current.get())
    }

    /// Returns `true` if `token` is the live generation.
    #[inline]
    #[must_use]
    pub fn is_current(&self, token: GenerationToken) -> bool {
        self.current.get() == token.0
    }
}

impl fmt::Debug for GenerationLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationLedger")
            .field("current", &self.current.get())
            .finish()
    }
}
