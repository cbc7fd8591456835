//! Propositional three-valued logic with join and partial meet.
//!
//! The domain has three values ordered two ways:
//!
//! ```text
//!   truth order:        False < Unknown < True     (used by and/or)
//!
//!   information order:       Unknown
//!                            /     \
//!                        False     True            (used by join/less/agree)
//! ```
//!
//! `Unknown` means "not decided by the abstraction". It is a legitimate
//! value, never an error, and propagates through every operation.

use serde::{Deserialize, Serialize};

use crate::error::{Result, ShapeError};

/// A Kleene truth value.
///
/// The discriminants follow the truth order so that `and`/`or` reduce to
/// min/max.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kleene {
    /// Definitely false (written `0`).
    False = 0,
    /// Not decided by the abstraction (written `1/2`).
    Unknown = 1,
    /// Definitely true (written `1`).
    True = 2,
}

impl Kleene {
    /// Join in the information order: equal values stay, disagreement loses
    /// precision.
    #[must_use]
    pub fn join(self, other: Kleene) -> Kleene {
        if self == other {
            self
        } else {
            Kleene::Unknown
        }
    }

    /// Partial meet in the information order.
    ///
    /// Equal values stay; `Unknown` yields to the more precise operand. The
    /// meet of the contradictory certain values `False` and `True` is not
    /// defined in this domain and is reported as an error. Callers that may
    /// observe non-agreeing values must pre-filter with [`Kleene::agree`] or
    /// use [`Kleene::meet_partial`].
    pub fn meet(self, other: Kleene) -> Result<Kleene> {
        self.meet_partial(other).ok_or(ShapeError::ContradictoryMeet)
    }

    /// Meet that returns `None` instead of an error for the contradictory
    /// `{False, True}` case.
    #[must_use]
    pub fn meet_partial(self, other: Kleene) -> Option<Kleene> {
        if self == other {
            Some(self)
        } else if self == Kleene::Unknown {
            Some(other)
        } else if other == Kleene::Unknown {
            Some(self)
        } else {
            None
        }
    }

    /// Three-valued conjunction: minimum in the truth order.
    #[must_use]
    pub fn and(self, other: Kleene) -> Kleene {
        self.min(other)
    }

    /// Three-valued disjunction: maximum in the truth order.
    #[must_use]
    pub fn or(self, other: Kleene) -> Kleene {
        self.max(other)
    }

    /// Three-valued negation: swaps `False` and `True`, fixes `Unknown`.
    #[must_use]
    pub fn not(self) -> Kleene {
        match self {
            Kleene::False => Kleene::True,
            Kleene::Unknown => Kleene::Unknown,
            Kleene::True => Kleene::False,
        }
    }

    /// Is `self` before `other` in the information order: true iff `other`
    /// is `Unknown` or the values are equal.
    #[must_use]
    pub fn less(self, other: Kleene) -> bool {
        other == Kleene::Unknown || self == other
    }

    /// Do the two values agree in the information order? False only for the
    /// contradictory pair `{False, True}`.
    #[must_use]
    pub fn agree(self, other: Kleene) -> bool {
        self.less(other) || other.less(self)
    }

    /// Is the value definite (not `Unknown`)?
    #[must_use]
    pub fn is_definite(self) -> bool {
        self != Kleene::Unknown
    }
}

impl std::fmt::Display for Kleene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Kleene::False => write!(f, "0"),
            Kleene::Unknown => write!(f, "1/2"),
            Kleene::True => write!(f, "1"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
