//! Crate-wide error type and result alias.
//!
//! Model-construction failures (duplicate predicates, conflicting call-site
//! registrations, mutation after the analysis phase has started) are typed
//! errors: they indicate a defect in the analyzed-program model and must stop
//! construction before the fixpoint runs. Invariant violations *during* the
//! fixpoint are engine bugs and are enforced with assertions instead.

use crate::callgraph::types::{MethodId, NodeId};

/// Errors reported while building or querying the analysis model.
#[derive(Debug, thiserror::Error)]
pub enum ShapeError {
    /// A predicate with this name is already registered (any signature).
    #[error("predicate '{0}' is already registered")]
    DuplicatePredicate(String),

    /// Predicates are limited to arities 0, 1 and 2.
    #[error("predicate '{name}' has unsupported arity {arity} (must be 0..=2)")]
    UnsupportedArity { name: String, arity: usize },

    /// The unique flag is legal only for unary predicates.
    #[error("predicate '{name}' of arity {arity} cannot be unique (unary only)")]
    UniqueRequiresUnary { name: String, arity: usize },

    /// Abstraction predicates must have arity at most 1.
    #[error("predicate '{name}' of arity {arity} cannot be an abstraction predicate")]
    AbstractionArity { name: String, arity: usize },

    /// function/invfunction/acyclic/reflexive are legal only for binary predicates.
    #[error("predicate '{name}' of arity {arity} cannot carry the {flag} property (binary only)")]
    BinaryFlagArity {
        name: String,
        arity: usize,
        flag: &'static str,
    },

    /// The same program point was registered as two different call-site kinds,
    /// or twice under the same kind.
    #[error("call site {site:?} in method {caller:?} is already registered")]
    DuplicateCallSite { caller: MethodId, site: NodeId },

    /// A virtual call site already lists this callee among its targets.
    #[error("virtual call site {site:?} already targets method {callee:?}")]
    DuplicateVirtualTarget { site: NodeId, callee: MethodId },

    /// A method was registered as a call target twice.
    #[error("method {0:?} is already a registered call target")]
    DuplicateTarget(MethodId),

    /// The call graph was mutated after `complete_definitions()`.
    #[error("call graph definition is complete; no further registration is allowed")]
    AnalysisStarted,

    /// Kleene meet of the contradictory certain values False and True.
    #[error("Kleene meet of contradictory certain values (0 and 1) is undefined")]
    ContradictoryMeet,

    /// The fixpoint loop hit its iteration bound before stabilizing.
    #[error("iteration bound of {0} reached before fixpoint")]
    IterationBound(u64),
}

/// Convenience result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ShapeError>;
