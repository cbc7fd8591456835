//! The contract the external three-valued-structure collaborator fulfils.
//!
//! The engine never inspects element identities or predicate contents beyond
//! the operations of the [`Structure`] trait: it evaluates and updates
//! predicate tuples, manages the element set, copies, blurs, coerces, and
//! asks for exact structural equivalence. Everything else (the concrete
//! node/predicate storage, how blur summarizes, how coerce enforces
//! integrity constraints) belongs to the implementor.

use serde::{Deserialize, Serialize};

use crate::callgraph::types::NodeId;
use crate::logic::Kleene;
use crate::vocab::PredicateId;

/// Handle of an element ("individual") within one structure. Only
/// meaningful to the structure that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ElementId(pub u32);

/// Handle of a fact within the fact repository of one program point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FactId(pub u32);

/// An abstract state tagged with the program point whose reachable-set owns
/// it. Two facts are the same state exactly when they carry the same handle
/// of the same point; the repository guarantees one handle per equivalence
/// class at insertion time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fact {
    /// The program point this fact belongs to.
    pub site: NodeId,
    /// The fact's handle within that point's repository.
    pub id: FactId,
}

impl Fact {
    /// Tie a fact handle to its containing program point.
    #[must_use]
    pub fn new(site: NodeId, id: FactId) -> Self {
        Self { site, id }
    }
}

/// A three-valued logical structure: a finite element set plus, for every
/// predicate of matching arity, a Kleene value per element tuple.
///
/// Implementations decide the default value of unwritten tuples (`False` is
/// the conventional choice) and own the abstraction (`blur`) and integrity
/// (`coerce`) semantics.
pub trait Structure: Clone {
    /// Evaluate a nullary predicate.
    fn eval0(&self, predicate: PredicateId) -> Kleene;

    /// Evaluate a unary predicate on an element.
    fn eval1(&self, predicate: PredicateId, element: ElementId) -> Kleene;

    /// Evaluate a binary predicate on an element pair.
    fn eval2(&self, predicate: PredicateId, from: ElementId, to: ElementId) -> Kleene;

    /// Update a nullary predicate.
    fn update0(&mut self, predicate: PredicateId, value: Kleene);

    /// Update a unary predicate on an element.
    fn update1(&mut self, predicate: PredicateId, element: ElementId, value: Kleene);

    /// Update a binary predicate on an element pair.
    fn update2(&mut self, predicate: PredicateId, from: ElementId, to: ElementId, value: Kleene);

    /// The current element set.
    fn elements(&self) -> Vec<ElementId>;

    /// Allocate a fresh element.
    fn new_element(&mut self) -> ElementId;

    /// Remove an element and every tuple mentioning it.
    fn remove_element(&mut self, element: ElementId);

    /// Apply the abstraction: forget distinguishing information so the state
    /// space stays finite.
    fn blur(&mut self);

    /// Enforce integrity constraints. Returns `false` when the structure is
    /// infeasible and must be discarded.
    fn coerce(&mut self) -> bool;

    /// Exact structural equivalence (isomorphism). Equal canonic signatures
    /// are necessary but not sufficient; this is the authoritative test.
    fn equivalent(&self, other: &Self) -> bool;

    /// The elements on which a unary predicate evaluates to something other
    /// than `False`, with their values.
    fn satisfying(&self, predicate: PredicateId) -> Vec<(ElementId, Kleene)>;

    /// Number of elements on which a unary predicate evaluates to something
    /// other than `False`.
    fn count_satisfying(&self, predicate: PredicateId) -> usize {
        self.satisfying(predicate).len()
    }
}
