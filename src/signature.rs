//! Canonic signatures: cheap merge-candidate bucketing for structures.
//!
//! Freshly discovered structures must be checked against every structure
//! already known at the same program point; doing that with the exact
//! equivalence test alone is an O(n) isomorphism scan per insertion. The
//! signature strategy makes this tractable with the standard two-phase
//! "hash bucket then verify" scheme: an approximate, information-order
//! respecting signature built from the nullary and unique-unary predicates
//! buckets the candidates, and only structures in the same bucket reach the
//! exact test.
//!
//! Equal signatures are necessary but never sufficient for equivalence.
//!
//! # Working-set filtering
//!
//! The strategy is built for a *pair of structure collections* sharing a
//! vocabulary. Before any signing, every structure of both collections
//! filters the working sets:
//!
//! - a nullary predicate is dropped as soon as any structure evaluates it
//!   `Unknown`;
//! - a unique predicate is dropped if any structure has more than one
//!   satisfying element, or one whose truth value is `Unknown`;
//! - while a unique predicate's single element is inspected, every unary
//!   predicate that is `Unknown` on that element is dropped.
//!
//! This pre-filtering keeps `Unknown` noise out of the signatures, so two
//! structures never land in different buckets (or the same bucket) because
//! of values the abstraction has not decided.

use crate::logic::Kleene;
use crate::tvs::Structure;
use crate::vocab::{PredicateId, Vocabulary};

// =============================================================================
// Canonic names
// =============================================================================

/// An ordered tuple of Kleene values identifying a signature bucket.
///
/// Values must always be appended in the same predicate order for two names
/// to be comparable.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CanonicName {
    values: Vec<Kleene>,
}

impl CanonicName {
    /// An empty name.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty name with room for `capacity` values.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            values: Vec::with_capacity(capacity),
        }
    }

    /// Append a value to the name.
    pub fn add(&mut self, value: Kleene) {
        self.values.push(value);
    }

    /// Number of values in the name.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Is the name empty?
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Pairwise information-order agreement: true when no position holds the
    /// contradictory pair `{False, True}`. Names of different lengths never
    /// agree.
    #[must_use]
    pub fn agrees_with(&self, other: &CanonicName) -> bool {
        self.values.len() == other.values.len()
            && self
                .values
                .iter()
                .zip(&other.values)
                .all(|(l, r)| l.agree(*r))
    }

    /// Pairwise information-order comparison: true when every value of
    /// `self` is at least as precise as the corresponding value of `other`.
    #[must_use]
    pub fn less_than_or_equal(&self, other: &CanonicName) -> bool {
        self.values.len() == other.values.len()
            && self
                .values
                .iter()
                .zip(&other.values)
                .all(|(l, r)| l.less(*r))
    }
}

impl std::fmt::Display for CanonicName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, v) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{v}")?;
        }
        Ok(())
    }
}

// =============================================================================
// Signature strategy
// =============================================================================

/// Signature strategy over the nullary and unique-unary predicates of two
/// structure collections.
///
/// Working sets are fixed at construction; [`UniqueSignatureStrategy::sign`]
/// may then be applied to any structure of either collection.
#[derive(Debug)]
pub struct UniqueSignatureStrategy {
    nullary: Vec<PredicateId>,
    unique: Vec<PredicateId>,
    unary: Vec<PredicateId>,
}

impl UniqueSignatureStrategy {
    /// Build the working sets from the vocabulary and filter them against
    /// every structure of both collections.
    pub fn new<S: Structure>(left: &[S], right: &[S], vocab: &Vocabulary) -> Self {
        let mut strategy = Self {
            nullary: vocab.nullary().to_vec(),
            unique: vocab.unique().to_vec(),
            unary: vocab.unary().to_vec(),
        };
        for structure in left.iter().chain(right) {
            strategy.filter_unknown_nullary(structure);
            strategy.filter_unknown_unique(structure);
        }
        strategy
    }

    /// Sign a structure: one value per surviving nullary predicate, then per
    /// surviving unique predicate either the unary-predicate vector of its
    /// single satisfying element or a single `False` when no element
    /// satisfies it.
    pub fn sign<S: Structure>(&self, structure: &S) -> CanonicName {
        let mut name = CanonicName::with_capacity(self.nullary.len() + self.unique.len());
        for &predicate in &self.nullary {
            name.add(structure.eval0(predicate));
        }
        for &unique in &self.unique {
            let satisfying = structure.satisfying(unique);
            match satisfying.first() {
                Some(&(element, value)) => {
                    // Filtering already dropped unique predicates with more
                    // than one satisfying element or an Unknown value.
                    debug_assert_eq!(satisfying.len(), 1);
                    debug_assert_eq!(value, Kleene::True);
                    for &unary in &self.unary {
                        name.add(structure.eval1(unary, element));
                    }
                }
                None => name.add(Kleene::False),
            }
        }
        name
    }

    /// Surviving nullary predicates, in vocabulary order.
    pub fn nullary(&self) -> &[PredicateId] {
        &self.nullary
    }

    /// Surviving unique predicates, in vocabulary order.
    pub fn unique(&self) -> &[PredicateId] {
        &self.unique
    }

    /// Surviving unary predicates, in vocabulary order.
    pub fn unary(&self) -> &[PredicateId] {
        &self.unary
    }

    fn filter_unknown_nullary<S: Structure>(&mut self, structure: &S) {
        self.nullary
            .retain(|&p| structure.eval0(p) != Kleene::Unknown);
    }

    fn filter_unknown_unique<S: Structure>(&mut self, structure: &S) {
        let mut kept = Vec::with_capacity(self.unique.len());
        for &unique in &self.unique {
            let satisfying = structure.satisfying(unique);
            match satisfying.as_slice() {
                [] => kept.push(unique),
                [(element, value)] => {
                    if *value == Kleene::Unknown {
                        continue;
                    }
                    // The single element is known to satisfy; drop the unary
                    // predicates that are undecided on it.
                    self.unary
                        .retain(|&q| structure.eval1(q, *element) != Kleene::Unknown);
                    kept.push(unique);
                }
                _ => {}
            }
        }
        self.unique = kept;
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use rustc_hash::FxHashMap;

    use super::*;
    use crate::tvs::ElementId;
    use crate::vocab::PredicateSpec;

    /// Minimal map-backed structure, enough for the strategy's contract.
    #[derive(Debug, Clone, Default)]
    struct TestTvs {
        elements: Vec<ElementId>,
        next_element: u32,
        nullary: FxHashMap<PredicateId, Kleene>,
        unary: FxHashMap<(PredicateId, ElementId), Kleene>,
    }

    impl TestTvs {
        fn set0(&mut self, p: PredicateId, v: Kleene) -> &mut Self {
            self.nullary.insert(p, v);
            self
        }

        fn set1(&mut self, p: PredicateId, e: ElementId, v: Kleene) -> &mut Self {
            self.unary.insert((p, e), v);
            self
        }
    }

    impl Structure for TestTvs {
        fn eval0(&self, p: PredicateId) -> Kleene {
            self.nullary.get(&p).copied().unwrap_or(Kleene::False)
        }

        fn eval1(&self, p: PredicateId, e: ElementId) -> Kleene {
            self.unary.get(&(p, e)).copied().unwrap_or(Kleene::False)
        }

        fn eval2(&self, _p: PredicateId, _from: ElementId, _to: ElementId) -> Kleene {
            Kleene::False
        }

        fn update0(&mut self, p: PredicateId, v: Kleene) {
            self.nullary.insert(p, v);
        }

        fn update1(&mut self, p: PredicateId, e: ElementId, v: Kleene) {
            self.unary.insert((p, e), v);
        }

        fn update2(&mut self, _p: PredicateId, _f: ElementId, _t: ElementId, _v: Kleene) {}

        fn elements(&self) -> Vec<ElementId> {
            self.elements.clone()
        }

        fn new_element(&mut self) -> ElementId {
            let e = ElementId(self.next_element);
            self.next_element += 1;
            self.elements.push(e);
            e
        }

        fn remove_element(&mut self, element: ElementId) {
            self.elements.retain(|&e| e != element);
            self.unary.retain(|&(_, e), _| e != element);
        }

        fn blur(&mut self) {}

        fn coerce(&mut self) -> bool {
            true
        }

        fn equivalent(&self, other: &Self) -> bool {
            self.nullary == other.nullary && self.unary == other.unary
        }

        fn satisfying(&self, p: PredicateId) -> Vec<(ElementId, Kleene)> {
            let mut found: Vec<_> = self
                .unary
                .iter()
                .filter(|((q, _), v)| *q == p && **v != Kleene::False)
                .map(|(&(_, e), &v)| (e, v))
                .collect();
            found.sort_by_key(|&(e, _)| e);
            found
        }
    }

    fn vocab_with(specs: Vec<PredicateSpec>) -> (Vocabulary, Vec<PredicateId>) {
        let mut vocab = Vocabulary::new();
        let ids = specs
            .into_iter()
            .map(|s| vocab.create_predicate(s).unwrap())
            .collect();
        (vocab, ids)
    }

    #[test]
    fn test_equal_signatures_for_matching_structures() {
        let (vocab, ids) = vocab_with(vec![
            PredicateSpec::nullary("flag"),
            PredicateSpec::unary("x").unique(),
            PredicateSpec::unary("marked"),
        ]);
        let (flag, x, marked) = (ids[0], ids[1], ids[2]);

        let mut a = TestTvs::default();
        let ea = a.new_element();
        a.set0(flag, Kleene::True)
            .set1(x, ea, Kleene::True)
            .set1(marked, ea, Kleene::True);

        // Same nullary/unique picture over a different element identity.
        let mut b = TestTvs::default();
        b.new_element();
        let eb = b.new_element();
        b.set0(flag, Kleene::True)
            .set1(x, eb, Kleene::True)
            .set1(marked, eb, Kleene::True);

        let strategy =
            UniqueSignatureStrategy::new(std::slice::from_ref(&a), std::slice::from_ref(&b), &vocab);
        assert_eq!(strategy.sign(&a), strategy.sign(&b));
    }

    #[test]
    fn test_nullary_difference_separates_signatures() {
        let (vocab, ids) = vocab_with(vec![PredicateSpec::nullary("flag")]);
        let flag = ids[0];

        let mut a = TestTvs::default();
        a.set0(flag, Kleene::True);
        let mut b = TestTvs::default();
        b.set0(flag, Kleene::False);

        let strategy =
            UniqueSignatureStrategy::new(std::slice::from_ref(&a), std::slice::from_ref(&b), &vocab);
        assert_eq!(strategy.nullary(), &[flag]);
        assert_ne!(strategy.sign(&a), strategy.sign(&b));
    }

    #[test]
    fn test_unknown_nullary_is_filtered() {
        let (vocab, ids) = vocab_with(vec![
            PredicateSpec::nullary("decided"),
            PredicateSpec::nullary("undecided"),
        ]);
        let (decided, undecided) = (ids[0], ids[1]);

        let mut a = TestTvs::default();
        a.set0(decided, Kleene::True).set0(undecided, Kleene::Unknown);
        let mut b = TestTvs::default();
        b.set0(decided, Kleene::True).set0(undecided, Kleene::False);

        let strategy =
            UniqueSignatureStrategy::new(std::slice::from_ref(&a), std::slice::from_ref(&b), &vocab);
        // The undecided predicate cannot separate the two structures.
        assert_eq!(strategy.nullary(), &[decided]);
        assert_eq!(strategy.sign(&a), strategy.sign(&b));
    }

    #[test]
    fn test_unique_with_multiple_satisfying_elements_is_dropped() {
        let (vocab, ids) = vocab_with(vec![PredicateSpec::unary("x").unique()]);
        let x = ids[0];

        let mut a = TestTvs::default();
        let e0 = a.new_element();
        let e1 = a.new_element();
        a.set1(x, e0, Kleene::True).set1(x, e1, Kleene::Unknown);

        let strategy = UniqueSignatureStrategy::new(std::slice::from_ref(&a), &[], &vocab);
        assert!(strategy.unique().is_empty());
        assert!(strategy.sign(&a).is_empty());
    }

    #[test]
    fn test_absent_unique_contributes_false() {
        let (vocab, ids) = vocab_with(vec![
            PredicateSpec::unary("x").unique(),
            PredicateSpec::unary("marked"),
        ]);
        let (x, marked) = (ids[0], ids[1]);

        // One structure has the unique element, the other does not.
        let mut a = TestTvs::default();
        let ea = a.new_element();
        a.set1(x, ea, Kleene::True).set1(marked, ea, Kleene::True);
        let b = TestTvs::default();

        let strategy =
            UniqueSignatureStrategy::new(std::slice::from_ref(&a), std::slice::from_ref(&b), &vocab);
        let sig_a = strategy.sign(&a);
        let sig_b = strategy.sign(&b);
        // a contributes the unary vector of the element, b a single False.
        assert_eq!(sig_a.len(), 2);
        assert_eq!(sig_b.len(), 1);
        assert_ne!(sig_a, sig_b);
    }

    #[test]
    fn test_canonic_name_orders() {
        let mut precise = CanonicName::new();
        precise.add(Kleene::True);
        precise.add(Kleene::False);
        let mut blurred = CanonicName::new();
        blurred.add(Kleene::True);
        blurred.add(Kleene::Unknown);
        let mut contra = CanonicName::new();
        contra.add(Kleene::False);
        contra.add(Kleene::False);

        assert!(precise.less_than_or_equal(&blurred));
        assert!(!blurred.less_than_or_equal(&precise));
        assert!(precise.agrees_with(&blurred));
        assert!(!precise.agrees_with(&contra));
        assert_eq!(format!("{precise}"), "1.0");
    }
}
