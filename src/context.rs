//! Calling-context bookkeeping for precise call/return matching.
//!
//! For every (callee method, fact at the callee's entry) pair the table
//! records which *basic contexts*, the (call-site program point, fact at
//! the call site) pairs, can reach that entry fact, and the refined call facts
//! each basic context contributes. When a callee's exit fact is computed,
//! the driver walks exactly these contexts instead of returning to every
//! caller indiscriminately.
//!
//! # Consistency contract
//!
//! The table is monotone and append-consistent: once a basic context has
//! been registered with a non-empty refined-fact set, re-registering the
//! same basic context must supply a set-equal collection. The table never
//! forgets or overwrites; it only gains new basic contexts. A violation is
//! an engine bug, enforced with debug assertions, never a recoverable
//! runtime condition.

use std::collections::{BTreeMap, BTreeSet};

use rustc_hash::FxHashMap;
use serde::Serialize;
use tracing::debug;

use crate::callgraph::types::{MethodId, NodeId};
use crate::error::{Result, ShapeError};
use crate::tvs::FactId;

// =============================================================================
// Basic contexts
// =============================================================================

/// A basic context: the call-site program point together with the fact that
/// reached it on the calling side. Hash/equality are structural over both
/// fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct BasicContext {
    /// The call-site program point.
    pub site: NodeId,
    /// The calling-side fact at that point.
    pub call_fact: FactId,
}

impl BasicContext {
    /// Pair a call site with its calling fact.
    #[must_use]
    pub fn new(site: NodeId, call_fact: FactId) -> Self {
        Self { site, call_fact }
    }
}

/// Outcome of registering a basic context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registered {
    /// The basic context was not known before; its refined facts are stored.
    New,
    /// The basic context was already known with a set-equal contribution.
    Known,
}

// =============================================================================
// Per (callee, entry fact) contexts
// =============================================================================

#[derive(Debug)]
struct ContextEntry {
    caller: MethodId,
    refined: BTreeSet<FactId>,
}

/// The calling contexts of one (callee method, entry fact) pair: a map from
/// basic contexts to the refined call facts each contributes.
#[derive(Debug, Default)]
pub struct CallingContext {
    entries: BTreeMap<BasicContext, ContextEntry>,
}

impl CallingContext {
    /// Register a basic context's contribution.
    ///
    /// Returns [`Registered::New`] when the basic context was absent and its
    /// refined facts are now stored, [`Registered::Known`] when it was
    /// already present, in which case the stored and supplied collections
    /// must be set-equal (debug assertion).
    pub fn update(
        &mut self,
        caller: MethodId,
        site: NodeId,
        call_fact: FactId,
        refined: &BTreeSet<FactId>,
    ) -> Registered {
        debug_assert!(!refined.is_empty(), "empty refined-fact set for {site:?}");
        let bc = BasicContext::new(site, call_fact);
        match self.entries.get(&bc) {
            None => {
                self.entries.insert(
                    bc,
                    ContextEntry {
                        caller,
                        refined: refined.clone(),
                    },
                );
                Registered::New
            }
            Some(existing) => {
                debug_assert_eq!(
                    existing.caller, caller,
                    "basic context {bc:?} re-registered from a different caller"
                );
                debug_assert_eq!(
                    &existing.refined, refined,
                    "basic context {bc:?} re-registered with a different refined-fact set"
                );
                Registered::Known
            }
        }
    }

    /// All registered basic contexts, in deterministic order.
    pub fn basic_contexts(&self) -> impl Iterator<Item = BasicContext> + '_ {
        self.entries.keys().copied()
    }

    /// The distinct call sites behind the registered basic contexts.
    #[must_use]
    pub fn call_sites(&self) -> BTreeSet<NodeId> {
        self.entries.keys().map(|bc| bc.site).collect()
    }

    /// The refined call facts a basic context contributes.
    #[must_use]
    pub fn refined_facts(&self, bc: BasicContext) -> Option<&BTreeSet<FactId>> {
        self.entries.get(&bc).map(|e| &e.refined)
    }

    /// The caller method behind a basic context.
    #[must_use]
    pub fn caller_of(&self, bc: BasicContext) -> Option<MethodId> {
        self.entries.get(&bc).map(|e| e.caller)
    }

    /// Number of registered basic contexts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Is the context empty?
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// =============================================================================
// The table
// =============================================================================

/// Context-table statistics for one method.
#[derive(Debug, Clone, Serialize)]
pub struct MethodContextStats {
    /// The method.
    pub method: MethodId,
    /// Distinct facts at the method's entry.
    pub entry_facts: usize,
    /// Basic contexts summed over all entry facts.
    pub calling_contexts: usize,
}

/// All calling contexts of all call targets: method -> entry fact ->
/// [`CallingContext`].
#[derive(Debug, Default)]
pub struct ContextTable {
    targets: FxHashMap<MethodId, BTreeMap<FactId, CallingContext>>,
}

impl ContextTable {
    /// An empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a method as a call target with an empty context map. Every
    /// target is added exactly once, before the analysis starts.
    pub fn add_target(&mut self, method: MethodId) -> Result<()> {
        if self.targets.contains_key(&method) {
            return Err(ShapeError::DuplicateTarget(method));
        }
        self.targets.insert(method, BTreeMap::new());
        Ok(())
    }

    /// Is the method a registered call target?
    #[must_use]
    pub fn contains_target(&self, method: MethodId) -> bool {
        self.targets.contains_key(&method)
    }

    /// Record that the basic context (site, `call_fact`) of `caller` reaches
    /// each of `facts_at_entry` in `callee`, contributing `refined` call
    /// facts.
    ///
    /// `facts_at_entry` are the pre-existing facts of the callee this call
    /// might reach; both it and `refined` must be non-empty, and the callee
    /// must be a registered target (debug assertions: model construction
    /// has already completed when this runs).
    pub fn add_to_calling_context(
        &mut self,
        callee: MethodId,
        facts_at_entry: &[FactId],
        caller: MethodId,
        site: NodeId,
        call_fact: FactId,
        refined: &BTreeSet<FactId>,
    ) {
        debug_assert!(!facts_at_entry.is_empty(), "no entry facts for {callee:?}");
        debug_assert!(!refined.is_empty(), "no refined call facts at {site:?}");
        let contexts = self
            .targets
            .get_mut(&callee)
            .unwrap_or_else(|| panic!("method {callee:?} is not a registered call target"));

        for &entry_fact in facts_at_entry {
            let ctx = contexts.entry(entry_fact).or_default();
            let registered = ctx.update(caller, site, call_fact, refined);
            debug!(
                ?callee,
                ?entry_fact,
                ?site,
                ?call_fact,
                ?registered,
                "calling context updated"
            );
        }
    }

    /// The calling context of a (method, entry fact) pair.
    ///
    /// # Panics
    ///
    /// Panics when the pair has no registered context (engine bug: Ret
    /// events only exist for entries that were reached through a call).
    #[must_use]
    pub fn calling_context(&self, method: MethodId, entry_fact: FactId) -> &CallingContext {
        self.targets
            .get(&method)
            .and_then(|m| m.get(&entry_fact))
            .unwrap_or_else(|| {
                panic!("no calling context for method {method:?} entry fact {entry_fact:?}")
            })
    }

    /// All calling contexts of a method, keyed by entry fact.
    pub fn calling_contexts(
        &self,
        method: MethodId,
    ) -> impl Iterator<Item = (FactId, &CallingContext)> {
        self.targets
            .get(&method)
            .into_iter()
            .flat_map(|m| m.iter().map(|(&f, c)| (f, c)))
    }

    /// All methods that call the given method, flattened over every entry
    /// fact and basic context.
    #[must_use]
    pub fn callers(&self, method: MethodId) -> BTreeSet<MethodId> {
        self.calling_contexts(method)
            .flat_map(|(_, ctx)| {
                ctx.basic_contexts()
                    .filter_map(|bc| ctx.caller_of(bc))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Per-method statistics: entry facts and basic contexts.
    #[must_use]
    pub fn stats(&self) -> Vec<MethodContextStats> {
        let mut stats: Vec<_> = self
            .targets
            .iter()
            .map(|(&method, contexts)| MethodContextStats {
                method,
                entry_facts: contexts.len(),
                calling_contexts: contexts.values().map(CallingContext::len).sum(),
            })
            .collect();
        stats.sort_by_key(|s| s.method);
        stats
    }
}

// =============================================================================
// Tests
// =============================================================================
