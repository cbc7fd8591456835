//! The analyzed program's transition system.
//!
//! Methods and their program points live in index-addressed arenas; every
//! point owns the repository of facts reachable there. Intra edges carry
//! opaque action handles. The engine never interprets an action, the
//! driver's interpreter does.
//!
//! # Fact deduplication
//!
//! A repository admits a structure by signing it against the structures
//! already present ([`crate::signature::UniqueSignatureStrategy`]) and
//! running the exact equivalence test only inside the matching signature
//! bucket. The returned handle is therefore one per equivalence class, which
//! is what makes fact handles meaningful as identities everywhere else in
//! the engine.
//!
//! # Summaries
//!
//! Every propagation records a (from fact, to fact) edge in the owning
//! method's fact-flow graph. A method summary is the set of (entry fact,
//! exit fact) pairs connected in that graph; [`Program::take_summary_delta`]
//! returns the pairs not yet handed out, which the driver turns into Ret
//! events.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use tracing::trace;

use crate::callgraph::types::{ActionId, MethodId, MethodKind, NodeId};
use crate::signature::UniqueSignatureStrategy;
use crate::tvs::{Fact, FactId, Structure};
use crate::vocab::Vocabulary;

// =============================================================================
// Sites and edges
// =============================================================================

/// Role of a program point within its method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SiteKind {
    /// Method entry.
    Entry,
    /// Method exit.
    Exit,
    /// Plain intraprocedural point.
    Intra,
    /// Resumption point after a call.
    RetSite,
    /// Static call site.
    StaticCallSite,
    /// Virtual call site.
    VirtualCallSite,
    /// Constructor call site.
    ConstructorCallSite,
}

impl SiteKind {
    /// Is this one of the three call-site kinds?
    #[must_use]
    pub fn is_call_site(self) -> bool {
        matches!(
            self,
            SiteKind::StaticCallSite | SiteKind::VirtualCallSite | SiteKind::ConstructorCallSite
        )
    }
}

/// An intraprocedural edge: target point plus the action whose transfer
/// function annotates the step.
#[derive(Debug, Clone, Copy)]
pub struct IntraEdge {
    /// Destination program point.
    pub target: NodeId,
    /// The opaque statement action on the edge.
    pub action: ActionId,
}

// =============================================================================
// Fact repositories
// =============================================================================

/// The reachable-fact set of one program point.
#[derive(Debug)]
struct FactRepository<S> {
    structures: Vec<S>,
}

impl<S: Structure> FactRepository<S> {
    fn new() -> Self {
        Self {
            structures: Vec::new(),
        }
    }

    /// Admit a structure: returns the handle of its equivalence class and
    /// whether the class is new.
    fn insert(&mut self, structure: S, vocab: &Vocabulary) -> (FactId, bool) {
        let strategy = UniqueSignatureStrategy::new(
            &self.structures,
            std::slice::from_ref(&structure),
            vocab,
        );
        let signature = strategy.sign(&structure);
        for (index, existing) in self.structures.iter().enumerate() {
            if strategy.sign(existing) == signature && existing.equivalent(&structure) {
                return (FactId(index as u32), false);
            }
        }
        self.structures.push(structure);
        (FactId(self.structures.len() as u32 - 1), true)
    }

    fn contains(&self, fact: FactId) -> bool {
        (fact.0 as usize) < self.structures.len()
    }

    fn get(&self, fact: FactId) -> &S {
        &self.structures[fact.0 as usize]
    }

    fn fact_ids(&self) -> Vec<FactId> {
        (0..self.structures.len() as u32).map(FactId).collect()
    }
}

// =============================================================================
// The program
// =============================================================================

#[derive(Debug)]
struct MethodData {
    name: String,
    kind: MethodKind,
    entry: NodeId,
    exit: NodeId,
    sites: Vec<NodeId>,
}

#[derive(Debug)]
struct SiteData<S> {
    method: MethodId,
    label: String,
    kind: SiteKind,
    edges: Vec<IntraEdge>,
    ret_site: Option<NodeId>,
    repo: FactRepository<S>,
}

/// The program model: method and site arenas, intra edges, per-site fact
/// repositories and per-method fact-flow graphs.
#[derive(Debug)]
pub struct Program<S: Structure> {
    vocab: Vocabulary,
    methods: Vec<MethodData>,
    sites: Vec<SiteData<S>>,
    flow: FxHashMap<MethodId, FxHashMap<Fact, Vec<Fact>>>,
    reported_summaries: FxHashMap<MethodId, FxHashSet<(FactId, FactId)>>,
}

impl<S: Structure> Program<S> {
    /// A program over the given (completed) vocabulary.
    #[must_use]
    pub fn new(vocab: Vocabulary) -> Self {
        Self {
            vocab,
            methods: Vec::new(),
            sites: Vec::new(),
            flow: FxHashMap::default(),
            reported_summaries: FxHashMap::default(),
        }
    }

    /// The shared vocabulary.
    #[must_use]
    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocab
    }

    // =========================================================================
    // Construction
    // =========================================================================

    /// Add a method; its entry and exit points are created with it.
    pub fn add_method(&mut self, name: impl Into<String>, kind: MethodKind) -> MethodId {
        let method = MethodId(self.methods.len() as u32);
        let name = name.into();
        let entry = self.push_site(method, format!("{name}:entry"), SiteKind::Entry);
        let exit = self.push_site(method, format!("{name}:exit"), SiteKind::Exit);
        self.methods.push(MethodData {
            name,
            kind,
            entry,
            exit,
            sites: vec![entry, exit],
        });
        method
    }

    /// Add a program point to a method.
    pub fn add_site(
        &mut self,
        method: MethodId,
        label: impl Into<String>,
        kind: SiteKind,
    ) -> NodeId {
        debug_assert!(
            !matches!(kind, SiteKind::Entry | SiteKind::Exit),
            "entry/exit points are created with their method"
        );
        let site = self.push_site(method, label.into(), kind);
        self.methods[method.0 as usize].sites.push(site);
        site
    }

    fn push_site(&mut self, method: MethodId, label: String, kind: SiteKind) -> NodeId {
        let site = NodeId(self.sites.len() as u32);
        self.sites.push(SiteData {
            method,
            label,
            kind,
            edges: Vec::new(),
            ret_site: None,
            repo: FactRepository::new(),
        });
        site
    }

    /// Add an intraprocedural edge annotated with a statement action.
    /// Call sites have no intra successors; their flow crosses the call.
    pub fn add_intra_edge(&mut self, from: NodeId, to: NodeId, action: ActionId) {
        debug_assert_eq!(
            self.sites[from.0 as usize].method,
            self.sites[to.0 as usize].method,
            "intra edge crosses methods"
        );
        debug_assert!(
            !self.sites[from.0 as usize].kind.is_call_site(),
            "call site {from:?} cannot have intra successors"
        );
        self.sites[from.0 as usize].edges.push(IntraEdge { target: to, action });
    }

    /// Bind a call site to the point where execution resumes after the call
    /// returns.
    pub fn set_ret_site(&mut self, call_site: NodeId, ret_site: NodeId) {
        debug_assert!(self.sites[call_site.0 as usize].kind.is_call_site());
        debug_assert_eq!(self.sites[ret_site.0 as usize].kind, SiteKind::RetSite);
        debug_assert_eq!(
            self.sites[call_site.0 as usize].method,
            self.sites[ret_site.0 as usize].method
        );
        self.sites[call_site.0 as usize].ret_site = Some(ret_site);
    }

    // =========================================================================
    // Topology queries
    // =========================================================================

    /// The method's human-readable name.
    #[must_use]
    pub fn method_name(&self, method: MethodId) -> &str {
        &self.methods[method.0 as usize].name
    }

    /// The method's dispatch kind.
    #[must_use]
    pub fn method_kind(&self, method: MethodId) -> MethodKind {
        self.methods[method.0 as usize].kind
    }

    /// The method's entry point.
    #[must_use]
    pub fn entry_site(&self, method: MethodId) -> NodeId {
        self.methods[method.0 as usize].entry
    }

    /// The method's exit point.
    #[must_use]
    pub fn exit_site(&self, method: MethodId) -> NodeId {
        self.methods[method.0 as usize].exit
    }

    /// All points of a method.
    #[must_use]
    pub fn sites_of(&self, method: MethodId) -> &[NodeId] {
        &self.methods[method.0 as usize].sites
    }

    /// The method that owns a point.
    #[must_use]
    pub fn method_of(&self, site: NodeId) -> MethodId {
        self.sites[site.0 as usize].method
    }

    /// A point's role.
    #[must_use]
    pub fn site_kind(&self, site: NodeId) -> SiteKind {
        self.sites[site.0 as usize].kind
    }

    /// A point's label.
    #[must_use]
    pub fn site_label(&self, site: NodeId) -> &str {
        &self.sites[site.0 as usize].label
    }

    /// Outgoing intra edges of a point.
    #[must_use]
    pub fn intra_edges(&self, site: NodeId) -> &[IntraEdge] {
        &self.sites[site.0 as usize].edges
    }

    /// The resumption point bound to a call site.
    ///
    /// # Panics
    ///
    /// Panics when no ret site was bound (model-construction defect caught
    /// at first use).
    #[must_use]
    pub fn ret_site(&self, call_site: NodeId) -> NodeId {
        self.sites[call_site.0 as usize]
            .ret_site
            .unwrap_or_else(|| panic!("call site {call_site:?} has no bound ret site"))
    }

    /// Number of methods.
    #[must_use]
    pub fn method_count(&self) -> usize {
        self.methods.len()
    }

    // =========================================================================
    // Facts
    // =========================================================================

    /// Admit a structure into a point's repository. Returns the fact and
    /// whether its equivalence class is new there.
    pub fn add_structure(&mut self, site: NodeId, structure: S) -> (Fact, bool) {
        let vocab = &self.vocab;
        let (id, is_new) = self.sites[site.0 as usize].repo.insert(structure, vocab);
        trace!(?site, ?id, is_new, "structure admitted");
        (Fact::new(site, id), is_new)
    }

    /// Is the fact known at its point?
    #[must_use]
    pub fn contains_fact(&self, fact: Fact) -> bool {
        self.sites[fact.site.0 as usize].repo.contains(fact.id)
    }

    /// The structure behind a fact.
    #[must_use]
    pub fn structure(&self, fact: Fact) -> &S {
        self.sites[fact.site.0 as usize].repo.get(fact.id)
    }

    /// Handles of all facts known at a point.
    #[must_use]
    pub fn facts_at(&self, site: NodeId) -> Vec<FactId> {
        self.sites[site.0 as usize].repo.fact_ids()
    }

    // =========================================================================
    // Fact flow and summaries
    // =========================================================================

    /// Record a propagation edge in the owning method's fact-flow graph.
    /// Returns whether the edge is new.
    pub fn record_flow(&mut self, method: MethodId, from: Fact, to: Fact) -> bool {
        debug_assert_eq!(self.method_of(from.site), method);
        debug_assert_eq!(self.method_of(to.site), method);
        let successors = self
            .flow
            .entry(method)
            .or_default()
            .entry(from)
            .or_default();
        if successors.contains(&to) {
            false
        } else {
            successors.push(to);
            true
        }
    }

    /// The (entry fact, exit fact) pairs newly connected in the method's
    /// fact-flow graph since the last call. Each pair is reported once.
    pub fn take_summary_delta(&mut self, method: MethodId) -> Vec<(FactId, FactId)> {
        let entry = self.entry_site(method);
        let exit = self.exit_site(method);
        let empty = FxHashMap::default();
        let flow = self.flow.get(&method).unwrap_or(&empty);

        let mut delta = Vec::new();
        let reported = self.reported_summaries.entry(method).or_default();
        for entry_fact in self.sites[entry.0 as usize].repo.fact_ids() {
            // Depth-first reachability from this entry fact.
            let start = Fact::new(entry, entry_fact);
            let mut seen: FxHashSet<Fact> = FxHashSet::default();
            let mut stack = vec![start];
            while let Some(fact) = stack.pop() {
                if !seen.insert(fact) {
                    continue;
                }
                if fact.site == exit && reported.insert((entry_fact, fact.id)) {
                    delta.push((entry_fact, fact.id));
                }
                if let Some(successors) = flow.get(&fact) {
                    stack.extend(successors.iter().copied());
                }
            }
        }
        delta
    }
}

// =============================================================================
// Tests
// =============================================================================
