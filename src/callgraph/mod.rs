//! Interprocedural call graph.
//!
//! A static table of call sites bound to caller, call-site program point,
//! callee, and the call/return/(guard) actions that define the effect of
//! crossing the edge. Construction and querying are strictly phased:
//! everything is registered single-threaded before the analysis starts,
//! `complete_definitions()` flips the phase flag, and any later mutation is
//! a typed error rather than undefined behavior.
//!
//! # Call-site kinds
//!
//! A given program point is exactly one call-site kind. Static and
//! constructor sites resolve to a single callee; a virtual site accumulates
//! a map of possible callees, each with its own guard action. Registering
//! the same point under a second kind, or the same (virtual site, callee)
//! pair twice, is a model-construction defect and fails loudly.
//!
//! The table of calling contexts lives alongside the call sites (the driver
//! updates it as calls are processed) and is reachable through
//! [`CallGraph::contexts`].

pub mod types;

use std::collections::BTreeSet;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::context::{CallingContext, ContextTable};
use crate::error::{Result, ShapeError};
use crate::tvs::FactId;

pub use types::{ActionId, CallKind, CallSite, MethodId, MethodKind, NodeId};

/// The interprocedural call graph plus the calling-context table it feeds.
#[derive(Debug, Default)]
pub struct CallGraph {
    methods: FxHashMap<MethodId, MethodKind>,
    static_sites: FxHashMap<NodeId, CallSite>,
    ctor_sites: FxHashMap<NodeId, CallSite>,
    // One virtual program point may have many targets; order of registration
    // is preserved so virtual dispatch enumerates deterministically.
    virtual_sites: FxHashMap<NodeId, Vec<CallSite>>,
    contexts: ContextTable,
    analysis_started: bool,
}

impl CallGraph {
    /// An empty call graph in the construction phase.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Construction phase
    // =========================================================================

    fn ensure_building(&self) -> Result<()> {
        if self.analysis_started {
            return Err(ShapeError::AnalysisStarted);
        }
        Ok(())
    }

    fn add_method(&mut self, method: MethodId, kind: MethodKind) -> Result<()> {
        self.ensure_building()?;
        self.contexts.add_target(method)?;
        self.methods.insert(method, kind);
        debug!(?method, ?kind, "registered call target");
        Ok(())
    }

    /// Register a statically dispatched method as a call target.
    pub fn add_static_method(&mut self, method: MethodId) -> Result<()> {
        self.add_method(method, MethodKind::Static)
    }

    /// Register a dynamically dispatched method as a call target.
    pub fn add_virtual_method(&mut self, method: MethodId) -> Result<()> {
        self.add_method(method, MethodKind::Virtual)
    }

    /// Register a constructor as a call target.
    pub fn add_constructor(&mut self, method: MethodId) -> Result<()> {
        self.add_method(method, MethodKind::Constructor)
    }

    fn check_site_free(&self, caller: MethodId, site: NodeId) -> Result<()> {
        if self.static_sites.contains_key(&site)
            || self.ctor_sites.contains_key(&site)
            || self.virtual_sites.contains_key(&site)
        {
            return Err(ShapeError::DuplicateCallSite { caller, site });
        }
        Ok(())
    }

    /// Register a static call edge.
    ///
    /// # Errors
    ///
    /// Fails if the program point is already registered under any kind, or
    /// after `complete_definitions()`.
    pub fn add_static_invocation(
        &mut self,
        caller: MethodId,
        site: NodeId,
        callee: MethodId,
        call_action: ActionId,
        ret_action: ActionId,
    ) -> Result<()> {
        self.ensure_building()?;
        self.check_site_free(caller, site)?;
        debug_assert_eq!(self.methods.get(&callee), Some(&MethodKind::Static));
        debug_assert!(self.contexts.contains_target(callee));
        self.static_sites.insert(
            site,
            CallSite {
                kind: CallKind::Static,
                caller,
                site,
                callee,
                call_action,
                ret_action,
                guard_action: None,
            },
        );
        debug!(?caller, ?site, ?callee, "registered static invocation");
        Ok(())
    }

    /// Register a constructor call edge.
    ///
    /// # Errors
    ///
    /// Fails if the program point is already registered under any kind, or
    /// after `complete_definitions()`.
    pub fn add_constructor_invocation(
        &mut self,
        caller: MethodId,
        site: NodeId,
        callee: MethodId,
        call_action: ActionId,
        ret_action: ActionId,
    ) -> Result<()> {
        self.ensure_building()?;
        self.check_site_free(caller, site)?;
        debug_assert_eq!(self.methods.get(&callee), Some(&MethodKind::Constructor));
        debug_assert!(self.contexts.contains_target(callee));
        self.ctor_sites.insert(
            site,
            CallSite {
                kind: CallKind::Constructor,
                caller,
                site,
                callee,
                call_action,
                ret_action,
                guard_action: None,
            },
        );
        debug!(?caller, ?site, ?callee, "registered constructor invocation");
        Ok(())
    }

    /// Register one target of a virtual call site. The same point may be
    /// registered once per distinct callee.
    ///
    /// # Errors
    ///
    /// Fails if the point is registered as a static/constructor site, if the
    /// (site, callee) pair is a duplicate, or after `complete_definitions()`.
    pub fn add_virtual_invocation(
        &mut self,
        caller: MethodId,
        site: NodeId,
        callee: MethodId,
        call_action: ActionId,
        ret_action: ActionId,
        guard_action: ActionId,
    ) -> Result<()> {
        self.ensure_building()?;
        if self.static_sites.contains_key(&site) || self.ctor_sites.contains_key(&site) {
            return Err(ShapeError::DuplicateCallSite { caller, site });
        }
        debug_assert_eq!(self.methods.get(&callee), Some(&MethodKind::Virtual));
        debug_assert!(self.contexts.contains_target(callee));
        let targets = self.virtual_sites.entry(site).or_default();
        if targets.iter().any(|cs| cs.callee == callee) {
            return Err(ShapeError::DuplicateVirtualTarget { site, callee });
        }
        targets.push(CallSite {
            kind: CallKind::Virtual,
            caller,
            site,
            callee,
            call_action,
            ret_action,
            guard_action: Some(guard_action),
        });
        debug!(?caller, ?site, ?callee, "registered virtual invocation");
        Ok(())
    }

    /// End the construction phase. All further registration is rejected.
    pub fn complete_definitions(&mut self) {
        self.analysis_started = true;
    }

    // =========================================================================
    // Query phase
    // =========================================================================

    /// The kind of a call site, if the point is one.
    #[must_use]
    pub fn site_kind(&self, site: NodeId) -> Option<CallKind> {
        if self.static_sites.contains_key(&site) {
            Some(CallKind::Static)
        } else if self.ctor_sites.contains_key(&site) {
            Some(CallKind::Constructor)
        } else if self.virtual_sites.contains_key(&site) {
            Some(CallKind::Virtual)
        } else {
            None
        }
    }

    fn static_site(&self, caller: MethodId, site: NodeId) -> &CallSite {
        let cs = self
            .static_sites
            .get(&site)
            .unwrap_or_else(|| panic!("{site:?} is not a static call site"));
        debug_assert_eq!(cs.caller, caller, "{site:?} does not belong to {caller:?}");
        cs
    }

    fn ctor_site(&self, caller: MethodId, site: NodeId) -> &CallSite {
        let cs = self
            .ctor_sites
            .get(&site)
            .unwrap_or_else(|| panic!("{site:?} is not a constructor call site"));
        debug_assert_eq!(cs.caller, caller, "{site:?} does not belong to {caller:?}");
        cs
    }

    fn virtual_site_targets(&self, caller: MethodId, site: NodeId) -> &[CallSite] {
        let targets = self
            .virtual_sites
            .get(&site)
            .unwrap_or_else(|| panic!("{site:?} is not a virtual call site"));
        debug_assert!(targets.iter().all(|cs| cs.caller == caller));
        targets
    }

    /// The resolved callee of a static call site.
    #[must_use]
    pub fn static_target(&self, caller: MethodId, site: NodeId) -> MethodId {
        self.static_site(caller, site).callee
    }

    /// The resolved callee of a constructor call site.
    #[must_use]
    pub fn constructor_target(&self, caller: MethodId, site: NodeId) -> MethodId {
        self.ctor_site(caller, site).callee
    }

    /// The possible callees of a virtual call site, in registration order.
    #[must_use]
    pub fn virtual_targets(&self, caller: MethodId, site: NodeId) -> Vec<MethodId> {
        self.virtual_site_targets(caller, site)
            .iter()
            .map(|cs| cs.callee)
            .collect()
    }

    fn call_site(&self, caller: MethodId, site: NodeId, callee: MethodId) -> &CallSite {
        let cs = match self.site_kind(site) {
            Some(CallKind::Static) => self.static_site(caller, site),
            Some(CallKind::Constructor) => self.ctor_site(caller, site),
            Some(CallKind::Virtual) => self
                .virtual_site_targets(caller, site)
                .iter()
                .find(|cs| cs.callee == callee)
                .unwrap_or_else(|| panic!("{site:?} has no virtual target {callee:?}")),
            None => panic!("{site:?} is not a call site"),
        };
        debug_assert_eq!(cs.callee, callee, "{site:?} does not target {callee:?}");
        cs
    }

    /// The action applied when crossing into the callee.
    #[must_use]
    pub fn call_action(&self, caller: MethodId, site: NodeId, callee: MethodId) -> ActionId {
        self.call_site(caller, site, callee).call_action
    }

    /// The action applied when returning to the caller.
    #[must_use]
    pub fn ret_action(&self, caller: MethodId, site: NodeId, callee: MethodId) -> ActionId {
        self.call_site(caller, site, callee).ret_action
    }

    /// The guard action of a virtual call edge.
    ///
    /// # Panics
    ///
    /// Panics when the site is not virtual; guards exist only there.
    #[must_use]
    pub fn guard_action(&self, caller: MethodId, site: NodeId, callee: MethodId) -> ActionId {
        let cs = self.call_site(caller, site, callee);
        cs.guard_action
            .unwrap_or_else(|| panic!("{site:?} is not a virtual call site"))
    }

    /// Is the site registered as a static call to `callee`?
    #[must_use]
    pub fn is_static_call_site_of(&self, caller: MethodId, site: NodeId, callee: MethodId) -> bool {
        self.static_sites
            .get(&site)
            .is_some_and(|cs| cs.caller == caller && cs.callee == callee)
    }

    /// Is the site registered as a virtual call with `callee` among its
    /// targets?
    #[must_use]
    pub fn is_virtual_call_site_of(
        &self,
        caller: MethodId,
        site: NodeId,
        callee: MethodId,
    ) -> bool {
        self.virtual_sites.get(&site).is_some_and(|ts| {
            ts.iter()
                .any(|cs| cs.caller == caller && cs.callee == callee)
        })
    }

    /// Is the site registered as a constructor call to `callee`?
    #[must_use]
    pub fn is_constructor_call_site_of(
        &self,
        caller: MethodId,
        site: NodeId,
        callee: MethodId,
    ) -> bool {
        self.ctor_sites
            .get(&site)
            .is_some_and(|cs| cs.caller == caller && cs.callee == callee)
    }

    /// Dispatch on the site kind to the matching `is_*_call_site_of` check.
    ///
    /// # Panics
    ///
    /// Panics when the point is not a call site at all.
    #[must_use]
    pub fn is_call_site_of(&self, caller: MethodId, site: NodeId, callee: MethodId) -> bool {
        match self.site_kind(site) {
            Some(CallKind::Static) => self.is_static_call_site_of(caller, site, callee),
            Some(CallKind::Virtual) => self.is_virtual_call_site_of(caller, site, callee),
            Some(CallKind::Constructor) => self.is_constructor_call_site_of(caller, site, callee),
            None => panic!("{site:?} is not a call site"),
        }
    }

    // =========================================================================
    // Calling contexts
    // =========================================================================

    /// The calling-context table.
    #[must_use]
    pub fn contexts(&self) -> &ContextTable {
        &self.contexts
    }

    /// Record a call's contribution to the callee's calling contexts. See
    /// [`ContextTable::add_to_calling_context`]; the call site is checked to
    /// really be a call site of (caller, callee).
    pub fn update_calling_contexts(
        &mut self,
        callee: MethodId,
        facts_at_entry: &[FactId],
        caller: MethodId,
        site: NodeId,
        call_fact: FactId,
        refined: &BTreeSet<FactId>,
    ) {
        debug_assert!(self.is_call_site_of(caller, site, callee));
        self.contexts
            .add_to_calling_context(callee, facts_at_entry, caller, site, call_fact, refined);
    }

    /// The calling context of a (method, entry fact) pair.
    #[must_use]
    pub fn calling_context(&self, method: MethodId, entry_fact: FactId) -> &CallingContext {
        self.contexts.calling_context(method, entry_fact)
    }
}

// =============================================================================
// Tests
// =============================================================================
