//! The chaotic-iteration fixpoint driver.
//!
//! The driver pulls events from the worklist, applies the matching
//! propagation rule, discovers new facts, and queues follow-up events; the
//! run terminates when the worklist is empty and no method summary is
//! pending recomputation. Transfer functions stay opaque behind the
//! [`Interpreter`] trait: the driver decides *where* structures flow, the
//! interpreter decides *what* each action does to them.
//!
//! # Event dispatch
//!
//! | event | reaction |
//! |---|---|
//! | `Intra` | apply the point's statement actions; queue events for facts new at the successors; call sites re-dispatch to their call event, the exit site marks the method summary dirty |
//! | `StaticCall` / `ConstructorCall` | apply the call action to the calling fact, merge results into the callee entry, register the calling context |
//! | `VirtualCall` | same, but over the guard-refined call facts carried by the event |
//! | `Ret` | for every registered calling context of (callee, entry fact), apply the return action and resume at the call's ret site in each caller |
//! | `Transition` | the flow edge was recorded at creation; schedule a summary recomputation |
//!
//! Summary updates run only when the worklist drains: the calculation is
//! delayed to the last possible moment, so bursts of intraprocedural
//! discovery pay for one recomputation instead of many.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{debug, info};

use crate::callgraph::types::{ActionId, MethodId, NodeId};
use crate::callgraph::CallGraph;
use crate::error::{Result, ShapeError};
use crate::program::{Program, SiteKind};
use crate::tvs::{Fact, FactId, Structure};
use crate::worklist::{
    DefaultPriorityPolicy, Event, EventKind, PriorityPolicy, StackWorklist, Worklist,
};

// =============================================================================
// Interpreter contract
// =============================================================================

/// The opaque transfer-function semantics of the analyzed program.
///
/// Every method returns the structures that survive the action; an empty
/// result means the input is infeasible under that action (for guards: the
/// dispatch target is not actually possible). Implementations are expected
/// to blur and coerce their outputs; the driver merges whatever it is
/// handed.
pub trait Interpreter<S: Structure> {
    /// Apply an intraprocedural statement action.
    fn apply_intra(&mut self, action: ActionId, input: &S) -> Vec<S>;

    /// Apply a virtual-dispatch guard: refine the calling structure and
    /// decide target feasibility.
    fn apply_guard(&mut self, action: ActionId, input: &S) -> Vec<S>;

    /// Apply a call action: map a (refined) calling structure to callee
    /// entry structures.
    fn apply_call(&mut self, action: ActionId, input: &S) -> Vec<S>;

    /// Apply a return action: combine a callee exit structure with the
    /// calling-side structure into structures at the caller's ret site.
    fn apply_ret(&mut self, action: ActionId, exit: &S, call: &S) -> Vec<S>;
}

// =============================================================================
// Statistics
// =============================================================================

/// Per-run counters, reported at fixpoint through the logging layer.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DriverStats {
    /// Loop iterations (event handled or summary pass).
    pub iterations: u64,
    /// Intra events handled.
    pub intra_events: u64,
    /// Static call events handled.
    pub static_call_events: u64,
    /// Virtual call events handled.
    pub virtual_call_events: u64,
    /// Constructor call events handled.
    pub constructor_call_events: u64,
    /// Ret events handled.
    pub ret_events: u64,
    /// Transition events handled.
    pub transition_events: u64,
    /// Method summary recomputations.
    pub summary_updates: u64,
}

impl DriverStats {
    fn count(&mut self, kind: EventKind) {
        match kind {
            EventKind::Intra => self.intra_events += 1,
            EventKind::StaticCall => self.static_call_events += 1,
            EventKind::VirtualCall => self.virtual_call_events += 1,
            EventKind::ConstructorCall => self.constructor_call_events += 1,
            EventKind::Ret => self.ret_events += 1,
            EventKind::Transition => self.transition_events += 1,
        }
    }
}

// =============================================================================
// The engine
// =============================================================================

/// The fixpoint engine: program model, call graph, scheduler and interpreter
/// wired together for one analysis run.
pub struct Engine<S: Structure, I: Interpreter<S>, P: PriorityPolicy = DefaultPriorityPolicy> {
    program: Program<S>,
    graph: CallGraph,
    interpreter: I,
    policy: P,
    worklist: StackWorklist,
    main: MethodId,
    modified: BTreeSet<MethodId>,
    stats: DriverStats,
    initialized: bool,
}

impl<S: Structure, I: Interpreter<S>> Engine<S, I, DefaultPriorityPolicy> {
    /// Wire an engine with the default priority policy. Completes the call
    /// graph's definitions: construction happens fully before the analysis.
    pub fn new(program: Program<S>, graph: CallGraph, main: MethodId, interpreter: I) -> Self {
        Self::with_policy(program, graph, main, interpreter, DefaultPriorityPolicy)
    }
}

impl<S: Structure, I: Interpreter<S>, P: PriorityPolicy> Engine<S, I, P> {
    /// Wire an engine with an explicit priority policy.
    pub fn with_policy(
        program: Program<S>,
        mut graph: CallGraph,
        main: MethodId,
        interpreter: I,
        policy: P,
    ) -> Self {
        graph.complete_definitions();
        Self {
            program,
            graph,
            interpreter,
            policy,
            worklist: StackWorklist::new(),
            main,
            modified: BTreeSet::new(),
            stats: DriverStats::default(),
            initialized: false,
        }
    }

    /// Seed the analysis: merge the initial structures into the main
    /// method's entry and queue the first events.
    pub fn init(&mut self, initial: Vec<S>) {
        debug_assert!(!self.initialized, "engine seeded twice");
        debug_assert!(!initial.is_empty(), "no initial structures");
        let entry = self.program.entry_site(self.main);
        for structure in initial {
            let (fact, is_new) = self.program.add_structure(entry, structure);
            if is_new {
                self.enqueue(Event::Intra {
                    method: self.main,
                    fact,
                });
            }
        }
        self.initialized = true;
    }

    /// Run the chaotic iteration until the fixpoint is reached.
    pub fn run(&mut self) -> &DriverStats {
        let reached = self.do_iterate(None);
        debug_assert!(reached);
        self.report();
        &self.stats
    }

    /// Run at most `max_iterations` loop iterations.
    ///
    /// # Errors
    ///
    /// Returns [`ShapeError::IterationBound`] when the bound is hit before
    /// the fixpoint.
    pub fn run_bounded(&mut self, max_iterations: u64) -> Result<&DriverStats> {
        if self.do_iterate(Some(max_iterations)) {
            self.report();
            Ok(&self.stats)
        } else {
            Err(ShapeError::IterationBound(max_iterations))
        }
    }

    /// The program model.
    pub fn program(&self) -> &Program<S> {
        &self.program
    }

    /// The call graph and its calling-context table.
    pub fn call_graph(&self) -> &CallGraph {
        &self.graph
    }

    /// The run counters so far.
    pub fn stats(&self) -> &DriverStats {
        &self.stats
    }

    // =========================================================================
    // The loop
    // =========================================================================

    fn do_iterate(&mut self, bound: Option<u64>) -> bool {
        debug_assert!(self.initialized, "engine not seeded");
        let mut remaining = bound;
        loop {
            if let Some(r) = &mut remaining {
                if *r == 0 {
                    return false;
                }
                *r -= 1;
            }
            self.stats.iterations += 1;

            if self.worklist.has_event() {
                let event = self.worklist.extract();
                self.handle_event(event);
            } else if !self.modified.is_empty() {
                self.update_summaries();
            } else {
                return true;
            }
        }
    }

    fn enqueue(&mut self, event: Event) {
        let priority = self.policy.priority_of(&event);
        debug!(%event, ?priority, "queued");
        self.worklist.add_with_priority(event, priority);
    }

    fn handle_event(&mut self, event: Event) {
        self.stats.count(event.kind());
        debug!(%event, "handling");
        match event {
            Event::Intra { method, fact } => self.handle_intra(method, fact),
            Event::StaticCall {
                method,
                call_fact,
                callee,
            } => self.handle_call(method, call_fact, vec![call_fact.id], callee),
            Event::VirtualCall {
                method,
                call_fact,
                refined_facts,
                callee,
            } => self.handle_call(method, call_fact, refined_facts, callee),
            Event::ConstructorCall {
                method,
                call_fact,
                callee,
            } => self.handle_call(method, call_fact, vec![call_fact.id], callee),
            Event::Ret {
                method,
                entry_fact,
                exit_fact,
            } => self.handle_ret(method, entry_fact, exit_fact),
            Event::Transition { method, .. } => {
                // The flow edge was recorded when the event was created; the
                // remaining effect is a summary recomputation.
                self.modified.insert(method);
            }
        }
    }

    // =========================================================================
    // Event handlers
    // =========================================================================

    fn handle_intra(&mut self, method: MethodId, fact: Fact) {
        debug_assert!(self.program.contains_fact(fact));
        let site = fact.site;
        match self.program.site_kind(site) {
            SiteKind::Entry | SiteKind::Intra | SiteKind::RetSite => {
                let edges = self.program.intra_edges(site).to_vec();
                for edge in edges {
                    let input = self.program.structure(fact).clone();
                    let outputs = self.interpreter.apply_intra(edge.action, &input);
                    self.deliver(method, fact, edge.target, outputs);
                }
            }
            SiteKind::Exit => {
                self.modified.insert(method);
            }
            SiteKind::StaticCallSite => {
                let callee = self.graph.static_target(method, site);
                self.enqueue(Event::StaticCall {
                    method,
                    call_fact: fact,
                    callee,
                });
            }
            SiteKind::ConstructorCallSite => {
                let callee = self.graph.constructor_target(method, site);
                self.enqueue(Event::ConstructorCall {
                    method,
                    call_fact: fact,
                    callee,
                });
            }
            SiteKind::VirtualCallSite => {
                for callee in self.graph.virtual_targets(method, site) {
                    let guard = self.graph.guard_action(method, site, callee);
                    let input = self.program.structure(fact).clone();
                    let refined = self.interpreter.apply_guard(guard, &input);
                    if refined.is_empty() {
                        // The initial call graph over-approximates; the guard
                        // ruled this target out.
                        debug!(?site, ?callee, "guard ruled out virtual target");
                        continue;
                    }
                    let mut refined_facts: Vec<FactId> = Vec::with_capacity(refined.len());
                    for structure in refined {
                        let (rf, _) = self.program.add_structure(site, structure);
                        if !refined_facts.contains(&rf.id) {
                            refined_facts.push(rf.id);
                        }
                    }
                    self.enqueue(Event::VirtualCall {
                        method,
                        call_fact: fact,
                        refined_facts,
                        callee,
                    });
                }
            }
        }
    }

    /// Shared call handling: only virtual calls refine the calling fact,
    /// static and constructor calls pass it through unchanged.
    fn handle_call(
        &mut self,
        caller: MethodId,
        call_fact: Fact,
        refined: Vec<FactId>,
        callee: MethodId,
    ) {
        debug_assert!(!refined.is_empty());
        let site = call_fact.site;
        debug_assert!(self.graph.is_call_site_of(caller, site, callee));
        let call_action = self.graph.call_action(caller, site, callee);

        let mut generated = Vec::new();
        for &rf in &refined {
            let input = self.program.structure(Fact::new(site, rf)).clone();
            generated.extend(self.interpreter.apply_call(call_action, &input));
        }
        if generated.is_empty() {
            debug!(?site, ?callee, "no structures survived the call action");
            return;
        }

        let entry = self.program.entry_site(callee);
        let mut facts_at_entry: Vec<FactId> = Vec::with_capacity(generated.len());
        for structure in generated {
            let (entry_fact, is_new) = self.program.add_structure(entry, structure);
            if !facts_at_entry.contains(&entry_fact.id) {
                facts_at_entry.push(entry_fact.id);
            }
            if is_new {
                self.enqueue(Event::Intra {
                    method: callee,
                    fact: entry_fact,
                });
            }
        }

        let refined_set: BTreeSet<FactId> = refined.into_iter().collect();
        self.graph.update_calling_contexts(
            callee,
            &facts_at_entry,
            caller,
            site,
            call_fact.id,
            &refined_set,
        );
    }

    fn handle_ret(&mut self, callee: MethodId, entry_fact: Fact, exit_fact: Fact) {
        debug_assert!(self.program.contains_fact(entry_fact));
        debug_assert!(self.program.contains_fact(exit_fact));

        // Snapshot the contexts: resuming the callers mutates the program.
        let contexts: Vec<_> = {
            let ctx = self.graph.calling_context(callee, entry_fact.id);
            ctx.basic_contexts()
                .map(|bc| {
                    let caller = ctx
                        .caller_of(bc)
                        .expect("basic context without a caller");
                    let refined: Vec<FactId> = ctx
                        .refined_facts(bc)
                        .expect("basic context without refined facts")
                        .iter()
                        .copied()
                        .collect();
                    (caller, bc.site, bc.call_fact, refined)
                })
                .collect()
        };
        debug_assert!(!contexts.is_empty());

        let exit_structure = self.program.structure(exit_fact).clone();
        for (caller, site, call_fact, refined) in contexts {
            let ret_action = self.graph.ret_action(caller, site, callee);
            let ret_site = self.program.ret_site(site);
            for rf in refined {
                let call_structure = self.program.structure(Fact::new(site, rf)).clone();
                let outputs =
                    self.interpreter
                        .apply_ret(ret_action, &exit_structure, &call_structure);
                self.deliver(caller, Fact::new(site, call_fact), ret_site, outputs);
            }
        }
    }

    /// Merge action outputs into a target point, recording fact flow and
    /// queueing events for whatever is new.
    fn deliver(&mut self, method: MethodId, from: Fact, target: NodeId, outputs: Vec<S>) {
        for structure in outputs {
            let (to_fact, is_new) = self.program.add_structure(target, structure);
            let new_edge = self.program.record_flow(method, from, to_fact);
            if is_new {
                self.enqueue(Event::Intra {
                    method,
                    fact: to_fact,
                });
            } else if new_edge {
                self.enqueue(Event::Transition {
                    method,
                    from_fact: from,
                    to_fact,
                });
            }
        }
    }

    // =========================================================================
    // Summaries
    // =========================================================================

    fn update_summaries(&mut self) {
        let methods: Vec<MethodId> = std::mem::take(&mut self.modified).into_iter().collect();
        debug!(count = methods.len(), "updating method summaries");
        for method in methods {
            self.stats.summary_updates += 1;
            let delta = self.program.take_summary_delta(method);
            if method == self.main {
                continue;
            }
            let entry = self.program.entry_site(method);
            let exit = self.program.exit_site(method);
            for (entry_fact, exit_fact) in delta {
                self.enqueue(Event::Ret {
                    method,
                    entry_fact: Fact::new(entry, entry_fact),
                    exit_fact: Fact::new(exit, exit_fact),
                });
            }
        }
    }

    fn report(&self) {
        info!(
            iterations = self.stats.iterations,
            intra = self.stats.intra_events,
            static_calls = self.stats.static_call_events,
            virtual_calls = self.stats.virtual_call_events,
            constructor_calls = self.stats.constructor_call_events,
            rets = self.stats.ret_events,
            transitions = self.stats.transition_events,
            summary_updates = self.stats.summary_updates,
            "fixpoint reached"
        );
        for stat in self.graph.contexts().stats() {
            info!(
                method = self.program.method_name(stat.method),
                entry_facts = stat.entry_facts,
                calling_contexts = stat.calling_contexts,
                "calling-context table"
            );
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
