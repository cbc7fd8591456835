//! End-to-end engine tests over a map-backed structure implementation.

use std::collections::BTreeSet;

use rustc_hash::FxHashMap;
use shapeflow::callgraph::CallGraph;
use shapeflow::context::{BasicContext, Registered};
use shapeflow::driver::{Engine, Interpreter};
use shapeflow::logic::Kleene;
use shapeflow::program::{Program, SiteKind};
use shapeflow::tvs::{ElementId, Fact, FactId, Structure};
use shapeflow::vocab::{PredicateId, PredicateSpec, Vocabulary};
use shapeflow::{ActionId, CallingContext, MethodId, MethodKind, NodeId};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// =============================================================================
// A small concrete structure: maps for every arity, False by default
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
struct MapTvs {
    next_element: u32,
    elements: Vec<ElementId>,
    nullary: FxHashMap<PredicateId, Kleene>,
    unary: FxHashMap<(PredicateId, ElementId), Kleene>,
    binary: FxHashMap<(PredicateId, ElementId, ElementId), Kleene>,
}

impl MapTvs {
    fn with_nullary(values: &[(PredicateId, Kleene)]) -> Self {
        let mut tvs = Self::default();
        for &(p, v) in values {
            tvs.nullary.insert(p, v);
        }
        tvs
    }
}

impl Structure for MapTvs {
    fn eval0(&self, p: PredicateId) -> Kleene {
        self.nullary.get(&p).copied().unwrap_or(Kleene::False)
    }

    fn eval1(&self, p: PredicateId, e: ElementId) -> Kleene {
        self.unary.get(&(p, e)).copied().unwrap_or(Kleene::False)
    }

    fn eval2(&self, p: PredicateId, from: ElementId, to: ElementId) -> Kleene {
        self.binary
            .get(&(p, from, to))
            .copied()
            .unwrap_or(Kleene::False)
    }

    fn update0(&mut self, p: PredicateId, v: Kleene) {
        self.nullary.insert(p, v);
    }

    fn update1(&mut self, p: PredicateId, e: ElementId, v: Kleene) {
        self.unary.insert((p, e), v);
    }

    fn update2(&mut self, p: PredicateId, from: ElementId, to: ElementId, v: Kleene) {
        self.binary.insert((p, from, to), v);
    }

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
        self.binary.retain(|&(_, f, t), _| f != element && t != element);
    }

    fn blur(&mut self) {}

    fn coerce(&mut self) -> bool {
        true
    }

    fn equivalent(&self, other: &Self) -> bool {
        // Tuples default to False, so compare without the False entries.
        fn definite<K: Ord + Copy>(m: &FxHashMap<K, Kleene>) -> Vec<(K, Kleene)> {
            let mut v: Vec<_> = m
                .iter()
                .filter(|(_, &val)| val != Kleene::False)
                .map(|(&k, &val)| (k, val))
                .collect();
            v.sort_by_key(|&(k, _)| k);
            v
        }
        self.nullary
            .iter()
            .all(|(&p, &v)| other.eval0(p) == v || v == Kleene::False)
            && other
                .nullary
                .iter()
                .all(|(&p, &v)| self.eval0(p) == v || v == Kleene::False)
            && definite(&self.unary) == definite(&other.unary)
            && definite(&self.binary) == definite(&other.binary)
            && self.elements == other.elements
    }

    fn satisfying(&self, p: PredicateId) -> Vec<(ElementId, Kleene)> {
        let mut found: Vec<_> = self
            .unary
            .iter()
            .filter(|((q, _), &v)| *q == p && v != Kleene::False)
            .map(|(&(_, e), &v)| (e, v))
            .collect();
        found.sort_by_key(|&(e, _)| e);
        found
    }
}

// =============================================================================
// Interpreter: a table of tiny action semantics
// =============================================================================

const IDENTITY: ActionId = ActionId(0);

#[derive(Debug, Clone, Copy)]
enum ActionEffect {
    /// Pass the input through unchanged.
    Identity,
    /// Set a nullary predicate to a value.
    Set(PredicateId, Kleene),
    /// Keep the input only when a nullary predicate is not False, and force
    /// it True (a dispatch guard refining the structure).
    RequireAndSet(PredicateId, Kleene),
}

#[derive(Debug, Default)]
struct TableInterpreter {
    effects: FxHashMap<ActionId, ActionEffect>,
}

impl TableInterpreter {
    fn new(effects: &[(ActionId, ActionEffect)]) -> Self {
        Self {
            effects: effects.iter().copied().collect(),
        }
    }

    fn apply(&self, action: ActionId, input: &MapTvs) -> Vec<MapTvs> {
        match self.effects.get(&action).copied() {
            None | Some(ActionEffect::Identity) => vec![input.clone()],
            Some(ActionEffect::Set(p, v)) => {
                let mut out = input.clone();
                out.update0(p, v);
                vec![out]
            }
            Some(ActionEffect::RequireAndSet(p, v)) => {
                if input.eval0(p).agree(v) {
                    let mut out = input.clone();
                    out.update0(p, v);
                    vec![out]
                } else {
                    Vec::new()
                }
            }
        }
    }
}

impl Interpreter<MapTvs> for TableInterpreter {
    fn apply_intra(&mut self, action: ActionId, input: &MapTvs) -> Vec<MapTvs> {
        self.apply(action, input)
    }

    fn apply_guard(&mut self, action: ActionId, input: &MapTvs) -> Vec<MapTvs> {
        self.apply(action, input)
    }

    fn apply_call(&mut self, action: ActionId, input: &MapTvs) -> Vec<MapTvs> {
        self.apply(action, input)
    }

    fn apply_ret(&mut self, action: ActionId, exit: &MapTvs, _call: &MapTvs) -> Vec<MapTvs> {
        self.apply(action, exit)
    }
}

// =============================================================================
// Calling-context scenario without the driver
// =============================================================================

#[test]
fn context_registration_is_idempotent_for_equal_sets() {
    // One static call site from M to N; N has one entry fact F reached with
    // the calling fact F itself as the only refined fact.
    let mut graph = CallGraph::new();
    let m = MethodId(0);
    let n = MethodId(1);
    graph.add_static_method(m).unwrap();
    graph.add_static_method(n).unwrap();
    let site = NodeId(42);
    graph
        .add_static_invocation(m, site, n, ActionId(1), ActionId(2))
        .unwrap();
    graph.complete_definitions();

    let entry_fact = FactId(0);
    let call_fact = FactId(0);
    let refined: BTreeSet<FactId> = [call_fact].into_iter().collect();

    graph.update_calling_contexts(n, &[entry_fact], m, site, call_fact, &refined);

    let ctx = graph.calling_context(n, entry_fact);
    assert_eq!(ctx.len(), 1);
    let bc = ctx.basic_contexts().next().unwrap();
    assert_eq!(bc, BasicContext::new(site, call_fact));
    assert_eq!(ctx.refined_facts(bc), Some(&refined));
    assert_eq!(ctx.caller_of(bc), Some(m));

    // Registering the identical contribution again is "already known" and
    // leaves the stored set untouched.
    graph.update_calling_contexts(n, &[entry_fact], m, site, call_fact, &refined);
    let ctx = graph.calling_context(n, entry_fact);
    assert_eq!(ctx.len(), 1);
    assert_eq!(ctx.refined_facts(bc), Some(&refined));
}

#[test]
fn calling_context_update_reports_new_then_known() {
    let mut ctx = CallingContext::default();
    let refined: BTreeSet<FactId> = [FactId(5)].into_iter().collect();
    assert_eq!(
        ctx.update(MethodId(0), NodeId(1), FactId(5), &refined),
        Registered::New
    );
    assert_eq!(
        ctx.update(MethodId(0), NodeId(1), FactId(5), &refined),
        Registered::Known
    );
}

// =============================================================================
// Full fixpoint: one static call
// =============================================================================

#[test]
fn static_call_fixpoint_matches_contexts() {
    init_tracing();
    let mut vocab = Vocabulary::new();
    let done = vocab
        .create_predicate(PredicateSpec::nullary("done"))
        .unwrap();

    let set_done = ActionId(1);
    let call_action = ActionId(2);
    let ret_action = ActionId(3);

    // main: entry -> call(callee) ; ret -> exit
    // callee: entry -set done-> exit
    let mut program: Program<MapTvs> = Program::new(vocab);
    let main = program.add_method("main", MethodKind::Static);
    let callee = program.add_method("callee", MethodKind::Static);

    let call_site = program.add_site(main, "call callee", SiteKind::StaticCallSite);
    let ret_site = program.add_site(main, "after call", SiteKind::RetSite);
    program.add_intra_edge(program.entry_site(main), call_site, IDENTITY);
    program.set_ret_site(call_site, ret_site);
    program.add_intra_edge(ret_site, program.exit_site(main), IDENTITY);
    program.add_intra_edge(
        program.entry_site(callee),
        program.exit_site(callee),
        set_done,
    );

    let mut graph = CallGraph::new();
    graph.add_static_method(main).unwrap();
    graph.add_static_method(callee).unwrap();
    graph
        .add_static_invocation(main, call_site, callee, call_action, ret_action)
        .unwrap();

    let interpreter = TableInterpreter::new(&[
        (set_done, ActionEffect::Set(done, Kleene::True)),
        (call_action, ActionEffect::Identity),
        (ret_action, ActionEffect::Identity),
    ]);

    let mut engine = Engine::new(program, graph, main, interpreter);
    engine.init(vec![MapTvs::default()]);
    let stats = engine.run().clone();

    assert_eq!(stats.static_call_events, 1);
    assert_eq!(stats.ret_events, 1);

    let program = engine.program();
    // The callee was entered with the unchanged calling structure and left
    // with done = 1.
    let callee_entry = program.entry_site(callee);
    let callee_exit = program.exit_site(callee);
    assert_eq!(program.facts_at(callee_entry).len(), 1);
    assert_eq!(program.facts_at(callee_exit).len(), 1);
    let exit_structure = program.structure(Fact::new(callee_exit, FactId(0)));
    assert_eq!(exit_structure.eval0(done), Kleene::True);

    // The return resumed main: the exit structure reached the ret site and
    // flowed on to main's exit.
    let main_exit = program.exit_site(main);
    assert_eq!(program.facts_at(ret_site).len(), 1);
    assert_eq!(program.facts_at(main_exit).len(), 1);
    let final_structure = program.structure(Fact::new(main_exit, FactId(0)));
    assert_eq!(final_structure.eval0(done), Kleene::True);

    // Exactly one basic context was registered for (callee, entry fact).
    let ctx = engine.call_graph().calling_context(callee, FactId(0));
    assert_eq!(ctx.len(), 1);
    let bc = ctx.basic_contexts().next().unwrap();
    assert_eq!(bc.site, call_site);
    assert_eq!(ctx.caller_of(bc), Some(main));
    let expected: BTreeSet<FactId> = [bc.call_fact].into_iter().collect();
    assert_eq!(ctx.refined_facts(bc), Some(&expected));
}

// =============================================================================
// Full fixpoint: virtual dispatch with guard refinement
// =============================================================================

#[test]
fn virtual_dispatch_refines_and_reaches_both_targets() {
    init_tracing();
    let mut vocab = Vocabulary::new();
    let sel = vocab.create_predicate(PredicateSpec::nullary("sel")).unwrap();
    let mark_a = vocab
        .create_predicate(PredicateSpec::nullary("marked_a"))
        .unwrap();
    let mark_b = vocab
        .create_predicate(PredicateSpec::nullary("marked_b"))
        .unwrap();

    let guard_a = ActionId(1);
    let guard_b = ActionId(2);
    let set_a = ActionId(3);
    let set_b = ActionId(4);
    let call_action = ActionId(5);
    let ret_action = ActionId(6);

    let mut program: Program<MapTvs> = Program::new(vocab);
    let main = program.add_method("main", MethodKind::Static);
    let target_a = program.add_method("a", MethodKind::Virtual);
    let target_b = program.add_method("b", MethodKind::Virtual);

    let call_site = program.add_site(main, "virtual call", SiteKind::VirtualCallSite);
    let ret_site = program.add_site(main, "after call", SiteKind::RetSite);
    program.add_intra_edge(program.entry_site(main), call_site, IDENTITY);
    program.set_ret_site(call_site, ret_site);
    program.add_intra_edge(ret_site, program.exit_site(main), IDENTITY);
    program.add_intra_edge(program.entry_site(target_a), program.exit_site(target_a), set_a);
    program.add_intra_edge(program.entry_site(target_b), program.exit_site(target_b), set_b);

    let mut graph = CallGraph::new();
    graph.add_static_method(main).unwrap();
    graph.add_virtual_method(target_a).unwrap();
    graph.add_virtual_method(target_b).unwrap();
    graph
        .add_virtual_invocation(main, call_site, target_a, call_action, ret_action, guard_a)
        .unwrap();
    graph
        .add_virtual_invocation(main, call_site, target_b, call_action, ret_action, guard_b)
        .unwrap();

    let interpreter = TableInterpreter::new(&[
        // The guards split the undecided receiver: target a is feasible
        // when sel can be 1, target b when sel can be 0.
        (guard_a, ActionEffect::RequireAndSet(sel, Kleene::True)),
        (guard_b, ActionEffect::RequireAndSet(sel, Kleene::False)),
        (set_a, ActionEffect::Set(mark_a, Kleene::True)),
        (set_b, ActionEffect::Set(mark_b, Kleene::True)),
        (call_action, ActionEffect::Identity),
        (ret_action, ActionEffect::Identity),
    ]);

    let mut engine = Engine::new(program, graph, main, interpreter);
    engine.init(vec![MapTvs::with_nullary(&[(sel, Kleene::Unknown)])]);
    let stats = engine.run().clone();

    assert_eq!(stats.virtual_call_events, 2);
    assert_eq!(stats.ret_events, 2);

    let program = engine.program();
    // The call site holds the unrefined fact plus one refinement per guard.
    assert_eq!(program.facts_at(call_site).len(), 3);
    // Each target was entered with its refined receiver.
    let entry_a = program.entry_site(target_a);
    let entry_b = program.entry_site(target_b);
    assert_eq!(program.facts_at(entry_a).len(), 1);
    assert_eq!(program.facts_at(entry_b).len(), 1);
    assert_eq!(
        program.structure(Fact::new(entry_a, FactId(0))).eval0(sel),
        Kleene::True
    );
    assert_eq!(
        program.structure(Fact::new(entry_b, FactId(0))).eval0(sel),
        Kleene::False
    );

    // Both returns resumed main, so the ret site distinguishes the paths.
    assert_eq!(program.facts_at(ret_site).len(), 2);
    let marks: Vec<(Kleene, Kleene)> = program
        .facts_at(ret_site)
        .iter()
        .map(|&f| {
            let s = program.structure(Fact::new(ret_site, f));
            (s.eval0(mark_a), s.eval0(mark_b))
        })
        .collect();
    assert!(marks.contains(&(Kleene::True, Kleene::False)));
    assert!(marks.contains(&(Kleene::False, Kleene::True)));

    // Contexts were registered under the guard-refined call facts.
    let ctx_a = engine.call_graph().calling_context(target_a, FactId(0));
    assert_eq!(ctx_a.len(), 1);
    let bc = ctx_a.basic_contexts().next().unwrap();
    let refined = ctx_a.refined_facts(bc).unwrap();
    assert_eq!(refined.len(), 1);
    let refined_fact = *refined.iter().next().unwrap();
    assert_ne!(refined_fact, bc.call_fact);
    assert_eq!(
        program
            .structure(Fact::new(call_site, refined_fact))
            .eval0(sel),
        Kleene::True
    );
}

// =============================================================================
// Constructor calls
// =============================================================================

#[test]
fn constructor_call_crosses_like_a_static_call() {
    let mut vocab = Vocabulary::new();
    let built = vocab
        .create_predicate(PredicateSpec::nullary("built"))
        .unwrap();

    let set_built = ActionId(1);
    let call_action = ActionId(2);
    let ret_action = ActionId(3);

    let mut program: Program<MapTvs> = Program::new(vocab);
    let main = program.add_method("main", MethodKind::Static);
    let ctor = program.add_method("ctor", MethodKind::Constructor);

    let call_site = program.add_site(main, "new", SiteKind::ConstructorCallSite);
    let ret_site = program.add_site(main, "after new", SiteKind::RetSite);
    program.add_intra_edge(program.entry_site(main), call_site, IDENTITY);
    program.set_ret_site(call_site, ret_site);
    program.add_intra_edge(ret_site, program.exit_site(main), IDENTITY);
    program.add_intra_edge(program.entry_site(ctor), program.exit_site(ctor), set_built);

    let mut graph = CallGraph::new();
    graph.add_static_method(main).unwrap();
    graph.add_constructor(ctor).unwrap();
    graph
        .add_constructor_invocation(main, call_site, ctor, call_action, ret_action)
        .unwrap();

    let interpreter = TableInterpreter::new(&[
        (set_built, ActionEffect::Set(built, Kleene::True)),
        (call_action, ActionEffect::Identity),
        (ret_action, ActionEffect::Identity),
    ]);

    let mut engine = Engine::new(program, graph, main, interpreter);
    engine.init(vec![MapTvs::default()]);
    let stats = engine.run().clone();

    assert_eq!(stats.constructor_call_events, 1);
    assert_eq!(stats.ret_events, 1);
    let program = engine.program();
    let main_exit = program.exit_site(main);
    assert_eq!(program.facts_at(main_exit).len(), 1);
    assert_eq!(
        program.structure(Fact::new(main_exit, FactId(0))).eval0(built),
        Kleene::True
    );
}
