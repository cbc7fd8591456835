//! Context-sensitive interprocedural propagation over three-valued logical
//! structures.
//!
//! For every program point of every analyzed method the engine computes the
//! set of abstract states ("facts") reachable under a chaotic-iteration
//! worklist fixpoint, tracking which calling contexts produced which facts
//! so call and return edges are matched precisely instead of merging all
//! callers.
//!
//! # Components
//!
//! - [`logic`] - the Kleene three-valued domain
//! - [`vocab`] - the predicate vocabulary shared by all structures of a run
//! - [`tvs`] - the contract of the external structure representation, and
//!   facts
//! - [`signature`] - canonic signatures: cheap merge-candidate bucketing
//! - [`callgraph`] - call sites, their kinds and actions
//! - [`context`] - the calling-context table for call/return matching
//! - [`worklist`] - propagation events and the scheduler
//! - [`program`] - the analyzed program's transition system and fact
//!   repositories
//! - [`driver`] - the fixpoint engine tying everything together
//!
//! # Example
//!
//! ```ignore
//! use shapeflow::callgraph::CallGraph;
//! use shapeflow::driver::Engine;
//! use shapeflow::program::Program;
//! use shapeflow::vocab::Vocabulary;
//!
//! let mut vocab = Vocabulary::new();
//! // ... register predicates, build the program model and call graph ...
//! let mut engine = Engine::new(program, graph, main, interpreter);
//! engine.init(initial_structures);
//! let stats = engine.run();
//! ```

pub mod callgraph;
pub mod context;
pub mod driver;
pub mod error;
pub mod logic;
pub mod program;
pub mod signature;
pub mod tvs;
pub mod vocab;
pub mod worklist;

pub use callgraph::{ActionId, CallGraph, CallKind, MethodId, MethodKind, NodeId};
pub use context::{BasicContext, CallingContext, ContextTable, Registered};
pub use driver::{DriverStats, Engine, Interpreter};
pub use error::{Result, ShapeError};
pub use logic::Kleene;
pub use program::{Program, SiteKind};
pub use signature::{CanonicName, UniqueSignatureStrategy};
pub use tvs::{ElementId, Fact, FactId, Structure};
pub use vocab::{Predicate, PredicateId, PredicateSpec, Vocabulary};
pub use worklist::{Event, EventKind, Priority, StackWorklist, Worklist};
