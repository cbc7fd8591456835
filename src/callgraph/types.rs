//! Call-graph type definitions.
//!
//! Methods, program points and actions are addressed by plain index handles
//! into the arenas that own them. Call-site records hold handles in both
//! directions (caller and callee), so navigation is O(1) both ways without
//! ownership cycles.

use serde::{Deserialize, Serialize};

/// Handle of an analyzed method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MethodId(pub u32);

/// Handle of a program point (a node of some method's transition system).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

/// Handle of an opaque action: the transfer function attached to an edge of
/// the program model. The engine never interprets actions itself; the
/// driver's interpreter does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionId(pub u32);

/// Kind of an analyzed method, which constrains the call-site kinds that may
/// target it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodKind {
    /// Statically dispatched.
    Static,
    /// Dynamically dispatched; call sites carry a guard.
    Virtual,
    /// Object constructor.
    Constructor,
}

/// Kind of a call site. A given program point is exactly one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallKind {
    /// 1:1 static dispatch.
    Static,
    /// 1:n dynamic dispatch, guarded per target.
    Virtual,
    /// 1:1 constructor invocation.
    Constructor,
}

/// An immutable call edge: who calls whom from where, and the actions that
/// define the effect of crossing the edge.
///
/// Created once during call-graph construction, never mutated. The guard
/// action exists only for virtual call sites.
#[derive(Debug, Clone)]
pub struct CallSite {
    /// Kind of the call site.
    pub kind: CallKind,
    /// The calling method.
    pub caller: MethodId,
    /// Program point of the call.
    pub site: NodeId,
    /// The called method.
    pub callee: MethodId,
    /// Action applied when crossing into the callee.
    pub call_action: ActionId,
    /// Action applied when returning to the caller.
    pub ret_action: ActionId,
    /// For virtual sites: action that refines the calling structure and
    /// decides whether this target is feasible.
    pub guard_action: Option<ActionId>,
}
