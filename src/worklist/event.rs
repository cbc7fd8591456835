//! Propagation events.
//!
//! An event records *what just changed and where* during the chaotic
//! iteration: a fact reached a program point, a call must be crossed, a
//! callee summary grew. Events are created when a new fact (or fact
//! transition) is discovered, consumed exactly once by the driver, and never
//! mutated. The six kinds form a closed dispatch table: the driver matches
//! exhaustively, so a new kind cannot be silently ignored.

use serde::Serialize;

use crate::callgraph::types::{MethodId, NodeId};
use crate::tvs::{Fact, FactId};

/// Discriminant of an [`Event`], used for statistics and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Intraprocedural step.
    Intra,
    /// Static call crossing.
    StaticCall,
    /// Virtual call crossing.
    VirtualCall,
    /// Constructor call crossing.
    ConstructorCall,
    /// Callee summary grew; resume the callers.
    Ret,
    /// Generic explicit fact-to-fact move.
    Transition,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EventKind::Intra => "INTRA",
            EventKind::StaticCall => "STATIC_CALL",
            EventKind::VirtualCall => "VIRTUAL_CALL",
            EventKind::ConstructorCall => "CONSTRUCTOR_CALL",
            EventKind::Ret => "RET",
            EventKind::Transition => "TRANSITION",
        };
        write!(f, "{name}")
    }
}

/// A unit of propagation work.
///
/// Facts carry their containing program point, so every event knows its
/// site without a separate field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A fact reached a non-call program point: apply the point's
    /// intraprocedural actions.
    Intra {
        /// Method in which the change occurred.
        method: MethodId,
        /// The newly discovered fact.
        fact: Fact,
    },

    /// A fact reached a static call site.
    StaticCall {
        /// The calling method.
        method: MethodId,
        /// The fact at the call site.
        call_fact: Fact,
        /// The resolved callee.
        callee: MethodId,
    },

    /// A fact reached a virtual call site and the guard resolved a target,
    /// refining the calling fact along the way.
    VirtualCall {
        /// The calling method.
        method: MethodId,
        /// The unrefined fact at the call site.
        call_fact: Fact,
        /// Guard-refined facts at the call site, used for the call action.
        refined_facts: Vec<FactId>,
        /// The resolved target.
        callee: MethodId,
    },

    /// A fact reached a constructor call site.
    ConstructorCall {
        /// The calling method.
        method: MethodId,
        /// The fact at the call site.
        call_fact: Fact,
        /// The resolved constructor.
        callee: MethodId,
    },

    /// A callee's exit fact was computed for some entry fact: resume every
    /// registered calling context.
    Ret {
        /// The method being returned from.
        method: MethodId,
        /// The entry fact the summary edge starts at.
        entry_fact: Fact,
        /// The exit fact the summary edge ends at.
        exit_fact: Fact,
    },

    /// A generic explicit (from, to) fact move, used when no call/return
    /// specialization applies.
    Transition {
        /// Method in which the move occurred.
        method: MethodId,
        /// Source of the move.
        from_fact: Fact,
        /// Destination of the move.
        to_fact: Fact,
    },
}

impl Event {
    /// The event's kind tag.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Intra { .. } => EventKind::Intra,
            Event::StaticCall { .. } => EventKind::StaticCall,
            Event::VirtualCall { .. } => EventKind::VirtualCall,
            Event::ConstructorCall { .. } => EventKind::ConstructorCall,
            Event::Ret { .. } => EventKind::Ret,
            Event::Transition { .. } => EventKind::Transition,
        }
    }

    /// The method in which the change occurred.
    #[must_use]
    pub fn method(&self) -> MethodId {
        match self {
            Event::Intra { method, .. }
            | Event::StaticCall { method, .. }
            | Event::VirtualCall { method, .. }
            | Event::ConstructorCall { method, .. }
            | Event::Ret { method, .. }
            | Event::Transition { method, .. } => *method,
        }
    }

    /// The program point of the change: the fact's site for intra events,
    /// the call site for call events, the exit site for returns, the
    /// destination for transitions.
    #[must_use]
    pub fn site(&self) -> NodeId {
        match self {
            Event::Intra { fact, .. } => fact.site,
            Event::StaticCall { call_fact, .. }
            | Event::VirtualCall { call_fact, .. }
            | Event::ConstructorCall { call_fact, .. } => call_fact.site,
            Event::Ret { exit_fact, .. } => exit_fact.site,
            Event::Transition { to_fact, .. } => to_fact.site,
        }
    }
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "event {} in method {:?} at {:?}",
            self.kind(),
            self.method(),
            self.site()
        )
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_and_site_accessors() {
        let fact = Fact::new(NodeId(3), FactId(1));
        let intra = Event::Intra {
            method: MethodId(0),
            fact,
        };
        assert_eq!(intra.kind(), EventKind::Intra);
        assert_eq!(intra.method(), MethodId(0));
        assert_eq!(intra.site(), NodeId(3));

        let ret = Event::Ret {
            method: MethodId(1),
            entry_fact: Fact::new(NodeId(4), FactId(0)),
            exit_fact: Fact::new(NodeId(5), FactId(2)),
        };
        assert_eq!(ret.kind(), EventKind::Ret);
        assert_eq!(ret.site(), NodeId(5));

        let call = Event::StaticCall {
            method: MethodId(0),
            call_fact: Fact::new(NodeId(7), FactId(9)),
            callee: MethodId(1),
        };
        assert_eq!(call.site(), NodeId(7));
        assert_eq!(format!("{}", call.kind()), "STATIC_CALL");
    }
}
