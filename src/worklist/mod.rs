//! Worklist scheduling for the chaotic iteration.
//!
//! The worklist holds pending [`Event`]s and hands them to the driver one at
//! a time. Scheduling order affects performance and termination *order*
//! only, never the fixpoint result: facts are deduplicated through the
//! signature strategy before events are queued, so any draining order
//! converges to the same reachable sets.
//!
//! # Priorities
//!
//! Three bands exist: the default band (events added with
//! [`Worklist::add`]), a mid band (any explicit priority), and a low band
//! (`None`). An implementation may legally ignore ordering hints as long as
//! it reports so truthfully through the capability queries.

pub mod event;

pub use event::{Event, EventKind};

/// An ordering hint for mid-band events. Explicit priorities are always
/// below the default band; `None` is below everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(pub u32);

/// The scheduler interface the driver drains.
pub trait Worklist {
    /// Queue an event with the default (highest) priority.
    fn add(&mut self, event: Event);

    /// Queue an event with an explicit priority (`Some` lands in the mid
    /// band, `None` in the low band).
    fn add_with_priority(&mut self, event: Event, priority: Option<Priority>);

    /// Are events pending? The driver must check this before extracting.
    fn has_event(&self) -> bool;

    /// Extract the next event.
    ///
    /// Which of several equal-priority events is returned is
    /// implementation-defined.
    ///
    /// # Panics
    ///
    /// Panics when the worklist is empty; that is a programming error in
    /// the driver, never a normal "done" signal.
    fn extract(&mut self) -> Event;

    /// Does this scheduler ignore priority *values*?
    fn ignores_priorities(&self) -> bool;

    /// Does this scheduler honor the default/mid/low band split?
    fn respects_low_and_high_priorities(&self) -> bool;
}

/// Assigns priorities to events as they are queued.
///
/// Selected once at configuration time and passed by value; the driver never
/// reaches into static state for it.
pub trait PriorityPolicy {
    /// The band an event belongs in: `None` is the low band.
    fn priority_of(&self, event: &Event) -> Option<Priority>;
}

/// The default policy: transition events (which only schedule summary
/// recomputation) sink to the low band, everything else shares one mid
/// priority.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPriorityPolicy;

impl PriorityPolicy for DefaultPriorityPolicy {
    fn priority_of(&self, event: &Event) -> Option<Priority> {
        match event {
            Event::Transition { .. } => None,
            _ => Some(Priority(0)),
        }
    }
}

/// Stack-based scheduler: three LIFO bands, drained high before mid before
/// low, most-recently-added first within a band (depth-first discovery
/// order).
#[derive(Debug, Default)]
pub struct StackWorklist {
    high: Vec<Event>,
    mid: Vec<Event>,
    low: Vec<Event>,
}

impl StackWorklist {
    /// An empty worklist.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of pending events across all bands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.high.len() + self.mid.len() + self.low.len()
    }

    /// Is the worklist empty?
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.high.is_empty() && self.mid.is_empty() && self.low.is_empty()
    }
}

impl Worklist for StackWorklist {
    fn add(&mut self, event: Event) {
        self.high.push(event);
    }

    fn add_with_priority(&mut self, event: Event, priority: Option<Priority>) {
        match priority {
            Some(_) => self.mid.push(event),
            None => self.low.push(event),
        }
    }

    fn has_event(&self) -> bool {
        !self.is_empty()
    }

    fn extract(&mut self) -> Event {
        self.high
            .pop()
            .or_else(|| self.mid.pop())
            .or_else(|| self.low.pop())
            .expect("extracting an event from an empty worklist")
    }

    fn ignores_priorities(&self) -> bool {
        // Priority values within the mid band are not compared.
        true
    }

    fn respects_low_and_high_priorities(&self) -> bool {
        true
    }
}

// =============================================================================
// Tests
// =============================================================================
