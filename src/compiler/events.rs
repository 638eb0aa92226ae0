//! Change tracking for passes and the scheduler.
//!
//! Passes do not return rich change descriptions; they record [`Event`]s into
//! a shared [`EventLog`] while they work and report only whether they changed
//! anything. The log is append-only and can be written from several threads
//! at once, which lets [`crate::compiler::Compiler::compile_batch`] share one
//! log across parallel units.
//!
//! # Examples
//!
//! ```rust
//! use simdcfg::compiler::{EventKind, EventLog};
//!
//! let events = EventLog::new();
//! events
//!     .record(EventKind::InstructionRemoved)
//!     .at(1, 4)
//!     .message("empty IF/ENDIF");
//! events.warn("iteration limit reached");
//!
//! assert_eq!(events.len(), 2);
//! assert!(events.has(EventKind::InstructionRemoved));
//! assert_eq!(events.count_kind(EventKind::Warning), 1);
//! ```

use std::fmt;

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
pub enum EventKind {
    /// An instruction was deleted.
    InstructionRemoved,
    /// A block was removed from the graph.
    BlockRemoved,
    /// Two adjacent blocks were merged.
    BlocksMerged,
    /// An instruction's predicate was inverted.
    PredicateInverted,
    /// An `IF { BREAK | CONTINUE } ENDIF` became a predicated jump.
    BreakPredicated,
    /// A predicated `BREAK` was folded into the loop's `WHILE`.
    WhilePredicated,
    /// A block's instructions were reordered.
    BlockScheduled,
    /// A pass started running.
    PassStarted,
    /// A pass finished running.
    PassCompleted,
    /// Free-form information.
    Info,
    /// Something unexpected that did not stop compilation.
    Warning,
}

/// One recorded change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// What happened.
    pub kind: EventKind,
    /// Sequence number of the block concerned, at the time of recording.
    pub block: Option<usize>,
    /// Instruction index concerned, at the time of recording.
    pub ip: Option<usize>,
    /// Name of the pass that recorded the event.
    pub pass: Option<&'static str>,
    /// Human-readable detail.
    pub message: Option<String>,
}

impl Event {
    fn new(kind: EventKind) -> Self {
        Self {
            kind,
            block: None,
            ip: None,
            pass: None,
            message: None,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(pass) = self.pass {
            write!(f, " [{pass}]")?;
        }
        if let Some(block) = self.block {
            write!(f, " B{block}")?;
        }
        if let Some(ip) = self.ip {
            write!(f, " @{ip}")?;
        }
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        Ok(())
    }
}

/// Builder returned by [`EventLog::record`]; the event is appended when the
/// builder is dropped.
pub struct EventBuilder<'a> {
    log: &'a EventLog,
    event: Option<Event>,
}

impl EventBuilder<'_> {
    fn event(&mut self) -> &mut Event {
        self.event.get_or_insert_with(|| Event::new(EventKind::Info))
    }

    /// Attaches a block sequence number.
    pub fn block(mut self, block: usize) -> Self {
        self.event().block = Some(block);
        self
    }

    /// Attaches a block sequence number and instruction index.
    pub fn at(mut self, block: usize, ip: usize) -> Self {
        let event = self.event();
        event.block = Some(block);
        event.ip = Some(ip);
        self
    }

    /// Attaches the recording pass.
    pub fn pass(mut self, pass: &'static str) -> Self {
        self.event().pass = Some(pass);
        self
    }

    /// Attaches a message.
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.event().message = Some(message.into());
        self
    }
}

impl Drop for EventBuilder<'_> {
    fn drop(&mut self) {
        if let Some(event) = self.event.take() {
            self.log.events.push(event);
        }
    }
}

/// Append-only, thread-safe list of [`Event`]s.
#[derive(Debug, Default)]
pub struct EventLog {
    events: boxcar::Vec<Event>,
}

impl EventLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts recording an event of `kind`.
    pub fn record(&self, kind: EventKind) -> EventBuilder<'_> {
        EventBuilder {
            log: self,
            event: Some(Event::new(kind)),
        }
    }

    /// Records an [`EventKind::Info`] message.
    pub fn info(&self, message: impl Into<String>) {
        let _ = self.record(EventKind::Info).message(message);
    }

    /// Records an [`EventKind::Warning`] message.
    pub fn warn(&self, message: impl Into<String>) {
        let _ = self.record(EventKind::Warning).message(message);
    }

    /// Appends every event of `other`.
    pub fn merge(&self, other: EventLog) {
        for event in other.events {
            self.events.push(event);
        }
    }

    /// Moves all events out, leaving the log empty.
    #[must_use]
    pub fn take(&mut self) -> EventLog {
        std::mem::take(self)
    }

    /// Number of recorded events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.count()
    }

    /// Returns `true` if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events in recording order.
    pub fn iter(&self) -> impl Iterator<Item = &Event> + '_ {
        self.events.iter().map(|(_, event)| event)
    }

    /// Number of events of `kind`.
    #[must_use]
    pub fn count_kind(&self, kind: EventKind) -> usize {
        self.iter().filter(|e| e.kind == kind).count()
    }

    /// Returns `true` if at least one event of `kind` was recorded.
    #[must_use]
    pub fn has(&self, kind: EventKind) -> bool {
        self.iter().any(|e| e.kind == kind)
    }

    /// One line per event kind that occurred, with its count.
    #[must_use]
    pub fn summary(&self) -> String {
        use strum::IntoEnumIterator;

        EventKind::iter()
            .filter_map(|kind| {
                let count = self.count_kind(kind);
                (count > 0).then(|| format!("{kind}: {count}"))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
