//! Event system for pipeline progress and the debug log stream.
//!
//! Provides an optional, non-intrusive way to observe a run. The
//! orchestrator emits an event on every state transition and on every log
//! append. A presentation layer implements [`EventHandler`] to render
//! progress and a debug console.

use crate::orchestrator::PipelineState;
use crate::run_log::LogEntry;
use std::sync::Arc;

/// Events emitted during a pipeline run.
#[derive(Debug, Clone)]
pub enum Event {
    /// The orchestrator moved from one state to another.
    StageChanged {
        from: PipelineState,
        to: PipelineState,
    },
    /// A log entry was appended to the run log.
    Log(LogEntry),
}

/// Handler for pipeline events.
///
/// This is entirely optional -- the orchestrator works without one.
///
/// # Example
///
/// ```
/// use codeshift::events::{Event, EventHandler};
///
/// struct PrintHandler;
///
/// impl EventHandler for PrintHandler {
///     fn on_event(&self, event: Event) {
///         match event {
///             Event::StageChanged { to, .. } => println!("[state] {}", to),
///             Event::Log(entry) => println!("[{}] {:?}", entry.stage, entry.kind),
///         }
///     }
/// }
/// ```
pub trait EventHandler: Send + Sync {
    /// Called for every emitted event, in order.
    fn on_event(&self, event: Event);
}

/// Emit an event if a handler is present. No-op otherwise.
pub(crate) fn emit(handler: &Option<Arc<dyn EventHandler>>, event: Event) {
    if let Some(ref h) = handler {
        h.on_event(event);
    }
}

/// An [`EventHandler`] backed by a closure.
///
/// # Example
///
/// ```
/// use codeshift::events::{Event, FnEventHandler};
/// use std::sync::Arc;
///
/// let handler = Arc::new(FnEventHandler(|event: Event| {
///     if let Event::Log(entry) = event {
///         println!("{}", entry.content);
///     }
/// }));
/// ```
pub struct FnEventHandler<F: Fn(Event) + Send + Sync>(pub F);

impl<F: Fn(Event) + Send + Sync> EventHandler for FnEventHandler<F> {
    fn on_event(&self, event: Event) {
        (self.0)(event);
    }
}
