//! Test helpers: event recording and execution traces.
//!
//! Use [`EventRecorder`] as the callback of a notifier or expression binding
//! to capture what was delivered, and [`depth_trace`] to compare how an
//! instrumented expression uses the stack against the original.

pub mod recorder;
pub mod trace;

pub use recorder::{EventRecorder, RecordedEvent};
pub use trace::{depth_trace, opnames, original_steps, Step};
