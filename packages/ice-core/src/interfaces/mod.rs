//! Change Source / Context Sink interfaces (C6/C7, spec.md §6).

mod notify_source;
mod traits;

pub use notify_source::NotifyChangeSource;
pub use traits::{ContextSink, EmittedContext, ChangeSource};
