//! Terminal sleep for execution contexts.

use std::panic;

/// Unwind payload of the terminal sleep.
///
/// The spawn trampoline treats this payload as a clean end of execution;
/// anything else unwinding out of a context is a real panic and keeps
/// propagating.
pub(crate) struct ExitSignal;

/// Ends the calling context and never returns.
///
/// The context's host thread unwinds up to the trampoline installed by
/// [`spawn`](crate::context::spawn) and finishes there, to be released by
/// [`reap`](crate::context::Context::reap). Callers must not hold locks when
/// exiting, and must only call this from inside a spawned context.
pub fn exit() -> ! {
    panic::resume_unwind(Box::new(ExitSignal))
}
