//! Calling-context resolution.
//!
//! Every execution context carries its kernel handle, process id and thread
//! id in host-thread-local state, installed by the context trampoline before
//! the task body runs. Kernel calls read it back instead of taking an
//! explicit "current thread" parameter.

use std::cell::RefCell;

use crate::{kernel::Kernel, proc::Pid, thread::Tid};

struct CurrentCtx {
    kernel: Kernel,
    pid: Pid,
    tid: Tid,
}

thread_local! {
    static CURRENT: RefCell<Option<CurrentCtx>> = const { RefCell::new(None) };
}

pub(crate) fn install(kernel: Kernel, pid: Pid, tid: Tid) {
    CURRENT.with(|c| *c.borrow_mut() = Some(CurrentCtx { kernel, pid, tid }));
}

/// Returns the calling context's kernel handle and identity.
///
/// Panics when called from a host thread that is not a kernel execution
/// context; kernel calls are only legal from inside task code.
pub(crate) fn context() -> (Kernel, Pid, Tid) {
    CURRENT.with(|c| match &*c.borrow() {
        Some(cur) => (cur.kernel.clone(), cur.pid, cur.tid),
        None => panic!("kernel call from outside any execution context"),
    })
}
