//! Threads: creation, join, detach, exit.
//!
//! Every thread owns a wrapper record ([`Ptcb`]) in its process's thread
//! table. The record outlives the thread when joiners still need it: a
//! joiner takes a reference under the kernel lock, waits on the record's
//! condition variable (cloned out first, so the record itself may be freed
//! mid-wait), and on waking re-finds the record by id. Whoever observes the
//! reference count at zero in a terminal state reclaims the record, and both
//! exit paths tolerate finding their own record already gone. All of it runs
//! under the one kernel lock; no reference count survives its record.

use std::{fmt, mem, sync::Arc};

use log::{debug, trace};
use teos_sched::context::{self, Completion};
use teos_sync::condvar::Condvar;

use crate::{
    current,
    kernel::{Kernel, KernelState},
    proc::{self, Pid, ProcState},
};

/// Identifier of a thread, unique within a kernel instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tid(u64);

impl Tid {
    /// The null thread id; no real thread ever carries it.
    pub const NOTHREAD: Tid = Tid(0);

    pub(crate) fn new(raw: u64) -> Tid {
        Tid(raw)
    }
}

impl fmt::Display for Tid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Entry point of a kernel thread; receives the argument buffer the thread
/// was created with.
pub type Task = fn(&[u8]) -> i32;

/// Thread wrapper record.
pub(crate) struct Ptcb {
    pub(crate) tid: Tid,
    task: Task,
    /// `None` for a main thread, which runs on the process argument buffer.
    args: Option<Box<[u8]>>,
    exit_value: i32,
    exited: bool,
    detached: bool,
    /// Joiners currently inside the wait protocol.
    refcount: usize,
    /// Cloned out before blocking; keeps waits valid across the record's
    /// reclamation.
    exit_cv: Arc<Condvar>,
}

impl Ptcb {
    pub(crate) fn new(tid: Tid, task: Task, args: Option<Box<[u8]>>) -> Ptcb {
        Ptcb {
            tid,
            task,
            args,
            exit_value: 0,
            exited: false,
            detached: false,
            refcount: 0,
            exit_cv: Arc::new(Condvar::new()),
        }
    }
}

/// Error type for [`join`].
#[derive(Debug, thiserror::Error)]
pub enum ThreadJoinError {
    /// The null thread cannot be joined.
    #[error("cannot join the null thread")]
    NullThread,
    /// A thread cannot join itself.
    #[error("a thread cannot join itself")]
    WouldDeadlock,
    /// No record with this id in the calling process.
    #[error("no thread t{0} in the calling process")]
    NotFound(Tid),
    /// The target is detached; its value is not observable.
    #[error("t{0} is detached")]
    Detached(Tid),
}

/// Error type for [`detach`].
#[derive(Debug, thiserror::Error)]
pub enum ThreadDetachError {
    /// The null thread cannot be detached.
    #[error("cannot detach the null thread")]
    NullThread,
    /// No record with this id in the calling process.
    #[error("no thread t{0} in the calling process")]
    NotFound(Tid),
    /// Detach is only meaningful before the target exits.
    #[error("t{0} has already exited")]
    AlreadyExited(Tid),
}

/// Starts a new thread in the calling process and returns its id.
///
/// The thread runs `task` with a copy of `args` as its argument buffer. Its
/// exit value is observable through [`join`] until the record is reclaimed.
pub fn create(task: Task, args: &[u8]) -> Tid {
    let (kernel, pid, _) = current::context();
    let mut st = kernel.lock_state();
    let tid = st.alloc_tid();

    let pcb = st.proc_mut(pid);
    pcb.thread_count += 1;
    pcb.insert_wrapper(Ptcb::new(tid, task, Some(args.into())));
    trace!("[p{pid}] create t{tid}");

    spawn_task_context(&mut st, &kernel, pid, tid);
    tid
}

/// Returns the calling thread's id. Pure, never fails.
pub fn current() -> Tid {
    let (_, _, tid) = current::context();
    tid
}

/// Waits for `target` to reach a terminal state and returns its exit value.
///
/// Several threads may join the same target; each holds a reference on the
/// record while it waits and every one of them observes the same value. The
/// joiner that drops the last reference after a terminal state reclaims the
/// record, whether the outcome was an exit or a detach; later joins report
/// [`ThreadJoinError::NotFound`].
///
/// A target that is detached, or becomes detached mid-wait, yields
/// [`ThreadJoinError::Detached`]. A record reclaimed while the caller slept
/// reports the same: only a detach can take a record away from under its
/// waiters.
pub fn join(target: Tid) -> Result<i32, ThreadJoinError> {
    let (kernel, pid, me) = current::context();
    if target == Tid::NOTHREAD {
        return Err(ThreadJoinError::NullThread);
    }
    if target == me {
        return Err(ThreadJoinError::WouldDeadlock);
    }

    let mut st = kernel.lock_state();
    {
        let pcb = st.proc_mut(pid);
        let Some(wrapper) = pcb.wrapper_mut(target) else {
            return Err(ThreadJoinError::NotFound(target));
        };
        wrapper.refcount += 1;
    }
    trace!("[p{pid}] t{me} joins t{target}");

    loop {
        let cv = {
            let pcb = st.proc(pid);
            let Some(wrapper) = pcb.wrapper(target) else {
                // Reclaimed while we slept; our reference went down with
                // the record, and that only happens to detached targets.
                return Err(ThreadJoinError::Detached(target));
            };
            if wrapper.exited || wrapper.detached {
                break;
            }
            wrapper.exit_cv.clone()
        };
        st = cv.wait(st);
    }

    // Terminal state seen; the record cannot vanish under an unbroken lock
    // hold.
    let pcb = st.proc_mut(pid);
    let Some(wrapper) = pcb.wrapper_mut(target) else {
        panic!("t{target} vanished under the kernel lock");
    };
    wrapper.refcount -= 1;
    let last = wrapper.refcount == 0;
    let outcome = if wrapper.detached {
        Err(ThreadJoinError::Detached(target))
    } else {
        Ok(wrapper.exit_value)
    };
    if last {
        pcb.remove_wrapper(target);
    }
    outcome
}

/// Makes `target` unjoinable and wakes every pending joiner.
///
/// The joiners drain out with [`ThreadJoinError::Detached`]; the last
/// reference out reclaims the record even though the target may still be
/// running, and the target's own exit copes with that. Detaching a thread
/// that has already exited fails, a second detach of the same live thread
/// is a no-op, and a thread may detach itself.
pub fn detach(target: Tid) -> Result<(), ThreadDetachError> {
    let (kernel, pid, _) = current::context();
    if target == Tid::NOTHREAD {
        return Err(ThreadDetachError::NullThread);
    }

    let mut st = kernel.lock_state();
    let pcb = st.proc_mut(pid);
    let Some(wrapper) = pcb.wrapper_mut(target) else {
        return Err(ThreadDetachError::NotFound(target));
    };
    if wrapper.exited {
        return Err(ThreadDetachError::AlreadyExited(target));
    }
    wrapper.detached = true;
    // Signaled under the lock, monitor style.
    wrapper.exit_cv.notify_all();
    trace!("[p{pid}] t{target} detached");
    Ok(())
}

/// Ends the calling thread with `value` as its exit value and never returns.
///
/// When siblings remain the value is published on the thread's record for
/// joiners to collect. The last thread of a process instead tears the whole
/// process down; see the module notes on the cascade.
pub fn exit(value: i32) -> ! {
    let (kernel, pid, tid) = current::context();
    {
        let mut st = kernel.lock_state();
        trace!("[p{pid}] t{tid} exit({value})");
        exit_current(&mut st, pid, tid, value);
    }
    teos_sched::exit::exit()
}

fn exit_current(st: &mut KernelState, pid: Pid, tid: Tid, value: i32) {
    let last = {
        let pcb = st.proc_mut(pid);
        pcb.thread_count -= 1;
        pcb.thread_count == 0
    };
    if last {
        terminate_process(st, pid, tid, value);
        return;
    }

    let pcb = st.proc_mut(pid);
    let Some(wrapper) = pcb.wrapper_mut(tid) else {
        // A joiner reclaimed our record after a detach; nothing left to
        // publish on.
        return;
    };
    wrapper.exit_value = value;
    wrapper.exited = true;
    if wrapper.detached {
        // Nobody can join a detached thread; the record goes with it.
        pcb.remove_wrapper(tid);
    } else {
        wrapper.exit_cv.notify_all();
    }
}

/// Last-thread teardown of a whole process.
///
/// Order matters here: sibling records die first, then the child and zombie
/// lists are handed to the root, then the parent learns of the new zombie,
/// then argument buffer and stream references go, and only then does the
/// exiting thread publish and retire its own record.
fn terminate_process(st: &mut KernelState, pid: Pid, tid: Tid, value: i32) {
    debug!("[p{pid}] last thread t{tid} down, tearing the process down");

    {
        // No live thread remains, so no join can be pending on any of
        // these records.
        let pcb = st.proc_mut(pid);
        for slot in pcb.threads.iter_mut() {
            if slot.as_ref().is_some_and(|w| w.tid != tid) {
                *slot = None;
            }
        }
    }

    if pid != Pid::ROOT {
        let (parent, children, zombies) = {
            let pcb = st.proc_mut(pid);
            let parent = match pcb.parent {
                Some(parent) => parent,
                None => panic!("non-root p{pid} has no parent"),
            };
            (
                parent,
                mem::take(&mut pcb.children),
                mem::take(&mut pcb.exited),
            )
        };

        // The root adopts every child, zombies included.
        for &child in &children {
            st.proc_mut(child).parent = Some(Pid::ROOT);
        }
        let root = st.proc_mut(Pid::ROOT);
        root.children.extend(children);
        if !zombies.is_empty() {
            root.exited.extend(zombies);
            root.child_exit.notify_all();
        }

        // Become a zombie of our own parent.
        let parent_pcb = st.proc_mut(parent);
        parent_pcb.exited.push(pid);
        parent_pcb.child_exit.notify_all();
    }

    let fids = {
        let pcb = st.proc_mut(pid);
        pcb.args = None;
        pcb.fid_table
            .iter_mut()
            .filter_map(Option::take)
            .collect::<Vec<_>>()
    };
    for fid in fids {
        st.streams.decref(fid);
    }

    let pcb = st.proc_mut(pid);
    if let Some(wrapper) = pcb.wrapper_mut(tid) {
        // A joiner is itself a live thread of this process, so none can be
        // blocked on the last record. It may already be gone though, when a
        // joiner reclaimed it after a detach.
        wrapper.exit_value = value;
        wrapper.exited = true;
        wrapper.exit_cv.notify_all();
    }
    pcb.remove_wrapper(tid);
    debug_assert_eq!(pcb.live_wrappers(), 0);
    // The handoff left nothing behind; only the root keeps its orphans.
    debug_assert!(pid == Pid::ROOT || (pcb.children.is_empty() && pcb.exited.is_empty()));
    pcb.main_thread = None;
    pcb.state = ProcState::Zombie;
}

/// Spawns the execution context that runs a thread's task.
///
/// What the context runs is resolved here, under the caller's lock hold,
/// right after the caller inserted the record: a main thread gets a copy
/// of the process argument buffer, a worker takes the buffer captured at
/// creation. A joiner can reclaim a detached record before the context
/// first runs, so the body never reads the record back. The task's return
/// value is routed by role: a main thread's return exits the whole
/// process, a worker's return exits just the thread.
pub(crate) fn spawn_task_context(st: &mut KernelState, kernel: &Kernel, pid: Pid, tid: Tid) {
    let pcb = st.proc_mut(pid);
    let main = pcb.main_thread == Some(tid);
    let Some(wrapper) = pcb.wrapper_mut(tid) else {
        panic!("t{tid} has no record to start from");
    };
    let task = wrapper.task;
    let args = match wrapper.args.take() {
        Some(args) => args,
        None if main => pcb.args.clone().unwrap_or_default(),
        None => panic!("t{tid} has nothing to run"),
    };

    let body = {
        let kernel = kernel.clone();
        move || {
            current::install(kernel, pid, tid);
            match context::run(move || task(&args)) {
                Completion::Returned(value) if main => proc::exit(value),
                Completion::Returned(value) => exit(value),
                Completion::Exited => {}
            }
        }
    };
    let mut ctx = match context::spawn(format!("p{pid}.t{tid}"), body) {
        Ok(ctx) => ctx,
        Err(err) => panic!("cannot start a context for p{pid}.t{tid}: {err}"),
    };
    ctx.start();
    st.contexts.push(ctx);
}
