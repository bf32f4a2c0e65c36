//! # teos-kernel
//!
//! A hosted simulation of a teaching OS kernel's process and thread core:
//! thread create/join/detach/exit with racing, reference-counted teardown,
//! and the termination cascade that folds a dying process into the process
//! tree (orphan reparenting, zombie handoff, parent wakeup).
//!
//! ## Design at a glance
//!
//! - One kernel-wide lock. Every kernel call holds the big
//!   [`teos_sync::mutex::Mutex`] around [`kernel::Kernel`]'s state for its
//!   whole duration; blocking protocols park on condition variables that
//!   atomically release and reacquire it. Concurrency comes from many
//!   execution contexts, not from fine-grained locking.
//! - Execution contexts are host threads, managed by `teos-sched`: created
//!   suspended, made runnable once their bookkeeping is published, ended by
//!   a terminal sleep they never return from.
//! - Processes live in an arena table indexed by [`proc::Pid`]; parent and
//!   child links are indices, never pointers. Pid 1 is the root process and
//!   adopts every orphan.
//! - Thread wrappers are owned by their process's slot table. Joins hold an
//!   explicit count under the kernel lock; whoever observes the count reach
//!   zero after a terminal state destroys the wrapper, exactly once.
//!
//! Kernel calls are free functions ([`thread::create`], [`thread::join`],
//! [`proc::exec`], [`proc::wait_child`], ...) that resolve the calling
//! context from thread-local state. They may only be called from task code
//! running inside a booted [`kernel::Kernel`].

pub mod kernel;
pub mod logger;
pub mod proc;
pub mod streams;
pub mod thread;

mod current;
