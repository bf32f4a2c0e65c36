/// An error returned by [`Mutex::try_lock`](crate::mutex::Mutex::try_lock).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TryLockError {
    /// The lock is held by somebody else right now.
    #[error("try_lock failed because the operation would block")]
    WouldBlock,
}

/// A type alias for the result of a nonblocking locking method.
pub type TryLockResult<Guard> = Result<Guard, TryLockError>;
