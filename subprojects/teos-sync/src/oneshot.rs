//! A blocking, single-producer, single-consumer one-shot channel.
//!
//! The scheduler layer uses these as start gates (a context created in the
//! suspended state blocks on `recv` until somebody fires `send`) and for
//! handing single results between contexts.

use std::{mem, sync::Arc};

use crate::{condvar::Condvar, mutex::Mutex};

/// Creates a new one-shot channel for sending a single value.
///
/// The returned [`Sender`] and [`Receiver`] are linked to each other.
pub fn channel<T>() -> (Sender<T>, Receiver<T>) {
    let shared = Arc::new(Shared {
        state: Mutex::new(State::Waiting),
        cvar: Condvar::new(),
    });
    let sender = Sender {
        shared: shared.clone(),
    };
    let receiver = Receiver { shared };
    (sender, receiver)
}

/// The sending half of a one-shot channel.
pub struct Sender<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Sender<T> {
    /// Attempts to send a value on this channel, returning it back if the
    /// [`Receiver`] is already gone.
    pub fn send(self, value: T) -> Result<(), SendError<T>> {
        let mut state = self.shared.state.lock();
        if let State::Closed = *state {
            return Err(SendError(value));
        }
        *state = State::Sent(value);
        self.shared.cvar.notify_one();
        Ok(())
    }
}

impl<T> Drop for Sender<T> {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock();
        // A sender dropped without sending closes the channel and wakes the
        // receiver; after a successful send there is nothing to do.
        if let State::Waiting = *state {
            *state = State::Closed;
            self.shared.cvar.notify_one();
        }
    }
}

/// The receiving half of a one-shot channel.
pub struct Receiver<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Receiver<T> {
    /// Waits for the value, blocking the current context until it is sent or
    /// the [`Sender`] is dropped.
    pub fn recv(self) -> Result<T, RecvError> {
        let mut state = self.shared.state.lock();
        loop {
            match mem::replace(&mut *state, State::Waiting) {
                State::Sent(value) => {
                    *state = State::Closed;
                    return Ok(value);
                }
                State::Closed => {
                    *state = State::Closed;
                    return Err(RecvError);
                }
                State::Waiting => state = self.shared.cvar.wait(state),
            }
        }
    }
}

impl<T> Drop for Receiver<T> {
    fn drop(&mut self) {
        // Closing drops an unreceived value in place and makes any later
        // send fail.
        *self.shared.state.lock() = State::Closed;
    }
}

/// An error returned from [`Sender::send`] when the receiving half was
/// dropped first. The error contains the value that could not be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("channel closed")]
pub struct SendError<T>(pub T);

/// An error returned from [`Receiver::recv`] when the sending half was
/// dropped before a value was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("channel closed")]
pub struct RecvError;

enum State<T> {
    /// No value yet, both halves may still be alive.
    Waiting,
    /// Value delivered, waiting to be picked up.
    Sent(T),
    /// One half is gone; no value will ever cross.
    Closed,
}

struct Shared<T> {
    state: Mutex<State<T>>,
    cvar: Condvar,
}

#[cfg(test)]
mod tests {
    use std::{thread, time::Duration};

    use super::*;

    #[test]
    fn test_send_then_recv() {
        let (tx, rx) = channel();
        tx.send(42).unwrap();
        assert_eq!(rx.recv(), Ok(42));
    }

    #[test]
    fn test_recv_blocks_until_send() {
        let (tx, rx) = channel();
        let sender = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            tx.send("late").unwrap();
        });
        assert_eq!(rx.recv(), Ok("late"));
        sender.join().unwrap();
    }

    #[test]
    fn test_dropped_sender_closes() {
        let (tx, rx) = channel::<u8>();
        drop(tx);
        assert_eq!(rx.recv(), Err(RecvError));
    }

    #[test]
    fn test_dropped_receiver_fails_send() {
        let (tx, rx) = channel();
        drop(rx);
        assert_eq!(tx.send(9), Err(SendError(9)));
    }

    #[test]
    fn test_unreceived_value_is_dropped_with_receiver() {
        let (tx, rx) = channel();
        tx.send(Arc::new(())).unwrap();
        drop(rx);
    }
}
