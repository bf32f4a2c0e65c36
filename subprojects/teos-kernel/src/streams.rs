//! Stream (open file object) bookkeeping.
//!
//! The kernel owns one table of reference-counted stream records; processes
//! refer to them through their bounded per-process fid tables. Only the
//! counting lives here: a record is opened with one reference, shared by
//! `exec` inheritance, and released exactly when its count reaches zero,
//! which the termination cascade relies on when it clears a dying process's
//! fid table.

use static_assertions::const_assert;

/// Per-process fid table size.
pub const MAX_FILEID: usize = 16;

// Slots 0 and 1 are the console pair every process starts with.
const_assert!(MAX_FILEID >= 2);

/// Index of a stream record in the kernel stream table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Fid(usize);

struct Fcb {
    refcount: usize,
}

pub(crate) struct StreamTable {
    slots: Vec<Option<Fcb>>,
}

impl StreamTable {
    pub(crate) fn new() -> StreamTable {
        StreamTable { slots: Vec::new() }
    }

    /// Opens a fresh stream record holding one reference.
    pub(crate) fn alloc(&mut self) -> Fid {
        let fcb = Fcb { refcount: 1 };
        match self.slots.iter().position(Option::is_none) {
            Some(i) => {
                self.slots[i] = Some(fcb);
                Fid(i)
            }
            None => {
                self.slots.push(Some(fcb));
                Fid(self.slots.len() - 1)
            }
        }
    }

    pub(crate) fn incref(&mut self, fid: Fid) {
        let Some(fcb) = self.slots.get_mut(fid.0).and_then(Option::as_mut) else {
            panic!("incref on a closed stream {fid:?}");
        };
        fcb.refcount += 1;
    }

    /// Drops one reference; the record is released when the count hits zero.
    pub(crate) fn decref(&mut self, fid: Fid) {
        let Some(fcb) = self.slots.get_mut(fid.0).and_then(Option::as_mut) else {
            panic!("decref on a closed stream {fid:?}");
        };
        fcb.refcount -= 1;
        if fcb.refcount == 0 {
            self.slots[fid.0] = None;
        }
    }

    /// Number of live stream records.
    pub(crate) fn live(&self) -> usize {
        self.slots.iter().flatten().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_opens_with_one_reference() {
        let mut table = StreamTable::new();
        let fid = table.alloc();
        assert_eq!(table.live(), 1);
        table.decref(fid);
        assert_eq!(table.live(), 0);
    }

    #[test]
    fn test_released_at_zero_not_before() {
        let mut table = StreamTable::new();
        let fid = table.alloc();
        table.incref(fid);
        table.incref(fid);
        table.decref(fid);
        table.decref(fid);
        assert_eq!(table.live(), 1);
        table.decref(fid);
        assert_eq!(table.live(), 0);
    }

    #[test]
    fn test_slots_are_reused() {
        let mut table = StreamTable::new();
        let a = table.alloc();
        let b = table.alloc();
        table.decref(a);
        let c = table.alloc();
        assert_eq!(a, c);
        assert_ne!(b, c);
    }

    #[test]
    #[should_panic(expected = "closed stream")]
    fn test_decref_on_closed_stream_panics() {
        let mut table = StreamTable::new();
        let fid = table.alloc();
        table.decref(fid);
        table.decref(fid);
    }
}
