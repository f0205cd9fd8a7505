//! Transfer counters shared between the worker and UI readers.

use std::sync::atomic::{AtomicU64, Ordering};

/// Byte counters of one transfer.
///
/// Reads are relaxed snapshots for UI polling only. `copied` is a single
/// cumulative counter, so successive snapshots never go backwards.
#[derive(Debug, Default)]
pub struct XferProgress {
    /// Bytes copied over every entry, including the one in flight.
    copied: AtomicU64,
    /// Bytes copied of the entry in flight.
    current: AtomicU64,
    total: AtomicU64,
}

impl XferProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&self) {
        self.copied.store(0, Ordering::Relaxed);
        self.current.store(0, Ordering::Relaxed);
        self.total.store(0, Ordering::Relaxed);
    }

    pub fn set_total(&self, total: u64) {
        self.total.store(total, Ordering::Relaxed);
    }

    pub(crate) fn add_current(&self, bytes: u64) {
        self.copied.fetch_add(bytes, Ordering::Relaxed);
        self.current.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Start a new entry; its bytes stay counted in `copied`.
    pub(crate) fn finish_entry(&self) {
        self.current.store(0, Ordering::Relaxed);
    }

    /// Bytes copied of the entry in flight.
    pub fn current(&self) -> u64 {
        self.current.load(Ordering::Relaxed)
    }

    /// `(copied, total)`, with `copied` clamped to `total` once it is known.
    pub fn snapshot(&self) -> (u64, u64) {
        let total = self.total.load(Ordering::Relaxed);
        let copied = self.copied.load(Ordering::Relaxed);
        if total > 0 {
            (copied.min(total), total)
        } else {
            (copied, total)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entries_accumulate() {
        let progress = XferProgress::new();
        progress.set_total(30);
        progress.add_current(10);
        assert_eq!(progress.snapshot(), (10, 30));

        progress.finish_entry();
        progress.add_current(5);
        assert_eq!(progress.current(), 5);
        assert_eq!(progress.snapshot(), (15, 30));
    }

    #[test]
    fn test_copied_clamped_to_total() {
        let progress = XferProgress::new();
        progress.set_total(8);
        progress.add_current(20);
        assert_eq!(progress.snapshot(), (8, 8));
    }

    #[test]
    fn test_finish_entry_keeps_copied() {
        let progress = XferProgress::new();
        progress.add_current(12);
        progress.finish_entry();
        assert_eq!(progress.current(), 0);
        assert_eq!(progress.snapshot(), (12, 0));
    }

    #[test]
    fn test_snapshot_never_goes_backwards() {
        use std::sync::atomic::AtomicBool;
        use std::sync::Arc;

        let progress = Arc::new(XferProgress::new());
        let done = Arc::new(AtomicBool::new(false));
        let writer = {
            let progress = Arc::clone(&progress);
            let done = Arc::clone(&done);
            std::thread::spawn(move || {
                for _ in 0..10_000 {
                    progress.add_current(7);
                    progress.add_current(3);
                    progress.finish_entry();
                }
                done.store(true, Ordering::SeqCst);
            })
        };

        let mut last = 0;
        while !done.load(Ordering::SeqCst) {
            let (copied, _) = progress.snapshot();
            assert!(copied >= last, "copied went from {last} to {copied}");
            last = copied;
        }
        writer.join().unwrap();
        assert_eq!(progress.snapshot(), (100_000, 0));
    }

    #[test]
    fn test_reset() {
        let progress = XferProgress::new();
        progress.set_total(8);
        progress.add_current(4);
        progress.reset();
        assert_eq!(progress.snapshot(), (0, 0));
    }
}
