//! Sequence resolver cursor.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// A lock-free cursor counting how many sequence items a route has handed out.
///
/// Every advance claims a distinct position, so concurrent callers never
/// receive the same item. Once the position runs past the end the last item
/// keeps being returned.
#[derive(Default)]
pub struct SequenceCursor(AtomicU64);

impl SequenceCursor {
    #[must_use]
    pub const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Cursor resuming from a previously observed position.
    #[must_use]
    pub const fn at(position: u64) -> Self {
        Self(AtomicU64::new(position))
    }

    /// Number of items handed out so far.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    /// Index the next advance would return for a sequence of `len` items.
    #[must_use]
    pub fn peek(&self, len: usize) -> usize {
        clamp(self.position(), len)
    }

    /// Claim the next index for a sequence of `len` items.
    #[must_use]
    pub fn advance(&self, len: usize) -> usize {
        let old_value = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
                Some(v.saturating_add(1))
            })
            .unwrap_or_else(|e| {
                debug_assert!(false, "we never return None from fetch_update");
                e
            });
        clamp(old_value, len)
    }

    pub fn reset(&self) {
        self.0.store(0, Ordering::Release);
    }
}

fn clamp(position: u64, len: usize) -> usize {
    let last = len.saturating_sub(1);
    usize::try_from(position).map_or(last, |p| p.min(last))
}

impl fmt::Debug for SequenceCursor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SequenceCursor")
            .field("position", &self.position())
            .finish()
    }
}
