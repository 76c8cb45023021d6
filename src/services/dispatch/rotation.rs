//! Round-robin rotation over endpoint candidates
//!
//! One `RotationSelector` holds one cursor. The cursor is shared by every call
//! on that selector, whichever candidate list is passed, so the pick is
//! "global call count modulo current list length". Callers that want fair
//! rotation must pass candidates in a consistent order.

use std::sync::atomic::{AtomicU64, Ordering};

/// Cursor wraps to zero before reaching this value (2^53 - 1)
pub const CURSOR_WRAP: u64 = (1 << 53) - 1;

/// Round-robin cursor, injectable so independent dispatchers never interfere
#[derive(Debug, Default)]
pub struct RotationSelector {
    cursor: AtomicU64,
}

impl RotationSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick the candidate under the cursor and advance it by one
    pub fn next<'a, T>(&self, candidates: &'a [T]) -> Option<&'a T> {
        if candidates.is_empty() {
            return None;
        }
        let position = self.advance();
        candidates.get((position % candidates.len() as u64) as usize)
    }

    /// Advance the cursor, returning the value it held before
    fn advance(&self) -> u64 {
        let step = |current: u64| {
            Some(if current + 1 >= CURSOR_WRAP {
                0
            } else {
                current + 1
            })
        };
        match self.cursor.fetch_update(Ordering::SeqCst, Ordering::SeqCst, step) {
            Ok(previous) | Err(previous) => previous,
        }
    }

    /// Current cursor value, without advancing
    pub fn peek(&self) -> u64 {
        self.cursor.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.cursor.store(0, Ordering::SeqCst);
        tracing::info!("Rotation cursor reset");
    }

    #[cfg(test)]
    fn set(&self, value: u64) {
        self.cursor.store(value, Ordering::SeqCst);
    }
}
