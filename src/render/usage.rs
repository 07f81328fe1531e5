use std::sync::atomic::{AtomicU32, Ordering};

const IDLE: u32 = 0;
const WRITING: u32 = 1;
const READY: u32 = 2;
// READING_BASE + n - 1 encodes n concurrent readers
const READING_BASE: u32 = 3;

/// Observable state of a [`UsageGuard`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UsageState {
    /// Nothing published yet, or the last write was abandoned.
    Idle,
    /// A writer owns the surface.
    Writing,
    /// A complete frame is available.
    Ready,
    /// `n` readers hold the completed frame.
    Reading(u32),
}

/// Lock-free single-writer / multi-reader hand-off of a render surface.
///
/// Every failed acquisition is a normal "busy or nothing to show" outcome: the writer skips
/// the frame while readers hold the surface, readers skip while a write is in progress.
#[derive(Debug, Default)]
pub struct UsageGuard {
    state: AtomicU32,
}

impl UsageGuard {
    pub const fn new() -> Self {
        Self {
            state: AtomicU32::new(IDLE),
        }
    }

    pub fn state(&self) -> UsageState {
        decode(self.state.load(Ordering::Acquire))
    }

    /// A complete frame is published (possibly being read).
    pub fn has_frame(&self) -> bool {
        self.state.load(Ordering::Acquire) >= READY
    }

    /// Idle/Ready -> Writing. Fails while another writer or any reader is active.
    pub fn try_begin_write(&self) -> bool {
        let mut cur = self.state.load(Ordering::Acquire);
        loop {
            if cur != IDLE && cur != READY {
                return false;
            }
            match self
                .state
                .compare_exchange_weak(cur, WRITING, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return true,
                Err(actual) => cur = actual,
            }
        }
    }

    /// Writing -> Ready.
    pub fn complete_write(&self) {
        let prev = self.state.swap(READY, Ordering::AcqRel);
        debug_assert_eq!(prev, WRITING, "complete_write without begin");
    }

    /// Writing -> Idle; the partially written surface must not be shown.
    pub fn abort_write(&self) {
        let prev = self.state.swap(IDLE, Ordering::AcqRel);
        debug_assert_eq!(prev, WRITING, "abort_write without begin");
    }

    /// Ready/Reading(n) -> Reading(n + 1). Fails if nothing is published or a write is active.
    pub fn try_begin_read(&self) -> bool {
        let mut cur = self.state.load(Ordering::Acquire);
        loop {
            let next = match cur {
                READY => READING_BASE,
                n if n >= READING_BASE && n < u32::MAX => n + 1,
                _ => return false,
            };
            match self
                .state
                .compare_exchange_weak(cur, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return true,
                Err(actual) => cur = actual,
            }
        }
    }

    /// Reading(n) -> Reading(n - 1), or Ready after the last reader.
    pub fn complete_read(&self) {
        let mut cur = self.state.load(Ordering::Acquire);
        loop {
            let next = match cur {
                READING_BASE => READY,
                n if n > READING_BASE => n - 1,
                _ => {
                    debug_assert!(false, "complete_read without begin");
                    return;
                }
            };
            match self
                .state
                .compare_exchange_weak(cur, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return,
                Err(actual) => cur = actual,
            }
        }
    }
}

fn decode(raw: u32) -> UsageState {
    match raw {
        IDLE => UsageState::Idle,
        WRITING => UsageState::Writing,
        READY => UsageState::Ready,
        n => UsageState::Reading(n - READING_BASE + 1),
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/usage.rs"]
mod tests;
