//! Frame-rate coalescing of pointer samples.
//!
//! Pointer-move events arrive faster than the display refreshes. The
//! scheduler keeps only the newest sample and asks the host for a single
//! animation frame; when that frame fires the newest sample is handed back
//! once. Samples are never reordered, only superseded.

#[cfg(test)]
#[path = "scheduler_test.rs"]
mod scheduler_test;

/// Identity of one requested animation frame.
///
/// Tokens from a scheduler are strictly increasing, so a frame that fires
/// after being cancelled or superseded is recognised as stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameToken(u64);

impl FrameToken {
    /// Raw token value, for hosts that key their frame callbacks by integer.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Coalesces samples of type `T` into at most one delivery per frame.
#[derive(Debug)]
pub struct FrameScheduler<T> {
    issued: u64,
    pending: Option<FrameToken>,
    latest: Option<T>,
}

impl<T> Default for FrameScheduler<T> {
    fn default() -> Self {
        Self { issued: 0, pending: None, latest: None }
    }
}

impl<T> FrameScheduler<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `sample` as the newest. Returns a token when the host must
    /// request a frame; `None` when a frame is already outstanding.
    pub fn propose(&mut self, sample: T) -> Option<FrameToken> {
        self.latest = Some(sample);
        if self.pending.is_some() {
            return None;
        }
        self.issued += 1;
        let token = FrameToken(self.issued);
        self.pending = Some(token);
        Some(token)
    }

    /// Deliver the newest sample if `token` is the outstanding frame.
    pub fn on_frame(&mut self, token: FrameToken) -> Option<T> {
        if self.pending != Some(token) {
            return None;
        }
        self.pending = None;
        self.latest.take()
    }

    /// Drop any outstanding frame and sample. Returns the token the host
    /// should cancel, if one was outstanding.
    pub fn cancel(&mut self) -> Option<FrameToken> {
        self.latest = None;
        self.pending.take()
    }

    #[must_use]
    pub fn pending(&self) -> Option<FrameToken> {
        self.pending
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}
