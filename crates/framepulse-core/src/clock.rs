use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

/// Ticket for one pending frame subscription.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct FrameRequest(u64);

impl FrameRequest {
    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Source of per-refresh ticks.
///
/// The host owns the actual refresh loop. The scheduler only asks for the next
/// tick, cancels it on stop, and reads the monotonic time for its own measurements.
pub trait FrameClock {
    /// Monotonic time in milliseconds.
    fn now_ms(&self) -> f64;

    /// Subscribe to the next tick.
    fn request_frame(&mut self) -> FrameRequest;

    /// Drop a subscription made by `request_frame`. Unknown tickets are ignored.
    fn cancel_frame(&mut self, request: FrameRequest);
}

/// Wall-clock source backed by `Instant`, for hosts that drive ticks from a loop.
pub struct SystemClock {
    origin: Instant,
    next_request: u64,
    pending: Option<FrameRequest>,
}

impl SystemClock {
    #[inline]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            next_request: 0,
            pending: None,
        }
    }

    /// Hands the pending subscription to the host loop, which delivers one tick for it.
    #[inline]
    pub fn take_pending(&mut self) -> Option<FrameRequest> {
        self.pending.take()
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameClock for SystemClock {
    #[inline]
    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }

    fn request_frame(&mut self) -> FrameRequest {
        self.next_request += 1;
        let request = FrameRequest(self.next_request);
        self.pending = Some(request);
        request
    }

    fn cancel_frame(&mut self, request: FrameRequest) {
        if self.pending == Some(request) {
            self.pending = None;
        }
    }
}

/// Deterministic clock whose time only moves when told to.
///
/// Clones share the same timeline, so a callback holding a clone can "spend"
/// time that the scheduler then measures.
#[derive(Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<f64>>,
    requests: Rc<Cell<u64>>,
    cancels: Rc<Cell<u64>>,
    pending: Rc<Cell<Option<FrameRequest>>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(now_ms: f64) -> Self {
        let clock = Self::default();
        clock.set(now_ms);
        clock
    }

    #[inline]
    pub fn set(&self, now_ms: f64) {
        self.now.set(now_ms);
    }

    #[inline]
    pub fn advance(&self, ms: f64) {
        self.now.set(self.now.get() + ms);
    }

    #[inline]
    pub fn pending(&self) -> Option<FrameRequest> {
        self.pending.get()
    }

    /// Total `request_frame` calls seen.
    #[inline]
    pub fn request_count(&self) -> u64 {
        self.requests.get()
    }

    /// Total effective `cancel_frame` calls seen.
    #[inline]
    pub fn cancel_count(&self) -> u64 {
        self.cancels.get()
    }
}

impl FrameClock for ManualClock {
    #[inline]
    fn now_ms(&self) -> f64 {
        self.now.get()
    }

    fn request_frame(&mut self) -> FrameRequest {
        let n = self.requests.get() + 1;
        self.requests.set(n);
        let request = FrameRequest(n);
        self.pending.set(Some(request));
        request
    }

    fn cancel_frame(&mut self, request: FrameRequest) {
        if self.pending.get() == Some(request) {
            self.pending.set(None);
            self.cancels.set(self.cancels.get() + 1);
        }
    }
}

#[cfg(test)]
#[path = "tests/clock_tests.rs"]
mod tests;
