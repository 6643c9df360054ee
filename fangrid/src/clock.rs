use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// A wrapping millisecond counter with a blocking sleep.
///
/// `now_ms` counts up from 0 and wraps back to 0 on reaching
/// `period_ms`. Every wait in the crate is written against this trait so
/// it can run on a simulated clock.
pub trait Clock {
    fn now_ms(&self) -> u32;

    /// Counter value at which `now_ms` wraps to 0.
    fn period_ms(&self) -> u32;

    fn sleep_ms(&self, ms: u32);

    /// Milliseconds since `start`, correct across one counter rollover.
    fn elapsed_since(&self, start: u32) -> u32 {
        let now = self.now_ms();
        if now >= start {
            now - start
        } else {
            self.period_ms() - start + now
        }
    }
}

/// A started timer, the equivalent of a raw start timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stopwatch {
    start: u32,
}

impl Stopwatch {
    pub fn start<C: Clock>(clock: &C) -> Self {
        Self {
            start: clock.now_ms(),
        }
    }

    pub fn elapsed_ms<C: Clock>(&self, clock: &C) -> u32 {
        clock.elapsed_since(self.start)
    }

    pub fn has_elapsed<C: Clock>(&self, clock: &C, ms: u32) -> bool {
        self.elapsed_ms(clock) >= ms
    }
}

/// Wall clock backed by `std::time::Instant`.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u32 {
        (self.origin.elapsed().as_millis() % u128::from(self.period_ms())) as u32
    }

    fn period_ms(&self) -> u32 {
        u32::MAX
    }

    fn sleep_ms(&self, ms: u32) {
        std::thread::sleep(Duration::from_millis(u64::from(ms)));
    }
}

/// Simulated clock: sleeping advances time instantly.
///
/// Clones share the same counter, so every simulated node and fan sees
/// the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Rc<Cell<u32>>,
    period: u32,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::with_period(u32::MAX)
    }

    /// A clock whose counter wraps at `period` ms.
    pub fn with_period(period: u32) -> Self {
        assert!(period > 0, "clock period must be non-zero");
        Self {
            now: Rc::new(Cell::new(0)),
            period,
        }
    }

    pub fn set(&self, ms: u32) {
        self.now.set(ms % self.period);
    }

    pub fn advance(&self, ms: u32) {
        let next = (u64::from(self.now.get()) + u64::from(ms)) % u64::from(self.period);
        self.now.set(next as u32);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u32 {
        self.now.get()
    }

    fn period_ms(&self) -> u32 {
        self.period
    }

    fn sleep_ms(&self, ms: u32) {
        self.advance(ms);
    }
}
