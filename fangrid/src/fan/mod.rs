pub mod validator;

pub use validator::{Validation, Validators};

use crate::clock::{Clock, Stopwatch};

/// Hardware that powers the fans and reports their tach signals.
///
/// Bit `i` of either mask is fan `i` of the cell.
pub trait FanDriver {
    fn set_outputs(&mut self, mask: u32);

    /// Tach status of every fan. Reading also resets latched edges.
    fn read_raw_status(&mut self) -> u32;
}

/// A cell's 32 fans with debounced readout and optional write-back
/// confirmation.
pub struct FanBank<D, C> {
    driver: D,
    clock: C,
    detect_ms: u32,
}

impl<D: FanDriver, C: Clock> FanBank<D, C> {
    pub fn new(driver: D, clock: C, detect_ms: u32) -> Self {
        Self {
            driver,
            clock,
            detect_ms,
        }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    /// Fans confirmed spinning on two samples `detect_ms` apart.
    ///
    /// Blocks for two sample gaps of at least 1ms each, so the
    /// confirmation loop in [`FanBank::set_state`] always makes progress.
    pub fn read_state(&mut self) -> u32 {
        let gap = self.detect_ms.max(1);
        self.driver.read_raw_status();
        self.clock.sleep_ms(gap);
        let mut state = self.driver.read_raw_status();
        self.clock.sleep_ms(gap);
        state &= self.driver.read_raw_status();
        state
    }

    /// Drive the fans to `state`.
    ///
    /// With a non-zero `validate_ms` the readout is repeated until it
    /// matches `state`; if the window closes first the observed state is
    /// returned instead. A zero window skips the check.
    pub fn set_state(&mut self, state: u32, validate_ms: u32) -> u32 {
        self.driver.set_outputs(state);
        if validate_ms == 0 {
            return state;
        }

        let timer = Stopwatch::start(&self.clock);
        let mut observed = self.read_state();
        while observed != state {
            if timer.has_elapsed(&self.clock, validate_ms) {
                log::debug!(
                    "fans did not settle within {validate_ms}ms: wanted {state:#010x}, saw {observed:#010x}"
                );
                return observed;
            }
            observed = self.read_state();
        }
        state
    }
}
