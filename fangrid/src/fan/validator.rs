use crate::clock::{Clock, Stopwatch};
use crate::layout::FANS_PER_CELL;

/// Debounce state of one fan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Validation {
    #[default]
    Idle,
    /// Commanded off; spinning is still expected until the window closes.
    Validating(Stopwatch),
}

/// Per-fan spin-down filter for one cell.
///
/// A fan turned off by command keeps spinning for several seconds. Until
/// it stops, or the window runs out, that spinning is not reported as a
/// person turning the fan back on.
#[derive(Debug, Clone)]
pub struct Validators {
    slots: [Validation; FANS_PER_CELL],
    window_ms: u32,
}

impl Validators {
    pub fn new(window_ms: u32) -> Self {
        Self {
            slots: [Validation::Idle; FANS_PER_CELL],
            window_ms,
        }
    }

    /// Record a commanded change from `current` to `target`.
    ///
    /// Fans going on→off are armed, fans going off→on are disarmed, and
    /// fans whose commanded state is unchanged keep their slot. Returns
    /// the mask of newly armed fans.
    pub fn arm_transitions<C: Clock>(&mut self, current: u32, target: u32, clock: &C) -> u32 {
        let changed = current ^ target;
        let turned_off = changed & current;
        let turned_on = changed & target;
        for (i, slot) in self.slots.iter_mut().enumerate() {
            let bit = 1u32 << i;
            if turned_off & bit != 0 {
                *slot = Validation::Validating(Stopwatch::start(clock));
            } else if turned_on & bit != 0 {
                *slot = Validation::Idle;
            }
        }
        turned_off
    }

    /// Mask out spinning that is still explained by a commanded stop.
    ///
    /// Slots whose fan has stopped, or whose window has run out, return
    /// to idle.
    pub fn filter<C: Clock>(&mut self, observed: u32, clock: &C) -> u32 {
        let mut visible = observed;
        for (i, slot) in self.slots.iter_mut().enumerate() {
            let Validation::Validating(timer) = *slot else {
                continue;
            };
            let bit = 1u32 << i;
            if observed & bit == 0 {
                *slot = Validation::Idle;
            } else if timer.has_elapsed(clock, self.window_ms) {
                *slot = Validation::Idle;
            } else {
                visible &= !bit;
            }
        }
        visible
    }

    pub fn slot(&self, fan: usize) -> Validation {
        self.slots[fan]
    }

    pub fn armed_mask(&self) -> u32 {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| matches!(slot, Validation::Validating(_)))
            .fold(0, |mask, (i, _)| mask | (1 << i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn turning_off_arms_only_changed_fans() {
        let clock = ManualClock::new();
        let mut v = Validators::new(6000);
        let armed = v.arm_transitions(0b1011, 0b0010, &clock);
        assert_eq!(armed, 0b1001);
        assert_eq!(v.armed_mask(), 0b1001);
    }

    #[test]
    fn spin_down_masked_within_window() {
        let clock = ManualClock::new();
        let mut v = Validators::new(6000);
        v.arm_transitions(0b1, 0b0, &clock);
        clock.advance(5999);
        assert_eq!(v.filter(0b1, &clock), 0);
        assert_eq!(v.armed_mask(), 0b1);
    }

    #[test]
    fn spinning_after_window_is_reported() {
        let clock = ManualClock::new();
        let mut v = Validators::new(6000);
        v.arm_transitions(0b1, 0b0, &clock);
        clock.advance(6000);
        assert_eq!(v.filter(0b1, &clock), 0b1);
        assert_eq!(v.slot(0), Validation::Idle);
    }

    #[test]
    fn stopped_fan_releases_early() {
        let clock = ManualClock::new();
        let mut v = Validators::new(6000);
        v.arm_transitions(0b100, 0, &clock);
        clock.advance(1200);
        assert_eq!(v.filter(0, &clock), 0);
        assert_eq!(v.slot(2), Validation::Idle);
        // Spinning again afterwards is genuine input.
        assert_eq!(v.filter(0b100, &clock), 0b100);
    }

    #[test]
    fn unvalidated_fans_pass_through() {
        let clock = ManualClock::new();
        let mut v = Validators::new(6000);
        v.arm_transitions(0b01, 0b00, &clock);
        assert_eq!(v.filter(0b11, &clock), 0b10);
    }

    #[test]
    fn repeated_command_arms_nothing_new() {
        let clock = ManualClock::new();
        let mut v = Validators::new(6000);
        v.arm_transitions(0xff, 0x0f, &clock);
        let first = v.slot(4);
        clock.advance(500);
        let armed = v.arm_transitions(0x0f, 0x0f, &clock);
        assert_eq!(armed, 0);
        assert_eq!(v.slot(4), first);
        assert_eq!(v.armed_mask(), 0xf0);
    }

    #[test]
    fn turning_on_disarms() {
        let clock = ManualClock::new();
        let mut v = Validators::new(6000);
        v.arm_transitions(0b1, 0b0, &clock);
        v.arm_transitions(0b0, 0b1, &clock);
        assert_eq!(v.armed_mask(), 0);
    }
}
