// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The confirmation gate: a bounded-duration solicitation of a physical
//! user gesture, guarding every mutating or signing operation.
//!
//! The raw button level, the LED, and the passage of time are all
//! external collaborators (`spec.md` §1) represented here as traits. The
//! gate itself only owns a [`Debounce`] and the phase-counting algorithm.

use crate::debounce::{Debounce, SAMPLE_INTERVAL_MS};

/// Reads the raw (undebounced) level of the presence button line.
///
/// `true` means released, `false` means pressed, matching [`Debounce`].
pub trait ButtonLine {
    fn read_level(&mut self) -> bool;
}

/// Blocks the caller for approximately the given number of milliseconds.
pub trait Delay {
    fn delay_ms(&mut self, ms: u32);
}

/// The presence-solicitation LED. The gate is the LED's only owner while
/// a confirmation is in progress (`spec.md` §5): handlers must not touch
/// it outside a gate.
pub trait Indicator {
    fn toggle(&mut self);
}

/// Number of half-second phases in the confirmation window (10s / 0.5s).
const PHASE_COUNT: u32 = 20;
/// Samples per half-second phase at the 15ms debounce cadence (500/15).
const SAMPLES_PER_PHASE: u32 = 33;

/// The outcome of a confirmation solicitation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateOutcome {
    Confirmed,
    Declined,
}

/// Solicits a single presence gesture within a 10-second window.
///
/// The [`Debounce`] filter is borrowed, not owned: button state persists
/// across commands (`spec.md` §3), so the dispatcher keeps one `Debounce`
/// alive for the lifetime of the device and lends it to a fresh gate for
/// each solicitation.
pub struct ConfirmationGate<'a, B, D, L> {
    button: &'a mut B,
    delay: &'a mut D,
    indicator: &'a mut L,
    debounce: &'a mut Debounce,
}

impl<'a, B, D, L> ConfirmationGate<'a, B, D, L>
where
    B: ButtonLine,
    D: Delay,
    L: Indicator,
{
    pub fn new(
        button: &'a mut B,
        delay: &'a mut D,
        indicator: &'a mut L,
        debounce: &'a mut Debounce,
    ) -> Self {
        Self {
            button,
            delay,
            indicator,
            debounce,
        }
    }

    /// Runs the full solicitation: 20 half-second phases, LED toggled at
    /// the start of each, 33 debounce samples per phase at 15ms. Returns
    /// as soon as a press is confirmed; returns `Declined` only once the
    /// whole 10-second window has elapsed with no press.
    ///
    /// Called at most once per handler (`spec.md` §4.3); this method
    /// never returns early for any reason other than a confirmed press.
    pub fn confirm(mut self) -> GateOutcome {
        for phase in 0..PHASE_COUNT {
            self.indicator.toggle();
            for _ in 0..SAMPLES_PER_PHASE {
                let level = self.button.read_level();
                self.debounce.sample(level);
                if self.debounce.take_event() {
                    // The original firmware's LED was left on only during
                    // the "on" half of each second; restore it to off
                    // before returning so a confirmed press never leaves
                    // the indicator lit. The "off" half-phases (odd
                    // `phase`) already left it off.
                    if phase % 2 == 0 {
                        self.indicator.toggle();
                    }
                    return GateOutcome::Confirmed;
                }
                self.delay.delay_ms(SAMPLE_INTERVAL_MS);
            }
        }
        GateOutcome::Declined
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{FakeDelay, FakeIndicator, ScriptedButton};

    #[test]
    fn confirms_on_the_first_held_press() {
        let mut button = ScriptedButton::pressed_after(0);
        let mut delay = FakeDelay::default();
        let mut indicator = FakeIndicator::default();
        let mut debounce = Debounce::new();
        let gate = ConfirmationGate::new(&mut button, &mut delay, &mut indicator, &mut debounce);
        assert_eq!(gate.confirm(), GateOutcome::Confirmed);
        // Indicator toggled on at phase start, then off again on confirm.
        assert_eq!(indicator.toggles, 2);
    }

    #[test]
    fn declines_after_the_full_window_with_no_press() {
        let mut button = ScriptedButton::never_pressed();
        let mut delay = FakeDelay::default();
        let mut indicator = FakeIndicator::default();
        let mut debounce = Debounce::new();
        let gate = ConfirmationGate::new(&mut button, &mut delay, &mut indicator, &mut debounce);
        assert_eq!(gate.confirm(), GateOutcome::Declined);
        assert_eq!(indicator.toggles, PHASE_COUNT as u32);
        assert_eq!(
            delay.total_ms,
            PHASE_COUNT * SAMPLES_PER_PHASE * SAMPLE_INTERVAL_MS
        );
    }

    #[test]
    fn a_press_too_short_to_debounce_does_not_confirm_within_one_phase() {
        // A glitch lasting fewer than DEBOUNCE_THRESHOLD samples should
        // not confirm, even though the line briefly reads pressed.
        let mut button = ScriptedButton::glitch();
        let mut delay = FakeDelay::default();
        let mut indicator = FakeIndicator::default();
        let mut debounce = Debounce::new();
        let gate = ConfirmationGate::new(&mut button, &mut delay, &mut indicator, &mut debounce);
        assert_eq!(gate.confirm(), GateOutcome::Declined);
    }
}
