// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A debounce filter for a single mechanical button line.
//!
//! This is deliberately a plain value, not a set of global statics updated
//! from an interrupt handler (the original firmware's `bouton_etat` /
//! `bouton_compteur` / `bouton_appuie`): callers own a `Debounce`, feed it
//! raw samples, and read back a clean edge event. See `spec.md` §9's
//! design note on the button state.

/// Consecutive disagreeing samples required before the stable level
/// updates. At the prescribed 15 ms sample cadence this is ~60 ms.
pub const DEBOUNCE_THRESHOLD: u8 = 4;

/// The cadence at which callers are expected to invoke [`Debounce::sample`].
pub const SAMPLE_INTERVAL_MS: u32 = 15;

/// Debounces a single active-low button line.
///
/// `true` means released (the line idles high); `false` means pressed.
#[derive(Clone, Copy, Debug)]
pub struct Debounce {
    stable_level: bool,
    disagreement_count: u8,
    press_confirmed: bool,
}

impl Default for Debounce {
    fn default() -> Self {
        Self::new()
    }
}

impl Debounce {
    /// A fresh filter, assuming the button starts released.
    pub const fn new() -> Self {
        Self {
            stable_level: true,
            disagreement_count: 0,
            press_confirmed: false,
        }
    }

    /// Feeds one raw sample of the button line into the filter.
    ///
    /// If `raw_level` disagrees with the current stable level for
    /// [`DEBOUNCE_THRESHOLD`] consecutive calls, the stable level flips.
    /// Flipping to the pressed (`false`) level raises the edge flag,
    /// which [`Self::take_event`] later observes and clears. Any sample
    /// that agrees with the current stable level resets the
    /// disagreement counter immediately.
    pub fn sample(&mut self, raw_level: bool) {
        if raw_level != self.stable_level {
            self.disagreement_count += 1;
            if self.disagreement_count >= DEBOUNCE_THRESHOLD {
                self.stable_level = raw_level;
                if !self.stable_level {
                    self.press_confirmed = true;
                }
                self.disagreement_count = 0;
            }
        } else {
            self.disagreement_count = 0;
        }
    }

    /// Reads and clears the "press just confirmed" edge flag.
    pub fn take_event(&mut self) -> bool {
        let event = self.press_confirmed;
        self.press_confirmed = false;
        event
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_press_never_raises_the_event() {
        let mut d = Debounce::new();
        // Fewer than DEBOUNCE_THRESHOLD disagreeing samples.
        for _ in 0..(DEBOUNCE_THRESHOLD - 1) {
            d.sample(false);
        }
        assert!(!d.take_event());
        // And releasing again resets the counter rather than accumulating.
        d.sample(true);
        d.sample(false);
        d.sample(false);
        assert!(!d.take_event());
    }

    #[test]
    fn held_press_raises_the_event_exactly_once() {
        let mut d = Debounce::new();
        for _ in 0..DEBOUNCE_THRESHOLD {
            d.sample(false);
        }
        assert!(d.take_event());
        // The flag was consumed; further samples at the same stable level
        // must not re-raise it.
        d.sample(false);
        d.sample(false);
        assert!(!d.take_event());
    }

    #[test]
    fn release_does_not_raise_the_event() {
        let mut d = Debounce::new();
        for _ in 0..DEBOUNCE_THRESHOLD {
            d.sample(false);
        }
        assert!(d.take_event());
        for _ in 0..DEBOUNCE_THRESHOLD {
            d.sample(true);
        }
        assert!(!d.take_event());
    }

    #[test]
    fn noisy_line_that_never_settles_stays_quiet() {
        let mut d = Debounce::new();
        for i in 0..100 {
            d.sample(i % 2 == 0);
        }
        assert!(!d.take_event());
    }
}
