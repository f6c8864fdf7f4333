// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The entropy source contract, and a documented-insecure default
//! implementation for hosts without a hardware TRNG.

/// Fills a buffer with pseudo-random bytes for the crypto adapter.
///
/// `spec.md` §4.5 defines no error path beyond the return value: `fill`
/// either succeeds and fills every byte, or fails and fills none that
/// the caller may rely on.
pub trait EntropySource {
    fn fill(&mut self, buf: &mut [u8]) -> bool;
}

/// A deterministic, ChaCha8-backed [`EntropySource`].
///
/// This resolves the open question in `spec.md` §4.5/§9 as option (b):
/// explicitly documenting the insecurity rather than quietly shipping it.
/// **This is not a hardware entropy source.** It exists so the protocol
/// logic in this crate (and the `FakeCryptoAdapter` test double) can be
/// exercised deterministically on a host with no TRNG attached.
/// Production firmware must wire a real hardware RNG instead — the
/// teacher repo's `drv/lpc55-rng-core`, which reads the LPC55's on-chip
/// TRNG peripheral through `rand_core::RngCore`, is the model to follow.
#[cfg(any(test, feature = "software-entropy"))]
pub struct ChaChaEntropy {
    rng: rand_chacha::ChaCha8Rng,
}

#[cfg(any(test, feature = "software-entropy"))]
impl ChaChaEntropy {
    pub fn from_seed(seed: [u8; 32]) -> Self {
        use rand_core::SeedableRng;
        Self {
            rng: rand_chacha::ChaCha8Rng::from_seed(seed),
        }
    }
}

#[cfg(any(test, feature = "software-entropy"))]
impl EntropySource for ChaChaEntropy {
    fn fill(&mut self, buf: &mut [u8]) -> bool {
        use rand_core::RngCore;
        self.rng.fill_bytes(buf);
        true
    }
}

#[cfg(test)]
pub(crate) struct AlwaysFailEntropy;

#[cfg(test)]
impl EntropySource for AlwaysFailEntropy {
    fn fill(&mut self, _buf: &mut [u8]) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chacha_entropy_fills_every_byte_and_reports_success() {
        let mut source = ChaChaEntropy::from_seed([7u8; 32]);
        let mut buf = [0u8; 21];
        assert!(source.fill(&mut buf));
        assert!(buf.iter().any(|&b| b != 0));
    }

    #[test]
    fn same_seed_is_deterministic() {
        let mut a = ChaChaEntropy::from_seed([1u8; 32]);
        let mut b = ChaChaEntropy::from_seed([1u8; 32]);
        let mut buf_a = [0u8; 21];
        let mut buf_b = [0u8; 21];
        a.fill(&mut buf_a);
        b.fill(&mut buf_b);
        assert_eq!(buf_a, buf_b);
    }
}
