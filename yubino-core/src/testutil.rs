// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Host-only fakes for the hardware-facing traits, shared by every unit
//! test module and the end-to-end scenarios in [`crate::scenarios`].
//!
//! None of this is `pub` outside the crate: it exists purely to drive the
//! logic in this crate from the host, the way the teacher's
//! `lib/snitch-core` and `lib/multitimer` crates stub their kernel
//! boundary with plain `std` collections under `#[cfg(test)]`.

use std::collections::VecDeque;

use crate::gate::{ButtonLine, Delay, Indicator};
use crate::store::NvStorage;
use crate::store::Record;
use crate::store::MAX_SLOTS;
use crate::transport::Transport;

/// A button line scripted with a fixed sequence of raw levels; once the
/// script is exhausted it holds at the last level forever (mirroring a
/// released button that's simply never touched again).
pub(crate) struct ScriptedButton {
    script: VecDeque<bool>,
    last: bool,
}

impl ScriptedButton {
    /// Released for `idle_samples` samples, then held pressed forever.
    pub(crate) fn pressed_after(idle_samples: usize) -> Self {
        let mut script = VecDeque::new();
        for _ in 0..idle_samples {
            script.push_back(true);
        }
        Self { script, last: false }
    }

    pub(crate) fn never_pressed() -> Self {
        Self {
            script: VecDeque::new(),
            last: true,
        }
    }

    /// Held pressed for fewer samples than the debounce threshold, then
    /// released for good.
    pub(crate) fn glitch() -> Self {
        Self {
            script: VecDeque::from(vec![false, false]),
            last: true,
        }
    }
}

impl ButtonLine for ScriptedButton {
    fn read_level(&mut self) -> bool {
        match self.script.pop_front() {
            Some(level) => level,
            None => self.last,
        }
    }
}

#[derive(Default)]
pub(crate) struct FakeDelay {
    pub(crate) total_ms: u32,
}

impl Delay for FakeDelay {
    fn delay_ms(&mut self, ms: u32) {
        self.total_ms += ms;
    }
}

#[derive(Default)]
pub(crate) struct FakeIndicator {
    pub(crate) toggles: u32,
}

impl Indicator for FakeIndicator {
    fn toggle(&mut self) {
        self.toggles += 1;
    }
}

/// An in-memory stand-in for the credential store's non-volatile region:
/// a flat array of records plus a header byte, with no persistence across
/// process restarts (there's nothing to persist to on a host).
pub(crate) struct InMemoryNvStorage {
    records: [Record; MAX_SLOTS],
    count: u8,
}

impl Default for InMemoryNvStorage {
    fn default() -> Self {
        Self {
            records: [Record::default(); MAX_SLOTS],
            count: 0,
        }
    }
}

impl NvStorage for InMemoryNvStorage {
    fn header(&self) -> u8 {
        self.count
    }

    fn set_header(&mut self, count: u8) {
        self.count = count;
    }

    fn read_record(&self, slot: usize) -> Record {
        self.records[slot]
    }

    fn write_payload(
        &mut self,
        slot: usize,
        app_id_hash: crate::ids::AppIdHash,
        credential_id: crate::ids::CredentialId,
        private_key: crate::ids::PrivateKey,
    ) {
        self.records[slot].app_id_hash = app_id_hash;
        self.records[slot].credential_id = credential_id;
        self.records[slot].private_key = private_key;
    }

    fn write_tag(&mut self, slot: usize, tag: u8) {
        self.records[slot].slot_tag = tag;
    }
}

/// A transport backed by an in-memory request queue and response buffer,
/// rather than a real blocking serial link.
#[derive(Default)]
pub(crate) struct VecTransport {
    pub(crate) inbound: VecDeque<u8>,
    pub(crate) outbound: Vec<u8>,
}

impl VecTransport {
    pub(crate) fn with_request(bytes: &[u8]) -> Self {
        Self {
            inbound: bytes.iter().copied().collect(),
            outbound: Vec::new(),
        }
    }
}

impl Transport for VecTransport {
    fn read_byte(&mut self) -> u8 {
        self.inbound
            .pop_front()
            .expect("test transport ran out of request bytes")
    }

    fn write_byte(&mut self, byte: u8) {
        self.outbound.push(byte);
    }
}
