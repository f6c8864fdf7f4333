// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The byte transport contract (`spec.md` §4.1).
//!
//! Blocking, unbuffered, unframed: the dispatcher and its handlers know
//! exactly how many bytes each message consumes or produces, so there is
//! nothing for this trait to do beyond moving one byte at a time.

pub trait Transport {
    /// Blocks until one byte has arrived.
    fn read_byte(&mut self) -> u8;
    /// Blocks until `byte` has been handed to the link.
    fn write_byte(&mut self, byte: u8);
}
