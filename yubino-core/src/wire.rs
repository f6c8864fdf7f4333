// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Wire-level constants: opcodes and status bytes.
//!
//! Every multi-byte field on the wire is an opaque byte string or a single
//! status byte; there is no endianness to get wrong. See `spec.md` §6 for
//! the full request/response table.

use num_derive::FromPrimitive;

/// The four request opcodes the dispatcher recognizes.
///
/// Any other byte is silently dropped by [`crate::Dispatcher::serve_one`]:
/// no payload is read and no response byte is written. This matches the
/// original firmware exactly and is called out, not "fixed", per
/// `spec.md` §4.7/§9 — `StatusCode::CommandUnknown` is reserved but never
/// emitted by this dispatcher.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
pub enum Opcode {
    List = 0,
    MakeCredential = 1,
    GetAssertion = 2,
    Reset = 3,
}

/// The single status byte that prefixes (or entirely constitutes) every
/// response.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
pub enum StatusCode {
    Ok = 0,
    /// Reserved; never emitted by [`crate::Dispatcher`] (see [`Opcode`]).
    CommandUnknown = 1,
    CryptoFailed = 2,
    /// Reserved for future use; `spec.md` names no operation that emits it.
    BadParameter = 3,
    NotFound = 4,
    StorageFull = 5,
    Approval = 6,
}

impl From<StatusCode> for u8 {
    fn from(status: StatusCode) -> Self {
        status as u8
    }
}
