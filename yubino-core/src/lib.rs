// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Core request/response logic for a U2F-style hardware security token.
//!
//! This crate holds every piece of the firmware that can be expressed
//! without touching real hardware: wire framing, the slotted credential
//! store, the debounce filter and confirmation gate, and the command
//! dispatcher that ties them together. The serial transceiver, the GPIO
//! button line, the indicator LED, the elliptic-curve primitives and the
//! entropy source are all represented as traits so the whole request/
//! response state machine can be driven on the host in unit tests; a
//! firmware binary only has to supply concrete implementations of those
//! traits and hand them to [`dispatcher::Dispatcher`].
//!
//! `#[cfg(test)]` lifts the `no_std` restriction so the test harness (and
//! the `rand_chacha`-backed [`entropy::ChaChaEntropy`] fake) can use `std`.

#![cfg_attr(not(test), no_std)]

pub mod crypto;
pub mod debounce;
pub mod dispatcher;
pub mod entropy;
pub mod gate;
pub mod ids;
pub mod store;
pub mod transport;
pub mod wire;

pub use crypto::CryptoAdapter;
pub use debounce::Debounce;
pub use dispatcher::Dispatcher;
pub use entropy::EntropySource;
pub use gate::{ButtonLine, ConfirmationGate, Delay, GateOutcome, Indicator};
pub use ids::{AppIdHash, ClientDataHash, CredentialId, PrivateKey, PublicKey, Signature};
pub use store::{CredentialStore, NvStorage, RamNvStorage, Record, StoreError};
pub use transport::Transport;
pub use wire::{Opcode, StatusCode};

#[cfg(any(test, feature = "software-entropy"))]
pub use entropy::ChaChaEntropy;

#[cfg(test)]
pub(crate) mod testutil;

#[cfg(test)]
mod scenarios;
