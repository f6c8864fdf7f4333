// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! 1-wire device drivers
//!
//! This crate contains all 1-wire device drivers -- which is currently a
//! short list!

#![no_std]

pub mod ds18b20;
