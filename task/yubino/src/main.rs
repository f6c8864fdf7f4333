// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Firmware entry point for the hardware security token.
//!
//! This task owns nothing but wiring: it builds concrete implementations of
//! `yubino_core`'s external traits out of this board's GPIO and RNG driver
//! tasks and hands them to `yubino_core::Dispatcher::serve_forever`. Every
//! protocol decision lives in `yubino-core`; grounded on `task-ping`/
//! `task-pong`, the teacher's minimal single-purpose tasks that do nothing
//! but construct a client and drive a loop.

#![no_std]
#![no_main]

use drv_lpc55_gpio_api::{Gpio, Pin, Value};
use userlib::{hl, task_slot, TaskId};
use yubino_core::{
    ButtonLine, ClientDataHash, CryptoAdapter, Delay, Dispatcher, EntropySource, Indicator,
    PrivateKey, PublicKey, RamNvStorage, Signature, Transport,
};

task_slot!(GPIO, gpio_driver);
task_slot!(RNG, rng_driver);
task_slot!(USART, usart_driver);

/// Active-low presence button, read through the GPIO driver task.
///
/// Pin assignment is board-specific and is resolved by the app-level pin
/// configuration this (trimmed) workspace does not carry; see
/// `drv/lpc55-gpio-api`'s `Pin` enum for the full set this board exposes.
const BUTTON_PIN: Pin = Pin::PIO0_0;
/// Presence-solicitation LED, same driver task as the button.
const LED_PIN: Pin = Pin::PIO0_1;

struct GpioButton {
    gpio: Gpio,
}

impl ButtonLine for GpioButton {
    fn read_level(&mut self) -> bool {
        // `Value::One` is released (idle high); a driver error is treated
        // as "no press" rather than propagated, since `ButtonLine` defines
        // no error path (`spec.md` §4.2/§9).
        matches!(self.gpio.read_val(BUTTON_PIN), Ok(Value::One))
    }
}

struct GpioIndicator {
    gpio: Gpio,
}

impl Indicator for GpioIndicator {
    fn toggle(&mut self) {
        let _ = self.gpio.toggle(LED_PIN);
    }
}

struct TickDelay;

impl Delay for TickDelay {
    fn delay_ms(&mut self, ms: u32) {
        // Hubris's system tick is 1ms on every board this workspace
        // targets; `hl::sleep_for` blocks the calling task for that many
        // ticks without spinning the CPU.
        hl::sleep_for(ms as u64);
    }
}

struct RngEntropy {
    rng: TaskId,
}

impl EntropySource for RngEntropy {
    fn fill(&mut self, buf: &mut [u8]) -> bool {
        drv_rng_api::rng_fill(self.rng, buf)
            .map(|filled| filled == buf.len())
            .unwrap_or(false)
    }
}

/// Placeholder byte transport over this board's USART.
///
/// Bidirectional framing over a serial link is explicitly out of scope
/// (`spec.md` §1, "the concrete serial transceiver driver"): every USART
/// driver task in this workspace (`drv/lpc55-usart`, `drv/stm32h7-usart`,
/// ...) is transmit-only, used for debug console output, and none expose a
/// receive path. `write_byte` below is real IPC to that driver's existing
/// `OP_WRITE`; `read_byte` has no teacher-grounded counterpart to adapt and
/// is left as an explicit `unimplemented!()` rather than a fabricated one,
/// per this crate's mandate not to invent hardware behavior the corpus
/// never shows. A real board bring-up would add an RX FIFO + notification
/// path to the USART driver (mirroring its existing TX path) and a matching
/// client call here.
struct UsartTransport {
    usart: TaskId,
}

impl Transport for UsartTransport {
    fn read_byte(&mut self) -> u8 {
        unimplemented!(
            "no USART driver in this workspace exposes a receive path; see \
             module-level doc comment"
        )
    }

    fn write_byte(&mut self, byte: u8) {
        const OP_WRITE: u16 = 1;
        let mut response = [0u8; 0];
        userlib::sys_send(
            self.usart,
            OP_WRITE,
            &[],
            &mut response,
            &[userlib::Lease::from(core::slice::from_ref(&byte))],
        );
    }
}

/// Placeholder for the elliptic-curve accelerator.
///
/// The genuine EC primitive is out of scope (`spec.md` §1, §4.6) and has no
/// equivalent in this workspace's dependency set: the curve the original
/// firmware uses (21-byte scalar, 40-byte point encoding) doesn't match any
/// curve RustCrypto's `p256`/`p384` crates implement. This adapter always
/// reports failure, which the dispatcher already has a defined path for
/// (`StatusCode::CryptoFailed`); it exists so `Dispatcher` can be fully
/// constructed and driven end to end by this task, exactly as it would be
/// once a real accelerator is wired in.
///
/// It still owns and draws from an [`EntropySource`] (`spec.md` §4.6: "an
/// adapter owns whatever entropy source it consumes internally"), so a real
/// accelerator only has to replace the body of `make_key`/`sign`, not the
/// wiring in `main` below.
struct UnimplementedCrypto {
    entropy: RngEntropy,
}

impl CryptoAdapter for UnimplementedCrypto {
    fn make_key(&mut self) -> Option<(PublicKey, PrivateKey)> {
        let mut scratch = [0u8; PrivateKey::LEN];
        let _ = self.entropy.fill(&mut scratch);
        None
    }

    fn sign(&mut self, _private_key: &PrivateKey, _digest: &ClientDataHash) -> Option<Signature> {
        None
    }
}

#[export_name = "main"]
fn main() -> ! {
    let gpio = Gpio::from(GPIO.get_task_id());
    let button = GpioButton {
        gpio: gpio.clone(),
    };
    let indicator = GpioIndicator { gpio };
    let delay = TickDelay;
    let entropy = RngEntropy {
        rng: RNG.get_task_id(),
    };
    let transport = UsartTransport {
        usart: USART.get_task_id(),
    };
    let crypto = UnimplementedCrypto { entropy };

    // `RamNvStorage` is a documented, non-durable placeholder for this
    // board's reserved flash/EEPROM window (`spec.md` §1; see its rustdoc
    // in `yubino_core::store`). It lets this task link and serve requests
    // end to end before a board-specific flash layout is committed.
    let mut dispatcher = Dispatcher::new(
        transport,
        button,
        delay,
        indicator,
        RamNvStorage::default(),
        crypto,
    );
    dispatcher.serve_forever()
}
