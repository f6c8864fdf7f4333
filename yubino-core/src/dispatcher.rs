// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The command dispatcher: reads one opcode, invokes its handler, and
//! returns to idle. See `spec.md` §4.7 for the state machine and §6 for
//! the wire format each handler below implements exactly.

use num_traits::FromPrimitive;
use ringbuf::ringbuf_entry;

use crate::debounce::Debounce;
use crate::gate::{ButtonLine, ConfirmationGate, Delay, GateOutcome, Indicator};
use crate::ids::{AppIdHash, ClientDataHash, CredentialId};
use crate::store::{CredentialStore, NvStorage, StoreError};
use crate::transport::Transport;
use crate::wire::{Opcode, StatusCode};
use crate::CryptoAdapter;

#[derive(Eq, PartialEq, Copy, Clone)]
enum Trace {
    None,
    Dispatch(Opcode),
    UnknownOpcode(u8),
    GateDeclined,
    CryptoFailed,
    StoreFull,
    NotFound,
}

ringbuf::ringbuf!(Trace, 32, Trace::None);

/// Ties the transport, presence gate, credential store, and crypto
/// adapter together into the request/response loop described in
/// `spec.md` §2 and §4.7.
pub struct Dispatcher<T, B, D, L, S, C> {
    transport: T,
    button: B,
    delay: D,
    indicator: L,
    store: CredentialStore<S>,
    crypto: C,
    /// Persists across commands (`spec.md` §3) rather than being
    /// recreated per gate.
    debounce: Debounce,
}

impl<T, B, D, L, S, C> Dispatcher<T, B, D, L, S, C>
where
    T: Transport,
    B: ButtonLine,
    D: Delay,
    L: Indicator,
    S: NvStorage,
    C: CryptoAdapter,
{
    pub fn new(transport: T, button: B, delay: D, indicator: L, storage: S, crypto: C) -> Self {
        Self {
            transport,
            button,
            delay,
            indicator,
            store: CredentialStore::new(storage),
            crypto,
            debounce: Debounce::new(),
        }
    }

    /// Runs the dispatcher forever. This is the embedded entry point;
    /// host tests drive [`Self::serve_one`] directly instead so they can
    /// inspect one request/response exchange at a time.
    pub fn serve_forever(&mut self) -> ! {
        loop {
            self.serve_one();
        }
    }

    /// Reads one opcode and, if it's recognized, runs its handler to
    /// completion. An unrecognized opcode is silently dropped: no
    /// payload is read and no response byte is written, matching
    /// `spec.md` §4.7/§9 exactly. Host libraries that send an opcode
    /// this dispatcher doesn't know about will hang waiting for a reply
    /// that never comes — that is the documented behavior, not a bug.
    pub fn serve_one(&mut self) {
        let opcode_byte = self.transport.read_byte();
        match Opcode::from_u8(opcode_byte) {
            Some(Opcode::List) => {
                ringbuf_entry!(Trace::Dispatch(Opcode::List));
                self.handle_list();
            }
            Some(Opcode::MakeCredential) => {
                ringbuf_entry!(Trace::Dispatch(Opcode::MakeCredential));
                self.handle_make_credential();
            }
            Some(Opcode::GetAssertion) => {
                ringbuf_entry!(Trace::Dispatch(Opcode::GetAssertion));
                self.handle_get_assertion();
            }
            Some(Opcode::Reset) => {
                ringbuf_entry!(Trace::Dispatch(Opcode::Reset));
                self.handle_reset();
            }
            None => {
                ringbuf_entry!(Trace::UnknownOpcode(opcode_byte));
            }
        }
    }

    /// Blocks on the confirmation gate. Called at most once per handler
    /// (`spec.md` §4.3): the gate consumes the button/delay/indicator by
    /// mutable reference for the duration of one solicitation and then
    /// gives them back.
    fn confirm_presence(&mut self) -> GateOutcome {
        let outcome = ConfirmationGate::new(
            &mut self.button,
            &mut self.delay,
            &mut self.indicator,
            &mut self.debounce,
        )
        .confirm();
        if outcome == GateOutcome::Declined {
            ringbuf_entry!(Trace::GateDeclined);
        }
        outcome
    }

    fn read_app_id_hash(&mut self) -> AppIdHash {
        let mut bytes = [0u8; AppIdHash::LEN];
        for b in bytes.iter_mut() {
            *b = self.transport.read_byte();
        }
        AppIdHash::new(bytes)
    }

    fn read_client_data_hash(&mut self) -> ClientDataHash {
        let mut bytes = [0u8; ClientDataHash::LEN];
        for b in bytes.iter_mut() {
            *b = self.transport.read_byte();
        }
        ClientDataHash::new(bytes)
    }

    fn write_status(&mut self, status: StatusCode) {
        self.transport.write_byte(status.into());
    }

    /// `List` (opcode 0): `[STATUS_OK, count, (credential_id ‖
    /// app_id_hash)·count]`. No payload, no presence gate, never fails.
    fn handle_list(&mut self) {
        let count = self.store.count();
        self.write_status(StatusCode::Ok);
        self.transport.write_byte(count);
        // Collecting into a local wouldn't fit this crate's no-alloc
        // budget; stream straight to the transport as the store walks
        // its slots, same as `spec.md` §4.4's `enumerate`.
        let transport = &mut self.transport;
        self.store.enumerate(|credential_id, app_id_hash| {
            for b in credential_id.as_ref() {
                transport.write_byte(*b);
            }
            for b in app_id_hash.as_ref() {
                transport.write_byte(*b);
            }
        });
    }

    /// `MakeCredential` (opcode 1): payload `app_id_hash[20]`.
    fn handle_make_credential(&mut self) {
        let app_id_hash = self.read_app_id_hash();

        if self.confirm_presence() == GateOutcome::Declined {
            self.write_status(StatusCode::Approval);
            return;
        }

        let Some((public_key, private_key)) = self.crypto.make_key() else {
            ringbuf_entry!(Trace::CryptoFailed);
            self.write_status(StatusCode::CryptoFailed);
            return;
        };

        // Documented truncation (`spec.md` §4.7 step 2, §9): the first
        // 16 bytes of `app_id_hash` become `credential_id`. Collisions
        // across relying parties are possible and accepted.
        let mut credential_id_bytes = [0u8; CredentialId::LEN];
        credential_id_bytes.copy_from_slice(&app_id_hash.as_ref()[..CredentialId::LEN]);
        let credential_id = CredentialId::new(credential_id_bytes);

        match self
            .store
            .append(app_id_hash, credential_id, private_key)
        {
            Err(StoreError::Full) => {
                // The freshly generated key pair is discarded here: it
                // never reaches `append`'s write path on this branch.
                ringbuf_entry!(Trace::StoreFull);
                self.write_status(StatusCode::StorageFull);
            }
            Ok(()) => {
                self.write_status(StatusCode::Ok);
                for b in credential_id.as_ref() {
                    self.transport.write_byte(*b);
                }
                for b in public_key.as_ref() {
                    self.transport.write_byte(*b);
                }
            }
        }
    }

    /// `GetAssertion` (opcode 2): payload `app_id_hash[20],
    /// client_data_hash[20]`.
    fn handle_get_assertion(&mut self) {
        let app_id_hash = self.read_app_id_hash();
        let client_data_hash = self.read_client_data_hash();

        if self.confirm_presence() == GateOutcome::Declined {
            self.write_status(StatusCode::Approval);
            return;
        }

        let Some((credential_id, private_key)) = self.store.find_by_app_id(&app_id_hash) else {
            ringbuf_entry!(Trace::NotFound);
            self.write_status(StatusCode::NotFound);
            return;
        };

        let Some(signature) = self.crypto.sign(&private_key, &client_data_hash) else {
            ringbuf_entry!(Trace::CryptoFailed);
            self.write_status(StatusCode::CryptoFailed);
            return;
        };

        self.write_status(StatusCode::Ok);
        for b in credential_id.as_ref() {
            self.transport.write_byte(*b);
        }
        for b in signature.as_ref() {
            self.transport.write_byte(*b);
        }
    }

    /// `Reset` (opcode 3): no payload.
    fn handle_reset(&mut self) {
        if self.confirm_presence() == GateOutcome::Declined {
            self.write_status(StatusCode::Approval);
            return;
        }
        self.store.erase_all();
        self.write_status(StatusCode::Ok);
    }
}

#[cfg(test)]
impl<T, B, D, L, S, C> Dispatcher<T, B, D, L, S, C>
where
    T: Transport,
    B: ButtonLine,
    D: Delay,
    L: Indicator,
    S: NvStorage,
    C: CryptoAdapter,
{
    /// Exposes the transport so end-to-end scenario tests can feed it more
    /// request bytes and drain accumulated response bytes between
    /// [`Self::serve_one`] calls, without the dispatcher itself needing any
    /// such plumbing in firmware.
    pub(crate) fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entropy::ChaChaEntropy;
    use crate::store::{RamNvStorage, MAX_SLOTS};
    use crate::testutil::{FakeDelay, FakeIndicator, InMemoryNvStorage, ScriptedButton, VecTransport};

    fn dispatcher_always_confirmed(
        request: &[u8],
    ) -> Dispatcher<VecTransport, ScriptedButton, FakeDelay, FakeIndicator, InMemoryNvStorage, crate::crypto::FakeCryptoAdapter<ChaChaEntropy>>
    {
        Dispatcher::new(
            VecTransport::with_request(request),
            ScriptedButton::pressed_after(0),
            FakeDelay::default(),
            FakeIndicator::default(),
            InMemoryNvStorage::default(),
            crate::crypto::FakeCryptoAdapter::new(ChaChaEntropy::from_seed([4u8; 32])),
        )
    }

    #[test]
    fn unknown_opcode_reads_nothing_and_writes_nothing() {
        let mut dispatcher = dispatcher_always_confirmed(&[0xEE]);
        dispatcher.serve_one();
        assert!(dispatcher.transport_mut().outbound.is_empty());
    }

    #[test]
    fn list_on_an_empty_store_is_two_zero_bytes() {
        let mut dispatcher = dispatcher_always_confirmed(&[0x00]);
        dispatcher.serve_one();
        assert_eq!(dispatcher.transport_mut().outbound, vec![0x00, 0x00]);
    }

    #[test]
    fn make_credential_declined_emits_only_the_approval_byte() {
        let mut request = vec![0x01];
        request.extend_from_slice(&[7u8; 20]);
        let mut dispatcher = Dispatcher::new(
            VecTransport::with_request(&request),
            ScriptedButton::never_pressed(),
            FakeDelay::default(),
            FakeIndicator::default(),
            InMemoryNvStorage::default(),
            crate::crypto::FakeCryptoAdapter::new(ChaChaEntropy::from_seed([4u8; 32])),
        );
        dispatcher.serve_one();
        assert_eq!(
            dispatcher.transport_mut().outbound,
            vec![StatusCode::Approval as u8]
        );
    }

    #[test]
    fn make_credential_confirmed_persists_and_list_reflects_it() {
        let mut app_id_hash = [0u8; 20];
        for (i, b) in app_id_hash.iter_mut().enumerate() {
            *b = i as u8;
        }
        let mut request = vec![0x01];
        request.extend_from_slice(&app_id_hash);
        let mut dispatcher = dispatcher_always_confirmed(&request);
        dispatcher.serve_one();
        let response = dispatcher.transport_mut().outbound.clone();
        assert_eq!(response[0], StatusCode::Ok as u8);
        assert_eq!(&response[1..17], &app_id_hash[..16]);
        assert_eq!(response.len(), 1 + CredentialId::LEN + crate::ids::PublicKey::LEN);

        dispatcher.transport_mut().outbound.clear();
        dispatcher.transport_mut().inbound.push_back(0x00);
        dispatcher.serve_one();
        let list_response = &dispatcher.transport_mut().outbound;
        assert_eq!(list_response[0], StatusCode::Ok as u8);
        assert_eq!(list_response[1], 1);
        assert_eq!(list_response.len(), 2 + 36);
    }

    #[test]
    fn storage_full_leaves_list_length_unchanged() {
        let mut dispatcher = Dispatcher::new(
            VecTransport::default(),
            ScriptedButton::pressed_after(0),
            FakeDelay::default(),
            FakeIndicator::default(),
            RamNvStorage::default(),
            crate::crypto::FakeCryptoAdapter::new(ChaChaEntropy::from_seed([11u8; 32])),
        );
        for i in 0..MAX_SLOTS as u8 {
            dispatcher.transport_mut().inbound.push_back(0x01);
            for _ in 0..20 {
                dispatcher.transport_mut().inbound.push_back(i);
            }
            dispatcher.transport_mut().outbound.clear();
            dispatcher.serve_one();
            assert_eq!(dispatcher.transport_mut().outbound[0], StatusCode::Ok as u8);
        }

        dispatcher.transport_mut().inbound.push_back(0x01);
        for _ in 0..20 {
            dispatcher.transport_mut().inbound.push_back(200);
        }
        dispatcher.transport_mut().outbound.clear();
        dispatcher.serve_one();
        assert_eq!(
            dispatcher.transport_mut().outbound,
            vec![StatusCode::StorageFull as u8]
        );

        dispatcher.transport_mut().inbound.push_back(0x00);
        dispatcher.transport_mut().outbound.clear();
        dispatcher.serve_one();
        assert_eq!(dispatcher.transport_mut().outbound[1], MAX_SLOTS as u8);
    }
}
