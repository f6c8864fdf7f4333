// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! End-to-end request/response scenarios straight out of `spec.md` §8,
//! driving [`Dispatcher::serve_one`] the way a host would: one opcode and
//! its payload in, one response out, repeated across a whole session on a
//! single dispatcher instance.

use crate::crypto::{verify, FakeCryptoAdapter};
use crate::entropy::ChaChaEntropy;
use crate::ids::{CredentialId, PublicKey, Signature};
use crate::store::{RamNvStorage, MAX_SLOTS};
use crate::testutil::{FakeDelay, FakeIndicator, ScriptedButton, VecTransport};
use crate::wire::StatusCode;
use crate::Dispatcher;

type Session = Dispatcher<
    VecTransport,
    ScriptedButton,
    FakeDelay,
    FakeIndicator,
    RamNvStorage,
    FakeCryptoAdapter<ChaChaEntropy>,
>;

fn session_that_always_confirms(seed: u8) -> Session {
    Dispatcher::new(
        VecTransport::default(),
        ScriptedButton::pressed_after(0),
        FakeDelay::default(),
        FakeIndicator::default(),
        RamNvStorage::default(),
        FakeCryptoAdapter::new(ChaChaEntropy::from_seed([seed; 32])),
    )
}

fn session_that_always_declines(seed: u8) -> Session {
    Dispatcher::new(
        VecTransport::default(),
        ScriptedButton::never_pressed(),
        FakeDelay::default(),
        FakeIndicator::default(),
        RamNvStorage::default(),
        FakeCryptoAdapter::new(ChaChaEntropy::from_seed([seed; 32])),
    )
}

/// Sends one request and returns the response bytes it produced, leaving
/// the dispatcher ready for the next request in the same session.
fn exchange(session: &mut Session, request: &[u8]) -> Vec<u8> {
    session.transport_mut().inbound.extend(request.iter().copied());
    session.transport_mut().outbound.clear();
    session.serve_one();
    session.transport_mut().outbound.clone()
}

fn ascending(start: u8, len: usize) -> Vec<u8> {
    (0..len as u32).map(|i| start.wrapping_add(i as u8)).collect()
}

fn descending(start: u8, len: usize) -> Vec<u8> {
    (0..len as u32).map(|i| start.wrapping_sub(i as u8)).collect()
}

/// Scenario 1: a fresh device's `List` is `00 00`.
#[test]
fn empty_list() {
    let mut session = session_that_always_confirms(1);
    let response = exchange(&mut session, &[0x00]);
    assert_eq!(response, vec![0x00, 0x00]);
}

/// Scenario 2: make a credential, list it, then get an assertion that
/// verifies against the returned public key.
#[test]
fn make_list_get() {
    let mut session = session_that_always_confirms(2);

    let app_id_hash = ascending(0x00, 20); // 00 01 02 .. 13
    let mut make_request = vec![0x01];
    make_request.extend_from_slice(&app_id_hash);
    let make_response = exchange(&mut session, &make_request);

    assert_eq!(make_response[0], StatusCode::Ok as u8);
    let credential_id = &make_response[1..1 + CredentialId::LEN];
    assert_eq!(credential_id, &app_id_hash[..16]); // 00 01 .. 0F
    let public_key_bytes: [u8; PublicKey::LEN] = make_response
        [1 + CredentialId::LEN..1 + CredentialId::LEN + PublicKey::LEN]
        .try_into()
        .unwrap();
    let public_key = PublicKey::new(public_key_bytes);

    let list_response = exchange(&mut session, &[0x00]);
    assert_eq!(list_response[0], StatusCode::Ok as u8);
    assert_eq!(list_response[1], 0x01);
    assert_eq!(&list_response[2..18], credential_id);
    assert_eq!(&list_response[18..38], &app_id_hash[..]);

    let client_data_hash = descending(0xFF, 20); // FF FE .. EC
    let mut get_request = vec![0x02];
    get_request.extend_from_slice(&app_id_hash);
    get_request.extend_from_slice(&client_data_hash);
    let get_response = exchange(&mut session, &get_request);

    assert_eq!(get_response[0], StatusCode::Ok as u8);
    assert_eq!(&get_response[1..17], credential_id);
    let signature_bytes: [u8; Signature::LEN] =
        get_response[17..17 + Signature::LEN].try_into().unwrap();
    let signature = Signature::new(signature_bytes);
    let digest = crate::ids::ClientDataHash::new(client_data_hash.try_into().unwrap());
    assert!(verify(&public_key, &digest, &signature));
}

/// Scenario 3: `GetAssertion` against an app id the store has never seen.
#[test]
fn not_found() {
    let mut session = session_that_always_confirms(3);
    let app_id_x = [0xAAu8; 20];
    let client_data_hash = [0x11u8; 20];
    let mut request = vec![0x02];
    request.extend_from_slice(&app_id_x);
    request.extend_from_slice(&client_data_hash);
    let response = exchange(&mut session, &request);
    assert_eq!(response, vec![StatusCode::NotFound as u8]);
}

/// Scenario 4: 17 successful `MakeCredential`s fill the store; the 18th is
/// rejected and `List`'s length is unaffected.
#[test]
fn storage_full() {
    let mut session = session_that_always_confirms(4);
    for i in 0..MAX_SLOTS as u8 {
        let app_id_hash = [i; 20];
        let mut request = vec![0x01];
        request.extend_from_slice(&app_id_hash);
        let response = exchange(&mut session, &request);
        assert_eq!(response[0], StatusCode::Ok as u8, "slot {i} should succeed");
    }

    let mut overflow_request = vec![0x01];
    overflow_request.extend_from_slice(&[0xFFu8; 20]);
    let overflow_response = exchange(&mut session, &overflow_request);
    assert_eq!(overflow_response, vec![StatusCode::StorageFull as u8]);

    let list_response = exchange(&mut session, &[0x00]);
    assert_eq!(list_response[1] as usize, MAX_SLOTS);
    assert_eq!(list_response.len(), 2 + MAX_SLOTS * 36);
}

/// Scenario 5: the user never confirms; the device declines and no
/// credential is created.
#[test]
fn declined_make_credential_mutates_nothing() {
    let mut session = session_that_always_declines(5);
    let app_id_hash = [0x42u8; 20];
    let mut request = vec![0x01];
    request.extend_from_slice(&app_id_hash);
    let response = exchange(&mut session, &request);
    assert_eq!(response, vec![StatusCode::Approval as u8]);

    let list_response = exchange(&mut session, &[0x00]);
    assert_eq!(list_response, vec![0x00, 0x00]);
}

/// Scenario 6: make a credential, reset, and confirm the store is empty
/// and the credential is unreachable afterward.
#[test]
fn reset_round_trip() {
    let mut session = session_that_always_confirms(6);
    let app_id_hash = [0x07u8; 20];
    let mut make_request = vec![0x01];
    make_request.extend_from_slice(&app_id_hash);
    let make_response = exchange(&mut session, &make_request);
    assert_eq!(make_response[0], StatusCode::Ok as u8);

    let reset_response = exchange(&mut session, &[0x03]);
    assert_eq!(reset_response, vec![StatusCode::Ok as u8]);

    let list_response = exchange(&mut session, &[0x00]);
    assert_eq!(list_response, vec![0x00, 0x00]);

    let client_data_hash = [0x99u8; 20];
    let mut get_request = vec![0x02];
    get_request.extend_from_slice(&app_id_hash);
    get_request.extend_from_slice(&client_data_hash);
    let get_response = exchange(&mut session, &get_request);
    assert_eq!(get_response, vec![StatusCode::NotFound as u8]);
}

/// `spec.md` §8: "Wire determinism: `List` output length equals `2 +
/// count·36` bytes" — checked across every occupancy from empty to full.
#[test]
fn list_length_matches_formula_at_every_occupancy() {
    let mut session = session_that_always_confirms(7);
    for i in 0..MAX_SLOTS as u8 {
        let list_response = exchange(&mut session, &[0x00]);
        assert_eq!(list_response.len(), 2 + (i as usize) * 36);

        let app_id_hash = [i; 20];
        let mut request = vec![0x01];
        request.extend_from_slice(&app_id_hash);
        exchange(&mut session, &request);
    }
    let final_list = exchange(&mut session, &[0x00]);
    assert_eq!(final_list.len(), 2 + MAX_SLOTS * 36);
}
