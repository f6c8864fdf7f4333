// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The slotted credential store.
//!
//! [`NvStorage`] is the byte-region contract the store is generic over,
//! in the same spirit as the teacher's `drv/lpc55-flash::Flash`, which is
//! "written in a very generic form that doesn't assume any particular
//! execution model." The real EEPROM/flash peripheral is out of scope
//! (`spec.md` §1); [`CredentialStore`] only ever reads and writes through
//! this trait, so a firmware binary supplies the peripheral glue and a
//! host test supplies `testutil::InMemoryNvStorage`.

use ringbuf::ringbuf_entry;
use static_assertions::const_assert_eq;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::ids::{AppIdHash, CredentialId, PrivateKey};

/// Slot tag value for an occupied slot.
pub const TAG_OCCUPIED: u8 = 0xFF;
/// Slot tag value for a free slot (the original firmware writes `0x00`;
/// any value other than `TAG_OCCUPIED` is free per `spec.md` §3).
pub const TAG_FREE: u8 = 0x00;

/// Maximum number of slots the 1000-byte reserved window can hold:
/// `1000 / size_of::<Record>()`.
pub const MAX_SLOTS: usize = 17;

/// One credential entry, laid out exactly as `spec.md` §3/§6 specifies:
/// `app_id_hash` (20) + `credential_id` (16) + `private_key` (21) +
/// `slot_tag` (1) = 58 bytes, in that order.
#[repr(C)]
#[derive(Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct Record {
    pub app_id_hash: AppIdHash,
    pub credential_id: CredentialId,
    pub private_key: PrivateKey,
    pub slot_tag: u8,
}

/// Byte length of one [`Record`], pinned at compile time the way the
/// teacher pins wire/layout invariants with `static_assertions` rather
/// than a runtime check.
pub const RECORD_LEN: usize = 58;
const_assert_eq!(core::mem::size_of::<Record>(), RECORD_LEN);
const_assert_eq!(MAX_SLOTS * RECORD_LEN, 986); // fits the 1000-byte window

/// The non-volatile byte region backing a [`CredentialStore`]: the flat
/// slot array plus the separately-addressed slot count header.
///
/// Implementors own exactly how `Record`s and the header byte map onto
/// real storage (EEPROM byte-at-a-time writes, flash pages, etc). The
/// store never assumes anything about write granularity beyond the
/// ordering contract on [`CredentialStore::append`].
pub trait NvStorage {
    fn header(&self) -> u8;
    fn set_header(&mut self, count: u8);
    fn read_record(&self, slot: usize) -> Record;
    fn write_payload(
        &mut self,
        slot: usize,
        app_id_hash: AppIdHash,
        credential_id: CredentialId,
        private_key: PrivateKey,
    );
    fn write_tag(&mut self, slot: usize, tag: u8);
}

/// A volatile, RAM-backed [`NvStorage`].
///
/// This is **not** durable: every field lives in ordinary RAM and is lost
/// across a reset, which is exactly what `spec.md` §3/§4.4 says must not
/// happen to a real credential store. It exists so a firmware binary with
/// no board-specific flash/EEPROM driver wired in yet can still link and
/// run the full dispatcher end to end (`task-yubino` uses it today), the
/// same stopgap role `lpc55-flash::Flash` fills generically for real NV
/// regions once a board does commit to a flash layout. Replace this with a
/// type backed by the board's reserved flash window before shipping.
#[derive(Default)]
pub struct RamNvStorage {
    records: [Record; MAX_SLOTS],
    count: u8,
}

impl NvStorage for RamNvStorage {
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
        app_id_hash: AppIdHash,
        credential_id: CredentialId,
        private_key: PrivateKey,
    ) {
        self.records[slot].app_id_hash = app_id_hash;
        self.records[slot].credential_id = credential_id;
        self.records[slot].private_key = private_key;
    }

    fn write_tag(&mut self, slot: usize, tag: u8) {
        self.records[slot].slot_tag = tag;
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum StoreError {
    /// All `MAX_SLOTS` slots are allocated; the caller's key material
    /// must be discarded, not partially persisted.
    Full,
}

#[derive(Eq, PartialEq, Copy, Clone)]
enum Trace {
    None,
    Appended { slot: u8 },
    Full,
    Erased { slots: u8 },
}

ringbuf::ringbuf!(Trace, 16, Trace::None);

/// The slotted credential store described in `spec.md` §4.4.
pub struct CredentialStore<S> {
    storage: S,
}

impl<S: NvStorage> CredentialStore<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Number of allocated slots. Not necessarily the number of
    /// *occupied* slots after a reset that didn't renumber (`spec.md`
    /// §3); in this implementation reset always renumbers to zero.
    pub fn count(&self) -> u8 {
        self.storage.header()
    }

    /// Returns the record at `index`, which must be `< self.count()`.
    pub fn record(&self, index: u8) -> Record {
        self.storage.read_record(index as usize)
    }

    /// Appends a new entry. Write order is payload, then tag, then
    /// header, matching `spec.md` §4.4 exactly: a power loss before the
    /// tag write leaves the slot looking free; a power loss before the
    /// header write leaves it orphaned but invisible.
    ///
    /// On [`StoreError::Full`] nothing is written: the caller's freshly
    /// generated key pair must be discarded by the handler, not
    /// persisted partially.
    pub fn append(
        &mut self,
        app_id_hash: AppIdHash,
        credential_id: CredentialId,
        private_key: PrivateKey,
    ) -> Result<(), StoreError> {
        let count = self.storage.header();
        if count as usize >= MAX_SLOTS {
            ringbuf_entry!(Trace::Full);
            return Err(StoreError::Full);
        }
        self.storage
            .write_payload(count as usize, app_id_hash, credential_id, private_key);
        self.storage.write_tag(count as usize, TAG_OCCUPIED);
        self.storage.set_header(count + 1);
        ringbuf_entry!(Trace::Appended { slot: count });
        Ok(())
    }

    /// Linear scan over slots `0..count` comparing `app_id_hash`
    /// byte-by-byte. Returns the first match's `credential_id` and
    /// `private_key`. Does **not** consult `slot_tag` (`spec.md` §4.4):
    /// the tag is maintained for a future compaction scheme but is dead
    /// metadata under the current read policy.
    pub fn find_by_app_id(
        &self,
        app_id_hash: &AppIdHash,
    ) -> Option<(CredentialId, PrivateKey)> {
        for i in 0..self.storage.header() {
            let record = self.storage.read_record(i as usize);
            if record.app_id_hash.as_ref() == app_id_hash.as_ref() {
                return Some((record.credential_id, record.private_key));
            }
        }
        None
    }

    /// Marks every allocated slot's tag free (best effort) and zeroes the
    /// header. After this the store appears empty to every subsequent
    /// operation.
    pub fn erase_all(&mut self) {
        let count = self.storage.header();
        for i in 0..count {
            self.storage.write_tag(i as usize, TAG_FREE);
        }
        self.storage.set_header(0);
        ringbuf_entry!(Trace::Erased { slots: count });
    }

    /// Streams `(credential_id, app_id_hash)` for every allocated slot in
    /// index order. Private keys are never emitted (`spec.md` §4.4); this
    /// takes a callback rather than returning a collection since the
    /// store has no allocator to build one in.
    pub fn enumerate(&self, mut on_entry: impl FnMut(CredentialId, AppIdHash)) {
        for i in 0..self.storage.header() {
            let record = self.storage.read_record(i as usize);
            on_entry(record.credential_id, record.app_id_hash);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::InMemoryNvStorage;

    fn app_id(byte: u8) -> AppIdHash {
        AppIdHash::new([byte; 20])
    }

    fn cred_id(byte: u8) -> CredentialId {
        CredentialId::new([byte; 16])
    }

    fn priv_key(byte: u8) -> PrivateKey {
        PrivateKey::new([byte; 21])
    }

    #[test]
    fn append_then_find_round_trips() {
        let mut store = CredentialStore::new(InMemoryNvStorage::default());
        store.append(app_id(1), cred_id(1), priv_key(1)).unwrap();
        let (cred, key) = store.find_by_app_id(&app_id(1)).unwrap();
        assert_eq!(cred.as_ref(), cred_id(1).as_ref());
        assert_eq!(key.as_ref(), priv_key(1).as_ref());
    }

    #[test]
    fn find_on_empty_store_is_none() {
        let store = CredentialStore::new(InMemoryNvStorage::default());
        assert!(store.find_by_app_id(&app_id(9)).is_none());
    }

    #[test]
    fn duplicate_app_id_resolves_to_the_oldest_entry() {
        let mut store = CredentialStore::new(InMemoryNvStorage::default());
        store.append(app_id(5), cred_id(1), priv_key(1)).unwrap();
        store.append(app_id(5), cred_id(2), priv_key(2)).unwrap();
        let (cred, _) = store.find_by_app_id(&app_id(5)).unwrap();
        assert_eq!(cred.as_ref(), cred_id(1).as_ref());
    }

    #[test]
    fn capacity_is_exactly_seventeen() {
        let mut store = CredentialStore::new(InMemoryNvStorage::default());
        for i in 0..MAX_SLOTS as u8 {
            store.append(app_id(i), cred_id(i), priv_key(i)).unwrap();
        }
        assert_eq!(store.count() as usize, MAX_SLOTS);
        let err = store.append(app_id(200), cred_id(200), priv_key(200));
        assert_eq!(err, Err(StoreError::Full));
        // Count must be unchanged, and the discarded attempt must not be
        // visible anywhere.
        assert_eq!(store.count() as usize, MAX_SLOTS);
        assert!(store.find_by_app_id(&app_id(200)).is_none());
    }

    #[test]
    fn reset_purges_everything() {
        let mut store = CredentialStore::new(InMemoryNvStorage::default());
        store.append(app_id(1), cred_id(1), priv_key(1)).unwrap();
        store.append(app_id(2), cred_id(2), priv_key(2)).unwrap();
        store.erase_all();
        assert_eq!(store.count(), 0);
        assert!(store.find_by_app_id(&app_id(1)).is_none());
        assert!(store.find_by_app_id(&app_id(2)).is_none());
    }

    #[test]
    fn enumerate_visits_slots_in_index_order_and_omits_private_keys() {
        let mut store = CredentialStore::new(InMemoryNvStorage::default());
        store.append(app_id(1), cred_id(1), priv_key(1)).unwrap();
        store.append(app_id(2), cred_id(2), priv_key(2)).unwrap();
        let mut seen = Vec::new();
        store.enumerate(|cred, app| seen.push((cred, app)));
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0.as_ref(), cred_id(1).as_ref());
        assert_eq!(seen[1].0.as_ref(), cred_id(2).as_ref());
    }
}
