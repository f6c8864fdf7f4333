// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Nominal wrappers around the fixed-size opaque byte strings that cross
//! the wire or live in a credential record.
//!
//! The wire protocol never interprets any of these as anything but an
//! opaque byte string (see `spec.md` §9), but distinct types keep a
//! handler from accidentally passing an `AppIdHash` where a
//! `CredentialId` was expected.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

macro_rules! opaque_id {
    ($name:ident, $len:expr, $doc:expr) => {
        #[doc = $doc]
        #[derive(
            Clone,
            Copy,
            PartialEq,
            Eq,
            Default,
            FromBytes,
            IntoBytes,
            Immutable,
            KnownLayout,
            Unaligned,
        )]
        #[repr(transparent)]
        pub struct $name([u8; $len]);

        impl $name {
            pub const LEN: usize = $len;

            pub const fn new(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl core::fmt::Debug for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.debug_tuple(stringify!($name)).field(&self.0).finish()
            }
        }
    };
}

opaque_id!(
    AppIdHash,
    20,
    "Opaque relying-party identifier supplied by the host, treated bit-wise."
);
opaque_id!(
    CredentialId,
    16,
    "Opaque handle for a stored key pair, returned to and echoed by the host."
);
opaque_id!(
    ClientDataHash,
    20,
    "The digest the host wants the token to sign over."
);
opaque_id!(PublicKey, 40, "EC public-point encoding returned on creation.");
opaque_id!(Signature, 40, "Signature over a `ClientDataHash`.");

/// An EC private scalar.
///
/// Unlike the other opaque IDs this is secret material: it derives neither
/// `Debug` nor `PartialEq` in the normal way it never leaves the device,
/// but if code ever does need to print one while debugging, the contents
/// must not leak into logs. [`PrivateKey`]'s `Debug` impl always prints a
/// redacted placeholder.
#[derive(Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(transparent)]
pub struct PrivateKey([u8; Self::LEN]);

impl PrivateKey {
    pub const LEN: usize = 21;

    pub const fn new(bytes: [u8; Self::LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; Self::LEN] {
        &self.0
    }
}

impl From<[u8; Self::LEN]> for PrivateKey {
    fn from(bytes: [u8; Self::LEN]) -> Self {
        Self(bytes)
    }
}

impl Default for PrivateKey {
    fn default() -> Self {
        Self([0u8; Self::LEN])
    }
}

impl AsRef<[u8]> for PrivateKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl core::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("PrivateKey").field(&"<redacted>").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_id_hash_truncates_cleanly_into_credential_id() {
        let mut bytes = [0u8; 20];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = i as u8;
        }
        let app_id_hash = AppIdHash::new(bytes);
        let mut cred_bytes = [0u8; 16];
        cred_bytes.copy_from_slice(&app_id_hash.as_ref()[..16]);
        let credential_id = CredentialId::new(cred_bytes);
        assert_eq!(credential_id.as_ref(), &bytes[..16]);
    }

    #[test]
    fn private_key_debug_redacts() {
        let key = PrivateKey::new([0xAA; 21]);
        let rendered = format!("{:?}", key);
        assert!(!rendered.contains("170")); // 0xAA as decimal, would appear if bytes leaked
        assert!(rendered.contains("redacted"));
    }
}
