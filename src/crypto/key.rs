//! Key newtypes used for mesh and provisioning security. Wrapping the raw
//! 16-byte arrays keeps network keys from being fed where an application or
//! session key belongs.
use crate::crypto::k_funcs::{k1, k4};
use crate::crypto::{hex_16_to_array, ECDHSecret, ProvisioningSalt, Salt, AID};
use core::convert::TryFrom;
use core::fmt::{Error, Formatter, LowerHex, UpperHex};

pub const KEY_LEN: usize = 16;

/// 128-bit AES key.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialOrd, PartialEq, Ord)]
#[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
pub struct Key([u8; KEY_LEN]);
pub const ZERO_KEY: Key = Key([0_u8; KEY_LEN]);

impl Key {
    #[must_use]
    pub const fn new(key_bytes: [u8; KEY_LEN]) -> Key {
        Key(key_bytes)
    }
    #[must_use]
    pub fn from_hex(hex: &str) -> Option<Key> {
        Some(Key::new(hex_16_to_array(hex)?))
    }
    #[must_use]
    pub fn random_secure() -> Key {
        use rand::RngCore;
        let mut bytes = [0_u8; KEY_LEN];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Key(bytes)
    }
    #[must_use]
    pub fn as_salt(&self) -> Salt {
        Salt::new(self.0)
    }
    #[must_use]
    pub const fn bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}
impl TryFrom<&[u8]> for Key {
    type Error = core::array::TryFromSliceError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        Ok(Key::new(value.try_into()?))
    }
}
impl AsRef<[u8]> for Key {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
impl UpperHex for Key {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        for &b in &self.0 {
            write!(f, "{:02X}", b)?;
        }
        Ok(())
    }
}
impl LowerHex for Key {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        for &b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

macro_rules! wrapped_key {
    ($(#[$docs:meta])* $name:ident) => {
        $(#[$docs])*
        #[derive(Clone, Copy, Debug, Hash, Eq, PartialOrd, PartialEq, Ord)]
        #[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
        pub struct $name(Key);
        impl $name {
            #[must_use]
            pub const fn new(key: Key) -> Self {
                Self(key)
            }
            #[must_use]
            pub const fn new_bytes(key_bytes: [u8; KEY_LEN]) -> Self {
                Self(Key::new(key_bytes))
            }
            #[must_use]
            pub fn from_hex(hex: &str) -> Option<Self> {
                Some(Self::new_bytes(hex_16_to_array(hex)?))
            }
            #[must_use]
            pub const fn key(&self) -> &Key {
                &self.0
            }
        }
        impl From<Key> for $name {
            fn from(k: Key) -> Self {
                Self(k)
            }
        }
        impl TryFrom<&[u8]> for $name {
            type Error = core::array::TryFromSliceError;

            fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
                Ok(Self::new(value.try_into()?))
            }
        }
        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                self.0.as_ref()
            }
        }
    };
}

wrapped_key!(
    /// Network key shared by every node of one network. NID, encryption key
    /// and privacy key all derive from it via `k2`.
    NetKey
);
wrapped_key!(
    /// Application key. The 6-bit AID it advertises comes from `k4`.
    AppKey
);
wrapped_key!(
    /// Per-node device key, established by the provisioning handshake and
    /// used in place of an application key for node configuration traffic.
    DevKey
);
wrapped_key!(
    /// Network-PDU payload encryption key (`k2` output).
    EncryptionKey
);
wrapped_key!(
    /// Network-PDU header obfuscation key (`k2` output).
    PrivacyKey
);
wrapped_key!(
    /// Provisioning-data encryption key, `k1(secret, prov_salt, "prsk")`.
    SessionKey
);
wrapped_key!(
    /// Handshake confirmation key, `k1(secret, confirmation_salt, "prck")`.
    ConfirmationKey
);

impl NetKey {
    #[must_use]
    pub fn random_secure() -> NetKey {
        NetKey(Key::random_secure())
    }
}
impl AppKey {
    #[must_use]
    pub fn random_secure() -> AppKey {
        AppKey(Key::random_secure())
    }
    #[must_use]
    pub fn aid(&self) -> AID {
        k4(self.key())
    }
}
impl DevKey {
    #[must_use]
    pub fn aid(&self) -> AID {
        k4(self.key())
    }
    /// `k1(ecdh_secret, provisioning_salt, "prdk")`.
    #[must_use]
    pub fn from_secret_salt(secret: &ECDHSecret, salt: &ProvisioningSalt) -> DevKey {
        DevKey(k1(secret.as_ref(), salt.as_salt(), b"prdk"))
    }
}
impl SessionKey {
    /// `k1(ecdh_secret, provisioning_salt, "prsk")`.
    #[must_use]
    pub fn from_secret_salt(secret: &ECDHSecret, salt: &ProvisioningSalt) -> SessionKey {
        SessionKey(k1(secret.as_ref(), salt.as_salt(), b"prsk"))
    }
}
impl ConfirmationKey {
    /// `k1(ecdh_secret, confirmation_salt, "prck")`.
    #[must_use]
    pub fn from_secret_salt(secret: &ECDHSecret, salt: Salt) -> ConfirmationKey {
        ConfirmationKey(k1(secret.as_ref(), salt, b"prck"))
    }
}
