//! Security materials: the credential records loaned out by the key store
//! and the keys derived from them on demand.
use crate::crypto::key::{AppKey, DevKey, EncryptionKey, NetKey, PrivacyKey};
use crate::crypto::{k2, AID};
use crate::mesh::{IVIndex, KeyIndex, NID};

/// The `k2` output for a network key: everything the network layer needs to
/// seal or open one PDU.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct NetworkKeys {
    nid: NID,
    encryption: EncryptionKey,
    privacy: PrivacyKey,
}
impl NetworkKeys {
    #[must_use]
    pub fn new(nid: NID, encryption: EncryptionKey, privacy: PrivacyKey) -> Self {
        Self {
            nid,
            encryption,
            privacy,
        }
    }
    #[must_use]
    pub fn nid(&self) -> NID {
        self.nid
    }
    #[must_use]
    pub fn encryption_key(&self) -> &EncryptionKey {
        &self.encryption
    }
    #[must_use]
    pub fn privacy_key(&self) -> &PrivacyKey {
        &self.privacy
    }
}
impl From<&NetKey> for NetworkKeys {
    fn from(k: &NetKey) -> Self {
        let (nid, encryption, privacy) = k2(k.key(), b"\x00");
        Self::new(nid, encryption, privacy)
    }
}

/// One network's credentials. Never mutated; key refresh replaces the record
/// wholesale in the store.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
#[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
pub struct NetworkCredential {
    pub net_key: NetKey,
    pub key_index: KeyIndex,
    pub iv_index: IVIndex,
}
impl NetworkCredential {
    #[must_use]
    pub fn new(net_key: NetKey, key_index: KeyIndex, iv_index: IVIndex) -> Self {
        Self {
            net_key,
            key_index,
            iv_index,
        }
    }
    #[must_use]
    pub fn network_keys(&self) -> NetworkKeys {
        NetworkKeys::from(&self.net_key)
    }
    /// NIDs are 7 bits so different networks can share one; only a decrypt
    /// attempt can tell them apart.
    #[must_use]
    pub fn matches_nid(&self, nid: NID) -> bool {
        self.network_keys().nid() == nid
    }
}

/// One application's credentials.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
#[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
pub struct ApplicationCredential {
    pub app_key: AppKey,
    pub key_index: KeyIndex,
}
impl ApplicationCredential {
    #[must_use]
    pub fn new(app_key: AppKey, key_index: KeyIndex) -> Self {
        Self { app_key, key_index }
    }
    #[must_use]
    pub fn aid(&self) -> AID {
        self.app_key.aid()
    }
}

/// A node's device key, established during provisioning.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
#[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceCredential {
    pub device_key: DevKey,
}
impl DeviceCredential {
    #[must_use]
    pub fn new(device_key: DevKey) -> Self {
        Self { device_key }
    }
    #[must_use]
    pub fn aid(&self) -> AID {
        self.device_key.aid()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_derives_nid() {
        let cred = NetworkCredential::new(
            NetKey::from_hex("f7a2a44f8e8a8029064f173ddc1e2b00").unwrap(),
            KeyIndex::new(0),
            IVIndex(0),
        );
        assert!(cred.matches_nid(NID::new(0x7F)));
        assert!(!cred.matches_nid(NID::new(0x00)));
    }
}
