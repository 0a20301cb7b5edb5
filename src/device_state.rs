//! Key-store boundary. All credential and sequence state lives behind this
//! trait so the protocol layers carry no hidden globals; persistence is the
//! embedder's business. `MemoryKeyStore` backs tests and simple embedders.
use crate::address::{GroupAddress, UnicastAddress};
use crate::crypto::materials::{ApplicationCredential, DeviceCredential, NetworkCredential};
use crate::mesh::SequenceNumber;
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Error)]
pub enum AllocError {
    #[error("sequence number space exhausted")]
    SequenceExhausted,
    #[error("no unassigned unicast address left")]
    UnicastExhausted,
}

/// Opaque string identities key every lookup, mirroring how the surrounding
/// record store names networks, applications and nodes.
pub trait KeyStore: Send + Sync {
    fn network(&self, identity: &str) -> Option<NetworkCredential>;
    fn application(&self, identity: &str) -> Option<ApplicationCredential>;
    fn device(&self, identity: &str) -> Option<DeviceCredential>;
    /// Every known network, for NID-scan decryption on receive.
    fn networks(&self) -> Vec<NetworkCredential>;
    /// Returns the next unused sequence number for the node and advances the
    /// counter. Sequence numbers are 24-bit and never wrap.
    fn next_seq(&self, node_identity: &str) -> Result<SequenceNumber, AllocError>;
    /// Members of a group address, for inbound source validation on group
    /// destinations.
    fn group_members(&self, group: GroupAddress) -> Vec<UnicastAddress>;
}

#[derive(Default)]
struct Inner {
    networks: HashMap<String, NetworkCredential>,
    applications: HashMap<String, ApplicationCredential>,
    devices: HashMap<String, DeviceCredential>,
    sequences: HashMap<String, u32>,
    groups: HashMap<GroupAddress, Vec<UnicastAddress>>,
    next_unicast: u16,
}

pub struct MemoryKeyStore {
    inner: Mutex<Inner>,
}
impl MemoryKeyStore {
    #[must_use]
    pub fn new() -> MemoryKeyStore {
        MemoryKeyStore {
            inner: Mutex::new(Inner {
                next_unicast: 1,
                ..Inner::default()
            }),
        }
    }
    pub fn insert_network(&self, identity: &str, credential: NetworkCredential) {
        self.lock().networks.insert(identity.to_owned(), credential);
    }
    pub fn insert_application(&self, identity: &str, credential: ApplicationCredential) {
        self.lock()
            .applications
            .insert(identity.to_owned(), credential);
    }
    pub fn insert_device(&self, identity: &str, credential: DeviceCredential) {
        self.lock().devices.insert(identity.to_owned(), credential);
    }
    pub fn insert_group_member(&self, group: GroupAddress, member: UnicastAddress) {
        self.lock().groups.entry(group).or_default().push(member);
    }
    /// Hands out the next free unicast address for a newly provisioned node.
    pub fn allocate_unicast(&self) -> Result<UnicastAddress, AllocError> {
        let mut inner = self.lock();
        let address =
            UnicastAddress::try_from(inner.next_unicast).or(Err(AllocError::UnicastExhausted))?;
        inner.next_unicast = inner
            .next_unicast
            .checked_add(1)
            .ok_or(AllocError::UnicastExhausted)?;
        Ok(address)
    }
    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("key store lock poisoned")
    }
}
impl Default for MemoryKeyStore {
    fn default() -> Self {
        Self::new()
    }
}
impl KeyStore for MemoryKeyStore {
    fn network(&self, identity: &str) -> Option<NetworkCredential> {
        self.lock().networks.get(identity).copied()
    }
    fn application(&self, identity: &str) -> Option<ApplicationCredential> {
        self.lock().applications.get(identity).copied()
    }
    fn device(&self, identity: &str) -> Option<DeviceCredential> {
        self.lock().devices.get(identity).copied()
    }
    fn networks(&self) -> Vec<NetworkCredential> {
        self.lock().networks.values().copied().collect()
    }
    fn next_seq(&self, node_identity: &str) -> Result<SequenceNumber, AllocError> {
        let mut inner = self.lock();
        let counter = inner.sequences.entry(node_identity.to_owned()).or_insert(0);
        if *counter > crate::mesh::U24::max_value() {
            return Err(AllocError::SequenceExhausted);
        }
        let seq = SequenceNumber::new(*counter);
        *counter += 1;
        Ok(seq)
    }
    fn group_members(&self, group: GroupAddress) -> Vec<UnicastAddress> {
        self.lock().groups.get(&group).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::key::NetKey;
    use crate::mesh::{IVIndex, KeyIndex};

    #[test]
    fn sequence_numbers_advance_per_node() {
        let store = MemoryKeyStore::new();
        assert_eq!(store.next_seq("a").unwrap(), SequenceNumber::new(0));
        assert_eq!(store.next_seq("a").unwrap(), SequenceNumber::new(1));
        assert_eq!(store.next_seq("b").unwrap(), SequenceNumber::new(0));
    }

    #[test]
    fn unicast_allocation_advances() {
        let store = MemoryKeyStore::new();
        assert_eq!(store.allocate_unicast().unwrap(), UnicastAddress::new(1));
        assert_eq!(store.allocate_unicast().unwrap(), UnicastAddress::new(2));
    }

    #[test]
    fn network_lookup() {
        let store = MemoryKeyStore::new();
        let cred = NetworkCredential::new(NetKey::random_secure(), KeyIndex::new(3), IVIndex(9));
        store.insert_network("main", cred);
        assert_eq!(store.network("main"), Some(cred));
        assert_eq!(store.network("other"), None);
        assert_eq!(store.networks(), vec![cred]);
    }
}
